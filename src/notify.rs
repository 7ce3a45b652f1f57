//! New-post notification mail.
//!
//! Delivery is fire-and-report: the ingestor logs and counts a failed send,
//! it never fails the ingestion because of one.

use crate::storage::PostRecord;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("Could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("Mail relay error: {0}")]
    Relay(#[from] lettre::transport::smtp::Error),
}

/// A formatted message for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

impl Notification {
    /// Formats the announcement of a newly ingested post.
    pub fn for_post(record: &PostRecord, recipient: &str) -> Self {
        let subject = format!("{} - {}", record.source.to_uppercase(), record.title);
        let html_body = format!(
            "<html><body><br><i>Posted by {} in {} blog on {}</i><br><br>\
             <a href=\"{}\">view post here</a><br><br>{}<br></body></html>",
            record.author, record.source, record.date, record.link, record.raw_html
        );

        Self {
            recipient: recipient.to_string(),
            subject,
            html_body,
        }
    }
}

/// Outbound message delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// [`Notifier`] relaying through an SMTP server over TLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Builds a TLS relay to `host`, authenticating when a username is given.
    pub fn new(
        host: &str,
        username: Option<&str>,
        password: Option<SecretString>,
        from: &str,
    ) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?;
        if let Some(user) = username {
            let secret = password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(user.to_string(), secret));
        }

        Ok(Self {
            transport: builder.build(),
            from: from.parse()?,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(notification.recipient.parse()?)
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(notification.html_body.clone())?;

        self.transport.send(message).await?;
        tracing::info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "Notification sent"
        );
        Ok(())
    }
}

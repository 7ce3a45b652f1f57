//! Invocation contract: one request in, one `(category, updated)` pair out.
//!
//! A scheduler calls this once per feed with the guids it already holds for
//! that feed, and periodically with `{"mode": "all"}` to refresh the
//! cross-category snapshot.

use crate::config::Config;
use crate::content::{ContentExtractor, EntityTagger};
use crate::feed::{FeedIngestor, FeedSource, FetchError, KnownGuids};
use crate::notify::Notifier;
use crate::snapshot::{
    is_fresh_enough, BlobStore, SnapshotError, SnapshotPublisher, SnapshotReconciler,
    ALL_CATEGORIES,
};
use crate::storage::RecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum InvocationRequest {
    /// Ingest one feed.
    Feed {
        url: String,
        category: String,
        #[serde(default, alias = "knownGuids", alias = "guids")]
        known_guids: Vec<String>,
    },
    /// Rebuild the cross-category snapshot if the bucket changed recently.
    All,
    /// Rebuild one category's snapshot unconditionally.
    Snapshot { category: String },
}

/// Result of an invocation. Serializes as the pair `[category, updated]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub category: String,
    pub updated: bool,
}

impl Serialize for InvocationOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.category, self.updated).serialize(serializer)
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Feed retrieval failed: {0}")]
    Feed(#[from] FetchError),
    #[error("Snapshot rebuild failed: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// External collaborators an invocation runs against.
pub struct Services<'a> {
    pub feeds: &'a dyn FeedSource,
    pub extractor: &'a dyn ContentExtractor,
    pub tagger: &'a dyn EntityTagger,
    pub store: &'a dyn RecordStore,
    pub blobs: &'a dyn BlobStore,
    pub notifier: Option<&'a dyn Notifier>,
}

/// Runs one invocation against the current time.
pub async fn handle(
    request: InvocationRequest,
    services: &Services<'_>,
    config: &Config,
) -> Result<InvocationOutcome, InvocationError> {
    handle_at(request, services, config, Utc::now()).await
}

/// Runs one invocation as of `now`.
pub async fn handle_at(
    request: InvocationRequest,
    services: &Services<'_>,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<InvocationOutcome, InvocationError> {
    match request {
        InvocationRequest::Feed {
            url,
            category,
            known_guids,
        } => {
            let known: KnownGuids = known_guids.into_iter().collect();
            let report = ingestor(services, config)
                .ingest_at(&url, &category, &known, now.timestamp())
                .await?;
            Ok(InvocationOutcome {
                category,
                updated: report.updated(),
            })
        }
        InvocationRequest::All => {
            let listing = services.blobs.list().await.map_err(SnapshotError::from)?;
            for object in &listing {
                let age = now.signed_duration_since(object.last_modified).num_seconds();
                tracing::debug!(key = %object.key, age_secs = age, "Snapshot object");
            }

            let updated = is_fresh_enough(&listing, now);
            if updated {
                rebuild(ALL_CATEGORIES, services, config, now).await?;
            } else {
                tracing::info!("No recent bucket changes, snapshot rebuild skipped");
            }
            Ok(InvocationOutcome {
                category: ALL_CATEGORIES.to_string(),
                updated,
            })
        }
        InvocationRequest::Snapshot { category } => {
            rebuild(&category, services, config, now).await?;
            Ok(InvocationOutcome {
                category,
                updated: true,
            })
        }
    }
}

fn ingestor<'a>(services: &Services<'a>, config: &Config) -> FeedIngestor<'a> {
    let ingestor = FeedIngestor::new(
        services.feeds,
        services.extractor,
        services.tagger,
        services.store,
    )
    .with_retention_days(config.days_to_retrieve)
    .with_language_code(&config.language_code);

    match (config.send_emails, services.notifier, config.to_email.as_deref()) {
        (true, Some(notifier), Some(recipient)) => ingestor.with_notifications(notifier, recipient),
        (true, _, _) => {
            tracing::warn!("Notifications enabled but no notifier or recipient configured");
            ingestor
        }
        _ => ingestor,
    }
}

async fn rebuild(
    category: &str,
    services: &Services<'_>,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<(), SnapshotError> {
    let content = SnapshotReconciler::new(services.store, services.blobs)
        .with_page_size(config.page_size)
        .reconcile_at(category, config.days_to_retrieve, now.timestamp())
        .await?;
    SnapshotPublisher::new(services.blobs)
        .publish(category, &content)
        .await?;
    Ok(())
}

use crate::util::{validate_link, UrlValidationError};
use async_trait::async_trait;
use futures::StreamExt;
use pulldown_cmark::{html, Event, Parser, TagEnd};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;

/// Browser identity presented when retrieving article pages.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:79.0) Gecko/20100101 Firefox/79.0";

/// Hosted reader service; the only base URL that is sent the API key.
pub const HOSTED_READER_BASE_URL: &str = "https://r.jina.ai";

pub(super) const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB
pub(super) const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub(super) const MAX_RETRIES: u32 = 3;

/// CSS selectors targeting main article content across common blog platforms.
const TARGET_SELECTORS: &str =
    "article, .entry-content, .post-content, .article-content, .post-body, main .content, main";

/// If the selector-scoped extraction returns less than this, retry without it.
const MIN_CONTENT_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid article link: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Insecure reader base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("No article text could be extracted")]
    Empty,
}

impl ContentError {
    /// Returns true if this error is transient and the request should be retried.
    pub(super) fn is_retryable(&self) -> bool {
        match self {
            ContentError::Timeout | ContentError::Network(_) => true,
            ContentError::HttpStatus(status) => *status >= 500,
            ContentError::ResponseTooLarge(_)
            | ContentError::InvalidUtf8
            | ContentError::InvalidUrl(_)
            | ContentError::InsecureBaseUrl
            | ContentError::Empty => false,
        }
    }
}

/// Article body in two renditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Formatted HTML of the main article content
    pub raw_html: String,
    /// Plain text of the same content, one block per line
    pub text: String,
}

/// Retrieves the main content of an article page.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, link: &str) -> Result<ExtractedContent, ContentError>;
}

/// [`ContentExtractor`] backed by a reader service (`<base>/<article url>`
/// returning Markdown), rendered to HTML and plain text locally.
///
/// Only used when a reader base URL is configured. The article host never
/// sees this client; the service fetches the page on its behalf.
pub struct ReaderClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    retry_base: Duration,
}

impl ReaderClient {
    /// Builds a client presenting [`BROWSER_USER_AGENT`].
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::InsecureBaseUrl`] for a non-HTTPS base URL
    /// other than localhost.
    pub fn new(base_url: &str, api_key: Option<SecretString>) -> Result<Self, ContentError> {
        let base = base_url.trim_end_matches('/');
        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS reader base URL");
                return Err(ContentError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS reader base URL (localhost only)");
        }

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base.to_string(),
            api_key,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Overrides the first retry delay (doubles on each retry).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    async fn fetch_with_retry(
        &self,
        reader_url: &str,
        use_selector: bool,
    ) -> Result<String, ContentError> {
        let mut retry_count = 0;

        loop {
            match self.fetch_once(reader_url, use_selector).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                    let delay = self.retry_base * 2u32.pow(retry_count);
                    tracing::debug!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying reader fetch after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, reader_url: &str, use_selector: bool) -> Result<String, ContentError> {
        let mut request = self.client.get(reader_url);

        if use_selector {
            request = request.header("X-Target-Selector", TARGET_SELECTORS);
        }

        // Only the official service receives the API key
        if let Some(key) = &self.api_key {
            if self.base_url == HOSTED_READER_BASE_URL {
                request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
            }
        }

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ContentError::Timeout)?
            .map_err(ContentError::Network)?;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        read_limited_text(response, MAX_CONTENT_SIZE).await
    }
}

#[async_trait]
impl ContentExtractor for ReaderClient {
    async fn extract(&self, link: &str) -> Result<ExtractedContent, ContentError> {
        let article = validate_link(link)?;
        let reader_url = format!("{}/{}", self.base_url, article.as_str());

        let mut markdown = self.fetch_with_retry(&reader_url, true).await?;
        if markdown.len() < MIN_CONTENT_LEN {
            tracing::debug!(
                content_len = markdown.len(),
                link = %link,
                "Target selector returned minimal content, retrying without selector"
            );
            markdown = self.fetch_with_retry(&reader_url, false).await?;
        }

        let markdown = strip_boilerplate(&markdown);
        let rendered = render_markdown(&markdown);
        if rendered.text.is_empty() {
            return Err(ContentError::Empty);
        }
        Ok(rendered)
    }
}

/// Renders reader Markdown to formatted HTML plus its plain text.
pub fn render_markdown(markdown: &str) -> ExtractedContent {
    let mut raw_html = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut raw_html, Parser::new(markdown));

    let mut text = String::with_capacity(markdown.len());
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak => text.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
            ) => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }

    ExtractedContent {
        raw_html,
        text: text.trim_matches('\n').to_string(),
    }
}

/// Drops reader-service scaffolding and common blog chrome.
///
/// Removes the `Title:`/`URL Source:`/`Markdown Content:` preamble, skip
/// links, comment form remnants, WordPress footers, and runs of three or
/// more month-archive links.
fn strip_boilerplate(content: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();

    lines.retain(|line| {
        let trimmed = line.trim();
        !(trimmed.starts_with("Title:")
            || trimmed.starts_with("URL Source:")
            || trimmed.starts_with("Published Time:")
            || trimmed == "Markdown Content:"
            || trimmed.starts_with("[Skip to content]")
            || trimmed == "Loading Comments..."
            || trimmed == "Write a Comment..."
            || trimmed.starts_with("Email (Required)")
            || trimmed.contains("Proudly powered by WordPress")
            || trimmed == "Menu")
    });

    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    let mut run_start = 0;
    let mut run_len = 0;

    for line in lines {
        if is_archive_link(line) {
            if run_len == 0 {
                run_start = result.len();
            }
            run_len += 1;
        } else {
            if run_len >= 3 {
                result.truncate(run_start);
            }
            run_len = 0;
        }
        result.push(line);
    }
    if run_len >= 3 {
        result.truncate(run_start);
    }

    result.join("\n")
}

const MONTHS: &[&str] = &[
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Matches `*   [Month YYYY](url)`
fn is_archive_link(line: &str) -> bool {
    let Some(item) = line.trim().strip_prefix('*') else {
        return false;
    };
    let Some(label) = item.trim_start().strip_prefix('[') else {
        return false;
    };
    let Some((text, _)) = label.split_once(']') else {
        return false;
    };
    match text.split_once(' ') {
        Some((month, year)) => {
            MONTHS.contains(&month) && year.len() == 4 && year.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

pub(super) async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}

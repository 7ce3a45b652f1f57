use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Record store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds a lock on the database
    #[error("Record store is locked by another process")]
    Locked,

    /// Migration failed
    #[error("Record store migration failed: {0}")]
    Migration(String),

    /// Continuation token could not be decoded
    #[error("Invalid continuation token: {0}")]
    InvalidToken(String),

    /// Generic database error
    #[error("Record store error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, mapping SQLite lock conditions to [`StoreError::Locked`]
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return StoreError::Locked;
        }
        StoreError::Other(err)
    }
}

pub(crate) fn is_lock_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    // SQLITE_BUSY (5), SQLITE_LOCKED (6)
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("sqlite_busy")
        || lower.contains("sqlite_locked")
}

// ============================================================================
// Records
// ============================================================================

/// A persisted post, keyed by `(source, timestamp)` and unique per `(source, guid)`.
///
/// Written once per guid by the ingestor and never edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    /// Category label the post was ingested under (the partition key)
    pub source: String,
    /// Unix epoch seconds (the sort key)
    pub timestamp: i64,
    pub guid: String,
    /// Human-readable form of `timestamp`
    pub date: String,
    pub title: String,
    /// Feed description with markup stripped
    pub description: String,
    /// Cleaned plain-text article body
    pub full_text: String,
    /// Formatted article HTML
    pub raw_html: String,
    pub link: String,
    pub author: String,
    /// Comma-joined detected entities, case preserved (`none` when empty)
    pub tags: String,
    /// Comma-joined feed category terms (`none` when empty)
    pub categories: String,
    /// Scan-friendly constant partition for cross-category queries
    pub visible: bool,
}

impl PostRecord {
    /// Lowercase mirror of [`PostRecord::tags`] for case-insensitive lookup
    pub fn lower_tags(&self) -> String {
        self.tags.to_lowercase()
    }
}

/// Lightweight projection of a [`PostRecord`], as read back by range queries.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PostSummary {
    pub source: String,
    pub timestamp: i64,
    pub guid: String,
    pub date: String,
    pub title: String,
    pub author: String,
    pub link: String,
    pub description: String,
}

// ============================================================================
// Queries
// ============================================================================

/// Which partition a range query reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition {
    /// Posts of one category label
    Source(String),
    /// All visible posts across categories, via the time-ordered secondary index
    Visible,
}

/// A paginated `timestamp > since` range query.
///
/// Continuation pages are requested with the same `RecordQuery` value, so
/// every page reads the partition the first page read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub partition: Partition,
    /// Exclusive lower bound on `timestamp`
    pub since: i64,
    /// Maximum items per page
    pub limit: u32,
}

/// Opaque cursor resuming a [`RecordQuery`] after the last item of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

#[derive(Serialize, Deserialize)]
pub(crate) struct TokenPosition {
    pub timestamp: i64,
    pub source: String,
    pub guid: String,
}

impl PageToken {
    pub(crate) fn encode(position: &TokenPosition) -> Result<Self, StoreError> {
        serde_json::to_string(position)
            .map(PageToken)
            .map_err(|e| StoreError::InvalidToken(e.to_string()))
    }

    pub(crate) fn decode(&self) -> Result<TokenPosition, StoreError> {
        serde_json::from_str(&self.0).map_err(|e| StoreError::InvalidToken(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PageToken {
    fn from(raw: String) -> Self {
        PageToken(raw)
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub items: Vec<PostSummary>,
    /// Present when more items may follow
    pub next: Option<PageToken>,
}

// ============================================================================
// Store Interface
// ============================================================================

/// Durable, range-queryable post store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Idempotent upsert keyed by `(source, guid)`; the last write wins.
    async fn put_post(&self, record: &PostRecord) -> Result<(), StoreError>;

    /// Reads one page of `query`, starting after `start` when given.
    async fn query_page(
        &self,
        query: &RecordQuery,
        start: Option<&PageToken>,
    ) -> Result<RecordPage, StoreError>;
}

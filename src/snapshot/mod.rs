//! Read-optimized per-category exports of the record store.
//!
//! - [`staleness`] decides whether a rebuild is worth running
//! - [`reconcile`] merges the published snapshot with recent posts
//! - [`publish`] replaces the published object
//! - [`blob`] is the object storage they read and write

pub mod blob;
mod publish;
mod reconcile;
mod staleness;
mod types;

use crate::storage::StoreError;
use thiserror::Error;

pub use blob::{Acl, BlobError, BlobStore, FsBlobStore, ObjectSummary, PutOptions};
pub use publish::SnapshotPublisher;
pub use reconcile::{SnapshotReconciler, DEFAULT_PAGE_SIZE, INCREMENTAL_LOOKBACK_DAYS};
pub use staleness::{is_fresh_enough, FRESHNESS_WINDOW_SECS};
pub use types::{in_scope, snapshot_key, SnapshotEntry, ALL_CATEGORIES};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Record store query failed: {0}")]
    Store(#[from] StoreError),
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
    #[error("Could not encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

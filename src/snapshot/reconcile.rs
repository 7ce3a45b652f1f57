//! Rebuilds a category snapshot from the record store.
//!
//! A reconciliation starts from the published snapshot (if any), queries the
//! record store for recent posts page by page until the continuation token
//! runs out, and appends every post the snapshot does not already carry.
//! Posts are told apart by category and guid, the same key the store uses. With a snapshot in place only the last day is read back; without
//! one the full retention window is.

use super::blob::BlobStore;
use super::types::{in_scope, snapshot_key, SnapshotEntry, ALL_CATEGORIES};
use super::SnapshotError;
use crate::feed::SECONDS_PER_DAY;
use crate::storage::{PageToken, Partition, RecordQuery, RecordStore};
use std::collections::HashSet;

/// Lookback used when a published snapshot already exists.
pub const INCREMENTAL_LOOKBACK_DAYS: u32 = 1;

/// Default bound on posts requested per store page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

pub struct SnapshotReconciler<'a> {
    store: &'a dyn RecordStore,
    blobs: &'a dyn BlobStore,
    page_size: u32,
}

impl<'a> SnapshotReconciler<'a> {
    pub fn new(store: &'a dyn RecordStore, blobs: &'a dyn BlobStore) -> Self {
        Self {
            store,
            blobs,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Reconciles `category` against the current time.
    pub async fn reconcile(
        &self,
        category: &str,
        retention_days: u32,
    ) -> Result<Vec<SnapshotEntry>, SnapshotError> {
        self.reconcile_at(category, retention_days, chrono::Utc::now().timestamp())
            .await
    }

    /// Reconciles `category` as of `now` (Unix seconds).
    ///
    /// Fails without producing content if any page query fails, since a
    /// partial union would drop posts from the published snapshot.
    pub async fn reconcile_at(
        &self,
        category: &str,
        retention_days: u32,
        now: i64,
    ) -> Result<Vec<SnapshotEntry>, SnapshotError> {
        let existing = self.load_existing(category).await?;

        let lookback_days = if existing.is_some() {
            INCREMENTAL_LOOKBACK_DAYS
        } else {
            retention_days
        };
        let mut content = existing.unwrap_or_default();
        let mut seen: HashSet<(String, String)> = content
            .iter()
            .map(|e| (e.category.clone(), e.guid.clone()))
            .collect();
        let carried = content.len();

        let partition = if category == ALL_CATEGORIES {
            Partition::Visible
        } else {
            Partition::Source(category.to_string())
        };
        // Every page re-uses this value, so continuations stay bound to `category`.
        let query = RecordQuery {
            partition,
            since: now.saturating_sub(i64::from(lookback_days) * SECONDS_PER_DAY),
            limit: self.page_size,
        };

        let mut token: Option<PageToken> = None;
        let mut pages = 0usize;
        loop {
            let page = self.store.query_page(&query, token.as_ref()).await?;
            pages += 1;

            for post in page.items {
                if seen.insert((post.source.clone(), post.guid.clone())) {
                    content.push(SnapshotEntry::from(post));
                }
            }

            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        content.retain(|entry| in_scope(entry, category));

        tracing::info!(
            category = %category,
            lookback_days,
            pages,
            carried,
            total = content.len(),
            "Snapshot reconciled"
        );
        Ok(content)
    }

    /// Entries of the published snapshot, or `None` when there is none to
    /// build on. An unreadable snapshot is treated as absent.
    async fn load_existing(
        &self,
        category: &str,
    ) -> Result<Option<Vec<SnapshotEntry>>, SnapshotError> {
        let key = snapshot_key(category);
        let Some(body) = self.blobs.get(&key).await? else {
            tracing::info!(key = %key, "No published snapshot, building from scratch");
            return Ok(None);
        };

        match serde_json::from_slice::<Vec<SnapshotEntry>>(&body) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Published snapshot unreadable, rebuilding");
                Ok(None)
            }
        }
    }
}

//! Per-entry ingestion decision: new, already known, or past retention.
//! Each entry is judged on its own against a fixed known-guid set.

use crate::feed::parser::FeedEntry;
use std::collections::HashSet;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Guids already visible to the caller (already stored, or already published).
pub type KnownGuids = HashSet<String>;

/// Outcome of filtering one feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ingest,
    SkipDuplicate,
    SkipStale,
}

/// Decides whether a feed entry should be ingested.
///
/// A known guid is always a duplicate, whatever its age. Otherwise the entry
/// is stale once `now` reaches `published + retention_days` days. The age is
/// measured from the entry's own timestamp.
///
/// Pure: the result depends only on the arguments, never on sibling entries.
pub fn decide(entry: &FeedEntry, known: &KnownGuids, now: i64, retention_days: u32) -> Decision {
    if known.contains(&entry.guid) {
        return Decision::SkipDuplicate;
    }

    let window = i64::from(retention_days).saturating_mul(SECONDS_PER_DAY);
    if now >= entry.published.saturating_add(window) {
        return Decision::SkipStale;
    }

    Decision::Ingest
}

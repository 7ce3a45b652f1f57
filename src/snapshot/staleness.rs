use super::blob::ObjectSummary;
use chrono::{DateTime, Utc};

/// A snapshot written less than this many seconds ago is left alone.
pub const FRESHNESS_WINDOW_SECS: i64 = 60;

/// Whether any object in `listing` was modified within the last
/// [`FRESHNESS_WINDOW_SECS`] before `now`.
///
/// This is a pure function of the listing and the clock: it does not look at
/// which key was modified, so a fresh snapshot of one category suppresses
/// rebuilding every other.
pub fn is_fresh_enough(listing: &[ObjectSummary], now: DateTime<Utc>) -> bool {
    listing.iter().any(|object| {
        let age = now.signed_duration_since(object.last_modified).num_seconds();
        age < FRESHNESS_WINDOW_SECS
    })
}

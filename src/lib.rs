//! Incremental feed ingestion and per-category snapshot publishing.
//!
//! Feeds are pulled, filtered against already-known guids and a retention
//! window, and written to a durable [`storage::RecordStore`]. Snapshots are
//! rebuilt by reconciling the record store with the currently published
//! export and replacing it whole in a [`snapshot::BlobStore`].

pub mod config;
pub mod content;
pub mod feed;
pub mod handler;
pub mod notify;
pub mod snapshot;
pub mod storage;
pub mod util;

//! Durable post store.
//!
//! [`RecordStore`] is the collaborator interface used by ingestion and
//! snapshot reconciliation; [`Database`] implements it on SQLite.

mod posts;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    PageToken, Partition, PostRecord, PostSummary, RecordPage, RecordQuery, RecordStore,
    StoreError,
};

//! Feed ingestion.
//!
//! - [`parser`] - RSS/Atom documents to [`FeedEntry`] values using `feed-rs`
//! - [`fetcher`] - HTTP retrieval with retry, timeout and a size cap
//! - [`filter`] - the per-entry ingest / duplicate / stale decision
//! - [`ingest`] - the [`FeedIngestor`] tying them to the record store
//!
//! # Example
//!
//! ```ignore
//! let ingestor = FeedIngestor::new(&source, &extractor, &tagger, &db)
//!     .with_retention_days(config.days_to_retrieve);
//! let report = ingestor.ingest(url, "compute", &known).await?;
//! println!("updated: {}", report.updated());
//! ```

pub mod fetcher;
pub mod filter;
pub mod ingest;
pub mod parser;

pub use fetcher::{FeedSource, FetchError, HttpFeedSource};
pub use filter::{decide, Decision, KnownGuids, SECONDS_PER_DAY};
pub use ingest::{FeedIngestor, IngestReport, DEFAULT_LANGUAGE_CODE, DEFAULT_RETENTION_DAYS};
pub use parser::{format_post_date, parse_feed, FeedEntry, ParseResult, DEFAULT_AUTHOR};

//! Drives one feed from retrieval to persisted posts.
//!
//! Entries are handled one at a time in document order. Anything that goes
//! wrong with a single entry (article retrieval, tagging, the store write)
//! is logged and counted, and the run moves on to the next entry. Only a
//! failure to retrieve the feed document itself fails the run.

use super::fetcher::{FeedSource, FetchError};
use super::filter::{decide, Decision, KnownGuids};
use super::parser::{format_post_date, FeedEntry};
use crate::content::{tag_post, ContentError, ContentExtractor, EntityTagger, TagError};
use crate::notify::{Notification, Notifier};
use crate::storage::{PostRecord, RecordStore, StoreError};
use crate::util::{clean_description, join_terms, normalize_quotes};
use thiserror::Error;

/// Default language passed to the entity tagger.
pub const DEFAULT_LANGUAGE_CODE: &str = "en";

/// Default retention window for first-time ingestion.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Why a single entry was not persisted.
#[derive(Debug, Error)]
enum EntryError {
    #[error("content extraction failed: {0}")]
    Extraction(#[from] ContentError),
    #[error("tagging failed: {0}")]
    Tagging(#[from] TagError),
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

/// Outcome counters for one ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Entries written to the store
    pub ingested: usize,
    /// Entries whose guid was already known
    pub duplicates: usize,
    /// Entries older than the retention window
    pub stale: usize,
    /// Entries that failed extraction, tagging or the store write
    pub failed: usize,
    /// Entries the parser dropped (no link or no timestamp)
    pub malformed: usize,
    /// Ingested entries whose notification could not be delivered
    pub notifications_failed: usize,
}

impl IngestReport {
    /// Whether this run wrote at least one new post.
    pub fn updated(&self) -> bool {
        self.ingested > 0
    }
}

struct NotifySettings<'a> {
    notifier: &'a dyn Notifier,
    recipient: String,
}

pub struct FeedIngestor<'a> {
    source: &'a dyn FeedSource,
    extractor: &'a dyn ContentExtractor,
    tagger: &'a dyn EntityTagger,
    store: &'a dyn RecordStore,
    notify: Option<NotifySettings<'a>>,
    retention_days: u32,
    language_code: String,
}

impl<'a> FeedIngestor<'a> {
    pub fn new(
        source: &'a dyn FeedSource,
        extractor: &'a dyn ContentExtractor,
        tagger: &'a dyn EntityTagger,
        store: &'a dyn RecordStore,
    ) -> Self {
        Self {
            source,
            extractor,
            tagger,
            store,
            notify: None,
            retention_days: DEFAULT_RETENTION_DAYS,
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
        }
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_language_code(mut self, code: &str) -> Self {
        self.language_code = code.to_string();
        self
    }

    /// Sends a message to `recipient` for every newly ingested post.
    pub fn with_notifications(mut self, notifier: &'a dyn Notifier, recipient: &str) -> Self {
        self.notify = Some(NotifySettings {
            notifier,
            recipient: recipient.to_string(),
        });
        self
    }

    /// Ingests the feed at `url` under `category`, skipping guids in `known`.
    pub async fn ingest(
        &self,
        url: &str,
        category: &str,
        known: &KnownGuids,
    ) -> Result<IngestReport, FetchError> {
        self.ingest_at(url, category, known, chrono::Utc::now().timestamp())
            .await
    }

    /// As [`ingest`](Self::ingest), judging staleness against `now` (Unix seconds).
    pub async fn ingest_at(
        &self,
        url: &str,
        category: &str,
        known: &KnownGuids,
        now: i64,
    ) -> Result<IngestReport, FetchError> {
        let parsed = self.source.fetch_entries(url).await?;
        let mut report = IngestReport {
            malformed: parsed.skipped,
            ..Default::default()
        };

        for entry in &parsed.entries {
            match decide(entry, known, now, self.retention_days) {
                Decision::SkipDuplicate => {
                    tracing::debug!(feed = %url, guid = %entry.guid, "Known guid, skipping");
                    report.duplicates += 1;
                }
                Decision::SkipStale => {
                    tracing::debug!(
                        feed = %url,
                        guid = %entry.guid,
                        published = entry.published,
                        "Outside retention window, skipping"
                    );
                    report.stale += 1;
                }
                Decision::Ingest => match self.ingest_entry(entry, category).await {
                    Ok(record) => {
                        tracing::info!(
                            category = %category,
                            guid = %record.guid,
                            title = %record.title,
                            "Post ingested"
                        );
                        report.ingested += 1;
                        if !self.send_notification(&record).await {
                            report.notifications_failed += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            feed = %url,
                            guid = %entry.guid,
                            link = %entry.link,
                            error = %e,
                            "Entry skipped"
                        );
                        report.failed += 1;
                    }
                },
            }
        }

        tracing::info!(
            feed = %url,
            category = %category,
            ingested = report.ingested,
            duplicates = report.duplicates,
            stale = report.stale,
            failed = report.failed,
            malformed = report.malformed,
            "Feed processed"
        );
        Ok(report)
    }

    async fn ingest_entry(&self, entry: &FeedEntry, category: &str) -> Result<PostRecord, EntryError> {
        let title = normalize_quotes(&entry.title).into_owned();
        let content = self.extractor.extract(&entry.link).await?;
        let tags = tag_post(self.tagger, &title, &content.text, &self.language_code).await?;

        let record = PostRecord {
            source: category.to_string(),
            timestamp: entry.published,
            guid: entry.guid.clone(),
            date: format_post_date(entry.published),
            title,
            description: clean_description(&entry.description),
            full_text: content.text,
            raw_html: content.raw_html,
            link: entry.link.clone(),
            author: entry.author.clone(),
            tags,
            categories: join_terms(&entry.categories),
            visible: true,
        };

        self.store.put_post(&record).await?;
        Ok(record)
    }

    /// Returns false only when a configured notification failed to send.
    async fn send_notification(&self, record: &PostRecord) -> bool {
        let Some(settings) = &self.notify else {
            return true;
        };

        let notification = Notification::for_post(record, &settings.recipient);
        match settings.notifier.send(&notification).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(guid = %record.guid, error = %e, "Notification failed");
                false
            }
        }
    }
}

use anyhow::Result;
use chrono::DateTime;
use feed_rs::parser;
use sha2::{Digest, Sha256};

/// Author recorded when a feed entry names nobody.
pub const DEFAULT_AUTHOR: &str = "blank";

/// Format of the human-readable date stored next to each post (UTC).
const DATE_FORMAT: &str = "%d-%m-%Y %H:%M";

/// A single entry from a syndication feed, with defaults already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub guid: String,
    pub link: String,
    pub title: String,
    /// Entry author, or [`DEFAULT_AUTHOR`].
    pub author: String,
    /// Unix epoch seconds of the entry's `updated` timestamp (falls back to `published`).
    pub published: i64,
    /// Raw description, may contain inline markup.
    pub description: String,
    /// Category terms in document order; empty when the entry has none.
    pub categories: Vec<String>,
}

/// Entries parsed from one feed document.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub entries: Vec<FeedEntry>,
    /// Entries dropped because they had no link or no timestamp.
    pub skipped: usize,
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult> {
    let feed = parser::parse(bytes)?;
    let mut result = ParseResult::default();

    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            result.skipped += 1;
            continue;
        };
        let Some(published) = entry.updated.or(entry.published).map(|dt| dt.timestamp()) else {
            tracing::debug!(link = %link, "Entry has no timestamp, skipping");
            result.skipped += 1;
            continue;
        };

        let title = entry.title.map(|t| t.content).unwrap_or_default();
        let author = entry
            .authors
            .first()
            .map(|p| p.name.trim())
            .filter(|name| !name.is_empty())
            .map_or_else(|| DEFAULT_AUTHOR.to_string(), str::to_string);
        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();
        let categories = entry
            .categories
            .into_iter()
            .map(|c| c.term)
            .filter(|term| !term.is_empty())
            .collect();

        let existing_id = if entry.id.is_empty() {
            None
        } else {
            Some(entry.id.as_str())
        };
        let guid = generate_guid(existing_id, &link, &title, published);

        result.entries.push(FeedEntry {
            guid,
            link,
            title,
            author,
            published,
            description,
            categories,
        });
    }

    Ok(result)
}

/// Renders an epoch timestamp as the stored human-readable date string.
pub fn format_post_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn generate_guid(existing: Option<&str>, link: &str, title: &str, published: i64) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!("{}|{}|{}", link, title, published);
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Blog</title>
  <item>
    <guid>post-1</guid>
    <title>First "quoted" post</title>
    <link>https://example.com/1</link>
    <author>jane@example.com (Jane)</author>
    <pubDate>Tue, 02 Jan 2024 10:30:00 GMT</pubDate>
    <description>&lt;p&gt;Hello&lt;/p&gt;</description>
    <category>Compute</category>
    <category>Serverless</category>
  </item>
  <item>
    <guid>post-2</guid>
    <title>No author</title>
    <link>https://example.com/2</link>
    <pubDate>Wed, 03 Jan 2024 00:00:00 GMT</pubDate>
  </item>
  <item>
    <guid>post-3</guid>
    <title>No date</title>
    <link>https://example.com/3</link>
  </item>
</channel></rss>"#;

    #[test]
    fn test_parse_resolves_fields_and_defaults() {
        let result = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.skipped, 1);

        let first = &result.entries[0];
        assert_eq!(first.guid, "post-1");
        assert_eq!(first.link, "https://example.com/1");
        assert_eq!(first.title, r#"First "quoted" post"#);
        assert_eq!(first.published, 1_704_191_400);
        assert_eq!(first.description, "<p>Hello</p>");
        assert_eq!(first.categories, vec!["Compute", "Serverless"]);
        assert_ne!(first.author, DEFAULT_AUTHOR);

        let second = &result.entries[1];
        assert_eq!(second.author, DEFAULT_AUTHOR);
        assert!(second.categories.is_empty());
        assert_eq!(second.description, "");
    }

    #[test]
    fn test_parse_atom_uses_updated() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom</title><id>urn:feed</id><updated>2024-01-05T00:00:00Z</updated>
  <entry>
    <id>urn:entry:1</id>
    <title>Atom entry</title>
    <link href="https://example.com/a1"/>
    <updated>2024-01-05T12:00:00Z</updated>
    <author><name>Sam</name></author>
    <summary>Short</summary>
  </entry>
</feed>"#;
        let result = parse_feed(atom.as_bytes()).unwrap();
        assert_eq!(result.entries.len(), 1);
        let entry = &result.entries[0];
        assert_eq!(entry.guid, "urn:entry:1");
        assert_eq!(entry.author, "Sam");
        assert_eq!(entry.published, 1_704_456_000);
    }

    #[test]
    fn test_parse_malformed_document_errors() {
        assert!(parse_feed(b"<not valid xml").is_err());
    }

    #[test]
    fn test_format_post_date() {
        assert_eq!(format_post_date(1_704_191_400), "02-01-2024 10:30");
    }

    #[test]
    fn test_generate_guid_prefers_existing() {
        assert_eq!(generate_guid(Some(" id-1 "), "l", "t", 1), "id-1");
        let hashed = generate_guid(None, "https://example.com", "t", 1);
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, generate_guid(Some("  "), "https://example.com", "t", 1));
    }
}

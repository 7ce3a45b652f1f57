use crate::storage::PostSummary;
use serde::{Deserialize, Serialize};

/// Category name for the cross-category snapshot.
pub const ALL_CATEGORIES: &str = "all";

/// One entry of a published snapshot.
///
/// Field names on the wire match the record store's attribute names, which
/// is what the single-page readers of the export expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(rename = "timest")]
    pub timestamp: i64,
    #[serde(rename = "blogsource")]
    pub category: String,
    pub title: String,
    #[serde(rename = "datestr")]
    pub date: String,
    pub guid: String,
    pub author: String,
    pub link: String,
    pub description: String,
}

impl From<PostSummary> for SnapshotEntry {
    fn from(post: PostSummary) -> Self {
        let description = post.description.trim().to_string();

        Self {
            timestamp: post.timestamp,
            category: post.source,
            title: post.title,
            date: post.date,
            guid: post.guid,
            author: post.author,
            link: post.link,
            description,
        }
    }
}

/// Blob key holding the snapshot for `category`.
pub fn snapshot_key(category: &str) -> String {
    format!("{}.json", category)
}

/// Whether `entry` belongs in the snapshot for `category`.
pub fn in_scope(entry: &SnapshotEntry, category: &str) -> bool {
    category == ALL_CATEGORIES || entry.category == category
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(description: &str) -> PostSummary {
        PostSummary {
            source: "compute".to_string(),
            timestamp: 10,
            guid: "g1".to_string(),
            date: "01-01-1970 00:00".to_string(),
            title: "T".to_string(),
            author: "blank".to_string(),
            link: "https://example.com/g1".to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_projection_trims_description() {
        let entry = SnapshotEntry::from(summary("  padded\n"));
        assert_eq!(entry.description, "padded");
        assert_eq!(entry.category, "compute");
    }

    #[test]
    fn test_wire_field_names() {
        let entry = SnapshotEntry::from(summary("d"));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["timest"], 10);
        assert_eq!(json["blogsource"], "compute");
        assert_eq!(json["datestr"], "01-01-1970 00:00");
        assert!(json.get("category").is_none());
    }

    #[test]
    fn test_in_scope() {
        let entry = SnapshotEntry::from(summary("d"));
        assert!(in_scope(&entry, "compute"));
        assert!(in_scope(&entry, ALL_CATEGORIES));
        assert!(!in_scope(&entry, "security"));
    }

    #[test]
    fn test_snapshot_key() {
        assert_eq!(snapshot_key("all"), "all.json");
    }
}

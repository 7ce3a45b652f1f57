use super::blob::{Acl, BlobStore, PutOptions};
use super::types::{in_scope, snapshot_key, SnapshotEntry};
use super::SnapshotError;

pub const SNAPSHOT_CONTENT_TYPE: &str = "application/json";
pub const SNAPSHOT_CACHE_CONTROL: &str = "public";

/// Writes snapshot content to the blob store as one whole-object replace.
pub struct SnapshotPublisher<'a> {
    blobs: &'a dyn BlobStore,
}

impl<'a> SnapshotPublisher<'a> {
    pub fn new(blobs: &'a dyn BlobStore) -> Self {
        Self { blobs }
    }

    /// Publishes the entries of `content` that belong to `category` under
    /// `<category>.json`, publicly readable. Returns the number of entries
    /// written. On error the previously published object stays in place.
    pub async fn publish(
        &self,
        category: &str,
        content: &[SnapshotEntry],
    ) -> Result<usize, SnapshotError> {
        let filtered: Vec<&SnapshotEntry> =
            content.iter().filter(|e| in_scope(e, category)).collect();
        let body = serde_json::to_vec(&filtered)?;

        let key = snapshot_key(category);
        let options = PutOptions {
            content_type: SNAPSHOT_CONTENT_TYPE.to_string(),
            cache_control: SNAPSHOT_CACHE_CONTROL.to_string(),
            acl: Acl::PublicRead,
        };
        self.blobs.put(&key, &body, &options).await?;

        tracing::info!(key = %key, entries = filtered.len(), bytes = body.len(), "Snapshot published");
        Ok(filtered.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::blob::{BlobError, ObjectSummary};
    use crate::snapshot::ALL_CATEGORIES;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingBlobs {
        puts: Mutex<Vec<(String, Vec<u8>, PutOptions)>>,
        fail: bool,
    }

    #[async_trait]
    impl BlobStore for CapturingBlobs {
        async fn list(&self) -> Result<Vec<ObjectSummary>, BlobError> {
            Ok(Vec::new())
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BlobError> {
            Ok(None)
        }

        async fn put(&self, key: &str, body: &[u8], options: &PutOptions) -> Result<(), BlobError> {
            if self.fail {
                return Err(BlobError::Io(std::io::Error::other("disk full")));
            }
            self.puts
                .lock()
                .unwrap()
                .push((key.to_string(), body.to_vec(), options.clone()));
            Ok(())
        }
    }

    fn entry(category: &str, guid: &str) -> SnapshotEntry {
        SnapshotEntry {
            timestamp: 1_704_191_400,
            category: category.to_string(),
            title: guid.to_uppercase(),
            date: "02-01-2024 10:30".to_string(),
            guid: guid.to_string(),
            author: "blank".to_string(),
            link: format!("https://example.com/{}", guid),
            description: "d".to_string(),
        }
    }

    fn mixed() -> Vec<SnapshotEntry> {
        vec![entry("tech", "t1"), entry("ops", "o1"), entry("tech", "t2")]
    }

    fn published(blobs: &CapturingBlobs) -> Vec<SnapshotEntry> {
        serde_json::from_slice(&blobs.puts.lock().unwrap()[0].1).unwrap()
    }

    #[tokio::test]
    async fn test_category_filter() {
        let blobs = CapturingBlobs::default();
        let written = SnapshotPublisher::new(&blobs).publish("tech", &mixed()).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(published(&blobs), vec![entry("tech", "t1"), entry("tech", "t2")]);
    }

    #[tokio::test]
    async fn test_all_is_unfiltered() {
        let blobs = CapturingBlobs::default();
        SnapshotPublisher::new(&blobs)
            .publish(ALL_CATEGORIES, &mixed())
            .await
            .unwrap();

        assert_eq!(published(&blobs), mixed());
        assert_eq!(blobs.puts.lock().unwrap()[0].0, "all.json");
    }

    #[tokio::test]
    async fn test_object_attributes() {
        let blobs = CapturingBlobs::default();
        SnapshotPublisher::new(&blobs).publish("ops", &mixed()).await.unwrap();

        let puts = blobs.puts.lock().unwrap();
        assert_eq!(puts[0].0, "ops.json");
        assert_eq!(
            puts[0].2,
            PutOptions {
                content_type: "application/json".to_string(),
                cache_control: "public".to_string(),
                acl: Acl::PublicRead,
            }
        );
    }

    #[tokio::test]
    async fn test_put_failure_surfaces() {
        let blobs = CapturingBlobs {
            fail: true,
            ..Default::default()
        };
        let result = SnapshotPublisher::new(&blobs).publish("ops", &mixed()).await;
        assert!(matches!(result, Err(SnapshotError::Blob(BlobError::Io(_)))));
    }
}

//! Object storage for published snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Suffix of the sidecar file carrying an object's [`PutOptions`].
const META_SUFFIX: &str = ".meta";
/// Marker in in-flight temp file names; such files are never listed.
const TMP_MARKER: &str = ".tmp.";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Blob store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not encode object metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Access policy applied to a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    Private,
    PublicRead,
}

/// Attributes stored with an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: String,
    pub acl: Acl,
}

/// Listing row for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Keyed object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Every object currently stored.
    async fn list(&self) -> Result<Vec<ObjectSummary>, BlobError>;

    /// Body of `key`, or `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Stores `body` under `key`, replacing any previous object whole.
    async fn put(&self, key: &str, body: &[u8], options: &PutOptions) -> Result<(), BlobError>;
}

/// [`BlobStore`] over a local directory, one file per key.
///
/// Writes go to a temp file first and are renamed into place, so a reader
/// sees either the previous object or the new one.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (creating if needed) the directory at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Attributes recorded for `key` by the last [`put`](BlobStore::put),
    /// or `None` if the object has none.
    pub async fn options(&self, key: &str) -> Result<Option<PutOptions>, BlobError> {
        self.object_path(key)?;
        let meta_path = self.root.join(format!("{}{}", key, META_SUFFIX));
        match tokio::fs::read(&meta_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        let invalid = key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.starts_with('.')
            || key.ends_with(META_SUFFIX)
            || key.contains(TMP_MARKER);
        if invalid {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

fn is_internal_file(name: &str) -> bool {
    name.ends_with(META_SUFFIX) || name.contains(TMP_MARKER) || name.starts_with('.')
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn list(&self) -> Result<Vec<ObjectSummary>, BlobError> {
        let mut objects = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(item) = dir.next_entry().await? {
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_internal_file(&name) {
                continue;
            }
            let metadata = item.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified()?;
            objects.push(ObjectSummary {
                key: name,
                last_modified: DateTime::<Utc>::from(modified),
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, body: &[u8], options: &PutOptions) -> Result<(), BlobError> {
        let path = self.object_path(key)?;
        let meta_path = self.root.join(format!("{}{}", key, META_SUFFIX));

        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.root.join(format!("{}{}{:016x}", key, TMP_MARKER, suffix));

        if let Err(e) = write_synced(&temp_path, body).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match options.acl {
                Acl::PublicRead => 0o644,
                Acl::Private => 0o600,
            };
            if let Err(e) =
                tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(mode)).await
            {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e.into());
            }
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tokio::fs::write(&meta_path, serde_json::to_vec(options)?).await?;

        tracing::debug!(key = %key, bytes = body.len(), "Object stored");
        Ok(())
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn json_options() -> PutOptions {
        PutOptions {
            content_type: "application/json".to_string(),
            cache_control: "public".to_string(),
            acl: Acl::PublicRead,
        }
    }

    fn temp_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("feedsync-blob-{}-{}-{}", name, std::process::id(), nanos))
    }

    #[tokio::test]
    async fn test_put_get_list() {
        let root = temp_root("put");
        let store = FsBlobStore::open(&root).await.unwrap();

        assert_eq!(store.get("all.json").await.unwrap(), None);
        store.put("all.json", b"[]", &json_options()).await.unwrap();
        store.put("all.json", b"[1]", &json_options()).await.unwrap();

        assert_eq!(store.get("all.json").await.unwrap(), Some(b"[1]".to_vec()));
        let listing = store.list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].key, "all.json");

        let options = store.options("all.json").await.unwrap();
        assert_eq!(options, Some(json_options()));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_public_read_mode() {
        use std::os::unix::fs::PermissionsExt;

        let root = temp_root("mode");
        let store = FsBlobStore::open(&root).await.unwrap();
        store.put("compute.json", b"[]", &json_options()).await.unwrap();

        let mode = std::fs::metadata(root.join("compute.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let root = temp_root("keys");
        let store = FsBlobStore::open(&root).await.unwrap();

        for key in ["../escape.json", "a/b.json", ".hidden", "", "x.json.meta"] {
            let result = store.put(key, b"[]", &json_options()).await;
            assert!(matches!(result, Err(BlobError::InvalidKey(_))), "key {:?}", key);
        }

        let _ = std::fs::remove_dir_all(&root);
    }
}

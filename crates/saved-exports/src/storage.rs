//! Durable object storage for saved exports.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use montage_common::{MontageError, MontageResult, StorageConfig};

/// Flat key/value object storage with public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy `source` to `key`, leaving `source` untouched. Returns the size in bytes.
    async fn put_copy(&self, source: &Path, key: &str) -> MontageResult<u64>;

    /// Remove `key`. Removing a missing object succeeds.
    async fn delete(&self, key: &str) -> MontageResult<()>;

    async fn exists(&self, key: &str) -> bool;

    fn public_url(&self, key: &str) -> String;
}

/// Build the `{owner}/{content}/{file}` key, rejecting unsafe segments.
pub fn object_key(owner_id: &str, content_id: &str, file_name: &str) -> MontageResult<String> {
    for (field, segment) in [
        ("owner_id", owner_id),
        ("content_id", content_id),
        ("file_name", file_name),
    ] {
        validate_segment(field, segment)?;
    }
    Ok(format!("{owner_id}/{content_id}/{file_name}"))
}

fn validate_segment(field: &str, segment: &str) -> MontageResult<()> {
    let ok = !segment.is_empty()
        && segment.len() <= 200
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(MontageError::validation(
            field,
            format!("'{segment}' is not a valid path segment"),
        ))
    }
}

/// Objects as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.root.clone(), config.public_base_url.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> MontageResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            validate_segment("key", segment)?;
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_copy(&self, source: &Path, key: &str) -> MontageResult<u64> {
        let target = self.path_for(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MontageError::storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        // Copy beside the target first so a half-written object is never visible.
        let mut part_name = target.file_name().unwrap_or_default().to_os_string();
        part_name.push(".part");
        let part = target.with_file_name(part_name);
        let copied = match tokio::fs::copy(source, &part).await {
            Ok(bytes) => tokio::fs::rename(&part, &target).await.map(|()| bytes),
            Err(e) => Err(e),
        };
        match copied {
            Ok(bytes) => {
                tracing::debug!(key, bytes, "Stored object");
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(MontageError::storage(format!(
                    "Failed to copy {} to {}: {e}",
                    source.display(),
                    target.display()
                )))
            }
        }
    }

    async fn delete(&self, key: &str) -> MontageResult<()> {
        let target = self.path_for(key)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MontageError::storage(format!(
                "Failed to delete {}: {e}",
                target.display()
            ))),
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("u1", "c-2", "a.mp4").unwrap(), "u1/c-2/a.mp4");
        assert!(object_key("..", "c", "a.mp4").is_err());
        assert!(object_key("u1", "c/2", "a.mp4").is_err());
        assert!(object_key("u1", "c", "").is_err());
    }

    #[test]
    fn test_public_url() {
        let store = LocalObjectStore::new("/tmp/x", "https://cdn.example.com/saved/");
        assert_eq!(
            store.public_url("u/c/f.mp4"),
            "https://cdn.example.com/saved/u/c/f.mp4"
        );
    }

    #[tokio::test]
    async fn test_put_copy_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("render.mp4");
        std::fs::write(&source, b"frames").unwrap();
        let store = LocalObjectStore::new(dir.path().join("store"), "/saved-exports");

        let bytes = store.put_copy(&source, "u/c/render.mp4").await.unwrap();
        assert_eq!(bytes, 6);
        assert!(source.exists());
        assert!(store.exists("u/c/render.mp4").await);
        assert!(!dir.path().join("store/u/c/render.mp4.part").exists());

        store.delete("u/c/render.mp4").await.unwrap();
        store.delete("u/c/render.mp4").await.unwrap();
        assert!(!store.exists("u/c/render.mp4").await);
    }

    #[tokio::test]
    async fn test_put_copy_missing_source_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "/s");
        let err = store
            .put_copy(&dir.path().join("missing.mp4"), "u/c/f.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MontageError::Storage { .. }));
        assert!(!store.exists("u/c/f.mp4").await);
    }
}

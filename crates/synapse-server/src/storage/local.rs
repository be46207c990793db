use super::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Filesystem-backed storage. Keys are `{owner}/{uuid}.{ext}` relative to the
/// configured root.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, storage_key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(storage_key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if storage_key.is_empty() || !safe {
            return Err(StorageError::InvalidKey(storage_key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, owner_id: &str, filename: &str, data: &[u8]) -> StorageResult<String> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(sanitize)
            .unwrap_or_else(|| "bin".to_string());

        let key = format!("{}/{}.{}", sanitize(owner_id), Uuid::new_v4(), extension);
        let path = self.resolve(&key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;

        debug!("Stored {} bytes at {}", data.len(), key);
        Ok(key)
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(storage_key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.resolve(storage_key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.resolve(storage_key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let key = storage
            .upload("user-1", "report.pdf", b"pdf bytes")
            .await
            .unwrap();
        assert!(key.starts_with("user-1/"));
        assert!(key.ends_with(".pdf"));

        let bytes = storage.download(&key).await.unwrap();
        assert_eq!(bytes, b"pdf bytes");
        assert!(storage.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let err = storage.download("user-1/missing.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let err = storage.download("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        let err = storage.download("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn hostile_owner_and_extension_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let key = storage
            .upload("../../evil", "no_extension", b"data")
            .await
            .unwrap();
        assert!(!key.contains(".."));
        assert!(storage.download(&key).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_the_object() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let key = storage.upload("u", "a.txt", b"x").await.unwrap();
        storage.delete(&key).await.unwrap();
        assert!(!storage.exists(&key).await.unwrap());
    }
}

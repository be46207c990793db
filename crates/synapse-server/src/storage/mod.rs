pub mod local;

pub use local::LocalStorage;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Object storage collaborator. The server only ever needs whole-object
/// reads and writes; durability and serving belong to the backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store the bytes and return the storage key recorded on the document.
    async fn upload(&self, owner_id: &str, filename: &str, data: &[u8]) -> StorageResult<String>;

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;
}

pub type DynStorage = Arc<dyn Storage>;

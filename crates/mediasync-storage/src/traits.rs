//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::Provider;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// Every operation is a blind write or delete against `(bucket, key)`; no
/// backend keeps a local view of what exists remotely.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload the file at `local_path` to `key`.
    ///
    /// The resulting object is publicly readable and replaces whatever was
    /// stored at `key` before.
    async fn put(&self, local_path: &Path, key: &str) -> StorageResult<()>;

    /// Delete exactly one object. A missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public URL an uploaded object is served from
    fn public_url(&self, key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> Provider;
}

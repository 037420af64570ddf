//! Mediasync Storage Library
//!
//! This crate provides the storage abstraction the sync orchestrator mirrors
//! files through, with implementations for S3, Google Cloud Storage and a
//! local directory mirror.
//!
//! # Remote key format
//!
//! `{prefix}{YYYY}/{MM}/{filename}`, where the prefix is normalized to end in
//! exactly one `/` (or stay empty) and the year/month segment can be turned
//! off. Keys never start with `/` and never contain `..`. Key derivation lives
//! in the `keys` module so every backend sees the same layout.

pub mod content_type;
pub mod factory;
#[cfg(feature = "storage-gcs")]
pub mod gcs;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-gcs")]
pub use gcs::{GcsStorage, ServiceAccountTokenSource, StaticToken, TokenSource};
pub use keys::{normalize_prefix, validate_key, KeyMapper};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use mediasync_core::Provider;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};

//! Mediasync Core Library
//!
//! This crate provides the configuration, error taxonomy and event models
//! shared by the storage backends, the sync orchestrator and the CLI host.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Credentials, SyncConfig};
pub use error::{LogLevel, SyncError};
pub use models::{
    parse_reference_time, AttachmentMetadata, FileSetEvent, MediaEvent, SizeVariant, UploadTask,
};
pub use storage_types::Provider;

//! Mediasync Services Layer
//!
//! This crate hosts the sync orchestration and the URL rewriter, and
//! re-exports the storage and core types a host needs so it can depend on a
//! single facade. Hosts call plain functions here from their own extension
//! points; nothing registers callbacks behind their back.

pub mod host;
pub mod rewriter;
pub mod sync;

pub use host::{StaticHost, UploadHost};
pub use mediasync_core::{
    parse_reference_time, AttachmentMetadata, FileSetEvent, MediaEvent, Provider, SyncConfig,
    SyncError, UploadTask,
};
pub use mediasync_storage::{create_storage, KeyMapper, Storage, StorageError, StorageResult};
pub use rewriter::UrlRewriter;
pub use sync::{DeleteOutcome, EventOutcome, FailedUpload, SyncReport, SyncService, UploadedObject};

//! Error types module
//!
//! Every failure the sync orchestrator can hit is terminal for the single
//! task it affects. None of them propagate to the host as a hard failure;
//! they are logged at the level the variant reports and the host carries on.

use std::path::PathBuf;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected conditions like a vanished variant file
    Debug,
    /// Warning level - for conditions that make the component skip work
    Warn,
    /// Error level - for provider failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Required configuration is absent or invalid; the component stays inert.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Local file missing: {}", path.display())]
    LocalFileMissing { path: PathBuf },

    /// The host could not resolve its local upload root, so no key can be derived.
    #[error("Local upload root could not be resolved")]
    UploadRootUnresolved,

    /// The file does not live below the upload root, so it has no stable remote key.
    #[error("Path is outside the upload root: {}", path.display())]
    OutsideUploadRoot { path: PathBuf },

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend call failed for key {key}: {message}")]
    BackendCallFailed { key: String, message: String },
}

impl SyncError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "CONFIG_ERROR",
            SyncError::LocalFileMissing { .. } => "LOCAL_FILE_MISSING",
            SyncError::UploadRootUnresolved => "UPLOAD_ROOT_UNRESOLVED",
            SyncError::OutsideUploadRoot { .. } => "OUTSIDE_UPLOAD_ROOT",
            SyncError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            SyncError::BackendCallFailed { .. } => "BACKEND_CALL_FAILED",
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            SyncError::LocalFileMissing { .. } => LogLevel::Debug,
            SyncError::Config(_)
            | SyncError::UploadRootUnresolved
            | SyncError::OutsideUploadRoot { .. } => LogLevel::Warn,
            SyncError::BackendUnavailable(_) | SyncError::BackendCallFailed { .. } => {
                LogLevel::Error
            }
        }
    }
}

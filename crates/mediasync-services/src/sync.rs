//! Sync orchestration
//!
//! Reacts to "file set ready" and "file deleted" events from the host, maps
//! local files to remote keys and mirrors them through the storage backend.
//! Every call runs inline in the caller's request; failures are logged and
//! reported, never retried, and never turned into a failure of the caller.

use chrono::Utc;
use mediasync_core::{
    AttachmentMetadata, FileSetEvent, LogLevel, MediaEvent, SyncConfig, SyncError, UploadTask,
};
use mediasync_storage::{create_storage, KeyMapper, Storage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use crate::host::{StaticHost, UploadHost};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub key: String,
    pub error: String,
}

/// What happened to one file-set event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub uploaded: Vec<UploadedObject>,
    /// Files that did not exist on disk when the event was handled
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedUpload>,
    /// Set when the whole event was skipped or aborted before any upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl SyncReport {
    fn aborted(err: &SyncError) -> Self {
        SyncReport {
            aborted: Some(err.to_string()),
            ..Default::default()
        }
    }

    /// Every existing file was uploaded and nothing was aborted
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted { key: String },
    Skipped { reason: String },
    Failed { key: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventOutcome {
    Synced(SyncReport),
    Deleted(DeleteOutcome),
}

fn log_sync_error(err: &SyncError) {
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(error = %err, code = err.error_code(), "Sync skipped"),
        LogLevel::Warn => tracing::warn!(error = %err, code = err.error_code(), "Sync skipped"),
        LogLevel::Error => tracing::error!(error = %err, code = err.error_code(), "Sync failed"),
    }
}

/// A derived variant name must be a bare file name sitting next to the primary.
fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Sync orchestrator
///
/// The storage backend is built on first use and kept for the lifetime of the
/// service. Construction failures are not cached, so a later event tries again.
pub struct SyncService {
    config: Arc<SyncConfig>,
    host: Arc<dyn UploadHost>,
    storage: OnceCell<Arc<dyn Storage>>,
    slow_call_threshold: Duration,
}

impl SyncService {
    pub fn new(config: SyncConfig, host: Arc<dyn UploadHost>) -> Self {
        let slow_call_threshold = Duration::from_millis(config.slow_call_threshold_ms);
        SyncService {
            config: Arc::new(config),
            host,
            storage: OnceCell::new(),
            slow_call_threshold,
        }
    }

    /// Service whose host settings come from the configuration itself
    pub fn from_config(config: SyncConfig) -> Self {
        let host = Arc::new(StaticHost::from_config(&config));
        Self::new(config, host)
    }

    /// Use a prebuilt backend instead of constructing one from configuration
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = OnceCell::new_with(Some(storage));
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn key_mapper(&self) -> KeyMapper {
        KeyMapper::new(
            &self.config.prefix,
            self.host.local_upload_root(),
            self.config.year_month_folders,
        )
    }

    async fn storage(&self) -> Result<Arc<dyn Storage>, SyncError> {
        self.storage
            .get_or_try_init(|| create_storage(&self.config))
            .await
            .cloned()
            .map_err(|e| SyncError::BackendUnavailable(e.to_string()))
    }

    fn warn_if_slow(&self, operation: &'static str, key: &str, elapsed: Duration) {
        if elapsed >= self.slow_call_threshold {
            tracing::warn!(
                operation,
                key = %key,
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                threshold_ms = self.slow_call_threshold.as_millis() as u64,
                "Backend call held the triggering request past the slow-call threshold"
            );
        }
    }

    /// Split the event into upload tasks for files that exist and the paths that do not.
    async fn plan(&self, event: &FileSetEvent) -> Result<(Vec<UploadTask>, Vec<PathBuf>), SyncError> {
        let reference = event.reference_time.unwrap_or_else(Utc::now);
        let mapper = self.key_mapper();
        let directory = mapper
            .directory(reference)
            .ok_or(SyncError::UploadRootUnresolved)?;
        // Derived variants are bare names next to the primary, so checking it covers them
        if !mapper.contains(&event.primary) {
            return Err(SyncError::OutsideUploadRoot {
                path: event.primary.clone(),
            });
        }

        let mut candidates = Vec::with_capacity(event.derived.len() + 1);
        if let Some(name) = event.primary.file_name().and_then(|n| n.to_str()) {
            candidates.push((event.primary.clone(), name.to_string()));
        }
        for name in &event.derived {
            if !is_bare_file_name(name) {
                tracing::warn!(variant = %name, "Ignoring derived file name with path separators");
                continue;
            }
            candidates.push((event.primary.with_file_name(name), name.clone()));
        }

        let mut tasks = Vec::with_capacity(candidates.len());
        let mut missing = Vec::new();
        for (local_path, name) in candidates {
            if !is_file(&local_path).await {
                log_sync_error(&SyncError::LocalFileMissing {
                    path: local_path.clone(),
                });
                missing.push(local_path);
                continue;
            }
            tasks.push(UploadTask {
                local_path,
                remote_key: format!("{}{}", directory, name),
            });
        }

        Ok((tasks, missing))
    }

    /// Upload tasks for the files of `event` that exist on disk
    pub async fn build_tasks(&self, event: &FileSetEvent) -> Result<Vec<UploadTask>, SyncError> {
        self.plan(event).await.map(|(tasks, _)| tasks)
    }

    /// Mirror a primary file and its derived variants.
    ///
    /// Missing files are skipped. A failed upload does not stop the remaining
    /// ones and nothing already uploaded is rolled back.
    #[tracing::instrument(
        skip(self, event),
        fields(primary = %event.primary.display(), derived = event.derived.len())
    )]
    pub async fn sync_file_set(&self, event: &FileSetEvent) -> SyncReport {
        let (tasks, missing) = match self.plan(event).await {
            Ok(plan) => plan,
            Err(err) => {
                log_sync_error(&err);
                return SyncReport::aborted(&err);
            }
        };

        let mut report = SyncReport {
            skipped: missing,
            ..Default::default()
        };
        if tasks.is_empty() {
            return report;
        }

        let storage = match self.storage().await {
            Ok(storage) => storage,
            Err(err) => {
                log_sync_error(&err);
                report.aborted = Some(err.to_string());
                return report;
            }
        };

        for task in tasks {
            let start = Instant::now();
            let result = storage.put(&task.local_path, &task.remote_key).await;
            self.warn_if_slow("put", &task.remote_key, start.elapsed());

            match result {
                Ok(()) => report.uploaded.push(UploadedObject {
                    url: storage.public_url(&task.remote_key),
                    key: task.remote_key,
                }),
                Err(e) => {
                    let err = SyncError::BackendCallFailed {
                        key: task.remote_key.clone(),
                        message: e.to_string(),
                    };
                    log_sync_error(&err);
                    report.failed.push(FailedUpload {
                        key: task.remote_key,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "File set synced"
        );

        report
    }

    /// Mirror an attachment described by host metadata; the metadata is handed back unchanged.
    pub async fn upload_attachment(
        &self,
        metadata: AttachmentMetadata,
        primary: &Path,
        reference_time: Option<chrono::DateTime<Utc>>,
    ) -> AttachmentMetadata {
        let event = FileSetEvent::from_metadata(primary, &metadata, reference_time);
        self.sync_file_set(&event).await;
        metadata
    }

    /// Delete the remote copy of one local file.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn delete_file(&self, path: &Path) -> DeleteOutcome {
        if path.as_os_str().is_empty() {
            return DeleteOutcome::Skipped {
                reason: "empty path".to_string(),
            };
        }

        let mapper = self.key_mapper();
        if mapper.upload_root().is_none() {
            let err = SyncError::UploadRootUnresolved;
            log_sync_error(&err);
            return DeleteOutcome::Skipped {
                reason: err.to_string(),
            };
        }
        let key = match mapper.key_for_local_path(path) {
            Some(key) => key,
            None => {
                let err = SyncError::OutsideUploadRoot {
                    path: path.to_path_buf(),
                };
                log_sync_error(&err);
                return DeleteOutcome::Skipped {
                    reason: err.to_string(),
                };
            }
        };

        let storage = match self.storage().await {
            Ok(storage) => storage,
            Err(err) => {
                log_sync_error(&err);
                return DeleteOutcome::Failed {
                    key,
                    error: err.to_string(),
                };
            }
        };

        let start = Instant::now();
        let result = storage.delete(&key).await;
        self.warn_if_slow("delete", &key, start.elapsed());

        match result {
            Ok(()) => DeleteOutcome::Deleted { key },
            Err(e) => {
                let err = SyncError::BackendCallFailed {
                    key: key.clone(),
                    message: e.to_string(),
                };
                log_sync_error(&err);
                DeleteOutcome::Failed {
                    key,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Fire-and-forget delete: the host proceeds with its local deletion regardless.
    pub async fn delete_attachment(&self, path: PathBuf) -> PathBuf {
        self.delete_file(&path).await;
        path
    }

    pub async fn dispatch(&self, event: MediaEvent) -> EventOutcome {
        match event {
            MediaEvent::FileSetReady(file_set) => {
                EventOutcome::Synced(self.sync_file_set(&file_set).await)
            }
            MediaEvent::FileDeleted(path) => EventOutcome::Deleted(self.delete_file(&path).await),
        }
    }
}

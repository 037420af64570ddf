#[cfg(feature = "storage-gcs")]
use crate::gcs::{GcsStorage, ServiceAccountTokenSource};
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Provider, Storage, StorageError, StorageResult};
use mediasync_core::SyncConfig;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &SyncConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.provider {
        #[cfg(feature = "storage-s3")]
        Provider::S3 => {
            let credentials = &config.credentials;
            let static_credentials = credentials
                .access_key_id
                .clone()
                .zip(credentials.secret_access_key.clone());

            let storage = S3Storage::new(
                config.bucket.clone(),
                config.region.clone(),
                config.endpoint.clone(),
                static_credentials,
            )
            .await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        Provider::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-gcs")]
        Provider::Gcs => {
            let credentials = &config.credentials;
            let http_client = GcsStorage::http_client(&config.gcs_application_name)?;
            let token_source = match (
                credentials.service_account_key_json.as_deref(),
                credentials.service_account_key_path.as_deref(),
            ) {
                (Some(json), _) => ServiceAccountTokenSource::from_json(json, http_client.clone())?,
                (None, Some(path)) => {
                    ServiceAccountTokenSource::from_file(path, http_client.clone()).await?
                }
                (None, None) => {
                    return Err(StorageError::ConfigError(
                        "MEDIASYNC_GCS_SERVICE_ACCOUNT_KEY not configured".to_string(),
                    ))
                }
            };
            let storage =
                GcsStorage::with_client(config.bucket.clone(), http_client, Arc::new(token_source));
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-gcs"))]
        Provider::Gcs => Err(StorageError::ConfigError(
            "GCS storage backend not available (storage-gcs feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        Provider::Local => {
            let base_path = config.local_mirror_path.clone().ok_or_else(|| {
                StorageError::ConfigError("MEDIASYNC_LOCAL_MIRROR_PATH not configured".to_string())
            })?;
            let base_url = format!("file://{}", base_path);

            let storage = LocalStorage::new(base_path, base_url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        Provider::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

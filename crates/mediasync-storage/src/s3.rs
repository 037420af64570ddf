use crate::content_type::content_type_for;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::Provider;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use std::path::Path;

const DEFAULT_REGION: &str = "us-east-1";

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region; falls back to the default region chain, then `us-east-1`
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `static_credentials` - Optional `(access_key_id, secret_access_key)`; the
    ///   default credential chain is used otherwise
    pub async fn new(
        bucket: String,
        region: Option<String>,
        endpoint_url: Option<String>,
        static_credentials: Option<(String, String)>,
    ) -> StorageResult<Self> {
        let region_provider = RegionProviderChain::first_try(region.map(Region::new))
            .or_default_provider()
            .or_else(DEFAULT_REGION);

        // Failed calls are reported to the orchestrator, never retried.
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(RetryConfig::disabled());

        if let Some((access_key_id, secret_access_key)) = static_credentials {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "mediasync-static",
            ));
        }

        let config = loader.load().await;
        let region = config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let client = if let Some(ref endpoint) = endpoint_url {
            // Path-style addressing is required by MinIO and most S3-compatible providers
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        Ok(S3Storage {
            client,
            bucket,
            region,
            endpoint_url,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let size = tokio::fs::metadata(local_path).await?.len();

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to read {}: {}",
                local_path.display(),
                e
            ))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .content_type(content_type_for(local_path))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                tracing::error!(
                    error = %message,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                StorageError::UploadFailed(message)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();

        // S3 answers 204 for keys that do not exist, so a repeated delete succeeds.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                tracing::error!(
                    error = %message,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(message)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    /// For AWS S3: `https://{bucket}.s3.{region}.amazonaws.com/{key}`.
    /// For S3-compatible providers: `{endpoint}/{bucket}/{key}` (path-style).
    fn public_url(&self, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }

    fn backend_type(&self) -> Provider {
        Provider::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use tempfile::tempdir;

    async fn storage_for(server: &mockito::ServerGuard) -> S3Storage {
        S3Storage::new(
            "media".to_string(),
            Some("us-east-1".to_string()),
            Some(server.url()),
            Some(("minio".to_string(), "minio123".to_string())),
        )
        .await
        .unwrap()
    }

    /// Path-style request path for `key`; the SDK may append an `x-id` query.
    fn object_path(key: &str) -> Matcher {
        Matcher::Regex(format!(r"^/media/{}(\?.*)?$", regex::escape(key)))
    }

    #[tokio::test]
    async fn test_put_sends_public_read_acl_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", object_path("wp/2024/01/a.jpg"))
            .match_query(Matcher::Any)
            .match_header("x-amz-acl", "public-read")
            .match_header("content-type", "image/jpeg")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"jpeg bytes").unwrap();

        let storage = storage_for(&server).await;
        storage.put(&path, "wp/2024/01/a.jpg").await.unwrap();
        // A second put to the same key overwrites without a prior check
        storage.put(&path, "wp/2024/01/a.jpg").await.unwrap();

        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_rejected_by_provider_is_upload_failed() {
        let mut server = mockito::Server::new_async().await;
        let _put = server
            .mock("PUT", object_path("a.jpg"))
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>"#,
            )
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"x").unwrap();

        let result = storage_for(&server).await.put(&path, "a.jpg").await;
        assert!(matches!(result, Err(StorageError::UploadFailed(_))));
    }

    #[tokio::test]
    async fn test_put_missing_local_file_makes_no_request() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let result = storage_for(&server)
            .await
            .put(&dir.path().join("gone.jpg"), "gone.jpg")
            .await;

        assert!(matches!(result, Err(StorageError::IoError(_))));
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_of_absent_key_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let delete = server
            .mock("DELETE", object_path("wp/2024/01/gone.jpg"))
            .match_query(Matcher::Any)
            .with_status(204)
            .expect(2)
            .create_async()
            .await;

        let storage = storage_for(&server).await;
        storage.delete("wp/2024/01/gone.jpg").await.unwrap();
        storage.delete("wp/2024/01/gone.jpg").await.unwrap();
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_rejected_by_provider_is_delete_failed() {
        let mut server = mockito::Server::new_async().await;
        let _delete = server
            .mock("DELETE", object_path("a.jpg"))
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/xml")
            .with_body(r#"<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>"#)
            .create_async()
            .await;

        let result = storage_for(&server).await.delete("a.jpg").await;
        assert!(matches!(result, Err(StorageError::DeleteFailed(_))));
    }

    #[tokio::test]
    async fn test_public_url_for_aws() {
        let storage = S3Storage::new(
            "media".to_string(),
            Some("eu-west-1".to_string()),
            None,
            Some(("AKIAEXAMPLE".to_string(), "secret".to_string())),
        )
        .await
        .unwrap();

        assert_eq!(
            storage.public_url("wp/2024/01/a.jpg"),
            "https://media.s3.eu-west-1.amazonaws.com/wp/2024/01/a.jpg"
        );
        assert_eq!(storage.backend_type(), Provider::S3);
    }

    #[tokio::test]
    async fn test_public_url_for_custom_endpoint() {
        let storage = S3Storage::new(
            "media".to_string(),
            Some("us-east-1".to_string()),
            Some("http://localhost:9000/".to_string()),
            Some(("minio".to_string(), "minio123".to_string())),
        )
        .await
        .unwrap();

        assert_eq!(
            storage.public_url("a.jpg"),
            "http://localhost:9000/media/a.jpg"
        );
    }
}

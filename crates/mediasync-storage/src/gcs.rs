//! Google Cloud Storage backend
//!
//! Talks to the GCS JSON API directly. Uploads use the resumable protocol in
//! fixed-size chunks and create the object with `predefinedAcl=publicRead`;
//! authentication is a service-account JWT exchanged for an OAuth2 access token.

use crate::content_type::content_type_for;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::Provider;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, LOCATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

const API_BASE_URL: &str = "https://storage.googleapis.com";
const PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
const TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Source of OAuth2 bearer tokens for GCS requests
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> StorageResult<String>;
}

/// Fixed token, for emulators and tests
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> StorageResult<String> {
        Ok(self.0.clone())
    }
}

/// Fields of a service-account JSON key file that the token exchange needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Service-account token source
///
/// Signs an RS256 assertion with the account's private key and exchanges it at
/// the key's `token_uri`. The token is reused until a minute before it expires.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    http_client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, http_client: reqwest::Client) -> Self {
        ServiceAccountTokenSource {
            key,
            http_client,
            cached: Mutex::new(None),
        }
    }

    /// Load a service-account JSON key file
    pub async fn from_file(path: &Path, http_client: reqwest::Client) -> StorageResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw, http_client).map_err(|e| {
            StorageError::ConfigError(format!("{} ({})", e, path.display()))
        })
    }

    /// Parse a service-account key given inline as JSON
    pub fn from_json(raw: &str, http_client: reqwest::Client) -> StorageResult<Self> {
        let key: ServiceAccountKey = serde_json::from_str(raw).map_err(|e| {
            StorageError::ConfigError(format!("Invalid service account key: {}", e))
        })?;
        Ok(Self::new(key, http_client))
    }

    fn assertion(&self, now: DateTime<Utc>) -> StorageResult<String> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: STORAGE_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + TOKEN_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| StorageError::Auth(format!("Invalid service account private key: {}", e)))?;

        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map_err(|e| StorageError::Auth(format!("Failed to sign token assertion: {}", e)))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> StorageResult<CachedToken> {
        let assertion = self.assertion(now)?;

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StorageError::Auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Auth(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Auth(format!("Invalid token response: {}", e)))?;

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now
                + ChronoDuration::seconds(token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS)),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> StorageResult<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(ref token) = *cached {
            if token.expires_at - ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.exchange(now).await?;
        tracing::debug!(
            client_email = %self.key.client_email,
            expires_at = %fresh.expires_at,
            "Obtained GCS access token"
        );
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

/// Google Cloud Storage implementation
#[derive(Clone)]
pub struct GcsStorage {
    http_client: reqwest::Client,
    bucket: String,
    api_base_url: String,
    token_source: Arc<dyn TokenSource>,
    chunk_size: usize,
}

impl GcsStorage {
    /// Create a new GcsStorage instance
    ///
    /// # Arguments
    /// * `bucket` - GCS bucket name
    /// * `application_name` - Sent as the `User-Agent` of every request
    /// * `token_source` - Supplies bearer tokens
    pub fn new(
        bucket: String,
        application_name: &str,
        token_source: Arc<dyn TokenSource>,
    ) -> StorageResult<Self> {
        let http_client = Self::http_client(application_name)?;
        Ok(Self::with_client(bucket, http_client, token_source))
    }

    pub fn with_client(
        bucket: String,
        http_client: reqwest::Client,
        token_source: Arc<dyn TokenSource>,
    ) -> Self {
        GcsStorage {
            http_client,
            bucket,
            api_base_url: API_BASE_URL.to_string(),
            token_source,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// HTTP client configured the way the backend expects
    pub fn http_client(application_name: &str) -> StorageResult<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(application_name)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create HTTP client: {}", e)))
    }

    /// Point the backend at another API host (emulators, tests)
    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Upload chunk size. The real service requires a multiple of 256 KiB
    /// for every chunk except the last.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn start_session(
        &self,
        token: &str,
        key: &str,
        content_type: &str,
        total: u64,
    ) -> StorageResult<String> {
        let url = format!("{}/upload/storage/v1/b/{}/o", self.api_base_url, self.bucket);

        let response = self
            .http_client
            .post(&url)
            .query(&[
                ("uploadType", "resumable"),
                ("name", key),
                ("predefinedAcl", "publicRead"),
            ])
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&serde_json::json!({ "name": key, "contentType": content_type }))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Failed to start upload: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::UploadFailed(format!(
                "Upload session rejected with {}: {}",
                status, body
            )));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                StorageError::UploadFailed("Upload session response had no Location".to_string())
            })
    }

    async fn send_chunk(
        &self,
        token: &str,
        session_url: &str,
        content_range: String,
        chunk: Bytes,
    ) -> StorageResult<StatusCode> {
        let response = self
            .http_client
            .put(session_url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_RANGE, content_range)
            .body(chunk)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Chunk upload failed: {}", e)))?;

        let status = response.status();
        // 308 Resume Incomplete: the chunk was stored, more is expected
        if status.is_success() || status == StatusCode::PERMANENT_REDIRECT {
            return Ok(status);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StorageError::UploadFailed(format!(
            "Chunk rejected with {}: {}",
            status, body
        )))
    }

    async fn upload_file(
        &self,
        file: &mut tokio::fs::File,
        local_path: &Path,
        key: &str,
        content_type: &str,
        total: u64,
    ) -> StorageResult<()> {
        let token = self.token_source.access_token().await?;
        let session_url = self.start_session(&token, key, content_type, total).await?;

        if total == 0 {
            self.send_chunk(&token, &session_url, "bytes */0".to_string(), Bytes::new())
                .await?;
            return Ok(());
        }

        let mut offset: u64 = 0;
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let read = Self::read_chunk(file, &mut buf).await?;
            if read == 0 {
                return Err(StorageError::UploadFailed(format!(
                    "{} shrank during upload ({} of {} bytes sent)",
                    local_path.display(),
                    offset,
                    total
                )));
            }

            let end = offset + read as u64 - 1;
            let content_range = format!("bytes {}-{}/{}", offset, end, total);
            let status = self
                .send_chunk(
                    &token,
                    &session_url,
                    content_range,
                    Bytes::copy_from_slice(&buf[..read]),
                )
                .await?;
            offset = end + 1;

            if status != StatusCode::PERMANENT_REDIRECT {
                return Ok(());
            }
            if offset >= total {
                return Err(StorageError::UploadFailed(
                    "Service still expects data after the final chunk".to_string(),
                ));
            }
        }
    }

    /// Fill `buf` from the file, stopping early only at end of file.
    async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> StorageResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = file.read(&mut buf[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        Ok(filled)
    }
}

#[async_trait]
impl Storage for GcsStorage {
    async fn put(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let mut file = tokio::fs::File::open(local_path).await?;
        let total = file.metadata().await?.len();
        let content_type = content_type_for(local_path);

        let result = self
            .upload_file(&mut file, local_path, key, content_type, total)
            .await;

        if let Err(ref e) = result {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = total,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "GCS upload failed"
            );
            return result;
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GCS upload successful"
        );

        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let token = self.token_source.access_token().await?;
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.api_base_url,
            self.bucket,
            urlencoding::encode(key)
        );

        let response = self
            .http_client
            .delete(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(bucket = %self.bucket, key = %key, "GCS delete of missing object");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                bucket = %self.bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "GCS delete failed"
            );
            return Err(StorageError::DeleteFailed(format!("{}: {}", status, body)));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GCS delete successful"
        );

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", PUBLIC_BASE_URL, self.bucket, key)
    }

    fn backend_type(&self) -> Provider {
        Provider::Gcs
    }
}

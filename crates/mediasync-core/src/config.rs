//! Configuration module
//!
//! `SyncConfig` is read once from the environment (after an optional `.env`
//! file) and never mutated afterwards. When `MEDIASYNC_PROVIDER` is absent the
//! component is inert and `from_env` returns `Ok(None)`.

use std::env;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;

use crate::storage_types::Provider;

const SLOW_CALL_THRESHOLD_MS: u64 = 5000;
const GCS_APPLICATION_NAME: &str = "mediasync";

/// Upload path appended to the site URL when no explicit upload URL is set.
pub const DEFAULT_UPLOAD_PATH: &str = "/wp-content/uploads";

/// Provider credentials. Secrets are redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub service_account_key_path: Option<PathBuf>,
    /// Service-account key JSON given inline instead of as a file
    pub service_account_key_json: Option<String>,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("service_account_key_path", &self.service_account_key_path)
            .field(
                "service_account_key_json",
                &self.service_account_key_json.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Sync configuration
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub provider: Provider,
    pub bucket: String,
    pub prefix: String,
    pub region: Option<String>,
    pub endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub credentials: Credentials,
    pub gcs_application_name: String,
    pub local_mirror_path: Option<String>,
    // URL rewriting
    pub rewrite_host: Option<String>,
    // Host settings
    pub upload_root: Option<String>,
    pub site_url: Option<String>,
    pub upload_url: Option<String>,
    pub year_month_folders: bool,
    pub slow_call_threshold_ms: u64,
}

impl SyncConfig {
    /// Minimal configuration for a provider. Mostly useful for tests and embedding hosts.
    pub fn new(provider: Provider, bucket: impl Into<String>) -> Self {
        SyncConfig {
            provider,
            bucket: bucket.into(),
            prefix: String::new(),
            region: None,
            endpoint: None,
            credentials: Credentials::default(),
            gcs_application_name: GCS_APPLICATION_NAME.to_string(),
            local_mirror_path: None,
            rewrite_host: None,
            upload_root: None,
            site_url: None,
            upload_url: None,
            year_month_folders: true,
            slow_call_threshold_ms: SLOW_CALL_THRESHOLD_MS,
        }
    }

    /// Read the process environment. Hosts load any `.env` file before calling this.
    pub fn from_env() -> Result<Option<Self>, anyhow::Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Returns `Ok(None)` when no provider is configured.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider: Provider = match var("MEDIASYNC_PROVIDER") {
            Some(value) => value.parse()?,
            None => return Ok(None),
        };

        // The key is either inline JSON or a path, optionally written as a file:// URL
        let (service_account_key_json, service_account_key_path) =
            match var("MEDIASYNC_GCS_SERVICE_ACCOUNT_KEY") {
                Some(v) if v.starts_with('{') => (Some(v), None),
                Some(v) => (
                    None,
                    Some(PathBuf::from(
                        v.strip_prefix("file://").map(str::to_string).unwrap_or(v),
                    )),
                ),
                None => (None, None),
            };

        let config = SyncConfig {
            provider,
            bucket: var("MEDIASYNC_BUCKET").unwrap_or_default(),
            prefix: lookup("MEDIASYNC_PREFIX").unwrap_or_default(),
            region: var("MEDIASYNC_REGION"),
            endpoint: var("MEDIASYNC_ENDPOINT"),
            credentials: Credentials {
                access_key_id: var("MEDIASYNC_ACCESS_KEY_ID"),
                secret_access_key: var("MEDIASYNC_SECRET_ACCESS_KEY"),
                service_account_key_path,
                service_account_key_json,
            },
            gcs_application_name: var("MEDIASYNC_GCS_APPLICATION_NAME")
                .unwrap_or_else(|| GCS_APPLICATION_NAME.to_string()),
            local_mirror_path: var("MEDIASYNC_LOCAL_MIRROR_PATH"),
            rewrite_host: var("MEDIASYNC_REWRITE_HOST"),
            upload_root: var("MEDIASYNC_UPLOAD_ROOT"),
            site_url: var("MEDIASYNC_SITE_URL"),
            upload_url: var("MEDIASYNC_UPLOAD_URL"),
            year_month_folders: var("MEDIASYNC_YEAR_MONTH_FOLDERS")
                .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no" | "off"))
                .unwrap_or(true),
            slow_call_threshold_ms: var("MEDIASYNC_SLOW_CALL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(SLOW_CALL_THRESHOLD_MS),
        };

        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.provider {
            Provider::S3 => {
                if self.bucket.is_empty() {
                    return Err(anyhow::anyhow!(
                        "MEDIASYNC_BUCKET must be set when using the S3 provider"
                    ));
                }
                let creds = &self.credentials;
                if creds.access_key_id.is_some() != creds.secret_access_key.is_some() {
                    return Err(anyhow::anyhow!(
                        "MEDIASYNC_ACCESS_KEY_ID and MEDIASYNC_SECRET_ACCESS_KEY must be set together"
                    ));
                }
            }
            Provider::Gcs => {
                if self.bucket.is_empty() {
                    return Err(anyhow::anyhow!(
                        "MEDIASYNC_BUCKET must be set when using the GCS provider"
                    ));
                }
                if self.credentials.service_account_key_path.is_none()
                    && self.credentials.service_account_key_json.is_none()
                {
                    return Err(anyhow::anyhow!(
                        "MEDIASYNC_GCS_SERVICE_ACCOUNT_KEY must be set when using the GCS provider"
                    ));
                }
            }
            Provider::Local => {
                if self.local_mirror_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "MEDIASYNC_LOCAL_MIRROR_PATH must be set when using the local provider"
                    ));
                }
            }
        }

        if let Some(ref host) = self.rewrite_host {
            if host.contains('/') || host.contains(char::is_whitespace) {
                return Err(anyhow::anyhow!(
                    "MEDIASYNC_REWRITE_HOST must be a bare host name, got '{}'",
                    host
                ));
            }
        }

        for (name, value) in [
            ("MEDIASYNC_SITE_URL", &self.site_url),
            ("MEDIASYNC_UPLOAD_URL", &self.upload_url),
        ] {
            if let Some(url) = value {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(anyhow::anyhow!("{} must be an http(s) URL", name));
                }
            }
        }

        Ok(())
    }

    pub fn upload_root(&self) -> Option<PathBuf> {
        self.upload_root.as_ref().map(PathBuf::from)
    }

    /// Public base URL of the upload root.
    ///
    /// Falls back to the site URL followed by the default upload path.
    pub fn upload_base_url(&self) -> Option<String> {
        self.upload_url.clone().or_else(|| {
            self.site_url
                .as_ref()
                .map(|site| format!("{}{}", site.trim_end_matches('/'), DEFAULT_UPLOAD_PATH))
        })
    }

    pub fn rewrite_enabled(&self) -> bool {
        self.rewrite_host.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_provider_is_inert() {
        let config = SyncConfig::from_lookup(lookup(&[("MEDIASYNC_BUCKET", "b")])).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn s3_requires_bucket() {
        let result = SyncConfig::from_lookup(lookup(&[("MEDIASYNC_PROVIDER", "s3")]));
        assert!(result.is_err());
    }

    #[test]
    fn s3_credentials_must_come_in_pairs() {
        let result = SyncConfig::from_lookup(lookup(&[
            ("MEDIASYNC_PROVIDER", "s3"),
            ("MEDIASYNC_BUCKET", "media"),
            ("MEDIASYNC_ACCESS_KEY_ID", "AKIA"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn gcs_key_path_strips_file_scheme() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("MEDIASYNC_PROVIDER", "google"),
            ("MEDIASYNC_BUCKET", "media"),
            ("MEDIASYNC_GCS_SERVICE_ACCOUNT_KEY", "file:///etc/mediasync/key.json"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.provider, Provider::Gcs);
        assert_eq!(
            config.credentials.service_account_key_path,
            Some(PathBuf::from("/etc/mediasync/key.json"))
        );
    }

    #[test]
    fn gcs_key_accepts_inline_json() {
        let inline = r#"{"client_email":"sync@project.iam.gserviceaccount.com","private_key":"x"}"#;
        let config = SyncConfig::from_lookup(lookup(&[
            ("MEDIASYNC_PROVIDER", "gcs"),
            ("MEDIASYNC_BUCKET", "media"),
            ("MEDIASYNC_GCS_SERVICE_ACCOUNT_KEY", inline),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(
            config.credentials.service_account_key_json.as_deref(),
            Some(inline)
        );
        assert_eq!(config.credentials.service_account_key_path, None);
    }

    #[test]
    fn gcs_requires_a_key() {
        let result = SyncConfig::from_lookup(lookup(&[
            ("MEDIASYNC_PROVIDER", "gcs"),
            ("MEDIASYNC_BUCKET", "media"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn defaults_are_applied() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("MEDIASYNC_PROVIDER", "local"),
            ("MEDIASYNC_LOCAL_MIRROR_PATH", "/tmp/mirror"),
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(config.prefix, "");
        assert!(config.year_month_folders);
        assert_eq!(config.slow_call_threshold_ms, SLOW_CALL_THRESHOLD_MS);
        assert!(!config.rewrite_enabled());
        assert_eq!(config.upload_base_url(), None);
    }

    #[test]
    fn year_month_folders_can_be_disabled() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("MEDIASYNC_PROVIDER", "local"),
            ("MEDIASYNC_LOCAL_MIRROR_PATH", "/tmp/mirror"),
            ("MEDIASYNC_YEAR_MONTH_FOLDERS", "off"),
        ]))
        .unwrap()
        .unwrap();
        assert!(!config.year_month_folders);
    }

    #[test]
    fn rewrite_host_must_be_bare() {
        let result = SyncConfig::from_lookup(lookup(&[
            ("MEDIASYNC_PROVIDER", "local"),
            ("MEDIASYNC_LOCAL_MIRROR_PATH", "/tmp/mirror"),
            ("MEDIASYNC_REWRITE_HOST", "https://cdn.example.com/"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn upload_base_url_falls_back_to_site_url() {
        let mut config = SyncConfig::new(Provider::S3, "media");
        config.site_url = Some("http://site.test/".to_string());
        assert_eq!(
            config.upload_base_url().as_deref(),
            Some("http://site.test/wp-content/uploads")
        );

        config.upload_url = Some("https://static.site.test/files".to_string());
        assert_eq!(
            config.upload_base_url().as_deref(),
            Some("https://static.site.test/files")
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials {
            access_key_id: Some("AKIA".to_string()),
            secret_access_key: Some("super-secret".to_string()),
            service_account_key_path: None,
            service_account_key_json: Some(r#"{"private_key":"-----BEGIN"}"#.to_string()),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("BEGIN"));
    }
}

//! Host collaborator interface
//!
//! The surrounding application owns its upload directory and URLs; the
//! orchestrator and the rewriter ask for them through this trait.

use mediasync_core::SyncConfig;
use std::path::PathBuf;

pub trait UploadHost: Send + Sync {
    /// Local directory that corresponds to the public upload base URL.
    ///
    /// `None` when the host cannot resolve it (e.g. installs that rewrite
    /// uploads to another domain); files are then skipped, never uploaded
    /// under a malformed key.
    fn local_upload_root(&self) -> Option<PathBuf>;

    fn site_base_url(&self) -> Option<String>;

    fn upload_base_url(&self) -> Option<String>;
}

/// Host settings fixed at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticHost {
    pub upload_root: Option<PathBuf>,
    pub site_url: Option<String>,
    pub upload_url: Option<String>,
}

impl StaticHost {
    pub fn from_config(config: &SyncConfig) -> Self {
        StaticHost {
            upload_root: config.upload_root(),
            site_url: config.site_url.clone(),
            upload_url: config.upload_base_url(),
        }
    }
}

impl UploadHost for StaticHost {
    fn local_upload_root(&self) -> Option<PathBuf> {
        self.upload_root.clone()
    }

    fn site_base_url(&self) -> Option<String> {
        self.site_url.clone()
    }

    fn upload_base_url(&self) -> Option<String> {
        self.upload_url.clone()
    }
}

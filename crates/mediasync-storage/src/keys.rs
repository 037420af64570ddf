//! Shared key generation for storage backends.
//!
//! Key format: `{prefix}{YYYY}/{MM}/{filename}`. The prefix is trailing-slashed
//! and stripped of leading slashes before use, so `media`, `/media` and
//! `media/` all produce `media/2024/01/a.jpg`.

use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};

use crate::{StorageError, StorageResult};

/// Normalize a configured key prefix: no leading slash, exactly one trailing slash.
///
/// An empty prefix (or one made only of slashes) stays empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Reject keys that could escape a bucket-relative namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid segments: {}",
            key
        )));
    }
    Ok(())
}

/// Derives remote keys from local paths.
#[derive(Debug, Clone)]
pub struct KeyMapper {
    prefix: String,
    upload_root: Option<PathBuf>,
    year_month_folders: bool,
}

impl KeyMapper {
    /// `upload_root` is `None` when the host cannot resolve its upload directory;
    /// every mapping then yields `None` and callers skip the file.
    pub fn new(prefix: &str, upload_root: Option<PathBuf>, year_month_folders: bool) -> Self {
        KeyMapper {
            prefix: normalize_prefix(prefix),
            upload_root,
            year_month_folders,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn upload_root(&self) -> Option<&Path> {
        self.upload_root.as_deref()
    }

    /// `YYYY/MM/` for the reference time, in UTC.
    pub fn year_month(reference: DateTime<Utc>) -> String {
        reference.format("%Y/%m/").to_string()
    }

    /// Remote directory (always ending in `/`, or empty) for files referenced at `reference`.
    pub fn directory(&self, reference: DateTime<Utc>) -> Option<String> {
        self.upload_root.as_ref()?;

        let mut directory = self.prefix.clone();
        if self.year_month_folders {
            directory.push_str(&Self::year_month(reference));
        }
        Some(directory)
    }

    /// Whether `local_path` lies below the upload root. Files elsewhere have no key.
    pub fn contains(&self, local_path: &Path) -> bool {
        let Some(root) = self.upload_root.as_deref() else {
            return false;
        };
        match local_path.strip_prefix(root) {
            Ok(relative) => {
                relative.components().next().is_some()
                    && relative
                        .components()
                        .all(|component| matches!(component, Component::Normal(_)))
            }
            Err(_) => false,
        }
    }

    /// Remote key for a freshly generated file: `directory + basename`.
    ///
    /// `None` when the file is outside the upload root, so it could never be
    /// found again by [`key_for_local_path`](Self::key_for_local_path) on delete.
    pub fn map_key(&self, local_path: &Path, reference: DateTime<Utc>) -> Option<String> {
        if !self.contains(local_path) {
            return None;
        }
        let file_name = local_path.file_name()?.to_str()?;
        let directory = self.directory(reference)?;
        Some(format!("{}{}", directory, file_name))
    }

    /// Remote key for an existing local file, derived from its position under the upload root.
    ///
    /// Used on delete, where the file already sits in its time-bucketed directory.
    pub fn key_for_local_path(&self, local_path: &Path) -> Option<String> {
        let root = self.upload_root.as_ref()?;
        let relative = local_path.strip_prefix(root).ok()?;

        let segments = relative
            .components()
            .map(|component| match component {
                Component::Normal(segment) => segment.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        if segments.is_empty() {
            return None;
        }

        Some(format!("{}{}", self.prefix, segments.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn january() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn mapper(prefix: &str) -> KeyMapper {
        KeyMapper::new(prefix, Some(PathBuf::from("/srv/site/uploads")), true)
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("media"), "media/");
        assert_eq!(normalize_prefix("/media"), "media/");
        assert_eq!(normalize_prefix("media/"), "media/");
        assert_eq!(normalize_prefix("//media//"), "media/");
        assert_eq!(normalize_prefix("sites/blog"), "sites/blog/");
    }

    #[test]
    fn map_key_never_doubles_or_drops_slashes() {
        let path = Path::new("/srv/site/uploads/2024/01/photo.jpg");
        for prefix in ["media", "media/", "/media", "/media/"] {
            assert_eq!(
                mapper(prefix).map_key(path, january()).as_deref(),
                Some("media/2024/01/photo.jpg"),
                "prefix {:?}",
                prefix
            );
        }
        assert_eq!(
            mapper("").map_key(path, january()).as_deref(),
            Some("2024/01/photo.jpg")
        );
    }

    #[test]
    fn map_key_uses_reference_month_not_file_location() {
        let path = Path::new("/srv/site/uploads/elsewhere/photo.jpg");
        let december = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            mapper("media").map_key(path, december).as_deref(),
            Some("media/2023/12/photo.jpg")
        );
    }

    #[test]
    fn year_month_folders_disabled() {
        let mapper = KeyMapper::new("media", Some(PathBuf::from("/srv/site/uploads")), false);
        assert_eq!(mapper.directory(january()).as_deref(), Some("media/"));
        assert_eq!(
            mapper
                .map_key(Path::new("/srv/site/uploads/photo.jpg"), january())
                .as_deref(),
            Some("media/photo.jpg")
        );
    }

    #[test]
    fn unresolved_upload_root_yields_none() {
        let mapper = KeyMapper::new("media", None, true);
        let path = Path::new("/srv/site/uploads/2024/01/photo.jpg");
        assert_eq!(mapper.directory(january()), None);
        assert_eq!(mapper.map_key(path, january()), None);
        assert_eq!(mapper.key_for_local_path(path), None);
    }

    #[test]
    fn key_for_local_path_strips_upload_root() {
        let path = Path::new("/srv/site/uploads/2024/01/photo-150x150.jpg");
        assert_eq!(
            mapper("/media/").key_for_local_path(path).as_deref(),
            Some("media/2024/01/photo-150x150.jpg")
        );
        assert_eq!(
            mapper("").key_for_local_path(path).as_deref(),
            Some("2024/01/photo-150x150.jpg")
        );
    }

    #[test]
    fn key_for_local_path_rejects_paths_outside_root() {
        let mapper = mapper("media");
        assert_eq!(mapper.key_for_local_path(Path::new("/etc/passwd")), None);
        assert_eq!(mapper.key_for_local_path(Path::new("/srv/site/uploads")), None);
        assert_eq!(
            mapper.key_for_local_path(Path::new("/srv/site/uploads/../secrets.txt")),
            None
        );
    }

    #[test]
    fn map_key_rejects_paths_outside_root() {
        let mapper = mapper("media");
        assert_eq!(mapper.map_key(Path::new("/tmp/x/secret.txt"), january()), None);
        assert_eq!(
            mapper.map_key(Path::new("/srv/site/uploads/../secret.txt"), january()),
            None
        );
        assert!(mapper.contains(Path::new("/srv/site/uploads/2024/01/a.jpg")));
        assert!(!mapper.contains(Path::new("/srv/site/uploads")));
        assert!(!mapper.contains(Path::new("/srv/site/uploads-old/a.jpg")));
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(validate_key("media/2024/01/a.jpg").is_ok());
        assert!(validate_key("a..b.jpg").is_ok());
        assert!(matches!(
            validate_key("/media/a.jpg"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            validate_key("media/../../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(validate_key(""), Err(StorageError::InvalidKey(_))));
    }
}

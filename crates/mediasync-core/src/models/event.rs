use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::PathBuf;

use super::attachment::AttachmentMetadata;

/// One file to mirror: where it lives locally and the key it gets remotely.
///
/// Built fresh for every event and dropped once the backend calls return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub remote_key: String,
}

/// A primary file plus the names of its derived variants, which live next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSetEvent {
    pub primary: PathBuf,
    pub derived: Vec<String>,
    /// Publish time of the parent item, if the host could resolve one.
    pub reference_time: Option<DateTime<Utc>>,
}

impl FileSetEvent {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        FileSetEvent {
            primary: primary.into(),
            derived: Vec::new(),
            reference_time: None,
        }
    }

    pub fn from_metadata(
        primary: impl Into<PathBuf>,
        metadata: &AttachmentMetadata,
        reference_time: Option<DateTime<Utc>>,
    ) -> Self {
        FileSetEvent {
            primary: primary.into(),
            derived: metadata.derived_files(),
            reference_time,
        }
    }

    pub fn with_derived<I, S>(mut self, derived: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.derived.extend(derived.into_iter().map(Into::into));
        self
    }

    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }
}

/// Events delivered by the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    FileSetReady(FileSetEvent),
    FileDeleted(PathBuf),
}

/// Parse a reference timestamp supplied by a host.
///
/// Accepts RFC 3339 or a `YYYY-MM-DD HH:MM:SS` GMT date. Zero dates
/// (`0000-00-00 00:00:00`) and anything unparseable mean "no reference".
pub fn parse_reference_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() || value.starts_with("0000") {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Generated size variant of an attachment (thumbnail, medium, large, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeVariant {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(
        rename = "mime-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Attachment metadata as produced by the host when it generates derived files.
///
/// Unknown fields are preserved so the metadata can be handed back to the host
/// exactly as it came in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sizes: BTreeMap<String, SizeVariant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttachmentMetadata {
    /// File names of every derived variant: the legacy thumbnail first, then each size.
    pub fn derived_files(&self) -> Vec<String> {
        let mut files = Vec::with_capacity(self.sizes.len() + 1);
        if let Some(thumb) = self.thumb.as_ref().filter(|t| !t.is_empty()) {
            files.push(thumb.clone());
        }
        files.extend(
            self.sizes
                .values()
                .map(|size| size.file.clone())
                .filter(|file| !file.is_empty()),
        );
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derived_files_lists_thumb_and_sizes() {
        let metadata: AttachmentMetadata = serde_json::from_value(json!({
            "file": "2024/01/a.jpg",
            "width": 1200,
            "height": 800,
            "thumb": "a-thumb.jpg",
            "sizes": {
                "medium": {"file": "a-300x200.jpg", "width": 300, "height": 200, "mime-type": "image/jpeg"},
                "thumbnail": {"file": "a-150x150.jpg", "width": 150, "height": 150, "mime-type": "image/jpeg"}
            }
        }))
        .unwrap();

        assert_eq!(
            metadata.derived_files(),
            vec!["a-thumb.jpg", "a-300x200.jpg", "a-150x150.jpg"]
        );
    }

    #[test]
    fn empty_metadata_has_no_derived_files() {
        let metadata: AttachmentMetadata = serde_json::from_value(json!({})).unwrap();
        assert!(metadata.derived_files().is_empty());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let input = json!({
            "file": "2024/01/a.jpg",
            "image_meta": {"camera": "X100", "iso": "200"},
            "sizes": {
                "thumbnail": {"file": "a-150x150.jpg", "filesize": 5120}
            }
        });
        let metadata: AttachmentMetadata = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&metadata).unwrap(), input);
    }
}

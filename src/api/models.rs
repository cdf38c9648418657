//! Wire types for the upload and download endpoints
//!
//! A successful `POST /upload` returns:
//!
//! ```json
//! {
//!   "original": "/uploads/cat-0190f3c2....png",
//!   "formats": {
//!     "jpeg": { "path": "/uploads/cat-0190f3c2...-converted.jpeg", "sizeInBytes": 1843 },
//!     "png":  { "path": "/uploads/cat-0190f3c2...-converted.png",  "sizeInBytes": 912 }
//!   },
//!   "failed": { "avif": "avif encoder failed: ..." }
//! }
//! ```
//!
//! `formats` only ever lists files that exist. `failed` is omitted when every
//! target succeeded.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::convert::{ConversionResult, FormatTag};
use crate::observability::MetricsSnapshot;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub path: String,
    pub size_in_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadResponse {
    pub original: String,
    pub formats: BTreeMap<FormatTag, ArtifactEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed: BTreeMap<FormatTag, String>,
}

impl UploadResponse {
    pub fn from_conversion(original: String, result: &ConversionResult) -> Self {
        let formats = result
            .artifacts
            .iter()
            .map(|(format, artifact)| {
                (
                    *format,
                    ArtifactEntry {
                        path: artifact.public_path.clone(),
                        size_in_bytes: artifact.size,
                    },
                )
            })
            .collect();

        Self {
            original,
            formats,
            failed: result.failures.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub pending_expiries: Option<usize>,
    pub metrics: MetricsSnapshot,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConvertedArtifact;
    use std::path::PathBuf;

    #[test]
    fn test_upload_response_shape() {
        let mut result = ConversionResult::default();
        result.artifacts.insert(
            FormatTag::Jpeg,
            ConvertedArtifact {
                format: FormatTag::Jpeg,
                file_name: "cat-1-converted.jpeg".into(),
                path: PathBuf::from("uploads/cat-1-converted.jpeg"),
                public_path: "/uploads/cat-1-converted.jpeg".into(),
                size: 321,
            },
        );

        let response = UploadResponse::from_conversion("/uploads/cat-1.png".into(), &result);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["original"], "/uploads/cat-1.png");
        assert_eq!(json["formats"]["jpeg"]["path"], "/uploads/cat-1-converted.jpeg");
        assert_eq!(json["formats"]["jpeg"]["sizeInBytes"], 321);
        assert!(json.get("failed").is_none());
    }

    #[test]
    fn test_failed_formats_are_listed_separately() {
        let mut result = ConversionResult::default();
        result.failures.insert(FormatTag::Avif, "avif encoder failed".into());

        let response = UploadResponse::from_conversion("/uploads/cat-1.png".into(), &result);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["formats"], serde_json::json!({}));
        assert_eq!(json["failed"]["avif"], "avif encoder failed");
    }
}

//! Typed request/response contracts for the six collaborator operations.
//!
//! The orchestrator is a client to every collaborator; each exchange is one
//! of these request variants against the matching capability. Wire payloads
//! stay narrow on purpose: references and small string fields, never raw
//! asset bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use crate::registry::Capability;
use crate::workflow::StageName;

/// Default generation style when the caller does not pick one.
#[must_use]
pub fn default_style() -> String {
    "modern".to_string()
}

/// Handle to one file the caller wants uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    /// File name, e.g. `photo_1.jpg`.
    pub name: String,
    /// Where the orchestrator can hand the file off from (path or URL).
    pub locator: String,
    /// MIME type.
    pub content_type: String,
}

impl FileHandle {
    /// Creates a file handle.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        locator: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            content_type: content_type.into(),
        }
    }
}

/// Trend context returned by the trend service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendContext {
    /// Current trend titles.
    pub trends: Vec<String>,
    /// Suggested hashtags.
    pub hashtags: Vec<String>,
}

/// Material analysis returned by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// Extracted keywords.
    pub keywords: Vec<String>,
    /// One-paragraph visual summary of the material.
    pub visual_summary: String,
}

/// Quality verdict returned by the quality service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    /// Overall alignment score in `[0, 1]`.
    pub score: f64,
    /// Generated caption.
    pub caption: String,
    /// Suggested hashtags.
    pub hashtags: Vec<String>,
}

/// One typed request to a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServiceRequest {
    /// Upload source material. Not idempotent on the collaborator side, so
    /// retries are only safe under the supplied idempotency key.
    UploadAsset {
        /// Files to upload.
        files: Vec<FileHandle>,
        /// Caller-supplied metadata (description etc.).
        metadata: HashMap<String, String>,
        /// Key the collaborator uses to deduplicate retried uploads.
        idempotency_key: String,
    },
    /// Look up trend context. Optional stage input.
    TrendLookup {
        /// References to uploaded material.
        material_refs: Vec<String>,
        /// Caller keywords.
        keywords: Vec<String>,
    },
    /// Analyze uploaded material.
    MaterialAnalysis {
        /// References to uploaded material.
        file_refs: Vec<String>,
        /// Caller keywords.
        keywords: Vec<String>,
    },
    /// Generate an image. `trend_context` is absent when the trend stage was
    /// skipped.
    GenerateContent {
        /// The generation prompt.
        prompt: String,
        /// Style name, e.g. `modern`.
        style: String,
        /// Analysis context from the material analysis stage.
        analysis_context: AnalysisContext,
        /// Trend context, when available.
        trend_context: Option<TrendContext>,
    },
    /// Score a generated image against its prompt.
    AssessQuality {
        /// Reference to the generated image.
        image_ref: String,
        /// The prompt it was generated from.
        prompt: String,
    },
    /// Bundle the image and quality report into the final package.
    Finalize {
        /// Reference to the generated image.
        image_ref: String,
        /// Reference to the quality report.
        quality_ref: String,
        /// Hashtag budget for the final caption.
        max_hashtags: usize,
    },
}

impl ServiceRequest {
    /// Returns the capability this request must be sent to.
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::UploadAsset { .. } => Capability::Upload,
            Self::TrendLookup { .. } => Capability::Trend,
            Self::MaterialAnalysis { .. } => Capability::Analyze,
            Self::GenerateContent { .. } => Capability::Generate,
            // Finalization is served by the quality service.
            Self::AssessQuality { .. } | Self::Finalize { .. } => Capability::AssessQuality,
        }
    }

    /// Returns true if the collaborator operation is idempotent by nature,
    /// or made retry-safe through an idempotency key.
    #[must_use]
    pub fn is_retry_safe(&self) -> bool {
        match self {
            Self::UploadAsset {
                idempotency_key, ..
            } => !idempotency_key.is_empty(),
            _ => true,
        }
    }

    /// Returns HTTP method and path for the request on the collaborator.
    #[must_use]
    pub fn route(&self) -> (&'static str, &'static str) {
        match self {
            Self::UploadAsset { .. } => ("POST", "/upload/images"),
            Self::TrendLookup { .. } => ("GET", "/analyzes/youtube"),
            Self::MaterialAnalysis { .. } => ("POST", "/analyzes/drive/enhanced"),
            Self::GenerateContent { .. } => ("POST", "/generate/poster"),
            Self::AssessQuality { .. } => ("POST", "/quality/assess"),
            Self::Finalize { .. } => ("POST", "/quality/finalize"),
        }
    }
}

/// One typed response from a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServiceResponse {
    /// Storage references for the uploaded files.
    Uploaded {
        /// One reference per uploaded file.
        file_refs: Vec<String>,
    },
    /// Trend context.
    Trends(TrendContext),
    /// Material analysis.
    Analysis(AnalysisContext),
    /// Reference to the generated image.
    Generated {
        /// Storage reference for the image.
        image_ref: String,
    },
    /// Quality verdict for a generated image.
    Quality(QualityVerdict),
    /// Locator of the finalized package.
    Finalized {
        /// Storage reference for the bundle.
        package_ref: String,
    },
}

/// Derives a deterministic idempotency key for a non-idempotent call.
///
/// The key is stable for a given (workflow, stage, attempt fingerprint), so a
/// retried upload deduplicates on the collaborator side while a deliberate
/// re-run with different inputs gets a fresh key.
#[must_use]
pub fn idempotency_key(workflow_id: Uuid, stage: StageName, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflow_id.as_bytes());
    hasher.update(stage.to_string().as_bytes());
    hasher.update(fingerprint.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_capability_mapping() {
        let req = ServiceRequest::TrendLookup {
            material_refs: vec![],
            keywords: vec![],
        };
        assert_eq!(req.capability(), Capability::Trend);

        let finalize = ServiceRequest::Finalize {
            image_ref: "img".to_string(),
            quality_ref: "q".to_string(),
            max_hashtags: 15,
        };
        assert_eq!(finalize.capability(), Capability::AssessQuality);
    }

    #[test]
    fn test_upload_without_key_is_not_retry_safe() {
        let req = ServiceRequest::UploadAsset {
            files: vec![],
            metadata: HashMap::new(),
            idempotency_key: String::new(),
        };
        assert!(!req.is_retry_safe());
    }

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let wf = crate::utils::generate_uuid();
        let a = idempotency_key(wf, StageName::Upload, "photo_1.jpg");
        let b = idempotency_key(wf, StageName::Upload, "photo_1.jpg");
        let c = idempotency_key(wf, StageName::Upload, "photo_2.jpg");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_generate_request_serializes_absent_trend_context() {
        let req = ServiceRequest::GenerateContent {
            prompt: "a sunset poster".to_string(),
            style: default_style(),
            analysis_context: AnalysisContext::default(),
            trend_context: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["op"], "generate_content");
        assert!(json["trend_context"].is_null());
    }

    #[test]
    fn test_routes_per_operation() {
        let req = ServiceRequest::MaterialAnalysis {
            file_refs: vec![],
            keywords: vec![],
        };
        assert_eq!(req.route(), ("POST", "/analyzes/drive/enhanced"));
    }
}

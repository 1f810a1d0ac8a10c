//! Wire types for the HTTP boundary.

use clipmark_core::{Format, ImageRef, RenderPreference};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// `POST /extract` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub url: String,
    #[serde(default = "default_true")]
    pub download_images: bool,
    #[serde(default)]
    pub render_mode: RenderPreference,
}

/// `POST /ingest` request body. Exactly one of `text`/`binary` is expected;
/// `binary` is base64-encoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub text: Option<String>,
    pub binary: Option<String>,
    pub hinted_format: Option<Format>,
}

/// Failure payload with an explicit empty content shape, so clients can
/// render a "failed to retrieve" state without special-casing missing
/// fields.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub title: String,
    pub content: String,
    pub images: Vec<ImageRef>,
}

impl ErrorBody {
    pub fn extraction_failure(error: String) -> Self {
        Self { error, title: "extraction failed".to_string(), content: String::new(), images: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_request_defaults() {
        let req: ExtractRequest = serde_json::from_str(r#"{"url": "https://example.org/a"}"#).unwrap();
        assert!(req.download_images);
        assert_eq!(req.render_mode, RenderPreference::Auto);
    }

    #[test]
    fn test_extract_request_overrides() {
        let req: ExtractRequest =
            serde_json::from_str(r#"{"url": "https://example.org/a", "downloadImages": false, "renderMode": "force"}"#)
                .unwrap();
        assert!(!req.download_images);
        assert_eq!(req.render_mode, RenderPreference::Force);
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody::extraction_failure("boom".to_string());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["title"], "extraction failed");
        assert_eq!(json["content"], "");
        assert!(json["images"].as_array().unwrap().is_empty());
    }
}

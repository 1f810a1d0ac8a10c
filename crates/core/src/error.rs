//! Error types for clipmark operations.
//!
//! This module defines the main error type [`ClipError`] which represents
//! all possible errors that can occur while fetching, extracting, and
//! ingesting content.
//!
//! Per-image download failures are deliberately *not* represented here:
//! they degrade to a flagged [`crate::images::ImageRef`] and never abort
//! an extraction.

use thiserror::Error;

/// Main error type for the extraction pipeline.
///
/// Fetch failures map onto [`ClipError::Timeout`], [`ClipError::HttpStatus`],
/// [`ClipError::Network`], and [`ClipError::Aborted`]. Extraction itself only
/// fails on input that is malformed beyond parsing ([`ClipError::ParseFailure`]);
/// everything else degrades to a best-effort result.
#[derive(Error, Debug)]
pub enum ClipError {
    /// Transport-level errors from reqwest (DNS, connection, TLS, protocol).
    #[cfg(feature = "fetch")]
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A fetch or navigation exceeded its deadline and was aborted.
    #[error("request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The remote server answered with a non-success status.
    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// An in-flight request was abandoned before completion.
    #[error("request aborted: {0}")]
    Aborted(String),

    /// Invalid or unsupported URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Input could not be parsed at all.
    ///
    /// Rare: the extractor is designed to fall back to the document body
    /// rather than fail, so this only surfaces for internal selector or
    /// rewriter errors.
    #[error("failed to parse content: {0}")]
    ParseFailure(String),

    /// Headless-browser session errors (launch, CDP transport, navigation).
    #[cfg(feature = "browser")]
    #[error("browser error: {0}")]
    Browser(String),

    /// Rendered mode was requested but no browser is configured or installed.
    #[error("no headless browser available: {0}")]
    BrowserUnavailable(String),

    /// A binary format needs a converter that is not loaded.
    ///
    /// Internal to ingestion: the public entry point degrades to a
    /// placeholder document instead of surfacing this.
    #[error("no converter available for {format} input")]
    ConverterUnavailable { format: &'static str },

    /// Uploaded or pasted content does not match its declared format.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// File system errors from the image store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ClipError.
pub type Result<T> = std::result::Result<T, ClipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClipError::InvalidUrl("not a url".to_string());
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_timeout_error() {
        let err = ClipError::Timeout { seconds: 10 };
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_http_status_error() {
        let err = ClipError::HttpStatus { status: 404, url: "https://example.com/a".to_string() };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_converter_unavailable_error() {
        let err = ClipError::ConverterUnavailable { format: "rtf" };
        assert!(err.to_string().contains("rtf"));
    }
}

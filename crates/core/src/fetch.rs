//! Lightweight content fetching over plain HTTP.
//!
//! This module issues single GET requests with a realistic desktop browser
//! header set. It covers the fast path of the two-tier fetch strategy; the
//! slow path (JavaScript execution in a headless browser) lives in
//! [`crate::browser`].
//!
//! Redirects are left to the HTTP client's policy: the final resolved URL is
//! taken from the response, never followed manually.

#[cfg(feature = "fetch")]
use std::time::Duration;

#[cfg(feature = "fetch")]
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::{ClipError, Result};

/// Realistic desktop User-Agent sent with every request to reduce
/// anti-bot friction on sites that reject obvious non-browser clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[cfg(feature = "fetch")]
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
#[cfg(feature = "fetch")]
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// Which retrieval strategy produced a [`FetchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Plain HTTP GET without JavaScript execution.
    Lightweight,
    /// Headless-browser render with JavaScript execution.
    Rendered,
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Lightweight => f.write_str("lightweight"),
            FetchMode::Rendered => f.write_str("rendered"),
        }
    }
}

/// HTTP client configuration for page and image fetches.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Timeout for text/HTML fetches, in seconds.
    pub text_timeout: u64,
    /// Timeout for binary/image fetches, in seconds.
    pub binary_timeout: u64,
    /// User-Agent header value.
    pub user_agent: String,
    /// Accept-Language header value.
    pub accept_language: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            text_timeout: 10,
            binary_timeout: 15,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

/// The raw outcome of one page fetch.
///
/// Ephemeral: exists for the duration of a single extraction call and is
/// passed by value to the extractor.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Raw response body.
    pub html: String,
    /// Final URL after the client followed redirects.
    pub final_url: Url,
    /// HTTP status code (always 200 for rendered fetches).
    pub status: u16,
    /// Content-Type header, if present.
    pub content_type: Option<String>,
    /// Strategy that produced this result.
    pub mode: FetchMode,
}

/// A downloaded binary payload (image fetches).
#[derive(Debug, Clone)]
pub struct BinaryFetch {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// A rendered-fetch strategy.
///
/// The production implementation is [`crate::browser::BrowserHandle`];
/// keeping the seam a trait lets the pipeline be exercised without a
/// Chromium install.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Fetches a page with JavaScript executed.
    async fn fetch_rendered(&self, url: &Url, load_images: bool) -> Result<FetchResult>;

    /// Releases any process-wide resources. Called once at shutdown.
    async fn shutdown(&self) {}
}

#[cfg(feature = "fetch")]
fn map_send_error(e: reqwest::Error, timeout: u64) -> ClipError {
    if e.is_timeout() { ClipError::Timeout { seconds: timeout } } else { ClipError::Network(e) }
}

/// Fetches a page over plain HTTP.
///
/// Issues a single GET with browser-like `User-Agent`, `Accept`, and
/// `Accept-Language` headers. Non-2xx statuses are failures
/// ([`ClipError::HttpStatus`]); a socket idle beyond the configured timeout
/// aborts the request ([`ClipError::Timeout`]).
#[cfg(feature = "fetch")]
pub async fn fetch_page(url: &str, config: &FetchConfig) -> Result<FetchResult> {
    let parsed_url = parse_http_url(url)?;

    let client = Client::builder()
        .timeout(Duration::from_secs(config.text_timeout))
        .build()
        .map_err(ClipError::Network)?;

    tracing::debug!(url = %parsed_url, "lightweight fetch");

    let response = client
        .get(parsed_url)
        .header("User-Agent", &config.user_agent)
        .header("Accept", HTML_ACCEPT)
        .header("Accept-Language", &config.accept_language)
        .send()
        .await
        .map_err(|e| map_send_error(e, config.text_timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClipError::HttpStatus { status: status.as_u16(), url: response.url().to_string() });
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let html = response
        .text()
        .await
        .map_err(|e| map_send_error(e, config.text_timeout))?;

    Ok(FetchResult { html, final_url, status: status.as_u16(), content_type, mode: FetchMode::Lightweight })
}

/// Fetches a binary resource (image mode).
///
/// Sends an image `Accept` header and a `Referer` derived from the page the
/// resource was found on. When the server declares a `Content-Length` above
/// `max_bytes` the request is abandoned without reading the body; bodies
/// delivered without a length are checked after download.
#[cfg(feature = "fetch")]
pub async fn fetch_binary(url: &Url, referer: &str, max_bytes: u64, config: &FetchConfig) -> Result<BinaryFetch> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.binary_timeout))
        .build()
        .map_err(ClipError::Network)?;

    let response = client
        .get(url.clone())
        .header("User-Agent", &config.user_agent)
        .header("Accept", IMAGE_ACCEPT)
        .header("Accept-Language", &config.accept_language)
        .header("Referer", referer)
        .send()
        .await
        .map_err(|e| map_send_error(e, config.binary_timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClipError::HttpStatus { status: status.as_u16(), url: url.to_string() });
    }

    if let Some(declared) = response.content_length()
        && declared > max_bytes
    {
        return Err(ClipError::Aborted(format!(
            "payload of {} bytes exceeds limit of {} bytes",
            declared, max_bytes
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_send_error(e, config.binary_timeout))?;

    if bytes.len() as u64 > max_bytes {
        return Err(ClipError::Aborted(format!(
            "payload of {} bytes exceeds limit of {} bytes",
            bytes.len(),
            max_bytes
        )));
    }

    Ok(BinaryFetch { bytes: bytes.to_vec(), content_type })
}

/// Parses and validates a target URL, rejecting non-HTTP schemes.
pub fn parse_http_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| ClipError::InvalidUrl(e.to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ClipError::InvalidUrl(format!(
            "unsupported scheme '{}', expected http or https",
            parsed.scheme()
        )));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.text_timeout, 10);
        assert_eq!(config.binary_timeout, 15);
        assert!(config.user_agent.contains("Mozilla"));
    }

    #[test]
    fn test_fetch_mode_display() {
        assert_eq!(FetchMode::Lightweight.to_string(), "lightweight");
        assert_eq!(FetchMode::Rendered.to_string(), "rendered");
    }

    #[test]
    fn test_fetch_mode_serialization() {
        assert_eq!(serde_json::to_string(&FetchMode::Rendered).unwrap(), "\"rendered\"");
    }

    #[test]
    fn test_parse_http_url_rejects_schemes() {
        assert!(parse_http_url("https://example.com").is_ok());
        assert!(matches!(parse_http_url("not-a-url"), Err(ClipError::InvalidUrl(_))));
        assert!(matches!(parse_http_url("ftp://example.com/x"), Err(ClipError::InvalidUrl(_))));
        assert!(matches!(
            parse_http_url("file:///etc/passwd"),
            Err(ClipError::InvalidUrl(_))
        ));
    }

    #[cfg(feature = "fetch")]
    #[test]
    fn test_fetch_page_invalid_url() {
        let config = FetchConfig::default();
        let result = std::thread::spawn(move || {
            tokio::runtime::Runtime::new()
                .unwrap()
                .block_on(fetch_page("not-a-url", &config))
        })
        .join()
        .unwrap();

        assert!(matches!(result, Err(ClipError::InvalidUrl(_))));
    }

    #[test]
    fn test_timeout_error_message() {
        let err = ClipError::Timeout { seconds: 10 };
        assert!(err.to_string().contains("10"));
    }
}

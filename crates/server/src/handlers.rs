//! Request handlers for the extraction service.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clipmark_core::{ClipError, ClipOptions};

use crate::routes::AppState;
use crate::types::{ErrorBody, ExtractRequest, IngestRequest};

/// `POST /extract` — run the clip pipeline against a URL.
pub async fn extract(State(state): State<AppState>, Json(request): Json<ExtractRequest>) -> Response {
    let options = ClipOptions { render: request.render_mode, download_images: request.download_images };

    match state.pipeline.clip(&request.url, &options).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::warn!(url = %request.url, error = %e, "extraction failed");
            let status = status_for(&e);
            (status, Json(ErrorBody::extraction_failure(e.to_string()))).into_response()
        }
    }
}

/// `POST /ingest` — normalize pasted or uploaded content into sanitized
/// HTML. Bypasses the fetch pipeline entirely.
pub async fn ingest(State(_state): State<AppState>, Json(request): Json<IngestRequest>) -> Response {
    let bytes = match (request.text, request.binary) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(encoded)) => match BASE64.decode(encoded.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorBody::extraction_failure(format!("invalid base64 payload: {}", e))),
                )
                    .into_response();
            }
        },
        (None, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::extraction_failure("either 'text' or 'binary' is required".to_string())),
            )
                .into_response();
        }
    };

    match clipmark_core::ingest(&bytes, request.hinted_format) {
        Ok(result) => Json(result).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::extraction_failure(e.to_string())),
        )
            .into_response(),
    }
}

/// `GET /images/{file}` — serve a stored image.
///
/// Files are content-addressed and never rewritten, so clients may cache
/// them indefinitely.
pub async fn image(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    if file.contains('/') || file.contains("..") || file.starts_with('.') {
        return StatusCode::NOT_FOUND.into_response();
    }

    let Some(store) = state.pipeline.image_store() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let path = store.dir().join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = content_type_for_file(&file);
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
                ],
                bytes,
            )
                .into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `GET /healthz` — liveness probe.
pub async fn health() -> Response {
    Json(serde_json::json!({"status": "ok"})).into_response()
}

fn status_for(error: &ClipError) -> StatusCode {
    match error {
        ClipError::InvalidUrl(_) | ClipError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        ClipError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ClipError::HttpStatus { .. } | ClipError::Network(_) => StatusCode::BAD_GATEWAY,
        ClipError::BrowserUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn content_type_for_file(file: &str) -> &'static str {
    match file.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

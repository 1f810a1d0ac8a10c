//! Router assembly and shared state.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use clipmark_core::ClipPipeline;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// State shared by every handler: the pipeline owns the fetch configs, the
/// browser handle, and the image store.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ClipPipeline>,
}

/// Builds the service router.
///
/// The outer timeout is a backstop well above every per-step timeout in the
/// pipeline; it exists so a wedged handler cannot hold a connection forever.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/extract", post(handlers::extract))
        .route("/ingest", post(handlers::ingest))
        .route("/images/{file}", get(handlers::image))
        .route("/healthz", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .with_state(state)
}

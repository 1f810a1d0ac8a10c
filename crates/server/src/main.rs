//! clipmark-server: HTTP boundary for the extraction pipeline.
//!
//! Exposes `POST /extract` (clip a URL), `POST /ingest` (normalize pasted
//! or uploaded content), `GET /images/{file}` (content-addressed image
//! assets), and `GET /healthz`. Article persistence lives elsewhere; this
//! service only produces extraction results.

mod handlers;
mod routes;
mod types;

use std::sync::Arc;

use clipmark_core::{BrowserHandle, ClipPipeline, ImageStore, PipelineConfig, RenderConfig};
use tracing_subscriber::EnvFilter;

use crate::routes::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipmark_server=info,clipmark_core=info")),
        )
        .init();

    let addr = std::env::var("CLIPMARK_ADDR").unwrap_or_else(|_| "127.0.0.1:8787".to_string());
    let image_dir = std::env::var("CLIPMARK_IMAGE_DIR").unwrap_or_else(|_| "data/images".to_string());

    let store = match ImageStore::new(&image_dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(dir = %image_dir, error = %e, "cannot open image store");
            std::process::exit(1);
        }
    };

    let render_config = RenderConfig::default();
    let mut pipeline = ClipPipeline::new(PipelineConfig::default()).with_image_store(store);

    if BrowserHandle::available(&render_config) {
        pipeline = pipeline.with_browser(BrowserHandle::new(render_config));
    } else {
        tracing::warn!("no Chromium executable found; rendered fetches are disabled");
    }

    let pipeline = Arc::new(pipeline);
    let app = routes::router(AppState { pipeline: pipeline.clone() });

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "cannot bind listen address");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %addr, image_dir = %image_dir, "clipmark-server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    // The shared browser must not outlive the process.
    pipeline.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

//! Core library for clipmark, a personal "clip and read later" collector.
//!
//! The pipeline: a [`strategy`] decision picks a lightweight HTTP fetch or
//! a headless-browser render, [`fetch`]/[`browser`] retrieve the raw HTML,
//! [`extract`] locates and cleans the article body, and [`images`]
//! optionally rewrites remote images to content-addressed local copies.
//! [`ingest`] is the independent entry point for pasted or uploaded
//! content.

#[cfg(feature = "browser")]
pub mod browser;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod images;
pub mod ingest;
#[cfg(feature = "fetch")]
pub mod pipeline;
pub mod sanitize;
pub mod strategy;

#[cfg(feature = "browser")]
pub use browser::{BrowserHandle, RenderConfig, find_chrome_executable};
pub use error::{ClipError, Result};
pub use extract::{ExtractConfig, ExtractedContent, extract};
pub use fetch::{BinaryFetch, FetchConfig, FetchMode, FetchResult, Renderer, parse_http_url};
#[cfg(feature = "fetch")]
pub use fetch::{fetch_binary, fetch_page};
pub use images::{ImageConfig, ImageRef, ImageStore};
pub use ingest::{BinaryConverter, ConverterRegistry, Format, IngestResult, detect, ingest, process};
#[cfg(feature = "fetch")]
pub use pipeline::{ClipOptions, ClipPipeline, ClipResult, PipelineConfig, PipelineConfigBuilder};
pub use strategy::{RenderPreference, StrategyConfig, decide, needs_escalation};

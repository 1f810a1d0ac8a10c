//! The clip pipeline: strategy selection, fetch, extraction, and image
//! localization wired together.
//!
//! [`ClipPipeline`] is the facade the HTTP boundary and the CLI build on.
//! Within one call the steps are strictly sequential; independent calls
//! share nothing but the browser handle and the image store, both of which
//! are safe under concurrency.
//!
//! Escalation policy: a lightweight attempt that fails, or extracts less
//! text than the sufficiency threshold, is retried exactly once in rendered
//! mode. This is a fallback, not a retry loop; rendered failures are
//! terminal for the call.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::extract::{self, ExtractConfig, ExtractedContent};
use crate::fetch::{self, FetchConfig, FetchMode, FetchResult, Renderer};
use crate::images::{self, ImageConfig, ImageStore};
use crate::strategy::{self, RenderPreference, StrategyConfig};
use crate::{ClipError, Result};

#[cfg(feature = "browser")]
use crate::browser::BrowserHandle;

/// Aggregate configuration for the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub strategy: StrategyConfig,
    pub image: ImageConfig,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self { config: PipelineConfig::default() }
    }

    pub fn fetch(mut self, fetch: FetchConfig) -> Self {
        self.config.fetch = fetch;
        self
    }

    pub fn extract(mut self, extract: ExtractConfig) -> Self {
        self.config.extract = extract;
        self
    }

    pub fn strategy(mut self, strategy: StrategyConfig) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn image(mut self, image: ImageConfig) -> Self {
        self.config.image = image;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request options supplied by the caller.
#[derive(Debug, Clone)]
pub struct ClipOptions {
    pub render: RenderPreference,
    pub download_images: bool,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self { render: RenderPreference::Auto, download_images: true }
    }
}

/// The outcome of one clip call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipResult {
    #[serde(flatten)]
    pub extracted: ExtractedContent,
    pub image_count: usize,
    pub downloaded_image_count: usize,
    /// Final URL after redirects.
    pub url: String,
    pub fetch_mode: FetchMode,
}

/// The extraction pipeline facade.
pub struct ClipPipeline {
    config: PipelineConfig,
    renderer: Option<Arc<dyn Renderer>>,
    store: Option<ImageStore>,
}

impl ClipPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config, renderer: None, store: None }
    }

    /// Attaches the shared browser handle used for rendered fetches.
    #[cfg(feature = "browser")]
    pub fn with_browser(self, browser: Arc<BrowserHandle>) -> Self {
        self.with_renderer(browser)
    }

    /// Attaches an arbitrary rendered-fetch strategy.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Attaches the image store; without one, image localization is skipped.
    pub fn with_image_store(mut self, store: ImageStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn image_store(&self) -> Option<&ImageStore> {
        self.store.as_ref()
    }

    /// Clips a URL: pick a fetch mode, fetch, extract, localize images.
    pub async fn clip(&self, url: &str, options: &ClipOptions) -> Result<ClipResult> {
        let target = fetch::parse_http_url(url)?;
        let mode = strategy::decide(&target, options.render, &self.config.strategy);

        let (fetched, extracted) = match self.fetch(&target, mode, options).await {
            Ok(fetched) => {
                let extracted = self.extract_from(&fetched)?;
                let too_thin = strategy::needs_escalation(extracted.plain_text.chars().count(), &self.config.strategy);

                if fetched.mode == FetchMode::Lightweight && too_thin && self.can_escalate(options) {
                    tracing::info!(url = %target, "extracted text below sufficiency threshold, escalating to rendered fetch");
                    match self.fetch_rendered_once(&target, options).await {
                        Ok(refetched) => {
                            let reextracted = self.extract_from(&refetched)?;
                            (refetched, reextracted)
                        }
                        Err(e) => {
                            // The thin lightweight result still beats a failure.
                            tracing::warn!(url = %target, error = %e, "escalation failed, keeping lightweight result");
                            (fetched, extracted)
                        }
                    }
                } else {
                    (fetched, extracted)
                }
            }
            Err(e) if mode == FetchMode::Lightweight && self.can_escalate(options) => {
                tracing::info!(url = %target, error = %e, "lightweight fetch failed, escalating to rendered fetch");
                let refetched = self.fetch_rendered_once(&target, options).await?;
                let extracted = self.extract_from(&refetched)?;
                (refetched, extracted)
            }
            Err(e) => return Err(e),
        };

        self.finish(fetched, extracted, options).await
    }

    /// Extracts directly from HTML that is already in hand (local file,
    /// stdin, stored copy); no fetching or escalation.
    pub async fn clip_html(&self, html: &str, base_url: Option<&Url>, options: &ClipOptions) -> Result<ClipResult> {
        let extracted = extract::extract(html, base_url, &self.config.extract)?;
        let fetched = FetchResult {
            html: String::new(),
            final_url: base_url
                .cloned()
                .unwrap_or_else(|| Url::parse("about:blank").expect("static URL parses")),
            status: 200,
            content_type: Some("text/html".to_string()),
            mode: FetchMode::Lightweight,
        };
        self.finish(fetched, extracted, options).await
    }

    /// Closes shared resources (the browser). The image store needs no
    /// teardown.
    pub async fn shutdown(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.shutdown().await;
        }
    }

    fn extract_from(&self, fetched: &FetchResult) -> Result<ExtractedContent> {
        extract::extract(&fetched.html, Some(&fetched.final_url), &self.config.extract)
    }

    async fn finish(&self, fetched: FetchResult, extracted: ExtractedContent, options: &ClipOptions) -> Result<ClipResult> {
        let extracted = match (&self.store, options.download_images) {
            (Some(store), true) => {
                let (content, refs) = images::localize_images(
                    &extracted.content,
                    Some(&fetched.final_url),
                    store,
                    &self.config.fetch,
                    &self.config.image,
                )
                .await;
                ExtractedContent { content, images: refs, ..extracted }
            }
            _ => extracted,
        };

        let image_count = extracted.images.len();
        let downloaded_image_count = extracted.images.iter().filter(|i| i.downloaded).count();

        Ok(ClipResult {
            extracted,
            image_count,
            downloaded_image_count,
            url: fetched.final_url.to_string(),
            fetch_mode: fetched.mode,
        })
    }

    fn can_escalate(&self, options: &ClipOptions) -> bool {
        options.render != RenderPreference::Disable && self.renderer.is_some()
    }

    async fn fetch(&self, url: &Url, mode: FetchMode, options: &ClipOptions) -> Result<FetchResult> {
        match mode {
            FetchMode::Lightweight => fetch::fetch_page(url.as_str(), &self.config.fetch).await,
            FetchMode::Rendered => self.fetch_rendered_once(url, options).await,
        }
    }

    async fn fetch_rendered_once(&self, url: &Url, options: &ClipOptions) -> Result<FetchResult> {
        match &self.renderer {
            Some(renderer) => {
                let load_images = options.download_images && self.store.is_some();
                renderer.fetch_rendered(url, load_images).await
            }
            None => Err(ClipError::BrowserUnavailable(
                "rendered fetch requested but no renderer is configured".to_string(),
            )),
        }
    }
}

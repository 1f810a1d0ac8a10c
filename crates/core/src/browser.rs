//! Shared headless-browser sessions for rendered fetching.
//!
//! One Chromium process serves the whole collector: [`BrowserHandle`] owns
//! it as an explicitly managed resource with lazy launch, transparent
//! restart after a crash, and an explicit [`BrowserHandle::shutdown`] for
//! process exit. Launching is the only serialization point; once the
//! browser is up, every rendered fetch runs in its own isolated page and
//! pages proceed concurrently.
//!
//! A rendered fetch navigates with a network-quiet wait under a hard
//! ceiling, runs a bounded scroll loop to trigger lazy-loaded content,
//! clicks "read more" style expanders, and captures the final HTML. The
//! page is closed on every exit path; the browser stays alive.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{BlockPattern, SetBlockedUrLsParams};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use url::Url;

use crate::fetch::{DEFAULT_USER_AGENT, FetchMode, FetchResult};
use crate::{ClipError, Result};

/// Visible-text vocabulary for "expand / read more" controls, clicked once
/// after the page settles so collapsed article bodies unfold before capture.
const EXPAND_LABELS: &[&str] = &[
    "read more",
    "show more",
    "continue reading",
    "see more",
    "expand",
    "full story",
    "weiterlesen",
    "mehr anzeigen",
    "lire la suite",
    "afficher plus",
    "leer más",
    "ver más",
    "ler mais",
    "mostra di più",
    "続きを読む",
    "もっと見る",
    "阅读全文",
    "展开",
    "더 보기",
];

/// URL patterns blocked when image localization is off: images, fonts,
/// stylesheets, and media contribute nothing to text extraction.
const BLOCKED_RESOURCE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.css", "*.woff", "*.woff2", "*.ttf", "*.otf",
    "*.mp4", "*.webm", "*.avi", "*.mp3", "*.ogg",
];

/// Configuration for rendered fetches.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Hard ceiling on navigation plus settling, in seconds.
    pub nav_timeout: u64,
    /// Network considered quiet after this many milliseconds without new
    /// resource entries.
    pub quiet_ms: u64,
    /// Upper bound on lazy-load scroll iterations.
    pub max_scroll_passes: u32,
    /// Viewport size presented to pages.
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Explicit browser executable; auto-discovered when unset.
    pub chrome_executable: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            nav_timeout: 45,
            quiet_ms: 1500,
            max_scroll_passes: 10,
            viewport_width: 1920,
            viewport_height: 1080,
            chrome_executable: None,
        }
    }
}

/// A shared, lazily launched headless-browser instance.
///
/// Store one `Arc<BrowserHandle>` per process. The first rendered fetch
/// launches the browser; concurrent callers arriving during the launch
/// wait on the same lock instead of spawning their own instance. If the
/// process dies underneath us, the next acquire relaunches it.
pub struct BrowserHandle {
    config: RenderConfig,
    inner: Mutex<Option<Browser>>,
}

impl BrowserHandle {
    pub fn new(config: RenderConfig) -> Arc<Self> {
        Arc::new(Self { config, inner: Mutex::new(None) })
    }

    /// Whether a usable browser executable exists on this machine.
    pub fn available(config: &RenderConfig) -> bool {
        config.chrome_executable.is_some() || find_chrome_executable().is_some()
    }

    /// Opens a fresh isolated page, launching or relaunching the browser
    /// as needed.
    async fn acquire(&self) -> Result<Page> {
        let mut guard = self.inner.lock().await;

        if let Some(browser) = guard.as_mut() {
            match browser.new_page("about:blank").await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::warn!(error = %e, "browser instance dead, relaunching");
                    if let Some(mut dead) = guard.take() {
                        let _ = dead.close().await;
                    }
                }
            }
        }

        let browser = self.launch().await?;
        *guard = Some(browser);

        guard
            .as_mut()
            .expect("browser present after launch")
            .new_page("about:blank")
            .await
            .map_err(|e| ClipError::Browser(format!("failed to open page: {}", e)))
    }

    async fn launch(&self) -> Result<Browser> {
        let exe = match &self.config.chrome_executable {
            Some(exe) => exe.clone(),
            None => find_chrome_executable().ok_or_else(|| {
                ClipError::BrowserUnavailable(
                    "no Chromium-family executable found; install Chromium or set CHROME_EXECUTABLE".to_string(),
                )
            })?,
        };

        tracing::info!(executable = %exe, "launching headless browser");

        let config = build_headless_config(&exe, self.config.viewport_width, self.config.viewport_height)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ClipError::Browser(format!("failed to launch {}: {}", exe, e)))?;

        // Drives CDP events for the browser's lifetime; ends when it closes.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "CDP handler event error");
                }
            }
        });

        Ok(browser)
    }

    /// Closes the shared browser. Called on process shutdown; later
    /// rendered fetches would relaunch it.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut browser) = guard.take() {
            let _ = browser.close().await;
            tracing::info!("headless browser shut down");
        }
    }

    /// Fetches a page through the headless browser.
    ///
    /// `load_images` keeps image requests flowing for later localization;
    /// otherwise images, fonts, stylesheets, and media are blocked.
    pub async fn fetch_rendered(&self, url: &Url, load_images: bool) -> Result<FetchResult> {
        let page = self.acquire().await?;
        let result = self.render(&page, url, load_images).await;
        // The page must not outlive this call, error paths included.
        page.close().await.ok();
        result
    }

    async fn render(&self, page: &Page, url: &Url, load_images: bool) -> Result<FetchResult> {
        if !load_images {
            let patterns = BLOCKED_RESOURCE_PATTERNS
                .iter()
                .map(|p| BlockPattern::new(*p, true))
                .collect::<Vec<_>>();
            page.execute(SetBlockedUrLsParams::builder().url_patterns(patterns).build())
                .await
                .map_err(|e| ClipError::Browser(format!("failed to install resource filter: {}", e)))?;
        }

        let deadline = Duration::from_secs(self.config.nav_timeout);
        let started = Instant::now();

        tracing::debug!(url = %url, "rendered fetch");

        tokio::time::timeout(deadline, page.goto(url.as_str()))
            .await
            .map_err(|_| ClipError::Timeout { seconds: self.config.nav_timeout })?
            .map_err(|e| ClipError::Browser(format!("navigation failed: {}", e)))?;

        let remaining = |started: Instant| deadline.saturating_sub(started.elapsed());

        wait_until_quiet(page, self.config.quiet_ms, remaining(started)).await;
        scroll_for_lazy_content(page, self.config.max_scroll_passes, remaining(started)).await;
        click_expanders(page).await;

        let html = page
            .content()
            .await
            .map_err(|e| ClipError::Browser(format!("failed to capture page content: {}", e)))?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        Ok(FetchResult {
            html,
            final_url,
            status: 200,
            content_type: Some("text/html".to_string()),
            mode: FetchMode::Rendered,
        })
    }
}

#[async_trait::async_trait]
impl crate::fetch::Renderer for BrowserHandle {
    async fn fetch_rendered(&self, url: &Url, load_images: bool) -> Result<FetchResult> {
        BrowserHandle::fetch_rendered(self, url, load_images).await
    }

    async fn shutdown(&self) {
        BrowserHandle::shutdown(self).await;
    }
}

async fn eval_u64(page: &Page, script: &str) -> Option<u64> {
    page.evaluate(script)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_u64())
}

async fn eval_bool(page: &Page, script: &str) -> bool {
    page.evaluate(script)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok())
        .and_then(|j| j.as_bool())
        .unwrap_or(false)
}

/// Waits until no new resource entries appear for `quiet_ms` consecutive
/// milliseconds, or until `budget` runs out. Polls the performance timeline
/// rather than CDP network events.
async fn wait_until_quiet(page: &Page, quiet_ms: u64, budget: Duration) {
    let poll = Duration::from_millis(250);
    let started = Instant::now();
    let mut last_count = 0u64;
    let mut quiet_since = Instant::now();

    while started.elapsed() < budget {
        let count = eval_u64(page, "performance.getEntriesByType('resource').length")
            .await
            .unwrap_or(0);
        let ready = eval_bool(page, "document.readyState === 'complete'").await;

        if !ready || count != last_count {
            last_count = count;
            quiet_since = Instant::now();
        } else if quiet_since.elapsed().as_millis() as u64 >= quiet_ms {
            return;
        }

        tokio::time::sleep(poll).await;
    }

    tracing::debug!("network quiet wait hit its ceiling");
}

/// Scrolls viewport-by-viewport to trigger lazy-loaded and
/// intersection-observer content. Stops early once the document height
/// stabilizes; `max_passes` caps infinite-scroll pages.
async fn scroll_for_lazy_content(page: &Page, max_passes: u32, budget: Duration) {
    let started = Instant::now();
    let mut last_height = 0u64;

    for _ in 0..max_passes {
        if started.elapsed() >= budget {
            break;
        }

        page.evaluate("window.scrollBy({top: window.innerHeight, behavior: 'instant'});")
            .await
            .ok();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let height = eval_u64(
            page,
            "Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)",
        )
        .await
        .unwrap_or(0);

        if height == last_height {
            break;
        }
        last_height = height;
    }

    page.evaluate("window.scrollTo({top: 0, behavior: 'instant'});")
        .await
        .ok();
}

/// Clicks up to a handful of elements whose visible text matches the
/// expand vocabulary, then gives the page a moment to settle.
async fn click_expanders(page: &Page) {
    let clicked = eval_u64(page, &expand_click_script()).await.unwrap_or(0);
    if clicked > 0 {
        tracing::debug!(clicked, "expanded collapsed content");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

fn expand_click_script() -> String {
    let labels = serde_json::to_string(EXPAND_LABELS).expect("static label table serializes");
    format!(
        r#"(() => {{
            const labels = {labels};
            let clicked = 0;
            const candidates = document.querySelectorAll('a, button, [role="button"]');
            for (const el of candidates) {{
                const text = (el.innerText || '').trim().toLowerCase();
                if (!text || text.length > 40) continue;
                if (labels.some(l => text === l || text.startsWith(l))) {{
                    try {{ el.click(); clicked++; }} catch (_) {{}}
                    if (clicked >= 5) break;
                }}
            }}
            return clicked;
        }})()"#
    )
}

/// Locates a Chromium-family executable: `CHROME_EXECUTABLE` override,
/// then PATH, then well-known install locations.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE")
        && Path::new(&p).exists()
    {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let names = ["chromium", "chromium-browser", "google-chrome", "chrome", "brave-browser"];
        for dir in std::env::split_paths(&path_var) {
            for name in names {
                let full = dir.join(name);
                if full.exists() {
                    return Some(full.to_string_lossy().into_owned());
                }
            }
        }
    }

    let well_known: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/local/bin/chromium",
        ]
    };

    well_known
        .iter()
        .find(|c| Path::new(c).exists())
        .map(|c| c.to_string())
}

fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", DEFAULT_USER_AGENT))
        .build()
        .map_err(ClipError::Browser)
}

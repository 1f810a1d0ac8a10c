//! Image localization with content-addressed storage.
//!
//! Walks extracted content for `<img>` references, downloads them within
//! type and size constraints, and rewrites the content to point at local
//! copies. Files are stored under a name derived from the SHA-256 of the
//! resolved source URL, so the same remote image clipped from two articles
//! maps to one stored file and the second encounter is a cache hit with no
//! network traffic.
//!
//! A failed image never fails the extraction: the entry degrades to
//! `downloaded: false` with the original URL preserved, and the `<img>` tag
//! is stamped with a `data-download-failed` marker.

#[cfg(feature = "fetch")]
use std::borrow::Cow;
#[cfg(feature = "fetch")]
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "fetch")]
use lol_html::{ElementContentHandlers, Selector};
#[cfg(feature = "fetch")]
use scraper::Html;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::Result;

#[cfg(feature = "fetch")]
use crate::fetch::{FetchConfig, fetch_binary};

/// Accepted image content types and the file extension each maps to.
const TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
];

/// Hard ceiling on a single image download.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// One image encountered during localization.
///
/// Immutable once written: a stored file is never modified, only superseded
/// by a re-fetch under the same name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    /// Resolved absolute URL of the remote image (or the raw `src` when it
    /// could not be resolved).
    pub original_url: String,
    /// On-disk path of the stored copy; `None` until downloaded.
    pub local_path: Option<String>,
    pub alt_text: String,
    pub title_text: String,
    pub downloaded: bool,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    /// Hex SHA-256 of the resolved URL; the dedup identity.
    pub content_hash: String,
}

/// Configuration for the image localizer.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Maximum accepted payload size in bytes.
    pub max_bytes: u64,
    /// Public route prefix substituted into rewritten `src` attributes.
    pub route_prefix: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { max_bytes: MAX_IMAGE_BYTES, route_prefix: "/images".to_string() }
    }
}

/// Content-addressed image directory.
///
/// Writes are atomic (write to a temp name, then rename), so two
/// extractions localizing the same remote image concurrently settle on one
/// file without locking, and readers never observe a partial file.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Looks up a stored file by content hash, trying each known extension.
    pub fn find(&self, hash: &str) -> Option<(PathBuf, &'static str)> {
        for (_, ext) in TYPE_EXTENSIONS {
            let path = self.dir.join(format!("{}.{}", hash, ext));
            if path.is_file() {
                return Some((path, ext));
            }
        }
        None
    }

    /// Stores `bytes` under `{hash}.{ext}` via write-then-rename.
    ///
    /// Overwriting an existing entry is safe: identical identity means
    /// identical name, and the rename replaces the file in one step.
    pub fn insert(&self, hash: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
        let final_path = self.dir.join(format!("{}.{}", hash, ext));
        let tmp_path = self.dir.join(format!(".{}.{}.tmp", hash, ext));

        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &final_path)?;

        Ok(final_path)
    }
}

/// Hex SHA-256 of a resolved image URL.
pub fn hash_url(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Resolves an `<img src>` to an absolute URL.
///
/// Handles already-absolute, protocol-relative (`//host/path`),
/// root-relative (`/path`), and ordinary relative forms, each against
/// `base_url`. Data URIs and empty sources are skipped.
pub fn resolve_image_url(src: &str, base_url: Option<&Url>) -> Option<Url> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }

    if src.starts_with("http://") || src.starts_with("https://") {
        return Url::parse(src).ok();
    }

    base_url?.join(src).ok()
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim().to_lowercase();
    TYPE_EXTENSIONS
        .iter()
        .find(|(t, _)| *t == essence)
        .map(|(_, ext)| *ext)
}

fn content_type_for(ext: &str) -> Option<String> {
    TYPE_EXTENSIONS
        .iter()
        .find(|(_, e)| *e == ext)
        .map(|(t, _)| t.to_string())
}

#[cfg(feature = "fetch")]
fn failed_ref(original_url: String, alt_text: String, title_text: String, content_hash: String) -> ImageRef {
    ImageRef {
        original_url,
        local_path: None,
        alt_text,
        title_text,
        downloaded: false,
        content_type: None,
        size_bytes: 0,
        content_hash,
    }
}

#[cfg(feature = "fetch")]
#[derive(Debug, Clone)]
struct ImageSite {
    src: String,
    alt: String,
    title: String,
}

#[cfg(feature = "fetch")]
fn collect_images(content: &str) -> Vec<ImageSite> {
    let fragment = Html::parse_fragment(content);
    let Ok(selector) = scraper::Selector::parse("img") else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    fragment
        .select(&selector)
        .filter_map(|el| {
            let src = el.attr("src")?.trim().to_string();
            if src.is_empty() || src.starts_with("data:") || !seen.insert(src.clone()) {
                return None;
            }
            Some(ImageSite {
                src,
                alt: el.attr("alt").unwrap_or_default().to_string(),
                title: el.attr("title").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Localizes every remote image referenced by `content`.
///
/// Returns the rewritten content and one [`ImageRef`] per distinct image in
/// document order. Downloads run sequentially within the call; each carries
/// its own timeout, so one hanging source delays only itself.
#[cfg(feature = "fetch")]
pub async fn localize_images(
    content: &str, base_url: Option<&Url>, store: &ImageStore, fetch_config: &FetchConfig, config: &ImageConfig,
) -> (String, Vec<ImageRef>) {
    let sites = collect_images(content);
    if sites.is_empty() {
        return (content.to_string(), Vec::new());
    }

    let mut refs = Vec::with_capacity(sites.len());
    let mut rewrites: HashMap<String, Option<String>> = HashMap::new();

    for site in sites {
        let image = localize_one(&site, base_url, store, fetch_config, config).await;
        let public = image.local_path.as_ref().and_then(|p| {
            let file = Path::new(p).file_name()?.to_str()?;
            Some(format!("{}/{}", config.route_prefix, file))
        });
        rewrites.insert(site.src.clone(), public);
        refs.push(image);
    }

    (rewrite_sources(content, &rewrites), refs)
}

#[cfg(feature = "fetch")]
async fn localize_one(
    site: &ImageSite, base_url: Option<&Url>, store: &ImageStore, fetch_config: &FetchConfig, config: &ImageConfig,
) -> ImageRef {
    let Some(resolved) = resolve_image_url(&site.src, base_url) else {
        return failed_ref(site.src.clone(), site.alt.clone(), site.title.clone(), hash_url(&site.src));
    };

    let hash = hash_url(resolved.as_str());

    // Same URL seen before, possibly from another article: reuse the file.
    if let Some((path, ext)) = store.find(&hash) {
        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        return ImageRef {
            original_url: resolved.to_string(),
            local_path: Some(path.to_string_lossy().into_owned()),
            alt_text: site.alt.clone(),
            title_text: site.title.clone(),
            downloaded: true,
            content_type: content_type_for(ext),
            size_bytes,
            content_hash: hash,
        };
    }

    let referer = origin_of(base_url.unwrap_or(&resolved));

    let fetched = match fetch_binary(&resolved, &referer, config.max_bytes, fetch_config).await {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(url = %resolved, error = %e, "image download failed");
            return failed_ref(resolved.to_string(), site.alt.clone(), site.title.clone(), hash);
        }
    };

    let Some(ext) = fetched.content_type.as_deref().and_then(extension_for) else {
        tracing::debug!(url = %resolved, content_type = ?fetched.content_type, "unsupported image type");
        return failed_ref(resolved.to_string(), site.alt.clone(), site.title.clone(), hash);
    };

    match store.insert(&hash, ext, &fetched.bytes) {
        Ok(path) => ImageRef {
            original_url: resolved.to_string(),
            local_path: Some(path.to_string_lossy().into_owned()),
            alt_text: site.alt.clone(),
            title_text: site.title.clone(),
            downloaded: true,
            content_type: fetched.content_type.clone(),
            size_bytes: fetched.bytes.len() as u64,
            content_hash: hash,
        },
        Err(e) => {
            tracing::warn!(url = %resolved, error = %e, "image store write failed");
            failed_ref(resolved.to_string(), site.alt.clone(), site.title.clone(), hash)
        }
    }
}

#[cfg(feature = "fetch")]
fn origin_of(url: &Url) -> String {
    match url.host_str() {
        Some(host) => format!("{}://{}/", url.scheme(), host),
        None => url.to_string(),
    }
}

/// Rewrites `<img>` sources: localized images point at their stored copy
/// (original URL preserved in `data-original-src`); failed ones keep their
/// source and gain a `data-download-failed` marker.
#[cfg(feature = "fetch")]
fn rewrite_sources(content: &str, rewrites: &HashMap<String, Option<String>>) -> String {
    let handlers: Vec<(Cow<'_, Selector>, ElementContentHandlers<'_>)> = vec![lol_html::element!("img[src]", |el| {
        let Some(src) = el.get_attribute("src") else {
            return Ok(());
        };
        match rewrites.get(src.trim()) {
            Some(Some(public)) => {
                el.set_attribute("data-original-src", &src).ok();
                el.set_attribute("src", public).ok();
            }
            Some(None) => {
                el.set_attribute("data-download-failed", "true").ok();
            }
            None => {}
        }
        Ok(())
    })];

    let mut output = String::new();
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings { element_content_handlers: handlers, ..Default::default() },
        |c: &[u8]| {
            output.push_str(&String::from_utf8_lossy(c));
        },
    );

    if rewriter.write(content.as_bytes()).is_err() {
        return content.to_string();
    }
    if rewriter.end().is_err() {
        return content.to_string();
    }

    output
}

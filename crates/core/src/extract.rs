//! Main content extraction.
//!
//! Given raw HTML and an optional base URL, locates the article's main
//! content region, strips boilerplate from a serialized copy of it, and
//! produces cleaned HTML plus two text renderings (plain and markdown-like
//! structured text).
//!
//! Extraction never reports "no content found": when no region qualifies it
//! degrades to the whole document body and returns whatever is there. The
//! caller's escalation policy decides what to do with a thin result.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::images::ImageRef;
use crate::sanitize;
use crate::{ClipError, Result};

/// Title used when the document offers nothing better.
pub const UNTITLED: &str = "untitled";

/// Ordered candidate selectors for the main content region.
///
/// Narrow, platform-specific containers come first, generic semantic
/// containers after, `body` as the terminal fallback. The first entry whose
/// visible text beats the minimum-content threshold wins; extending site
/// coverage means adding a row here, not touching control flow.
const REGION_SELECTORS: &[&str] = &[
    // Platform-specific containers
    ".postArticle-content",
    ".meteredContent",
    ".notion-page-content",
    ".crayons-article__main",
    ".js-post-body",
    ".markdown-body",
    // Generic semantic containers
    "article",
    "main",
    "[role=main]",
    // Common class-name conventions
    ".post-content",
    ".article-content",
    ".entry-content",
    ".article-body",
    ".post-body",
    ".story-body",
    "#content",
    ".content",
    // Terminal fallback
    "body",
];

/// Platform-specific title containers, tried after `<title>` and `<h1>`.
const TITLE_SELECTORS: &[&str] = &[".post-title", ".article-title", ".entry-title", ".graf--title"];

/// Block-level tags rendered into structured text, with their markers.
const STRUCTURED_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote"];

/// Configuration for content extraction.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Minimum visible text length, in characters, for a selector candidate
    /// to be accepted as the content region.
    pub min_region_len: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { min_region_len: 100 }
    }
}

/// The result of one extraction pass. Immutable after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    /// Document title, never empty (falls back to [`UNTITLED`]).
    pub title: String,
    /// Sanitized HTML of the content region.
    pub content: String,
    /// Unformatted text of the content region.
    pub plain_text: String,
    /// Markdown-like rendering of the region's block structure.
    pub structured_text: String,
    /// Localized images; empty until the image localizer runs.
    pub images: Vec<ImageRef>,
}

/// Extracts the main content from an HTML document.
///
/// `base_url` scopes relative URL resolution; without it, relative links
/// are left as-is.
pub fn extract(html: &str, base_url: Option<&Url>, config: &ExtractConfig) -> Result<ExtractedContent> {
    let doc = Html::parse_document(html);

    let title = extract_title(&doc)?;
    let region_html = select_region(&doc, config)?;
    let content = sanitize::clean_region(&region_html, base_url);

    let fragment = Html::parse_fragment(&content);
    let plain_text = sanitize::collapse_whitespace(&fragment.root_element().text().collect::<String>());
    let structured_text = structured_text(&fragment);

    Ok(ExtractedContent { title, content, plain_text, structured_text, images: Vec::new() })
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| ClipError::ParseFailure(format!("invalid selector '{}': {}", selector, e)))
}

/// Title fallback chain: `<title>` → first `<h1>` → platform-specific
/// containers → the `untitled` sentinel.
fn extract_title(doc: &Html) -> Result<String> {
    let title_sel = parse_selector("title")?;
    if let Some(el) = doc.select(&title_sel).next() {
        let text = sanitize::collapse_whitespace(&el.text().collect::<String>());
        if !text.is_empty() {
            return Ok(text);
        }
    }

    let h1_sel = parse_selector("h1")?;
    if let Some(el) = doc.select(&h1_sel).next() {
        let text = sanitize::collapse_whitespace(&el.text().collect::<String>());
        if !text.is_empty() {
            return Ok(text);
        }
    }

    for selector in TITLE_SELECTORS {
        let sel = parse_selector(selector)?;
        if let Some(el) = doc.select(&sel).next() {
            let text = sanitize::collapse_whitespace(&el.text().collect::<String>());
            if !text.is_empty() {
                return Ok(text);
            }
        }
    }

    Ok(UNTITLED.to_string())
}

/// Walks the selector table in priority order and returns the serialized
/// HTML of the first region with enough visible text, falling back to the
/// document body (or the whole document when even that is missing).
fn select_region(doc: &Html, config: &ExtractConfig) -> Result<String> {
    for selector in REGION_SELECTORS {
        let sel = parse_selector(selector)?;
        for candidate in doc.select(&sel) {
            if visible_text_len(&candidate) > config.min_region_len {
                tracing::debug!(selector = %selector, "content region selected");
                return Ok(candidate.html());
            }
        }
    }

    let body_sel = parse_selector("body")?;
    match doc.select(&body_sel).next() {
        Some(body) => Ok(body.html()),
        None => Ok(doc.root_element().html()),
    }
}

fn visible_text_len(el: &ElementRef) -> usize {
    el.text()
        .flat_map(|t| t.chars())
        .filter(|c| !c.is_whitespace())
        .count()
}

/// Renders the region's block structure as markdown-like text: headings
/// prefixed with `#` repeated to their level, list items with `- `,
/// blockquotes with `> `, paragraphs bare, all blank-line separated.
///
/// Best effort by design; this is not a Markdown compiler.
fn structured_text(fragment: &Html) -> String {
    let mut blocks = Vec::new();
    walk_blocks(*fragment.root_element(), &mut blocks);
    blocks.join("\n\n")
}

fn walk_blocks(node: ego_tree::NodeRef<'_, scraper::Node>, blocks: &mut Vec<String>) {
    for child in node.children() {
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };

        let tag = el.value().name().to_lowercase();
        if STRUCTURED_TAGS.contains(&tag.as_str()) {
            // Outermost block wins; its text already includes any nested markup.
            let text = sanitize::collapse_whitespace(&el.text().collect::<String>());
            if !text.is_empty() {
                blocks.push(render_block(&tag, &text));
            }
            continue;
        }

        walk_blocks(child, blocks);
    }
}

fn render_block(tag: &str, text: &str) -> String {
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse::<usize>().unwrap_or(1);
            format!("{} {}", "#".repeat(level), text)
        }
        "li" => format!("- {}", text),
        "blockquote" => format!("> {}", text),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_PARAGRAPH: &str = "This paragraph carries enough text to clear the minimum content threshold. \
        It keeps going with several sentences of real prose, the way an actual article body would, \
        so the region selector accepts its container.";

    fn article_html() -> String {
        format!(
            r#"<html><head><title>Sample Article</title></head><body>
                <nav><a href="/">Home</a><a href="/about">About</a></nav>
                <article><h1>Heading</h1><p>{}</p></article>
                <footer>footer text</footer>
            </body></html>"#,
            LONG_PARAGRAPH
        )
    }

    #[test]
    fn test_prefers_article_over_body() {
        let result = extract(&article_html(), None, &ExtractConfig::default()).unwrap();
        assert!(result.content.contains("Heading"));
        assert!(!result.content.contains("Home"));
        assert!(!result.content.contains("footer text"));
    }

    #[test]
    fn test_body_fallback_never_null() {
        let html = "<html><head><title>Thin</title></head><body><p>tiny</p></body></html>";
        let result = extract(html, None, &ExtractConfig::default()).unwrap();

        assert_eq!(result.title, "Thin");
        assert!(result.content.contains("tiny"));
        assert_eq!(result.plain_text, "tiny");
        assert!(result.images.is_empty());
    }

    #[test]
    fn test_empty_document_returns_empty_strings() {
        let result = extract("", None, &ExtractConfig::default()).unwrap();
        assert_eq!(result.title, UNTITLED);
        assert_eq!(result.plain_text, "");
        assert_eq!(result.structured_text, "");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let html = article_html();
        let config = ExtractConfig::default();
        let first = extract(&html, None, &config).unwrap();
        let second = extract(&html, None, &config).unwrap();

        assert_eq!(first.content, second.content);
        assert_eq!(first.plain_text, second.plain_text);
        assert_eq!(first.structured_text, second.structured_text);
    }

    #[test]
    fn test_title_from_h1_when_no_title_tag() {
        let html = format!(
            "<html><body><article><h1>From Heading</h1><p>{}</p></article></body></html>",
            LONG_PARAGRAPH
        );
        let result = extract(&html, None, &ExtractConfig::default()).unwrap();
        assert_eq!(result.title, "From Heading");
    }

    #[test]
    fn test_title_sentinel() {
        let html = "<html><body><p>no title anywhere</p></body></html>";
        let result = extract(html, None, &ExtractConfig::default()).unwrap();
        assert_eq!(result.title, UNTITLED);
    }

    #[test]
    fn test_structured_text_markers() {
        let html = format!(
            r#"<html><body><article>
                <h2>Section</h2>
                <p>{}</p>
                <ul><li>first item</li><li>second item</li></ul>
                <blockquote>a quoted line</blockquote>
            </article></body></html>"#,
            LONG_PARAGRAPH
        );

        let result = extract(&html, None, &ExtractConfig::default()).unwrap();
        assert!(result.structured_text.contains("## Section"));
        assert!(result.structured_text.contains("- first item"));
        assert!(result.structured_text.contains("- second item"));
        assert!(result.structured_text.contains("> a quoted line"));
        assert!(result.structured_text.contains("\n\n"));
    }

    #[test]
    fn test_structured_text_emits_outermost_block_once() {
        let html = format!(
            r#"<html><body><article>
                <p>{}</p>
                <blockquote><p>nested quote paragraph</p></blockquote>
            </article></body></html>"#,
            LONG_PARAGRAPH
        );

        let result = extract(&html, None, &ExtractConfig::default()).unwrap();
        assert!(result.structured_text.contains("> nested quote paragraph"));
        assert_eq!(result.structured_text.matches("nested quote paragraph").count(), 1);
    }

    #[test]
    fn test_relative_links_resolved() {
        let base = Url::parse("https://example.org/posts/1").unwrap();
        let html = format!(
            r#"<html><body><article><p>{}</p><a href="/tags/rust">rust</a></article></body></html>"#,
            LONG_PARAGRAPH
        );

        let result = extract(&html, Some(&base), &ExtractConfig::default()).unwrap();
        assert!(result.content.contains(r#"href="https://example.org/tags/rust""#));
    }

    #[test]
    fn test_serialization_field_names() {
        let result = extract(&article_html(), None, &ExtractConfig::default()).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("plainText").is_some());
        assert!(json.get("structuredText").is_some());
        assert!(json.get("images").is_some());
    }

    #[test]
    fn test_platform_selector_beats_generic() {
        let html = format!(
            r#"<html><body>
                <div class="postArticle-content"><p>{}</p></div>
                <article><p>{}</p></article>
            </body></html>"#,
            LONG_PARAGRAPH, "short decoy text that is long enough to qualify as a region on its own, \
             with padding padding padding padding padding padding to pass the threshold check"
        );

        let result = extract(&html, None, &ExtractConfig::default()).unwrap();
        assert!(result.content.contains("carries enough text"));
        assert!(!result.content.contains("decoy"));
    }
}

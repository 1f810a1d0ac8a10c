//! Format detection and ingestion for pasted or uploaded content.
//!
//! Independent entry point next to the fetch/extract pipeline: content that
//! arrives directly from the user (paste or upload) is sniffed for its
//! format and normalized into sanitized HTML suitable for storage.
//!
//! Detection order: binary signatures (ZIP-based Office formats via their
//! internal manifest markers, the RTF header) → HTML tag patterns →
//! Markdown structural patterns → plaintext fallback.
//!
//! The Markdown transformer is intentionally a minimal rule-based pass, not
//! a CommonMark implementation. Known limitations: nested lists flatten to
//! one level, inline HTML inside Markdown is escaped rather than passed
//! through, and reference-style links are not resolved.

use std::borrow::Cow;
use std::sync::LazyLock;

use lol_html::{ElementContentHandlers, Selector};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ClipError, Result};

/// Recognized input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    Html,
    Markdown,
    Plaintext,
    Rtf,
    OfficeDoc,
    OfficeSheet,
}

impl Format {
    /// Stable lowercase name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Html => "html",
            Format::Markdown => "markdown",
            Format::Plaintext => "plaintext",
            Format::Rtf => "rtf",
            Format::OfficeDoc => "office-doc",
            Format::OfficeSheet => "office-sheet",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Format::Html => "HTML",
            Format::Markdown => "Markdown",
            Format::Plaintext => "plain text",
            Format::Rtf => "RTF",
            Format::OfficeDoc => "word-processing",
            Format::OfficeSheet => "spreadsheet",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "html" => Ok(Format::Html),
            "markdown" | "md" => Ok(Format::Markdown),
            "plaintext" | "text" => Ok(Format::Plaintext),
            "rtf" => Ok(Format::Rtf),
            "office-doc" | "docx" => Ok(Format::OfficeDoc),
            "office-sheet" | "xlsx" => Ok(Format::OfficeSheet),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

/// The outcome of one ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub sanitized_html: String,
    pub detected_format: Format,
}

/// Converter for a binary office format, loadable at runtime.
///
/// Converters are optional by design: an installation without one still
/// accepts uploads of that format and stores a labeled placeholder.
pub trait BinaryConverter: Send + Sync {
    /// Converts the raw document into HTML (sanitized afterwards by the
    /// ingestor, so converters may emit arbitrary markup).
    fn convert(&self, content: &[u8]) -> Result<String>;
}

/// The set of binary converters loaded into this process.
#[derive(Default)]
pub struct ConverterRegistry {
    rtf: Option<Box<dyn BinaryConverter>>,
    office_doc: Option<Box<dyn BinaryConverter>>,
    office_sheet: Option<Box<dyn BinaryConverter>>,
}

impl ConverterRegistry {
    pub fn with_rtf(mut self, converter: Box<dyn BinaryConverter>) -> Self {
        self.rtf = Some(converter);
        self
    }

    pub fn with_office_doc(mut self, converter: Box<dyn BinaryConverter>) -> Self {
        self.office_doc = Some(converter);
        self
    }

    pub fn with_office_sheet(mut self, converter: Box<dyn BinaryConverter>) -> Self {
        self.office_sheet = Some(converter);
        self
    }

    fn converter_for(&self, format: Format) -> Option<&dyn BinaryConverter> {
        match format {
            Format::Rtf => self.rtf.as_deref(),
            Format::OfficeDoc => self.office_doc.as_deref(),
            Format::OfficeSheet => self.office_sheet.as_deref(),
            _ => None,
        }
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const RTF_MAGIC: &[u8] = b"{\\rtf1";

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(!doctype|html|head|body|div|p|h[1-6]|br|span|a|img|table|ul|ol|li|blockquote|article|section|strong|em|pre|code)\b",
    )
    .unwrap()
});

static MARKDOWN_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^#{1,6}\s+\S",          // headings
        r"(?m)^[-*+]\s+\S",           // unordered lists
        r"(?m)^\d+[.)]\s+\S",         // ordered lists
        r"(?m)^>\s",                  // blockquotes
        r"\[[^\]]+\]\([^)]+\)",       // links
        r"(?m)^```",                  // code fences
        r"\*\*[^*\n]+\*\*",           // bold emphasis
        r"(?m)^\|.+\|\s*$",           // tables
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Sniffs the format of pasted or uploaded content.
pub fn detect(content: &[u8]) -> Format {
    if content.starts_with(ZIP_MAGIC) {
        if find_subsequence(content, b"word/") {
            return Format::OfficeDoc;
        }
        if find_subsequence(content, b"xl/") {
            return Format::OfficeSheet;
        }
    }

    let trimmed = trim_leading_whitespace(content);
    if trimmed.starts_with(RTF_MAGIC) {
        return Format::Rtf;
    }

    let text = String::from_utf8_lossy(content);
    if HTML_TAG.is_match(&text) {
        return Format::Html;
    }
    if MARKDOWN_MARKERS.iter().any(|m| m.is_match(&text)) {
        return Format::Markdown;
    }

    Format::Plaintext
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn trim_leading_whitespace(content: &[u8]) -> &[u8] {
    let start = content
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(content.len());
    &content[start..]
}

/// Normalizes content of a known format into sanitized HTML.
///
/// Binary formats route through the registry's converters and fail with
/// [`ClipError::ConverterUnavailable`] when none is loaded; use [`ingest`]
/// for the degrading entry point.
pub fn process(content: &[u8], format: Format) -> Result<String> {
    process_with_converters(content, format, &ConverterRegistry::default())
}

/// Like [`process`], with explicit converters.
pub fn process_with_converters(content: &[u8], format: Format, converters: &ConverterRegistry) -> Result<String> {
    match format {
        Format::Html => {
            let text = text_input(content)?;
            Ok(sanitize_html(&text))
        }
        Format::Markdown => {
            let text = text_input(content)?;
            Ok(markdown_to_html(&text))
        }
        Format::Plaintext => {
            let text = text_input(content)?;
            Ok(plaintext_to_html(&text))
        }
        Format::Rtf | Format::OfficeDoc | Format::OfficeSheet => match converters.converter_for(format) {
            Some(converter) => {
                let html = converter.convert(content)?;
                Ok(sanitize_html(&html))
            }
            None => Err(ClipError::ConverterUnavailable { format: format.name() }),
        },
    }
}

/// Ingests pasted or uploaded content: detect (unless hinted), convert,
/// sanitize. Missing binary converters degrade to a labeled placeholder
/// document instead of failing the ingestion.
pub fn ingest(content: &[u8], hinted_format: Option<Format>) -> Result<IngestResult> {
    ingest_with_converters(content, hinted_format, &ConverterRegistry::default())
}

/// Like [`ingest`], with explicit converters.
pub fn ingest_with_converters(
    content: &[u8], hinted_format: Option<Format>, converters: &ConverterRegistry,
) -> Result<IngestResult> {
    let detected_format = hinted_format.unwrap_or_else(|| detect(content));

    match process_with_converters(content, detected_format, converters) {
        Ok(sanitized_html) => Ok(IngestResult { sanitized_html, detected_format }),
        Err(ClipError::ConverterUnavailable { .. }) => {
            Ok(IngestResult { sanitized_html: placeholder(detected_format), detected_format })
        }
        Err(e) => Err(e),
    }
}

fn text_input(content: &[u8]) -> Result<&str> {
    std::str::from_utf8(content).map_err(|e| ClipError::MalformedInput(format!("invalid UTF-8: {}", e)))
}

fn placeholder(format: Format) -> String {
    format!(
        "<p><em>This {} document could not be converted for reading: no {} converter is installed. \
         The original upload is kept unchanged.</em></p>",
        format.label(),
        format.label()
    )
}

// ── HTML sanitizer ───────────────────────────────────────────────────────

/// Tags kept by the sanitizer. Anything else is dropped: content-bearing
/// unknowns are unwrapped, script-like tags disappear with their content.
const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "br", "hr", "strong", "b", "em", "i", "u", "s", "del", "blockquote",
    "ul", "ol", "li", "table", "thead", "tbody", "tr", "th", "td", "a", "img", "pre", "code", "figure", "figcaption",
];

/// Tags removed together with their content.
const DROPPED_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "object", "embed", "form", "template"];

fn allowed_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "title"],
        "img" => &["src", "alt", "title"],
        "td" | "th" => &["colspan", "rowspan"],
        _ => &[],
    }
}

/// Sanitizes arbitrary HTML down to the storage allow-list.
pub fn sanitize_html(html: &str) -> String {
    let handlers: Vec<(Cow<'_, Selector>, ElementContentHandlers<'_>)> = vec![lol_html::element!("*", |el| {
        let tag = el.tag_name().to_lowercase();

        if DROPPED_TAGS.contains(&tag.as_str()) {
            el.remove();
            return Ok(());
        }
        if !ALLOWED_TAGS.contains(&tag.as_str()) {
            el.remove_and_keep_content();
            return Ok(());
        }

        let allowed = allowed_attrs(&tag);
        let dropped: Vec<String> = el
            .attributes()
            .iter()
            .map(|a| a.name())
            .filter(|name| !allowed.contains(&name.as_str()))
            .collect();
        for name in dropped {
            el.remove_attribute(&name);
        }

        // javascript: and friends have no business in stored content
        if tag == "a"
            && let Some(href) = el.get_attribute("href")
            && !is_safe_link(&href)
        {
            el.remove_attribute("href");
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

    if rewriter.write(html.as_bytes()).is_err() {
        return escape_html(html);
    }
    if rewriter.end().is_err() {
        return escape_html(html);
    }

    output
}

fn is_safe_link(href: &str) -> bool {
    let trimmed = href.trim().to_lowercase();
    trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with("mailto:")
        || trimmed.starts_with('#')
        || trimmed.starts_with('/')
}

// ── Markdown transformer ─────────────────────────────────────────────────

static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").unwrap());
static INLINE_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());
static INLINE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").unwrap());
static INLINE_ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap());
static ORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s+(.*)$").unwrap());
static UNORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*+]\s+(.*)$").unwrap());
static HORIZONTAL_RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(-{3,}|\*{3,}|_{3,})\s*$").unwrap());

/// Converts Markdown to HTML with a small rule set: headings, emphasis,
/// links, images, blockquotes, flat lists, tables, and fenced code.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut out = String::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut list: Option<(&'static str, Vec<String>)> = None;
    let mut quote: Vec<String> = Vec::new();
    let mut fence: Option<String> = None;
    let mut table: Vec<String> = Vec::new();

    let flush_paragraph = |out: &mut String, paragraph: &mut Vec<String>| {
        if !paragraph.is_empty() {
            out.push_str(&format!("<p>{}</p>\n", inline(&paragraph.join(" "))));
            paragraph.clear();
        }
    };
    let flush_list = |out: &mut String, list: &mut Option<(&'static str, Vec<String>)>| {
        if let Some((tag, items)) = list.take() {
            out.push_str(&format!("<{}>", tag));
            for item in items {
                out.push_str(&format!("<li>{}</li>", inline(&item)));
            }
            out.push_str(&format!("</{}>\n", tag));
        }
    };
    let flush_quote = |out: &mut String, quote: &mut Vec<String>| {
        if !quote.is_empty() {
            out.push_str(&format!("<blockquote><p>{}</p></blockquote>\n", inline(&quote.join(" "))));
            quote.clear();
        }
    };
    let flush_table = |out: &mut String, table: &mut Vec<String>| {
        if !table.is_empty() {
            out.push_str(&render_table(table));
            table.clear();
        }
    };

    for line in markdown.lines() {
        // Fenced code swallows everything until the closing fence.
        if let Some(code) = fence.as_mut() {
            if line.trim_start().starts_with("```") {
                out.push_str(&format!("<pre><code>{}</code></pre>\n", escape_html(code.trim_end())));
                fence = None;
            } else {
                code.push_str(line);
                code.push('\n');
            }
            continue;
        }

        let trimmed = line.trim_end();

        if trimmed.trim_start().starts_with("```") {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
            flush_quote(&mut out, &mut quote);
            flush_table(&mut out, &mut table);
            fence = Some(String::new());
            continue;
        }

        if trimmed.is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
            flush_quote(&mut out, &mut quote);
            flush_table(&mut out, &mut table);
            continue;
        }

        if let Some(caps) = HEADING.captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
            flush_quote(&mut out, &mut quote);
            flush_table(&mut out, &mut table);
            let level = caps[1].len();
            out.push_str(&format!("<h{}>{}</h{}>\n", level, inline(&caps[2]), level));
            continue;
        }

        if HORIZONTAL_RULE.is_match(trimmed) && list.is_none() {
            flush_paragraph(&mut out, &mut paragraph);
            flush_quote(&mut out, &mut quote);
            flush_table(&mut out, &mut table);
            out.push_str("<hr>\n");
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('>') {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
            flush_table(&mut out, &mut table);
            quote.push(rest.trim_start().to_string());
            continue;
        }

        if let Some(caps) = UNORDERED_ITEM.captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            flush_quote(&mut out, &mut quote);
            flush_table(&mut out, &mut table);
            if let Some(("ul", items)) = &mut list {
                items.push(caps[1].to_string());
            } else {
                flush_list(&mut out, &mut list);
                list = Some(("ul", vec![caps[1].to_string()]));
            }
            continue;
        }

        if let Some(caps) = ORDERED_ITEM.captures(trimmed) {
            flush_paragraph(&mut out, &mut paragraph);
            flush_quote(&mut out, &mut quote);
            flush_table(&mut out, &mut table);
            if let Some(("ol", items)) = &mut list {
                items.push(caps[1].to_string());
            } else {
                flush_list(&mut out, &mut list);
                list = Some(("ol", vec![caps[1].to_string()]));
            }
            continue;
        }

        if trimmed.starts_with('|') && trimmed.ends_with('|') {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
            flush_quote(&mut out, &mut quote);
            table.push(trimmed.to_string());
            continue;
        }

        flush_list(&mut out, &mut list);
        flush_quote(&mut out, &mut quote);
        flush_table(&mut out, &mut table);
        paragraph.push(trimmed.to_string());
    }

    if let Some(code) = fence {
        out.push_str(&format!("<pre><code>{}</code></pre>\n", escape_html(code.trim_end())));
    }
    flush_paragraph(&mut out, &mut paragraph);
    flush_list(&mut out, &mut list);
    flush_quote(&mut out, &mut quote);
    flush_table(&mut out, &mut table);

    out.trim_end().to_string()
}

fn render_table(rows: &[String]) -> String {
    let cells = |row: &str| -> Vec<String> {
        row.trim_matches('|')
            .split('|')
            .map(|c| c.trim().to_string())
            .collect()
    };
    let is_divider = |row: &str| {
        cells(row)
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':'))
    };

    let mut out = String::from("<table>");
    let mut body_rows = rows;

    if rows.len() >= 2 && is_divider(&rows[1]) {
        out.push_str("<thead><tr>");
        for cell in cells(&rows[0]) {
            out.push_str(&format!("<th>{}</th>", inline(&cell)));
        }
        out.push_str("</tr></thead>");
        body_rows = &rows[2..];
    }

    out.push_str("<tbody>");
    for row in body_rows {
        out.push_str("<tr>");
        for cell in cells(row) {
            out.push_str(&format!("<td>{}</td>", inline(&cell)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>\n");
    out
}

/// Applies inline Markdown rules to already-trimmed text.
fn inline(text: &str) -> String {
    let escaped = escape_html(text);
    let with_code = INLINE_CODE.replace_all(&escaped, "<code>$1</code>");
    let with_images = INLINE_IMAGE.replace_all(&with_code, r#"<img src="$2" alt="$1">"#);
    let with_links = INLINE_LINK.replace_all(&with_images, r#"<a href="$2">$1</a>"#);
    let with_bold = INLINE_BOLD.replace_all(&with_links, "<strong>$1</strong>");
    INLINE_ITALIC.replace_all(&with_bold, "<em>$1</em>").into_owned()
}

fn plaintext_to_html(text: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("<br>"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("<br>"));
    }

    paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", p))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

//! Markup cleanup for extracted content regions.
//!
//! Everything in this module operates on a serialized copy of the selected
//! region, never on the live parse tree, so extraction stays referentially
//! transparent and repeated passes over the same input produce identical
//! output.
//!
//! The passes: structural boilerplate removal (by tag and by class/id
//! pattern), attribute normalization (inline style allow-list, lazy-loading
//! attribute stripping, relative URL resolution), and whitespace collapsing.

use std::borrow::Cow;

use lol_html::html_content::Element;
use lol_html::{ElementContentHandlers, Selector};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Tags removed outright from a content region.
///
/// `header`/`footer` elements are page chrome; heading tags (`h1`..`h6`)
/// are untouched.
const REMOVED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "nav", "aside", "header", "footer", "form", "button",
    "input", "select", "textarea", "svg", "canvas",
];

/// Inline style properties preserved during normalization. Everything else
/// carries layout or tracking concerns and is dropped.
const STYLE_ALLOW: &[&str] = &[
    "font-weight",
    "font-style",
    "text-align",
    "text-decoration",
    "color",
    "background-color",
    "margin",
    "padding",
    "border",
];

/// Attributes that trigger deferred external fetches when the stored HTML
/// is rendered later.
const LAZY_ATTRS: &[&str] = &["srcset", "data-src", "data-srcset", "loading"];

static BOILERPLATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(comment|comments|disqus|sidebar|side-bar|share|sharing|social|related|recommend|recommended|newsletter|subscribe|promo|advert|advertisement|ad|ads|ad-container|sponsor|sponsored|banner|breadcrumb|breadcrumbs|nav|navigation|menu|navbar|topbar|masthead|search|searchbox|pager|pagination|popup|modal|cookie|widget|outbrain|taboola)([-_].*)?$",
    )
    .unwrap()
});

static POSITIVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(article|content|entry|main|post|story|text|body)").unwrap());

static BR_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:<br\s*/?>\s*){2,}").unwrap());

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Runs the full cleanup pipeline over a serialized content region.
pub fn clean_region(html: &str, base_url: Option<&Url>) -> String {
    let cleaned = remove_boilerplate(html);
    let cleaned = normalize_attributes(&cleaned, base_url);
    let cleaned = BR_RUN.replace_all(&cleaned, "<br>").to_string();
    collapse_whitespace(&cleaned)
}

/// Collapses runs of whitespace into single spaces.
pub fn collapse_whitespace(html: &str) -> String {
    WHITESPACE_RUN.replace_all(html, " ").trim().to_string()
}

fn rewrite(html: &str, handlers: Vec<(Cow<'_, Selector>, ElementContentHandlers<'_>)>) -> String {
    let mut output = String::new();
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings { element_content_handlers: handlers, ..Default::default() },
        |c: &[u8]| {
            output.push_str(&String::from_utf8_lossy(c));
        },
    );

    if rewriter.write(html.as_bytes()).is_err() {
        return html.to_string();
    }
    if rewriter.end().is_err() {
        return html.to_string();
    }

    output
}

/// Removes navigation, ads, comments, share widgets, and similar chrome.
fn remove_boilerplate(html: &str) -> String {
    let mut handlers: Vec<(Cow<'_, Selector>, ElementContentHandlers<'_>)> = REMOVED_TAGS
        .iter()
        .map(|tag| {
            lol_html::element!(*tag, |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();

    handlers.push(lol_html::element!("*", |el| {
        if should_remove_by_name(el) {
            el.remove();
        }
        Ok(())
    }));

    rewrite(html, handlers)
}

fn should_remove_by_name(el: &Element) -> bool {
    if let Some(id) = el.get_attribute("id")
        && BOILERPLATE_PATTERN.is_match(&id)
        && !POSITIVE_PATTERN.is_match(&id)
    {
        return true;
    }

    if let Some(class) = el.get_attribute("class") {
        for class_name in class.split_whitespace() {
            if BOILERPLATE_PATTERN.is_match(class_name) && !POSITIVE_PATTERN.is_match(class_name) {
                return true;
            }
        }
    }

    false
}

/// Filters inline styles, strips lazy-loading attributes, and resolves
/// relative link/image URLs against `base_url`.
fn normalize_attributes(html: &str, base_url: Option<&Url>) -> String {
    let handlers: Vec<(Cow<'_, Selector>, ElementContentHandlers<'_>)> = vec![
        lol_html::element!("*", |el| {
            if let Some(style) = el.get_attribute("style") {
                match filter_style(&style) {
                    Some(kept) => {
                        el.set_attribute("style", &kept).ok();
                    }
                    None => el.remove_attribute("style"),
                }
            }
            for attr in LAZY_ATTRS {
                el.remove_attribute(attr);
            }
            Ok(())
        }),
        lol_html::element!("a[href]", |el| {
            if let Some(href) = el.get_attribute("href")
                && !href.starts_with('#')
                && let Some(base) = base_url
                && let Ok(absolute) = base.join(&href)
            {
                el.set_attribute("href", absolute.as_str()).ok();
            }
            Ok(())
        }),
        lol_html::element!("img[src]", |el| {
            if let Some(src) = el.get_attribute("src")
                && !src.starts_with("data:")
                && let Some(base) = base_url
                && let Ok(absolute) = base.join(&src)
            {
                el.set_attribute("src", absolute.as_str()).ok();
            }
            Ok(())
        }),
    ];

    rewrite(html, handlers)
}

/// Keeps only allow-listed declarations from an inline style attribute.
/// Returns `None` when nothing survives.
fn filter_style(style: &str) -> Option<String> {
    let kept: Vec<String> = style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_lowercase();
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            STYLE_ALLOW
                .contains(&name.as_str())
                .then(|| format!("{}: {}", name, value))
        })
        .collect();

    if kept.is_empty() { None } else { Some(kept.join("; ")) }
}

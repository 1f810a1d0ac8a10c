//! Render strategy selection.
//!
//! Decides, per target URL, whether a lightweight HTTP fetch suffices or a
//! full headless-browser render is required. The decision is a pure function
//! of the URL, the caller's preference, and a data-driven allow-list of
//! hosts known to serve empty shells without JavaScript.
//!
//! The selector also owns the content-sufficiency check behind the one-shot
//! escalation policy: a lightweight attempt that fails or yields too little
//! text is retried exactly once in rendered mode.

use std::str::FromStr;

use serde::Deserialize;
use url::Url;

use crate::fetch::FetchMode;

/// Hosts that are known to require JavaScript execution (or to stonewall
/// plain HTTP clients). Matched against the host itself and any subdomain.
///
/// Ordered roughly by how often they show up in clipped links; order has no
/// behavioral effect, this is a membership table.
const RENDERED_HOSTS: &[&str] = &[
    "twitter.com",
    "x.com",
    "medium.com",
    "reddit.com",
    "quora.com",
    "linkedin.com",
    "facebook.com",
    "instagram.com",
    "threads.net",
    "substack.com",
    "notion.site",
    "zhihu.com",
    "juejin.cn",
];

/// Caller override for the fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPreference {
    /// Decide from the host allow-list (the default).
    #[default]
    Auto,
    /// Always use the headless browser.
    Force,
    /// Never use the headless browser.
    Disable,
}

impl FromStr for RenderPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "force" => Ok(Self::Force),
            "disable" => Ok(Self::Disable),
            _ => Err(format!("invalid render mode: {}. Valid options: auto, force, disable", s)),
        }
    }
}

/// Configuration for strategy selection and escalation.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Extra hosts (beyond the built-in table) that always get a render.
    pub rendered_hosts: Vec<String>,
    /// Minimum extracted text length, in characters, below which a
    /// lightweight result is considered insufficient and escalates.
    pub min_content_len: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self { rendered_hosts: Vec::new(), min_content_len: 300 }
    }
}

/// Picks the fetch mode for a target URL.
///
/// `Force` and `Disable` win unconditionally; `Auto` renders if and only if
/// the URL's host is on the JS-heavy allow-list.
pub fn decide(url: &Url, preference: RenderPreference, config: &StrategyConfig) -> FetchMode {
    match preference {
        RenderPreference::Force => FetchMode::Rendered,
        RenderPreference::Disable => FetchMode::Lightweight,
        RenderPreference::Auto => {
            if host_requires_render(url, config) { FetchMode::Rendered } else { FetchMode::Lightweight }
        }
    }
}

/// Whether a lightweight result with `text_len` characters of extracted
/// text should escalate to a rendered fetch.
pub fn needs_escalation(text_len: usize, config: &StrategyConfig) -> bool {
    text_len < config.min_content_len
}

fn host_requires_render(url: &Url, config: &StrategyConfig) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    RENDERED_HOSTS
        .iter()
        .copied()
        .chain(config.rendered_hosts.iter().map(|h| h.as_str()))
        .any(|candidate| host == candidate || host.ends_with(&format!(".{}", candidate)))
}

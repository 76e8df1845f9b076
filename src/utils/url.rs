//! URL normalization and event-likeness filtering.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::models::DiscoveryConfig;

static MARKDOWN_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid markdown label pattern"));

static PLAIN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s\)\]<>"'`]+"#).expect("valid url pattern")
});

/// Normalize a raw URL candidate into its canonical form.
///
/// Strips markdown artifacts, rejects `data:` and non-http(s) schemes,
/// coerces scheme-less hosts to `https://` and keeps relative paths
/// verbatim. Absolute URLs are canonicalized (lowercase host, no fragment).
///
/// # Examples
/// ```
/// use event_crawler::utils::url::normalize;
///
/// assert_eq!(
///     normalize("[AI Summit](https://AI-Summit.example.com/2025#top)"),
///     Some("https://ai-summit.example.com/2025".to_string())
/// );
/// assert_eq!(normalize("javascript:alert(1)"), None);
/// ```
pub fn normalize(raw: &str) -> Option<String> {
    let stripped = MARKDOWN_LABEL.replace_all(raw, "");
    let cleaned: String = stripped.chars().filter(|c| !matches!(c, '(' | ')')).collect();
    let cleaned = cleaned
        .trim()
        .trim_matches(|c| matches!(c, '<' | '>' | '"' | '\'' | '`'))
        .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | '!' | '?'))
        .trim();

    if cleaned.is_empty() || cleaned.chars().any(char::is_whitespace) {
        return None;
    }
    if cleaned.to_ascii_lowercase().starts_with("data:") {
        return None;
    }

    if let Some(rest) = cleaned.strip_prefix("//") {
        return canonical(&format!("https://{rest}"));
    }
    if cleaned.starts_with('/') {
        return Some(cleaned.to_string());
    }

    match Url::parse(cleaned) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => canonical(cleaned),
        // `example.com:8080/x` parses with "example.com" as the scheme
        Ok(url) if url.scheme().contains('.') => canonical(&format!("https://{cleaned}")),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) if looks_like_host(cleaned) => {
            canonical(&format!("https://{cleaned}"))
        }
        Err(_) => None,
    }
}

fn looks_like_host(s: &str) -> bool {
    let host = s.split(['/', '?', '#']).next().unwrap_or_default();
    host.contains('.') && !host.starts_with('.') && !host.ends_with('.')
}

fn canonical(absolute: &str) -> Option<String> {
    let mut url = Url::parse(absolute).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

/// Decides which normalized URLs look like event pages.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    terms: Vec<String>,
    year: Option<String>,
}

impl UrlFilter {
    pub fn new(terms: Vec<String>, target_year: Option<i32>) -> Self {
        Self {
            terms: terms.into_iter().map(|t| t.to_lowercase()).collect(),
            year: target_year.map(|y| y.to_string()),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.event_terms.clone(), config.target_year)
    }

    /// Whether host+path contains an event term or the target year.
    pub fn is_event_like(&self, normalized: &str) -> bool {
        let haystack = match Url::parse(normalized) {
            Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
            Err(_) => normalized.to_string(),
        }
        .to_lowercase();

        self.terms.iter().any(|term| haystack.contains(term.as_str()))
            || self
                .year
                .as_deref()
                .is_some_and(|year| haystack.contains(year))
    }

    /// Normalize and filter in one step.
    pub fn accept(&self, raw: &str) -> Option<String> {
        normalize(raw).filter(|url| self.is_event_like(url))
    }

    /// Pull unique event-like URLs out of free text, in order of appearance.
    ///
    /// Handles plain URLs as well as markdown links.
    pub fn scrape(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        PLAIN_URL
            .find_iter(text)
            .filter_map(|m| self.accept(m.as_str()))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

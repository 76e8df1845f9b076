//! Fetched page document.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};

use crate::utils::resolve_url;

/// Metadata recorded when a page is ingested.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    /// When the page was fetched
    pub crawled_at: DateTime<Utc>,

    /// Link-following depth of the work item that produced the page
    pub depth: usize,

    /// Free-form annotations
    pub extra: BTreeMap<String, String>,
}

impl DocumentMeta {
    pub fn at_depth(depth: usize) -> Self {
        Self {
            crawled_at: Utc::now(),
            depth,
            extra: BTreeMap::new(),
        }
    }
}

/// One fetched page pending or undergoing extraction.
///
/// Markup and derived text are reference-counted so that handing a pending
/// document to the pipeline does not copy the page.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub raw_markup: Arc<str>,
    pub title: String,
    /// Visible text, one block per line
    pub text: Arc<str>,
    /// Outbound link targets, resolved against `url`, in page order
    pub links: Arc<[String]>,
    pub meta: DocumentMeta,
    /// Promoted links this document waits on before extraction
    pub awaiting: Option<Vec<String>>,
}

impl Document {
    /// Parse markup once and derive text and outbound links.
    pub fn new(url: &str, raw_markup: &str, title: &str, meta: DocumentMeta) -> Self {
        let html = Html::parse_document(raw_markup);
        let title = if title.trim().is_empty() {
            page_title(&html).unwrap_or_default()
        } else {
            title.trim().to_string()
        };

        Self {
            url: url.to_string(),
            raw_markup: Arc::from(raw_markup),
            title,
            text: Arc::from(visible_text(&html)),
            links: outbound_links(&html, url).into(),
            meta,
            awaiting: None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.awaiting.is_some()
    }
}

/// Text of the `<title>` element, if any.
pub fn page_title(html: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    html.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Visible body text with scripts and styles removed, one non-empty line per
/// text node.
fn visible_text(html: &Html) -> String {
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    let root = html.select(&body).next().unwrap_or_else(|| html.root_element());

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(|a| a.value().as_element())
            .any(|el| matches!(el.name(), "script" | "style" | "noscript" | "template"));
        if hidden {
            continue;
        }
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Absolute `a[href]` targets in page order, without duplicates.
fn outbound_links(html: &Html, base: &str) -> Vec<String> {
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = url::Url::parse(base).ok();

    let mut seen = std::collections::HashSet::new();
    html.select(&anchor)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .map(|href| match &base {
            Some(base) => resolve_url(base, href),
            None => href.to_string(),
        })
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

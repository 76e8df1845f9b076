// src/services/navigation.rs

//! Navigation step: ask the oracle whether to extract a page now or visit
//! some of its links first.

use log::{debug, warn};
use serde_json::Value;

use super::collaborators::{NavigationOracle, NavigationRequest};
use super::documents::DocumentStore;
use super::frontier::Frontier;
use crate::models::{CrawlerConfig, Document, NavigationDecision};
use crate::utils::resolve;
use crate::utils::text::truncate_graphemes;

/// Result of applying a decision to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Links were promoted; the document waits on them
    Deferred(Vec<String>),
    /// Hand the document to extraction now
    Extract,
}

#[derive(Debug, Clone)]
pub struct NavigationStep {
    text_chars: usize,
    max_links: usize,
    max_depth: usize,
}

impl NavigationStep {
    pub fn new(text_chars: usize, max_links: usize, max_depth: usize) -> Self {
        Self {
            text_chars,
            max_links,
            max_depth,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.navigation_text_chars,
            config.navigation_max_links,
            config.max_depth,
        )
    }

    /// Bounded view of the page for the oracle prompt.
    pub fn request_for(&self, doc: &Document) -> NavigationRequest {
        NavigationRequest {
            url: doc.url.clone(),
            title: doc.title.clone(),
            text: truncate_graphemes(&doc.text, self.text_chars).to_string(),
            links: doc.links.iter().take(self.max_links).cloned().collect(),
        }
    }

    /// Ask the oracle. Any failure falls back to extraction.
    pub async fn decide(&self, oracle: &dyn NavigationOracle, doc: &Document) -> NavigationDecision {
        match oracle.decide(&self.request_for(doc)).await {
            Ok(raw) => parse_decision(&raw),
            Err(e) => {
                warn!("Navigation oracle failed for {}: {}", doc.url, e);
                NavigationDecision::extract()
            }
        }
    }

    /// Promote clicked links and defer the document, or pass it to extraction.
    ///
    /// Falls through to extraction when no link can be visited: past the
    /// depth budget, or every link was rejected or already processed.
    pub fn apply(
        &self,
        decision: &NavigationDecision,
        doc: &Document,
        frontier: &Frontier,
        documents: &DocumentStore,
    ) -> NavigationOutcome {
        if !decision.wants_click() {
            return NavigationOutcome::Extract;
        }

        let child_depth = doc.meta.depth + 1;
        if child_depth > self.max_depth {
            debug!("Not following links from {}: depth budget reached", doc.url);
            return NavigationOutcome::Extract;
        }

        let resolved: Vec<String> = decision
            .links
            .iter()
            .map(|link| resolve(&doc.url, link).unwrap_or_else(|| link.clone()))
            .collect();
        let accepted = frontier.add_priority(&resolved, child_depth);
        if accepted.is_empty() {
            debug!("No clicked link from {} was accepted, extracting", doc.url);
            return NavigationOutcome::Extract;
        }

        documents.defer(&doc.url, accepted.clone());
        NavigationOutcome::Deferred(accepted)
    }
}

/// Permissive parse of the oracle's answer.
///
/// Reads the span between the first `{` and the last `}`; `action` is
/// case-insensitive and a single `link` string is accepted for `links`.
/// Anything unrecognized means extract.
pub fn parse_decision(raw: &str) -> NavigationDecision {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        debug!("Navigation answer has no JSON object");
        return NavigationDecision::extract();
    };
    if end < start {
        return NavigationDecision::extract();
    }

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&raw[start..=end]) else {
        debug!("Navigation answer is not valid JSON");
        return NavigationDecision::extract();
    };

    let action = object
        .get("action")
        .and_then(Value::as_str)
        .map(|a| a.trim().to_ascii_lowercase());
    match action.as_deref() {
        Some("click") => {}
        Some("extract") => return NavigationDecision::extract(),
        other => {
            debug!("Unrecognized navigation action {:?}", other);
            return NavigationDecision::extract();
        }
    }

    let mut links = Vec::new();
    for key in ["links", "link"] {
        match object.get(key) {
            Some(Value::Array(items)) => {
                links.extend(items.iter().filter_map(Value::as_str).map(str::to_owned));
            }
            Some(Value::String(link)) => links.push(link.clone()),
            _ => {}
        }
    }
    links.retain(|link| !link.trim().is_empty());

    NavigationDecision::click(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, Result};
    use crate::models::DocumentMeta;
    use crate::utils::UrlFilter;
    use async_trait::async_trait;

    const PAGE_URL: &str = "https://ai-summit.example.com/2025/";
    const PAGE: &str = r#"<html><head><title>AI Summit</title></head><body>
        <p>Landing page</p>
        <a href="/2025/agenda">Agenda</a>
        <a href="/2025/speakers">Speakers</a>
    </body></html>"#;

    struct Scripted(Result<String>);

    #[async_trait]
    impl NavigationOracle for Scripted {
        async fn decide(&self, _request: &NavigationRequest) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(AppError::collaborator("oracle", "offline")),
            }
        }
    }

    fn setup() -> (NavigationStep, Frontier, DocumentStore, Document) {
        let frontier = Frontier::new(UrlFilter::new(vec!["summit".into()], Some(2025)));
        let documents = DocumentStore::new();
        documents.ingest(PAGE_URL, PAGE, "", DocumentMeta::at_depth(0));
        let doc = documents.get(PAGE_URL).unwrap();
        (NavigationStep::new(2000, 20, 2), frontier, documents, doc)
    }

    #[test]
    fn test_parse_decision_variants() {
        let click = parse_decision(
            "Sure! ```json\n{\"action\": \"CLICK\", \"links\": [\"/agenda\", \"\"]}\n```",
        );
        assert_eq!(click, NavigationDecision::click(vec!["/agenda".into()]));

        let alias = parse_decision(r#"{"action":"click","link":"/speakers"}"#);
        assert_eq!(alias.links, vec!["/speakers".to_string()]);

        assert_eq!(parse_decision("no json here"), NavigationDecision::extract());
        assert_eq!(
            parse_decision(r#"{"action":"scroll"}"#),
            NavigationDecision::extract()
        );
        assert_eq!(
            parse_decision(r#"{"action":"click","links":[]}"#),
            NavigationDecision::extract()
        );
        assert_eq!(parse_decision("} {"), NavigationDecision::extract());
    }

    #[test]
    fn test_request_is_bounded() {
        let (_, _, _, doc) = setup();
        let step = NavigationStep::new(4, 1, 2);
        let request = step.request_for(&doc);
        assert_eq!(request.text.chars().count(), 4);
        assert_eq!(request.links, vec!["https://ai-summit.example.com/2025/agenda".to_string()]);
        assert_eq!(request.title, "AI Summit");
    }

    #[tokio::test]
    async fn test_oracle_error_defaults_to_extract() {
        let (step, _, _, doc) = setup();
        let oracle = Scripted(Err(AppError::collaborator("oracle", "offline")));
        assert_eq!(step.decide(&oracle, &doc).await, NavigationDecision::extract());
    }

    #[tokio::test]
    async fn test_click_promotes_links_and_defers() {
        let (step, frontier, documents, doc) = setup();
        frontier.add(["https://other-summit.example.com/"]);
        let oracle = Scripted(Ok(r#"{"action":"click","links":["agenda","speakers"]}"#.into()));

        let decision = step.decide(&oracle, &doc).await;
        let outcome = step.apply(&decision, &doc, &frontier, &documents);

        let expected = vec![
            "https://ai-summit.example.com/2025/agenda".to_string(),
            "https://ai-summit.example.com/2025/speakers".to_string(),
        ];
        assert_eq!(outcome, NavigationOutcome::Deferred(expected.clone()));
        assert!(documents.get(PAGE_URL).unwrap().is_deferred());

        let next = frontier.next().unwrap();
        assert_eq!(next.url, expected[0]);
        assert_eq!(next.depth, 1);
    }

    #[test]
    fn test_click_past_depth_budget_extracts() {
        let (_, frontier, documents, doc) = setup();
        let step = NavigationStep::new(2000, 20, 0);
        let decision = NavigationDecision::click(vec!["agenda".into()]);
        assert_eq!(
            step.apply(&decision, &doc, &frontier, &documents),
            NavigationOutcome::Extract
        );
        assert!(!frontier.has_pending());
    }

    #[test]
    fn test_click_on_rejected_links_extracts() {
        let (step, frontier, documents, doc) = setup();
        let decision = NavigationDecision::click(vec!["https://example.com/about".into()]);
        assert_eq!(
            step.apply(&decision, &doc, &frontier, &documents),
            NavigationOutcome::Extract
        );
        assert!(!documents.get(PAGE_URL).unwrap().is_deferred());
    }
}

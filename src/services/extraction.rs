// src/services/extraction.rs

//! Extraction step: semantic extractor call, repair, and enrichment.

use log::{info, warn};
use serde_json::Value;

use super::collaborators::SemanticExtractor;
use crate::models::{Document, EventRecord, ExtractionConfig, Registration};
use crate::pipeline::repair::{ParseOutcome, parse_response};
use crate::utils::text::{extract_prices, extract_topics};

#[derive(Debug, Clone)]
pub struct ExtractionStep {
    enrich_missing: bool,
}

impl ExtractionStep {
    pub fn new(enrich_missing: bool) -> Self {
        Self { enrich_missing }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.enrich_missing)
    }

    /// Records found on `doc`, stamped with its URL. Never fails: collaborator
    /// errors and unparsable answers yield no records.
    pub async fn run(&self, extractor: &dyn SemanticExtractor, doc: &Document) -> Vec<EventRecord> {
        let raw = match extractor.extract(&doc.text, &doc.url, &doc.title).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Extraction failed for {}: {}", doc.url, e);
                return Vec::new();
            }
        };

        let mut records = match parse_response(&raw) {
            ParseOutcome::Valid(records) => records,
            ParseOutcome::Empty => {
                info!("No event extracted from {}", doc.url);
                return Vec::new();
            }
            ParseOutcome::Malformed(reason) => {
                warn!("Unusable extraction for {}: {}", doc.url, reason);
                return Vec::new();
            }
        };

        for record in &mut records {
            record.source_url = Some(doc.url.clone());
            if self.enrich_missing {
                enrich(record, &doc.text);
            }
        }
        records
    }
}

/// Fill missing topics and prices from patterns in the page text.
pub fn enrich(record: &mut EventRecord, text: &str) {
    if record.topics.is_empty() {
        record.topics = extract_topics(text);
    }
    if record.prices().is_empty() {
        let prices: Vec<Value> = extract_prices(text).into_iter().map(Value::String).collect();
        if !prices.is_empty() {
            record
                .registration
                .get_or_insert_with(Registration::default)
                .prices = prices;
        }
    }
}

//! Text helpers: grapheme-safe truncation and topic/price detection.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

static TOPIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:deep|machine|reinforcement|supervised|unsupervised)\s+learning|neural\s+networks?|computer\s+vision|natural\s+language\s+processing|nlp|generative\s+ai|edge\s+ai|artificial\s+intelligence|ai|robotics?|data\s+science|big\s+data|cloud\s+computing|large\s+language\s+models?|llms?|transformers?|automation|autonomous\s+systems?)\b",
    )
    .expect("valid topic pattern")
});

static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let amount = r"\d+(?:,\d{3})*(?:\.\d{2})?";
    Regex::new(&format!(
        r"[$€£]{amount}(?:\s*-\s*[$€£]{amount})?|\b{amount}\s*(?:USD|EUR|GBP)\b"
    ))
    .expect("valid price pattern")
});

/// Truncate to at most `max` grapheme clusters.
pub fn truncate_graphemes(text: &str, max: usize) -> &str {
    match text.grapheme_indices(true).nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// AI/ML topics mentioned in `text`, title-cased and sorted.
pub fn extract_topics(text: &str) -> Vec<String> {
    TOPIC_PATTERN
        .find_iter(text)
        .map(|m| title_case(m.as_str()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Price strings found in `text`, unique, in order of appearance.
pub fn extract_prices(text: &str) -> Vec<String> {
    let mut prices: Vec<String> = Vec::new();
    for m in PRICE_PATTERN.find_iter(text) {
        let price = m.as_str().trim().to_string();
        if !prices.contains(&price) {
            prices.push(price);
        }
    }
    prices
}

fn title_case(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

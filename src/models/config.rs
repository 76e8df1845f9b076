//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawl budget settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// URL filtering and seed search settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Record extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Record merge policy
    #[serde(default)]
    pub merge: MergeConfig,

    /// Model endpoint settings
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_links == 0 {
            return Err(AppError::validation("crawler.max_links must be > 0"));
        }
        if self.crawler.navigation_text_chars == 0 {
            return Err(AppError::validation(
                "crawler.navigation_text_chars must be > 0",
            ));
        }
        if self.discovery.event_terms.is_empty() && self.discovery.target_year.is_none() {
            return Err(AppError::validation(
                "discovery.event_terms is empty and no target_year is set",
            ));
        }
        if !(0.0..=1.0).contains(&self.merge.name_similarity_threshold) {
            return Err(AppError::validation(
                "merge.name_similarity_threshold must be within 0.0..=1.0",
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(AppError::validation("llm.model is empty"));
        }
        Ok(())
    }

    /// Every `"<keyword> in <region>"` search query, region-major.
    pub fn search_queries(&self) -> Vec<String> {
        let keywords = &self.discovery.keywords;
        self.discovery
            .regions
            .iter()
            .flat_map(|region| {
                keywords
                    .iter()
                    .map(move |keyword| format!("{keyword} in {region}"))
            })
            .collect()
    }
}

/// HTTP client and crawl budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Fetch attempts before a URL is given up for this run
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Minimum delay between collaborator calls in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum number of URLs processed in one run
    #[serde(default = "defaults::max_links")]
    pub max_links: usize,

    /// Maximum link-following depth from a seed URL
    #[serde(default = "defaults::max_depth")]
    pub max_depth: usize,

    /// Characters of page text shown to the navigation oracle
    #[serde(default = "defaults::navigation_text_chars")]
    pub navigation_text_chars: usize,

    /// Outbound links shown to the navigation oracle
    #[serde(default = "defaults::navigation_max_links")]
    pub navigation_max_links: usize,

    /// Queue event-like links found on extracted pages
    #[serde(default = "defaults::follow_page_links")]
    pub follow_page_links: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            request_delay_ms: defaults::request_delay(),
            max_links: defaults::max_links(),
            max_depth: defaults::max_depth(),
            navigation_text_chars: defaults::navigation_text_chars(),
            navigation_max_links: defaults::navigation_max_links(),
            follow_page_links: defaults::follow_page_links(),
        }
    }
}

/// URL filtering and seed search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Substrings of host+path that mark a URL as event-like
    #[serde(default = "defaults::event_terms")]
    pub event_terms: Vec<String>,

    /// Year that also marks a URL as event-like
    #[serde(default = "defaults::target_year")]
    pub target_year: Option<i32>,

    /// Search keywords for seed discovery
    #[serde(default = "defaults::keywords")]
    pub keywords: Vec<String>,

    /// Regions combined with every keyword
    #[serde(default = "defaults::regions")]
    pub regions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            event_terms: defaults::event_terms(),
            target_year: defaults::target_year(),
            keywords: defaults::keywords(),
            regions: defaults::regions(),
        }
    }
}

/// Record extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Fill missing topics and prices from the page text
    #[serde(default = "defaults::enrich_missing")]
    pub enrich_missing: bool,

    /// Characters of page text sent to the extractor
    #[serde(default = "defaults::max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enrich_missing: defaults::enrich_missing(),
            max_text_chars: defaults::max_text_chars(),
        }
    }
}

/// Record merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Names at least this similar are treated as the same event
    #[serde(default = "defaults::name_similarity_threshold")]
    pub name_similarity_threshold: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: defaults::name_similarity_threshold(),
        }
    }
}

/// OpenAI-compatible model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base URL (without `/chat/completions`)
    #[serde(default = "defaults::llm_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "defaults::llm_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "defaults::llm_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature
    #[serde(default = "defaults::llm_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::llm_base_url(),
            model: defaults::llm_model(),
            api_key_env: defaults::llm_api_key_env(),
            temperature: defaults::llm_temperature(),
        }
    }
}

mod defaults {
    use chrono::Datelike;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; event-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn request_delay() -> u64 {
        1000
    }
    pub fn max_links() -> usize {
        100
    }
    pub fn max_depth() -> usize {
        2
    }
    pub fn navigation_text_chars() -> usize {
        2000
    }
    pub fn navigation_max_links() -> usize {
        20
    }
    pub fn follow_page_links() -> bool {
        true
    }

    // Discovery defaults
    pub fn event_terms() -> Vec<String> {
        [
            "conference",
            "summit",
            "symposium",
            "expo",
            "meetup",
            "forum",
            "congress",
            "convention",
            "workshop",
            "ai-",
            "ml-",
            "tech-",
            "artificial-intelligence",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
    pub fn target_year() -> Option<i32> {
        Some(chrono::Utc::now().year())
    }
    pub fn keywords() -> Vec<String> {
        [
            "AI conferences",
            "artificial intelligence events",
            "machine learning conferences",
            "data science conferences",
            "tech conferences",
            "deep learning symposium",
            "AI summit",
            "NLP conference",
            "computer vision conference",
            "enterprise AI summit",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
    pub fn regions() -> Vec<String> {
        [
            "United States",
            "India",
            "Europe",
            "Dubai",
            "Singapore",
            "United Kingdom",
            "Canada",
            "Australia",
            "Germany",
            "France",
            "Japan",
            "South Korea",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    // Extraction defaults
    pub fn enrich_missing() -> bool {
        true
    }
    pub fn max_text_chars() -> usize {
        30_000
    }

    // Merge defaults
    pub fn name_similarity_threshold() -> f64 {
        0.8
    }

    // LLM defaults
    pub fn llm_base_url() -> String {
        "https://api.openai.com/v1".into()
    }
    pub fn llm_model() -> String {
        "gpt-4o-mini".into()
    }
    pub fn llm_api_key_env() -> String {
        "OPENAI_API_KEY".into()
    }
    pub fn llm_temperature() -> f32 {
        0.0
    }
}

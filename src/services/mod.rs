//! Service layer for the crawler application.
//!
//! This module contains the crawl components and their collaborators:
//! - URL frontier (`Frontier`)
//! - Fetched document lifecycle (`DocumentStore`)
//! - Navigation and extraction steps (`NavigationStep`, `ExtractionStep`)
//! - External collaborators (`PageFetcher`, `NavigationOracle`,
//!   `SemanticExtractor`, `SearchAgent`) and their HTTP/LLM implementations

mod collaborators;
mod documents;
mod extraction;
mod fetcher;
mod frontier;
mod llm;
mod navigation;
pub mod prompts;

pub use collaborators::{
    NavigationOracle, NavigationRequest, PageFetcher, SearchAgent, SemanticExtractor,
};
pub use documents::DocumentStore;
pub use extraction::{ExtractionStep, enrich};
pub use fetcher::HttpFetcher;
pub use frontier::Frontier;
pub use llm::{ChatClient, LlmAgents};
pub use navigation::{NavigationOutcome, NavigationStep, parse_decision};

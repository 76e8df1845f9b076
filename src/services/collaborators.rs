// src/services/collaborators.rs

//! Narrow interfaces to the external collaborators of the crawl.
//!
//! Each trait returns raw output; interpreting it is the caller's job, so a
//! misbehaving collaborator can degrade results but never panic the crawl.

use async_trait::async_trait;

use crate::error::Result;

/// Retrieves page markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// `Ok(None)` means "skip quietly"; `Err` is a transient failure.
    async fn fetch(&self, url: &str) -> Result<Option<String>>;
}

/// What the navigation oracle is shown about a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub url: String,
    pub title: String,
    /// Truncated visible text
    pub text: String,
    /// First few outbound links
    pub links: Vec<String>,
}

/// Decides whether a page should be extracted or its links visited first.
#[async_trait]
pub trait NavigationOracle: Send + Sync {
    /// Raw text expected to contain `{"action": ..., "links": [...]}`.
    async fn decide(&self, request: &NavigationRequest) -> Result<String>;
}

/// Turns page text into free-form JSON-ish event records.
#[async_trait]
pub trait SemanticExtractor: Send + Sync {
    async fn extract(&self, text: &str, url: &str, title: &str) -> Result<String>;
}

/// Suggests candidate event URLs for a search query.
#[async_trait]
pub trait SearchAgent: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

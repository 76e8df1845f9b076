// src/models/mod.rs

//! Domain models for the event crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod crawl;
mod document;
mod event;
mod navigation;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, DiscoveryConfig, ExtractionConfig, LlmConfig, MergeConfig,
};
pub use crawl::{CrawlContext, CrawlStats, WorkItem};
pub use document::{Document, DocumentMeta, page_title};
pub use event::{EventRecord, Registration, is_blank, is_empty_value};
pub use navigation::{NavAction, NavigationDecision};

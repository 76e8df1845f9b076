//! Crawl work items and per-run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A queued URL together with the link-following depth it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub url: String,
    pub depth: usize,
}

impl WorkItem {
    pub fn new(url: impl Into<String>, depth: usize) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }
}

/// Counters for one crawl run, written to `stats.json` at shutdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub urls_processed: usize,
    pub urls_skipped_depth: usize,
    pub fetch_failures: usize,
    pub fetch_empty: usize,
    pub documents_deferred: usize,
    pub documents_extracted: usize,
    pub extraction_empty: usize,
    pub records_created: usize,
    pub records_merged: usize,
    pub search_queries: usize,
}

/// Explicit per-run context handed to the crawler.
///
/// Created once at process start; `finish` seals the counters so they can be
/// persisted before the process exits.
#[derive(Debug)]
pub struct CrawlContext {
    stats: CrawlStats,
}

impl CrawlContext {
    pub fn new() -> Self {
        let start_time = Utc::now();
        Self {
            stats: CrawlStats {
                run_id: start_time.format("run-%Y%m%dT%H%M%S").to_string(),
                start_time,
                ..CrawlStats::default()
            },
        }
    }

    pub fn run_id(&self) -> &str {
        &self.stats.run_id
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut CrawlStats {
        &mut self.stats
    }

    /// Stamp the end time and hand back the final counters.
    pub fn finish(mut self) -> CrawlStats {
        self.stats.end_time = Some(Utc::now());
        self.stats
    }
}

impl Default for CrawlContext {
    fn default() -> Self {
        Self::new()
    }
}

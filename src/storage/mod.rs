//! Durable crawl state.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml          # Crawler configuration
//! ├── queue.json           # Frontier snapshot (ordered URL array)
//! ├── crawled_links.json   # Processed-URL ledger
//! ├── stats.json           # Summary of the last run
//! └── events/
//!     └── event_<key>.json # One record per dedup key
//! ```

pub mod local;
pub mod records;

use std::fmt;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{CrawlStats, EventRecord};

// Re-export for convenience
pub use local::LocalStorage;
pub use records::{RecordStore, StoreOutcome};

/// Identity of a persisted record: `src_<hash>` from its source URL, or
/// `seq_<n>` when it has none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(String);

impl DedupKey {
    const FILE_PREFIX: &'static str = "event_";
    const FILE_SUFFIX: &'static str = ".json";

    /// Stable key from the first 32 hex chars of SHA-256 of the URL.
    pub fn from_source(url: &str) -> Self {
        let digest = Sha256::digest(url.trim().as_bytes());
        let hex = hex::encode(digest);
        Self(format!("src_{}", &hex[..32]))
    }

    pub fn sequence(n: u64) -> Self {
        Self(format!("seq_{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The counter value of a `seq_<n>` key.
    pub fn sequence_number(&self) -> Option<u64> {
        self.0.strip_prefix("seq_")?.parse().ok()
    }

    pub fn file_name(&self) -> String {
        format!("{}{}{}", Self::FILE_PREFIX, self.0, Self::FILE_SUFFIX)
    }

    /// Inverse of [`DedupKey::file_name`].
    pub fn from_file_name(name: &str) -> Option<Self> {
        let key = name
            .strip_prefix(Self::FILE_PREFIX)?
            .strip_suffix(Self::FILE_SUFFIX)?;
        let valid = (key.starts_with("src_") || key.starts_with("seq_"))
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| Self(key.to_string()))
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for crawl state backends.
#[async_trait]
pub trait CrawlStorage: Send + Sync {
    /// Overwrite the frontier snapshot.
    async fn save_queue(&self, urls: &[String]) -> Result<()>;

    /// Load the frontier snapshot; empty when none exists.
    async fn load_queue(&self) -> Result<Vec<String>>;

    /// Overwrite the processed-URL ledger.
    async fn save_ledger(&self, urls: &[String]) -> Result<()>;

    async fn load_ledger(&self) -> Result<Vec<String>>;

    /// Write one persisted record.
    async fn write_record(&self, key: &DedupKey, record: &EventRecord) -> Result<()>;

    /// Every persisted record with its key.
    async fn load_records(&self) -> Result<Vec<(DedupKey, EventRecord)>>;

    async fn save_stats(&self, stats: &CrawlStats) -> Result<()>;
}

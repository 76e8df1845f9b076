//! Local filesystem storage implementation.
//!
//! Every write goes to a temporary file first and is renamed into place, so
//! a crash never leaves a half-written queue, ledger or record behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{CrawlStats, EventRecord};
use crate::storage::{CrawlStorage, DedupKey};

const QUEUE_KEY: &str = "queue.json";
const LEDGER_KEY: &str = "crawled_links.json";
const STATS_KEY: &str = "stats.json";
const CONFIG_KEY: &str = "config.toml";
const EVENTS_DIR: &str = "events";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Location of `config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.path(CONFIG_KEY)
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn record_key(key: &DedupKey) -> String {
        format!("{}/{}", EVENTS_DIR, key.file_name())
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes)
            .await
            .map_err(|e| AppError::storage(key, e))
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(|e| AppError::storage(key, e))?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CrawlStorage for LocalStorage {
    async fn save_queue(&self, urls: &[String]) -> Result<()> {
        self.write_json(QUEUE_KEY, urls).await
    }

    async fn load_queue(&self) -> Result<Vec<String>> {
        Ok(self.read_json(QUEUE_KEY).await?.unwrap_or_default())
    }

    async fn save_ledger(&self, urls: &[String]) -> Result<()> {
        self.write_json(LEDGER_KEY, urls).await
    }

    async fn load_ledger(&self) -> Result<Vec<String>> {
        Ok(self.read_json(LEDGER_KEY).await?.unwrap_or_default())
    }

    async fn write_record(&self, key: &DedupKey, record: &EventRecord) -> Result<()> {
        self.write_json(&Self::record_key(key), record).await
    }

    async fn load_records(&self) -> Result<Vec<(DedupKey, EventRecord)>> {
        let dir = self.path(EVENTS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(key) = file_name.to_str().and_then(DedupKey::from_file_name) else {
                continue;
            };
            match self.read_json::<EventRecord>(&Self::record_key(&key)).await {
                Ok(Some(record)) => records.push((key, record)),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping unreadable record {}: {}", key, e),
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    async fn save_stats(&self, stats: &CrawlStats) -> Result<()> {
        self.write_json(STATS_KEY, stats).await
    }
}

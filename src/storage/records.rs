//! Record store: dedup, merge and persist event records.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{EventRecord, is_blank};
use crate::pipeline::merge::{MergePolicy, merge};
use crate::storage::{CrawlStorage, DedupKey};

/// What [`RecordStore::store`] did with a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Created(DedupKey),
    Merged(DedupKey),
}

impl StoreOutcome {
    pub fn key(&self) -> &DedupKey {
        match self {
            Self::Created(key) | Self::Merged(key) => key,
        }
    }
}

#[derive(Debug, Default)]
struct RecordIndex {
    records: HashMap<DedupKey, EventRecord>,
    next_seq: u64,
}

/// Keyed record index over a [`CrawlStorage`] backend.
///
/// The index is loaded once in [`RecordStore::open`]; afterwards every
/// lookup is in memory and every write goes through one lock.
pub struct RecordStore {
    storage: Arc<dyn CrawlStorage>,
    policy: MergePolicy,
    index: Mutex<RecordIndex>,
}

impl RecordStore {
    pub async fn open(storage: Arc<dyn CrawlStorage>, policy: MergePolicy) -> Result<Self> {
        let mut index = RecordIndex::default();
        for (key, record) in storage.load_records().await? {
            if let Some(n) = key.sequence_number() {
                index.next_seq = index.next_seq.max(n + 1);
            }
            index.records.insert(key, record);
        }
        info!("Record store opened with {} record(s)", index.records.len());

        Ok(Self {
            storage,
            policy,
            index: Mutex::new(index),
        })
    }

    /// Create or merge the record under its dedup key and persist it.
    ///
    /// A write failure is logged and returned; the in-memory index is only
    /// updated once the write succeeded.
    pub async fn store(&self, mut record: EventRecord) -> Result<StoreOutcome> {
        let now = Utc::now();
        let mut index = self.index.lock().await;

        let key = match record.source_url.as_deref() {
            Some(url) if !is_blank(&record.source_url) => DedupKey::from_source(url),
            _ => DedupKey::sequence(index.next_seq),
        };

        let (merged, created) = match index.records.get(&key) {
            Some(existing) => (merge(existing, &record, &self.policy, now), false),
            None => {
                record.last_updated = Some(now);
                (record, true)
            }
        };

        if let Err(e) = self.storage.write_record(&key, &merged).await {
            error!("Failed to persist record {}: {}", key, e);
            return Err(e);
        }

        if key.sequence_number().is_some() {
            index.next_seq += 1;
        }
        debug!(
            "{} record {} ({})",
            if created { "Created" } else { "Merged" },
            key,
            merged.display_name()
        );
        index.records.insert(key.clone(), merged);

        Ok(if created {
            StoreOutcome::Created(key)
        } else {
            StoreOutcome::Merged(key)
        })
    }

    /// Source URLs of every persisted record.
    pub async fn known_sources(&self) -> Vec<String> {
        let index = self.index.lock().await;
        let mut sources: Vec<String> = index
            .records
            .values()
            .filter_map(|r| r.source_url.clone())
            .filter(|url| !url.trim().is_empty())
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::CrawlStats;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: serde_json::Value) -> EventRecord {
        serde_json::from_value(value).unwrap()
    }

    async fn open(dir: &TempDir) -> RecordStore {
        let storage: Arc<dyn CrawlStorage> = Arc::new(LocalStorage::new(dir.path()));
        RecordStore::open(storage, MergePolicy::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_same_source_merges_into_one_file() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        let first = record(json!({
            "event_name": "AI Summit 2025",
            "topics": ["AI"],
            "source_url": "https://ai-summit.example.com/"
        }));
        let second = record(json!({
            "event_name": "AI Summit 2025",
            "topics": ["ML"],
            "source_url": "https://ai-summit.example.com/"
        }));

        let created = store.store(first).await.unwrap();
        let merged = store.store(second).await.unwrap();
        assert!(matches!(created, StoreOutcome::Created(_)));
        assert_eq!(merged, StoreOutcome::Merged(created.key().clone()));

        let files = std::fs::read_dir(tmp.path().join("events")).unwrap().count();
        assert_eq!(files, 1);
        let persisted = LocalStorage::new(tmp.path()).load_records().await.unwrap();
        assert_eq!(persisted[0].0, *created.key());
        assert_eq!(persisted[0].1.topics, vec!["AI", "ML"]);
    }

    #[tokio::test]
    async fn test_records_without_source_get_sequence_keys() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        let a = store.store(record(json!({"event_name": "A", "topics": ["AI"]}))).await.unwrap();
        let b = store.store(record(json!({"event_name": "B", "topics": ["AI"]}))).await.unwrap();
        assert_eq!(a, StoreOutcome::Created(DedupKey::sequence(0)));
        assert_eq!(b, StoreOutcome::Created(DedupKey::sequence(1)));

        // counter resumes past existing files
        let reopened = open(&tmp).await;
        let c = reopened
            .store(record(json!({"event_name": "C", "topics": ["AI"]})))
            .await
            .unwrap();
        assert_eq!(c, StoreOutcome::Created(DedupKey::sequence(2)));
        assert_eq!(reopened.len().await, 3);
    }

    #[tokio::test]
    async fn test_known_sources_after_reopen() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp).await;
        store
            .store(record(json!({
                "event_name": "ML Forum",
                "dates": "2025-06-01",
                "source_url": "https://ml-forum.example.com/"
            })))
            .await
            .unwrap();

        let reopened = open(&tmp).await;
        assert_eq!(
            reopened.known_sources().await,
            vec!["https://ml-forum.example.com/".to_string()]
        );
    }

    struct FailingStorage;

    #[async_trait]
    impl CrawlStorage for FailingStorage {
        async fn save_queue(&self, _urls: &[String]) -> Result<()> {
            Ok(())
        }
        async fn load_queue(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn save_ledger(&self, _urls: &[String]) -> Result<()> {
            Ok(())
        }
        async fn load_ledger(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn write_record(&self, key: &DedupKey, _record: &EventRecord) -> Result<()> {
            Err(AppError::storage(key.as_str(), "disk full"))
        }
        async fn load_records(&self) -> Result<Vec<(DedupKey, EventRecord)>> {
            Ok(Vec::new())
        }
        async fn save_stats(&self, _stats: &CrawlStats) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_returned_and_not_indexed() {
        let store = RecordStore::open(Arc::new(FailingStorage), MergePolicy::default())
            .await
            .unwrap();
        let result = store
            .store(record(json!({"event_name": "X", "topics": ["AI"]})))
            .await;

        assert!(matches!(result, Err(AppError::Storage { .. })));
        assert_eq!(store.len().await, 0);
    }
}

//! Read-only views over persisted crawl state.

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::pipeline::repair::{ParseOutcome, parse_response};
use crate::storage::CrawlStorage;

/// Sizes of the persisted queue, ledger and record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageSummary {
    pub queued: usize,
    pub crawled: usize,
    pub records: usize,
}

pub async fn summarize(storage: &dyn CrawlStorage) -> Result<StorageSummary> {
    Ok(StorageSummary {
        queued: storage.load_queue().await?.len(),
        crawled: storage.load_ledger().await?.len(),
        records: storage.load_records().await?.len(),
    })
}

/// Run the repair engine over a saved model response.
///
/// Returns the recovered records as pretty JSON; an answer with no usable
/// event is a validation error carrying the reason.
pub fn repair_report(response: &str) -> Result<String> {
    match parse_response(response) {
        ParseOutcome::Valid(records) => Ok(serde_json::to_string_pretty(&records)?),
        ParseOutcome::Empty => Ok("[]".to_string()),
        ParseOutcome::Malformed(reason) => Err(AppError::validation(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventRecord;
    use crate::storage::{DedupKey, LocalStorage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_summary_of_fresh_storage() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        assert_eq!(summarize(&storage).await.unwrap(), StorageSummary::default());
    }

    #[tokio::test]
    async fn test_summary_counts_persisted_state() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage
            .save_queue(&["https://a-summit.example.com/".to_string()])
            .await
            .unwrap();
        storage
            .save_ledger(&[
                "https://b-summit.example.com/".to_string(),
                "https://c-summit.example.com/".to_string(),
            ])
            .await
            .unwrap();
        let record: EventRecord =
            serde_json::from_str(r#"{"event_name": "B Summit", "topics": ["AI"]}"#).unwrap();
        storage
            .write_record(&DedupKey::sequence(0), &record)
            .await
            .unwrap();

        let summary = summarize(&storage).await.unwrap();
        assert_eq!(
            summary,
            StorageSummary {
                queued: 1,
                crawled: 2,
                records: 1,
            }
        );
    }

    #[test]
    fn test_repair_report() {
        let report =
            repair_report(r#"[{"event_name": "AI Summit", "location": "Paris"}, {"event_"#).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(value[0]["event_name"], "AI Summit");

        assert_eq!(repair_report("[]").unwrap(), "[]");
        assert!(matches!(
            repair_report("I could not find any events."),
            Err(AppError::Validation(_))
        ));
    }
}

// src/services/documents.rs

//! Document lifecycle: fetched pages waiting for navigation or extraction.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::models::{Document, DocumentMeta};

#[derive(Debug, Default)]
struct StoreState {
    next_seq: u64,
    live: HashMap<String, (u64, Document)>,
    completed: HashSet<String>,
}

/// Owns every fetched-but-unprocessed [`Document`], at most one per URL.
#[derive(Debug, Default)]
pub struct DocumentStore {
    state: Mutex<StoreState>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a fetched page. First write wins; a completed URL is ignored.
    ///
    /// Returns `true` when a new document was created.
    pub fn ingest(&self, url: &str, raw_markup: &str, title: &str, meta: DocumentMeta) -> bool {
        {
            let state = self.lock();
            if state.live.contains_key(url) || state.completed.contains(url) {
                return false;
            }
        }

        // Parse outside the lock; re-check before inserting.
        let document = Document::new(url, raw_markup, title, meta);
        let mut state = self.lock();
        if state.live.contains_key(url) || state.completed.contains(url) {
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.live.insert(url.to_string(), (seq, document));
        true
    }

    /// Unprocessed documents in insertion order.
    pub fn pending(&self) -> Vec<Document> {
        let state = self.lock();
        let mut docs: Vec<_> = state.live.values().collect();
        docs.sort_by_key(|(seq, _)| *seq);
        docs.into_iter().map(|(_, doc)| doc.clone()).collect()
    }

    /// Whether `url` has a document that is not completed yet.
    pub fn contains(&self, url: &str) -> bool {
        self.lock().live.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<Document> {
        self.lock().live.get(url).map(|(_, doc)| doc.clone())
    }

    /// Park a document until the promoted links it waits on are visited.
    pub fn defer(&self, url: &str, awaiting: Vec<String>) -> bool {
        match self.lock().live.get_mut(url) {
            Some((_, doc)) => {
                doc.awaiting = Some(awaiting);
                true
            }
            None => false,
        }
    }

    /// Mark processed and release the content.
    pub fn complete(&self, url: &str) {
        let mut state = self.lock();
        state.live.remove(url);
        state.completed.insert(url.to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "https://ai-summit.example.com/";

    #[test]
    fn test_first_write_wins() {
        let store = DocumentStore::new();
        assert!(store.ingest(URL, "<title>First</title>", "", DocumentMeta::at_depth(0)));
        assert!(!store.ingest(URL, "<title>Second</title>", "", DocumentMeta::at_depth(0)));

        let pending = store.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "First");
    }

    #[test]
    fn test_pending_in_insertion_order() {
        let store = DocumentStore::new();
        for i in 0..5 {
            store.ingest(&format!("{URL}{i}"), "", "", DocumentMeta::at_depth(0));
        }
        let urls: Vec<_> = store.pending().into_iter().map(|d| d.url).collect();
        let expected: Vec<_> = (0..5).map(|i| format!("{URL}{i}")).collect();
        assert_eq!(urls, expected);
    }

    #[test]
    fn test_complete_drops_and_blocks_reingest() {
        let store = DocumentStore::new();
        store.ingest(URL, "<p>x</p>", "", DocumentMeta::at_depth(0));
        store.complete(URL);

        assert!(store.is_empty());
        assert!(!store.contains(URL));
        assert!(!store.ingest(URL, "<p>y</p>", "", DocumentMeta::at_depth(0)));
    }

    #[test]
    fn test_defer_marks_document() {
        let store = DocumentStore::new();
        store.ingest(URL, "", "", DocumentMeta::at_depth(0));
        assert!(store.defer(URL, vec!["https://ai-summit.example.com/agenda".into()]));
        assert!(store.get(URL).unwrap().is_deferred());
        assert!(!store.defer("https://unknown.example.com/", Vec::new()));
    }

    #[test]
    fn test_concurrent_ingest_keeps_one_document_per_url() {
        let store = Arc::new(DocumentStore::new());
        let created = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = Arc::clone(&store);
                let created = &created;
                scope.spawn(move || {
                    for n in 0..10 {
                        let url = format!("{URL}{n}");
                        let markup = format!("<p>worker {worker}</p>");
                        if store.ingest(&url, &markup, "", DocumentMeta::at_depth(0)) {
                            created.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(created.load(Ordering::SeqCst), 10);
        assert_eq!(store.len(), 10);
        assert_eq!(store.pending().len(), 10);
    }
}

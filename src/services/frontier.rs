// src/services/frontier.rs

//! URL frontier: known URLs plus the pending `(url, depth)` work queue.
//!
//! Every operation takes the single internal lock for its whole duration and
//! never awaits while holding it, so one frontier can be shared by several
//! fetch workers.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::models::WorkItem;
use crate::utils::{UrlFilter, normalize};

#[derive(Debug, Default)]
struct FrontierState {
    discovered: HashSet<String>,
    processed: HashSet<String>,
    queue: VecDeque<WorkItem>,
}

impl FrontierState {
    fn is_queued(&self, url: &str) -> bool {
        self.discovered.contains(url) && !self.processed.contains(url)
    }
}

/// Deduplicating, breadth-first queue of event-like URLs.
#[derive(Debug)]
pub struct Frontier {
    filter: UrlFilter,
    state: Mutex<FrontierState>,
}

impl Frontier {
    pub fn new(filter: UrlFilter) -> Self {
        Self {
            filter,
            state: Mutex::new(FrontierState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        // The state stays consistent across a panicking holder; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append event-like, never-seen URLs to the back at depth 0.
    ///
    /// Returns the accepted canonical URLs in input order.
    pub fn add<I, S>(&self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_at_depth(urls, 0)
    }

    /// Same as [`Frontier::add`] with an explicit depth.
    pub fn add_at_depth<I, S>(&self, urls: I, depth: usize) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.lock();
        let mut accepted = Vec::new();
        for raw in urls {
            let Some(url) = self.filter.accept(raw.as_ref()) else {
                continue;
            };
            if state.discovered.insert(url.clone()) {
                state.queue.push_back(WorkItem::new(url.clone(), depth));
                accepted.push(url);
            }
        }
        accepted
    }

    /// Queue operator-supplied seeds at depth 0.
    ///
    /// Seeds are normalized and deduplicated but not filtered for
    /// event-likeness; relative paths are dropped since nothing can resolve
    /// them.
    pub fn add_seeds<I, S>(&self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.lock();
        let mut accepted = Vec::new();
        for raw in urls {
            let Some(url) = normalize(raw.as_ref()).filter(|u| !u.starts_with('/')) else {
                continue;
            };
            if state.discovered.insert(url.clone()) {
                state.queue.push_back(WorkItem::new(url.clone(), 0));
                accepted.push(url);
            }
        }
        accepted
    }

    /// Push URLs to the front so the first input is served next.
    ///
    /// A URL that is already queued but not yet processed is promoted as
    /// well; its older queue entry is skipped later. Processed URLs are
    /// never re-queued.
    pub fn add_priority<I, S>(&self, urls: I, depth: usize) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.lock();
        let mut accepted: Vec<String> = Vec::new();
        for raw in urls {
            let Some(url) = self.filter.accept(raw.as_ref()) else {
                continue;
            };
            if accepted.contains(&url) || state.processed.contains(&url) {
                continue;
            }
            state.discovered.insert(url.clone());
            accepted.push(url);
        }

        for url in accepted.iter().rev() {
            state.queue.push_front(WorkItem::new(url.clone(), depth));
        }
        accepted
    }

    /// Pop the next unprocessed item and mark it processed.
    pub fn next(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        while let Some(item) = state.queue.pop_front() {
            if state.processed.insert(item.url.clone()) {
                return Some(item);
            }
        }
        None
    }

    pub fn has_pending(&self) -> bool {
        let state = self.lock();
        state.queue.iter().any(|item| !state.processed.contains(&item.url))
    }

    /// Number of distinct URLs waiting in the queue.
    pub fn pending_len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_processed(&self, url: &str) -> bool {
        let state = self.lock();
        state.processed.contains(url)
            || normalize(url).is_some_and(|canonical| state.processed.contains(&canonical))
    }

    /// Queued URLs in service order, without duplicates or processed entries.
    pub fn snapshot(&self) -> Vec<String> {
        let state = self.lock();
        let mut seen = HashSet::new();
        state
            .queue
            .iter()
            .filter(|item| state.is_queued(&item.url))
            .filter(|item| seen.insert(item.url.as_str()))
            .map(|item| item.url.clone())
            .collect()
    }

    /// Record URLs handled by an earlier run so they are never served again.
    pub fn mark_processed<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.lock();
        for raw in urls {
            let url = normalize(raw.as_ref()).unwrap_or_else(|| raw.as_ref().to_string());
            state.discovered.insert(url.clone());
            state.processed.insert(url);
        }
    }

    /// Re-queue a persisted snapshot at depth 0.
    ///
    /// Entries were validated when first added, so only deduplication applies.
    pub fn restore<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.lock();
        let mut restored = 0;
        for raw in urls {
            let url = raw.as_ref().trim();
            if url.is_empty() || !state.discovered.insert(url.to_string()) {
                continue;
            }
            state.queue.push_back(WorkItem::new(url, 0));
            restored += 1;
        }
        restored
    }
}

// src/pipeline/crawl.rs

//! Event crawling pipeline.
//!
//! A single sequential worker drains `(url, depth)` work items from the
//! frontier: fetch, ingest, navigation decision, then extraction and record
//! storage. Search queries refill the frontier when it runs dry.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::Result;
use crate::models::{Config, CrawlContext, CrawlStats, Document, DocumentMeta, WorkItem};
use crate::pipeline::merge::MergePolicy;
use crate::services::{
    DocumentStore, ExtractionStep, Frontier, NavigationOracle, NavigationOutcome, NavigationStep,
    PageFetcher, SearchAgent, SemanticExtractor,
};
use crate::storage::{CrawlStorage, RecordStore, StoreOutcome};
use crate::utils::{Throttle, UrlFilter};

/// The external collaborators a crawl talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn PageFetcher>,
    pub navigator: Arc<dyn NavigationOracle>,
    pub extractor: Arc<dyn SemanticExtractor>,
    pub search: Option<Arc<dyn SearchAgent>>,
}

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Operator-supplied start URLs
    pub seeds: Vec<String>,
    /// Re-queue the persisted frontier snapshot
    pub resume: bool,
    /// Ask the search agent for URLs when the frontier runs dry
    pub search: bool,
}

/// Append-only record of URLs fetched in this and earlier runs.
#[derive(Debug, Default)]
struct Ledger {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl Ledger {
    fn from_urls(urls: Vec<String>) -> Self {
        let mut ledger = Self::default();
        for url in urls {
            ledger.push(url);
        }
        ledger
    }

    fn push(&mut self, url: String) -> bool {
        if self.seen.insert(url.clone()) {
            self.urls.push(url);
            true
        } else {
            false
        }
    }
}

pub struct Crawler {
    config: Arc<Config>,
    storage: Arc<dyn CrawlStorage>,
    collaborators: Collaborators,
    url_filter: UrlFilter,
    frontier: Frontier,
    documents: DocumentStore,
    records: RecordStore,
    navigation: NavigationStep,
    extraction: ExtractionStep,
    throttle: Throttle,
    ledger: Ledger,
    queries: VecDeque<String>,
}

impl Crawler {
    /// Open the record store and wire up the crawl components.
    pub async fn new(
        config: Arc<Config>,
        storage: Arc<dyn CrawlStorage>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let url_filter = UrlFilter::from_config(&config.discovery);
        let records = RecordStore::open(Arc::clone(&storage), MergePolicy::from(&config.merge)).await?;

        Ok(Self {
            frontier: Frontier::new(url_filter.clone()),
            documents: DocumentStore::new(),
            records,
            navigation: NavigationStep::from_config(&config.crawler),
            extraction: ExtractionStep::from_config(&config.extraction),
            throttle: Throttle::from_millis(config.crawler.request_delay_ms),
            ledger: Ledger::default(),
            queries: VecDeque::new(),
            url_filter,
            config,
            storage,
            collaborators,
        })
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Run until the link budget is spent or there is nothing left to visit.
    pub async fn run(&mut self, ctx: &mut CrawlContext, options: &CrawlOptions) -> Result<()> {
        self.prepare(options).await?;

        let max_links = self.config.crawler.max_links;
        let max_depth = self.config.crawler.max_depth;

        while ctx.stats().urls_processed < max_links {
            if !self.frontier.has_pending() {
                if self.discover(ctx).await? {
                    continue;
                }
                info!("Frontier exhausted");
                break;
            }

            let Some(item) = self.frontier.next() else {
                continue;
            };
            self.save_queue().await?;

            if item.depth > max_depth {
                debug!("Skipping {} at depth {} (max {})", item.url, item.depth, max_depth);
                ctx.stats_mut().urls_skipped_depth += 1;
                continue;
            }

            ctx.stats_mut().urls_processed += 1;
            info!(
                "[{}/{}] {} (depth {})",
                ctx.stats().urls_processed,
                max_links,
                item.url,
                item.depth
            );
            self.process_item(ctx, item).await?;
        }

        if ctx.stats().urls_processed >= max_links {
            info!("Link budget ({}) reached", max_links);
        }

        // Whatever is still parked gets extracted with what we have.
        if !self.documents.is_empty() {
            info!("Extracting {} parked document(s)", self.documents.len());
        }
        self.process_pending(ctx, true).await?;
        self.save_queue().await?;
        info!("{} URL(s) left in the queue", self.frontier.pending_len());
        Ok(())
    }

    /// Seed the frontier from the ledger, persisted records, the saved
    /// queue and the operator's seeds.
    async fn prepare(&mut self, options: &CrawlOptions) -> Result<()> {
        self.ledger = Ledger::from_urls(self.storage.load_ledger().await?);
        self.frontier.mark_processed(&self.ledger.urls);
        self.frontier.mark_processed(self.records.known_sources().await);
        info!("Ledger holds {} processed URL(s)", self.ledger.urls.len());

        if options.resume {
            let restored = self.frontier.restore(self.storage.load_queue().await?);
            info!("Restored {} queued URL(s)", restored);
        }

        let seeded = self.frontier.add_seeds(&options.seeds);
        if !options.seeds.is_empty() {
            info!("Queued {}/{} seed URL(s)", seeded.len(), options.seeds.len());
        }

        self.queries = if options.search && self.collaborators.search.is_some() {
            self.config.search_queries().into()
        } else {
            VecDeque::new()
        };

        self.save_queue().await
    }

    /// Run search queries until one yields new URLs. `false` when none is left.
    async fn discover(&mut self, ctx: &mut CrawlContext) -> Result<bool> {
        let Some(search) = self.collaborators.search.clone() else {
            return Ok(false);
        };

        while let Some(query) = self.queries.pop_front() {
            self.throttle.wait().await;
            ctx.stats_mut().search_queries += 1;

            let answer = match search.search(&query).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!("Search for {:?} failed: {}", query, e);
                    continue;
                }
            };

            let found = self.url_filter.scrape(&answer);
            let accepted = self.frontier.add(&found);
            info!(
                "Search {:?}: {} URL(s) found, {} new",
                query,
                found.len(),
                accepted.len()
            );
            if !accepted.is_empty() {
                self.save_queue().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn process_item(&mut self, ctx: &mut CrawlContext, item: WorkItem) -> Result<()> {
        self.throttle.wait().await;
        let markup = match self.collaborators.fetcher.fetch(&item.url).await {
            Ok(Some(markup)) => markup,
            Ok(None) => {
                debug!("Nothing to process at {}", item.url);
                ctx.stats_mut().fetch_empty += 1;
                return Ok(());
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", item.url, e);
                ctx.stats_mut().fetch_failures += 1;
                return Ok(());
            }
        };

        self.record_crawled(&item.url).await?;

        self.documents
            .ingest(&item.url, &markup, "", DocumentMeta::at_depth(item.depth));
        let page_links = self
            .documents
            .get(&item.url)
            .map(|doc| Arc::clone(&doc.links));

        self.process_pending(ctx, false).await?;

        if self.config.crawler.follow_page_links && item.depth < self.config.crawler.max_depth {
            if let Some(links) = page_links {
                let added = self.frontier.add_at_depth(links.iter(), item.depth + 1);
                if !added.is_empty() {
                    debug!("Queued {} page link(s) from {}", added.len(), item.url);
                    self.save_queue().await?;
                }
            }
        }
        Ok(())
    }

    /// Drive every pending document one step forward.
    ///
    /// Fresh documents go through navigation first. A deferred document is
    /// extracted once every link it waits on has been taken from the frontier
    /// and finished, or unconditionally when `flushing`.
    async fn process_pending(&mut self, ctx: &mut CrawlContext, flushing: bool) -> Result<()> {
        let (deferred, fresh): (Vec<_>, Vec<_>) = self
            .documents
            .pending()
            .into_iter()
            .partition(Document::is_deferred);

        for doc in fresh {
            if flushing {
                self.extract_document(ctx, &doc).await?;
                continue;
            }

            self.throttle.wait().await;
            let decision = self
                .navigation
                .decide(self.collaborators.navigator.as_ref(), &doc)
                .await;

            match self
                .navigation
                .apply(&decision, &doc, &self.frontier, &self.documents)
            {
                NavigationOutcome::Deferred(links) => {
                    info!("Visiting {} link(s) before extracting {}", links.len(), doc.url);
                    ctx.stats_mut().documents_deferred += 1;
                    self.save_queue().await?;
                }
                NavigationOutcome::Extract => self.extract_document(ctx, &doc).await?,
            }
        }

        for doc in deferred {
            let awaiting = doc.awaiting.as_deref().unwrap_or_default();
            let ready = flushing
                || awaiting
                    .iter()
                    .all(|url| self.frontier.is_processed(url) && !self.documents.contains(url));
            if ready {
                self.extract_document(ctx, &doc).await?;
            }
        }
        Ok(())
    }

    async fn extract_document(&self, ctx: &mut CrawlContext, doc: &Document) -> Result<()> {
        self.throttle.wait().await;
        let records = self
            .extraction
            .run(self.collaborators.extractor.as_ref(), doc)
            .await;

        let stats = ctx.stats_mut();
        stats.documents_extracted += 1;
        if records.is_empty() {
            stats.extraction_empty += 1;
        }

        for record in records {
            let name = record.display_name().to_string();
            match self.records.store(record).await? {
                StoreOutcome::Created(key) => {
                    info!("Extracted event {:?} from {} ({})", name, doc.url, key);
                    ctx.stats_mut().records_created += 1;
                }
                StoreOutcome::Merged(key) => {
                    info!("Merged event {:?} from {} into {}", name, doc.url, key);
                    ctx.stats_mut().records_merged += 1;
                }
            }
        }

        self.documents.complete(&doc.url);
        Ok(())
    }

    async fn record_crawled(&mut self, url: &str) -> Result<()> {
        if !self.ledger.push(url.to_string()) {
            return Ok(());
        }
        if let Err(e) = self.storage.save_ledger(&self.ledger.urls).await {
            error!("Failed to update crawled-links ledger: {}", e);
            return Err(e);
        }
        Ok(())
    }

    async fn save_queue(&self) -> Result<()> {
        if let Err(e) = self.storage.save_queue(&self.frontier.snapshot()).await {
            error!("Failed to save queue snapshot: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

/// Run one crawl and persist its statistics.
///
/// Statistics are written even when the crawl stops on an error.
pub async fn run_crawler(
    config: Arc<Config>,
    storage: Arc<dyn CrawlStorage>,
    collaborators: Collaborators,
    options: &CrawlOptions,
) -> Result<CrawlStats> {
    let mut ctx = CrawlContext::new();
    info!("Crawl {} starting", ctx.run_id());

    let mut crawler = Crawler::new(config, Arc::clone(&storage), collaborators).await?;
    let outcome = crawler.run(&mut ctx, options).await;

    let stats = ctx.finish();
    storage.save_stats(&stats).await?;
    outcome?;

    info!(
        "Crawl {} complete: {} URL(s) processed, {} record(s) created, {} merged, {} stored in total",
        stats.run_id,
        stats.urls_processed,
        stats.records_created,
        stats.records_merged,
        crawler.records().len().await
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::NavigationRequest;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const LANDING: &str = "https://ai-summit.example.com/2025/";
    const AGENDA: &str = "https://ai-summit.example.com/2025/agenda";
    const SPEAKERS: &str = "https://ai-summit.example.com/2025/speakers";
    const BROKEN: &str = "https://broken-summit.example.com/";

    struct MockWeb {
        pages: HashMap<&'static str, &'static str>,
        fetched: Mutex<Vec<String>>,
    }

    impl MockWeb {
        fn new() -> Self {
            let mut pages = HashMap::new();
            pages.insert(
                LANDING,
                r#"<html><head><title>AI Summit 2025</title></head><body>
                    <p>The AI Summit returns. Machine learning for everyone.</p>
                    <a href="agenda">Agenda</a>
                    <a href="speakers">Speakers</a>
                    <a href="https://example.com/about">About</a>
                </body></html>"#,
            );
            pages.insert(AGENDA, "<html><body><p>Day 1: keynotes. $500 early bird.</p></body></html>");
            pages.insert(SPEAKERS, "<html><body><p>Ada Lovelace</p></body></html>");
            Self {
                pages,
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for MockWeb {
        async fn fetch(&self, url: &str) -> Result<Option<String>> {
            self.fetched.lock().unwrap().push(url.to_string());
            if url == BROKEN {
                return Err(AppError::collaborator(url, "connection reset"));
            }
            Ok(self.pages.get(url).map(|page| page.to_string()))
        }
    }

    /// Clicks through from the landing page to the agenda only.
    struct MockNavigator;

    #[async_trait]
    impl NavigationOracle for MockNavigator {
        async fn decide(&self, request: &NavigationRequest) -> Result<String> {
            if request.url == LANDING {
                Ok(r#"{"action": "click", "links": ["https://ai-summit.example.com/2025/agenda"]}"#.into())
            } else {
                Ok(r#"{"action": "extract", "links": []}"#.into())
            }
        }
    }

    #[derive(Default)]
    struct MockExtractor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SemanticExtractor for MockExtractor {
        async fn extract(&self, _text: &str, url: &str, _title: &str) -> Result<String> {
            self.calls.lock().unwrap().push(url.to_string());
            Ok(match url {
                LANDING => r#"Here it is: {"event_name": "AI Summit 2025", "dates": "March 3-4, 2025", "location": "San Francisco"}"#,
                AGENDA => r#"[{"event_name": "AI Summit 2025", "description": "Day 1: keynotes"}]"#,
                _ => "[]",
            }
            .to_string())
        }
    }

    struct MockSearch;

    #[async_trait]
    impl SearchAgent for MockSearch {
        async fn search(&self, query: &str) -> Result<String> {
            if query.contains("Europe") {
                Ok(format!("1. [AI Summit]({LANDING})\n2. https://example.com/about"))
            } else {
                Ok("nothing relevant".into())
            }
        }
    }

    struct Harness {
        _tmp: TempDir,
        storage: Arc<LocalStorage>,
        web: Arc<MockWeb>,
        extractor: Arc<MockExtractor>,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            Self {
                storage: Arc::new(LocalStorage::new(tmp.path())),
                _tmp: tmp,
                web: Arc::new(MockWeb::new()),
                extractor: Arc::new(MockExtractor::default()),
            }
        }

        fn collaborators(&self, search: bool) -> Collaborators {
            Collaborators {
                fetcher: self.web.clone(),
                navigator: Arc::new(MockNavigator),
                extractor: self.extractor.clone(),
                search: search.then(|| Arc::new(MockSearch) as Arc<dyn SearchAgent>),
            }
        }

        async fn run(&self, config: Config, options: CrawlOptions) -> CrawlStats {
            run_crawler(
                Arc::new(config),
                self.storage.clone(),
                self.collaborators(options.search),
                &options,
            )
            .await
            .unwrap()
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.crawler.request_delay_ms = 0;
        config.discovery.target_year = Some(2025);
        config
    }

    fn seeded(urls: &[&str]) -> CrawlOptions {
        CrawlOptions {
            seeds: urls.iter().map(|u| u.to_string()).collect(),
            ..CrawlOptions::default()
        }
    }

    #[tokio::test]
    async fn test_landing_page_extracted_after_promoted_link() {
        let h = Harness::new();
        let stats = h.run(config(), seeded(&[LANDING])).await;

        assert_eq!(h.web.fetched(), vec![LANDING, AGENDA, SPEAKERS]);
        // agenda before the deferred landing page
        let calls = h.extractor.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![AGENDA, LANDING, SPEAKERS]);

        assert_eq!(stats.urls_processed, 3);
        assert_eq!(stats.documents_deferred, 1);
        assert_eq!(stats.documents_extracted, 3);
        assert_eq!(stats.records_created, 2);
        assert_eq!(stats.extraction_empty, 1);

        let ledger = h.storage.load_ledger().await.unwrap();
        assert_eq!(ledger, vec![LANDING, AGENDA, SPEAKERS]);
        assert!(h.storage.load_queue().await.unwrap().is_empty());
        assert_eq!(h.storage.load_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_link_budget_is_a_hard_stop() {
        let h = Harness::new();
        let mut config = config();
        config.crawler.max_links = 1;
        let stats = h.run(config, seeded(&[LANDING])).await;

        assert_eq!(stats.urls_processed, 1);
        assert_eq!(h.web.fetched(), vec![LANDING]);
        // the parked landing page is still extracted at shutdown
        assert_eq!(stats.documents_extracted, 1);
        assert_eq!(h.storage.load_queue().await.unwrap(), vec![AGENDA, SPEAKERS]);
    }

    #[tokio::test]
    async fn test_depth_budget_stops_link_following() {
        let h = Harness::new();
        let mut config = config();
        config.crawler.max_depth = 0;
        let stats = h.run(config, seeded(&[LANDING])).await;

        assert_eq!(h.web.fetched(), vec![LANDING]);
        assert_eq!(stats.documents_deferred, 0);
        assert_eq!(stats.records_created, 1);
    }

    #[tokio::test]
    async fn test_resume_skips_processed_urls() {
        let h = Harness::new();
        h.run(config(), seeded(&[LANDING])).await;
        let fetched_before = h.web.fetched().len();

        let options = CrawlOptions {
            resume: true,
            ..seeded(&[LANDING, AGENDA])
        };
        let stats = h.run(config(), options).await;

        assert_eq!(stats.urls_processed, 0);
        assert_eq!(h.web.fetched().len(), fetched_before);
        assert_eq!(h.storage.load_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_skipped() {
        let h = Harness::new();
        let stats = h.run(config(), seeded(&[BROKEN, LANDING])).await;

        assert_eq!(stats.fetch_failures, 1);
        assert_eq!(stats.records_created, 2);
        let ledger = h.storage.load_ledger().await.unwrap();
        assert!(!ledger.contains(&BROKEN.to_string()));
    }

    #[tokio::test]
    async fn test_search_refills_empty_frontier() {
        let h = Harness::new();
        let mut config = config();
        config.discovery.keywords = vec!["AI summit".into()];
        config.discovery.regions = vec!["Asia".into(), "Europe".into()];
        let options = CrawlOptions {
            search: true,
            ..CrawlOptions::default()
        };
        let stats = h.run(config, options).await;

        assert_eq!(stats.search_queries, 2);
        assert_eq!(h.web.fetched()[0], LANDING);
        assert_eq!(stats.records_created, 2);
    }

    #[tokio::test]
    async fn test_stats_written() {
        let h = Harness::new();
        h.run(config(), seeded(&[LANDING])).await;
        let stats: CrawlStats = serde_json::from_slice(
            &std::fs::read(h._tmp.path().join("stats.json")).unwrap(),
        )
        .unwrap();
        assert!(stats.end_time.is_some());
        assert_eq!(stats.urls_processed, 3);
    }

    struct SingleEvent;

    #[async_trait]
    impl SemanticExtractor for SingleEvent {
        async fn extract(&self, _text: &str, _url: &str, _title: &str) -> Result<String> {
            Ok(r#"```json
{"event_name": "AI Summit 2025", "dates": "March 3-4", "location": "San Francisco"}
```"#
                .to_string())
        }
    }

    #[tokio::test]
    async fn test_reingested_page_merges_into_one_record() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn CrawlStorage> = Arc::new(LocalStorage::new(tmp.path()));
        let records = RecordStore::open(storage, MergePolicy::default()).await.unwrap();
        let step = ExtractionStep::new(true);
        let doc = Document::new(
            "https://ai-summit.example.com/",
            "<p>Join us at AI Summit 2025, March 3-4, San Francisco. $500 early bird.</p>",
            "",
            DocumentMeta::at_depth(0),
        );

        let first = step.run(&SingleEvent, &doc).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].event_name.as_deref(), Some("AI Summit 2025"));
        assert!(first[0].prices().iter().any(|p| p.as_str() == Some("$500")));
        let created = records.store(first[0].clone()).await.unwrap();
        assert!(matches!(created, StoreOutcome::Created(_)));

        let second = step.run(&SingleEvent, &doc).await;
        let merged = records.store(second[0].clone()).await.unwrap();
        assert_eq!(merged, StoreOutcome::Merged(created.key().clone()));
        assert_eq!(std::fs::read_dir(tmp.path().join("events")).unwrap().count(), 1);
    }
}

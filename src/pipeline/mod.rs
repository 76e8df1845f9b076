//! Pipeline entry points for crawler operations.
//!
//! - `run_crawler`: Discover, fetch and extract event pages
//! - `summarize` / `repair_report`: Inspect persisted state and saved answers
//!
//! Plus the pure record stages: `repair`, `validate`, `merge`.

pub mod crawl;
pub mod inspect;
pub mod merge;
pub mod repair;
pub mod validate;

pub use crawl::{Collaborators, CrawlOptions, Crawler, run_crawler};
pub use inspect::{StorageSummary, repair_report, summarize};

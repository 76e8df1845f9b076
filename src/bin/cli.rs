//! Event Crawler CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use event_crawler::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, Collaborators, CrawlOptions},
    services::{HttpFetcher, LlmAgents, SearchAgent},
    storage::LocalStorage,
};

/// Event Crawler - LLM-guided tech event discovery
#[derive(Parser, Debug)]
#[command(
    name = "event-crawler",
    version,
    about = "Crawls the web for tech events and extracts structured records"
)]
struct Cli {
    /// Path to storage directory holding config, queue, ledger and events
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl from seeds, the saved queue and search results
    Crawl {
        /// Start URL (repeatable)
        #[arg(long = "seed", value_name = "URL")]
        seeds: Vec<String>,

        /// File with one start URL per line
        #[arg(long)]
        seeds_file: Option<PathBuf>,

        /// Re-queue the saved frontier snapshot
        #[arg(long)]
        resume: bool,

        /// Never ask the search agent for URLs
        #[arg(long)]
        no_search: bool,

        /// Override crawler.max_links
        #[arg(long)]
        max_links: Option<usize>,

        /// Override crawler.max_depth
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Validate configuration file
    Validate,

    /// Show queue, ledger and record counts
    Info,

    /// Recover event records from a saved model response
    Repair {
        /// File containing the raw response text
        file: PathBuf,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Seed URLs from a file; blank lines and `#` comments are ignored.
fn read_seeds(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

async fn run(cli: Cli) -> Result<()> {
    let storage = Arc::new(LocalStorage::new(&cli.storage_dir));
    let mut config = Config::load_or_default(storage.config_path());
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    match cli.command {
        Command::Crawl {
            mut seeds,
            seeds_file,
            resume,
            no_search,
            max_links,
            max_depth,
        } => {
            if let Some(n) = max_links {
                config.crawler.max_links = n;
            }
            if let Some(n) = max_depth {
                config.crawler.max_depth = n;
            }
            config.validate()?;

            if let Some(path) = seeds_file {
                seeds.extend(read_seeds(&path)?);
            }

            let agents = Arc::new(LlmAgents::from_config(&config)?);
            let collaborators = Collaborators {
                fetcher: Arc::new(HttpFetcher::new(&config.crawler)?),
                navigator: agents.clone(),
                extractor: agents.clone(),
                search: (!no_search).then(|| agents as Arc<dyn SearchAgent>),
            };
            let options = CrawlOptions {
                seeds,
                resume,
                search: !no_search,
            };

            let stats =
                pipeline::run_crawler(Arc::new(config), storage, collaborators, &options).await?;
            log::info!(
                "Processed {} URL(s): {} fetch failure(s), {} record(s) created, {} merged",
                stats.urls_processed,
                stats.fetch_failures,
                stats.records_created,
                stats.records_merged
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} event terms, {} search queries)",
                config.discovery.event_terms.len(),
                config.search_queries().len()
            );
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            let summary = pipeline::summarize(storage.as_ref()).await?;
            log::info!("Queued URLs: {}", summary.queued);
            log::info!("Crawled URLs: {}", summary.crawled);
            log::info!("Event records: {}", summary.records);
        }

        Command::Repair { file } => {
            let response = std::fs::read_to_string(&file)?;
            match pipeline::repair_report(&response) {
                Ok(report) => println!("{report}"),
                Err(AppError::Validation(reason)) => {
                    log::warn!("Nothing recoverable in {}: {}", file.display(), reason);
                    println!("[]");
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Event Crawler starting...");

    let result = run(cli).await;
    match &result {
        Ok(()) => log::info!("Done!"),
        Err(e) => log::error!("Fatal: {}", e),
    }
    log::logger().flush();

    result
}

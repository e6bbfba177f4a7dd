//! # Scholar Feed
//!
//! Keeps a local SQLite mirror of recent arXiv submissions matching a keyword
//! query, and answers a few read-side questions about it.
//!
//! ## Usage
//!
//! ```sh
//! scholar_feed                 # run one ingestion pass
//! scholar_feed newest --page 2 # browse
//! ```
//!
//! ## Architecture
//!
//! An ingestion run is a single sequential pass:
//! 1. **Fetching**: Request pages of the feed, newest submissions first
//! 2. **Parsing**: Turn each raw entry into typed fields, logging anything missing
//! 3. **Gating**: Stop at the first entry published before the retention cutoff
//! 4. **Persisting**: Get-or-create authors and the article, then replace its author set
//!
//! Re-running is idempotent: already-stored articles and authors are reused.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod cutoff;
mod errors;
mod ingest;
mod models;
mod outputs;
mod parser;
mod scrapers;
mod store;
mod utils;

use cli::{BROWSE_PAGE_SIZE, Cli, Command};
use cutoff::CutoffPolicy;
use ingest::{IngestSettings, Ingestor};
use models::PageRequest;
use outputs::json;
use scrapers::arxiv::{ArxivClient, ArxivConfig};
use store::SqliteStore;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    let command = args.command();
    debug!(?command, database_url = %args.database_url, "Parsed CLI arguments");

    // Only ingestion may create a fresh database.
    let store = match command {
        Command::Ingest => SqliteStore::connect_or_create(&args.database_url).await?,
        _ => SqliteStore::connect(&args.database_url).await?,
    };
    let policy = CutoffPolicy::months_before(Utc::now(), args.retention_months);

    match command {
        Command::Ingest => run_ingestion(&args, store, policy).await,
        Command::Newest { page } => {
            let page = store
                .newest_articles(policy.cutoff(), PageRequest::new(page, BROWSE_PAGE_SIZE))
                .await?;
            json::print(&page).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Authors { page } => {
            let page = store
                .prolific_authors(policy.cutoff(), PageRequest::new(page, BROWSE_PAGE_SIZE))
                .await?;
            json::print(&page).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Article { id } => match store.article_detail(id).await? {
            Some(detail) => {
                json::print(&detail).await?;
                Ok(ExitCode::SUCCESS)
            }
            None => not_found("article", id),
        },
        Command::Author { id } => match store.author_detail(id, policy.cutoff()).await? {
            Some(detail) => {
                json::print(&detail).await?;
                Ok(ExitCode::SUCCESS)
            }
            None => not_found("author", id),
        },
    }
}

fn not_found(kind: &str, id: i64) -> Result<ExitCode, Box<dyn Error>> {
    warn!(kind, id, "Not found");
    Ok(ExitCode::FAILURE)
}

#[instrument(level = "info", skip_all, fields(retention_months = args.retention_months))]
async fn run_ingestion(
    args: &Cli,
    store: SqliteStore,
    policy: CutoffPolicy,
) -> Result<ExitCode, Box<dyn Error>> {
    let start_time = Instant::now();
    info!(cutoff = %policy.cutoff(), "Ingestion starting");

    let client = ArxivClient::new(ArxivConfig {
        base_url: args.api_base.clone(),
        search_query: args.search_query.clone(),
        timeout: Duration::from_secs(args.request_timeout_secs),
    })?;
    let settings = IngestSettings {
        page_size: args.page_size,
        page_delay: Duration::from_millis(args.page_delay_ms),
    };
    let ingestor = Ingestor::new(client, store, policy, settings);

    let progress = ingestor.run().await;
    let summary = ingest::report(&progress, ingestor.store(), start_time.elapsed()).await;

    if summary.state.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

//! Command-line interface definitions for Scholar Feed.
//!
//! All options have defaults, so a bare invocation runs one ingestion pass.
//! Connection settings can also be supplied through environment variables.

use crate::cutoff::DEFAULT_RETENTION_MONTHS;
use crate::ingest::DEFAULT_PAGE_SIZE;
use crate::scrapers::arxiv::{DEFAULT_API_BASE, DEFAULT_SEARCH_QUERY};
use clap::{Parser, Subcommand};

/// Maximum page size accepted by the arXiv export API.
pub const MAX_PAGE_SIZE: usize = 2000;

/// Rows per page for the browse subcommands.
pub const BROWSE_PAGE_SIZE: usize = 50;

/// Mirror recent arXiv submissions into a local database and browse them.
///
/// # Examples
///
/// ```sh
/// # Ingest into ./scholar.db
/// scholar_feed
///
/// # Ingest with a smaller window into another database
/// scholar_feed --database-url sqlite:///var/lib/scholar.db --retention-months 3 ingest
///
/// # Browse
/// scholar_feed newest --page 2
/// scholar_feed author 17
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite database URL
    #[arg(long, env = "SCHOLAR_DATABASE_URL", default_value = "sqlite://scholar.db")]
    pub database_url: String,

    /// Base URL of the arXiv query endpoint
    #[arg(long, env = "ARXIV_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// arXiv search expression
    #[arg(long, env = "ARXIV_SEARCH_QUERY", default_value = DEFAULT_SEARCH_QUERY)]
    pub search_query: String,

    /// Entries requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_page_size)]
    pub page_size: usize,

    /// Retention window in calendar months
    #[arg(long, default_value_t = DEFAULT_RETENTION_MONTHS)]
    pub retention_months: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Pause between page requests in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub page_delay_ms: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch new submissions and upsert them (default)
    Ingest,
    /// List articles inside the retention window, newest first
    Newest {
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// List authors by number of articles inside the retention window
    Authors {
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Show one article with its authors
    Article { id: i64 },
    /// Show one author with their articles inside the retention window
    Author { id: i64 },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Ingest)
    }
}

fn parse_page_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|e| format!("{e}"))?;
    if (1..=MAX_PAGE_SIZE).contains(&size) {
        Ok(size)
    } else {
        Err(format!("page size must be between 1 and {MAX_PAGE_SIZE}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_run_ingestion() {
        let cli = Cli::parse_from(["scholar_feed"]);

        assert_eq!(cli.command(), Command::Ingest);
        assert_eq!(cli.page_size, 200);
        assert_eq!(cli.retention_months, 6);
        assert_eq!(cli.page_delay_ms, 3000);
        assert!(cli.search_query.contains("all:\"machine learning\""));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "scholar_feed",
            "--database-url",
            "sqlite::memory:",
            "--api-base",
            "http://localhost:8080/api/query",
            "--page-size",
            "50",
            "--retention-months",
            "3",
            "ingest",
        ]);

        assert_eq!(cli.database_url, "sqlite::memory:");
        assert_eq!(cli.api_base, "http://localhost:8080/api/query");
        assert_eq!(cli.page_size, 50);
        assert_eq!(cli.retention_months, 3);
        assert_eq!(cli.command(), Command::Ingest);
    }

    #[test]
    fn test_cli_browse_subcommands() {
        let cli = Cli::parse_from(["scholar_feed", "newest", "--page", "3"]);
        assert_eq!(cli.command(), Command::Newest { page: 3 });

        let cli = Cli::parse_from(["scholar_feed", "authors"]);
        assert_eq!(cli.command(), Command::Authors { page: 1 });

        let cli = Cli::parse_from(["scholar_feed", "article", "42"]);
        assert_eq!(cli.command(), Command::Article { id: 42 });

        let cli = Cli::parse_from(["scholar_feed", "author", "7"]);
        assert_eq!(cli.command(), Command::Author { id: 7 });
    }

    #[test]
    fn test_cli_rejects_out_of_range_page_size() {
        assert!(Cli::try_parse_from(["scholar_feed", "--page-size", "0"]).is_err());
        assert!(Cli::try_parse_from(["scholar_feed", "--page-size", "2001"]).is_err());
        assert!(Cli::try_parse_from(["scholar_feed", "--page-size", "2000"]).is_ok());
    }
}

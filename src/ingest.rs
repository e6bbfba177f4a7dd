//! Ingestion driver.
//!
//! Pages through the remote feed, parses each entry, gates it on the
//! retention window, and upserts it. The run is an explicit state machine:
//! a [`Progress`] value is threaded through [`Ingestor::step`] until it
//! reaches a terminal [`RunState`].
//!
//! ```text
//!             +--------- cutoff entry seen ---------> StoppedByCutoff
//! Running ----+--------- offset >= total -----------> StoppedByExhaustion
//!    ^   |    +--------- any IngestError -----------> Failed
//!    +---+ next page
//! ```
//!
//! Entries are committed one at a time; a failure leaves everything ingested
//! before it in place.

use crate::cutoff::{CutoffPolicy, FeedOrder};
use crate::errors::IngestError;
use crate::models::RemotePage;
use crate::parser::{article_key, missing_fields, parse_entry};
use crate::scrapers::PageFetcher;
use crate::store::{ScholarStore, SqliteStore};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    StoppedByCutoff,
    StoppedByExhaustion,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunState::StoppedByCutoff | RunState::StoppedByExhaustion)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "RUNNING",
            RunState::StoppedByCutoff => "STOPPED_BY_CUTOFF",
            RunState::StoppedByExhaustion => "STOPPED_BY_EXHAUSTION",
            RunState::Failed => "FAILED",
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub pages_fetched: usize,
    pub entries_seen: usize,
    pub entries_skipped: usize,
    pub articles_created: usize,
    pub articles_existing: usize,
    pub authors_created: usize,
}

impl RunStats {
    pub fn entries_persisted(&self) -> usize {
        self.articles_created + self.articles_existing
    }
}

/// The state of one run, passed from step to step.
#[derive(Debug)]
pub struct Progress {
    pub state: RunState,
    /// Offset of the next page to fetch.
    pub offset: usize,
    /// Total result count. Starts above one page so the first fetch happens.
    pub total_results: usize,
    pub stats: RunStats,
    /// Set when `state` is [`RunState::Failed`].
    pub error: Option<IngestError>,
    order: FeedOrder,
}

impl Progress {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: RunState::Running,
            offset: 0,
            total_results: page_size + 1,
            stats: RunStats::default(),
            error: None,
            order: FeedOrder::default(),
        }
    }
}

/// What a finished run reports. Database totals are `None` when they could
/// not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,
    pub stats: RunStats,
    pub articles_total: Option<usize>,
    pub authors_total: Option<usize>,
}

/// Log how a run ended, then the database totals.
///
/// The terminal state, the root error, and the run counters are always logged
/// first. The totals are best-effort: a failing count query is logged as a
/// warning and left out of the summary.
///
/// # Arguments
///
/// * `progress` - The terminal progress returned by [`Ingestor::run`]
/// * `store` - The store the run wrote to
/// * `elapsed` - Wall-clock duration of the run
///
/// # Returns
///
/// A [`RunSummary`] whose `state` is taken from `progress`.
pub async fn report(progress: &Progress, store: &SqliteStore, elapsed: Duration) -> RunSummary {
    let stats = progress.stats;
    match (&progress.state, &progress.error) {
        (RunState::Failed, Some(e)) => {
            error!(error = %e, offset = progress.offset, "Ingestion failed");
        }
        (state, _) => {
            info!(state = state.as_str(), "Ingestion stopped");
        }
    }
    info!(
        state = progress.state.as_str(),
        pages = stats.pages_fetched,
        entries_seen = stats.entries_seen,
        entries_skipped = stats.entries_skipped,
        entries_persisted = stats.entries_persisted(),
        articles_created = stats.articles_created,
        articles_existing = stats.articles_existing,
        authors_created = stats.authors_created,
        ?elapsed,
        "Execution complete"
    );

    let articles_total = match store.count_articles().await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "Could not count stored articles");
            None
        }
    };
    let authors_total = match store.count_authors().await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "Could not count stored authors");
            None
        }
    };
    info!(?articles_total, ?authors_total, "Database totals");

    RunSummary {
        state: progress.state,
        stats,
        articles_total,
        authors_total,
    }
}

/// Result of working through a single page.
enum PageOutcome {
    Completed,
    ReachedCutoff,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub page_size: usize,
    /// Pause before each page after the first.
    pub page_delay: Duration,
}

pub struct Ingestor<F, S> {
    fetcher: F,
    store: S,
    policy: CutoffPolicy,
    settings: IngestSettings,
}

impl<F, S> Ingestor<F, S>
where
    F: PageFetcher,
    S: ScholarStore,
{
    pub fn new(fetcher: F, store: S, policy: CutoffPolicy, settings: IngestSettings) -> Self {
        let settings = IngestSettings {
            page_size: settings.page_size.max(1),
            ..settings
        };
        Self {
            fetcher,
            store,
            policy,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run until a terminal state is reached.
    #[instrument(level = "info", skip_all, fields(cutoff = %self.policy.cutoff(), page_size = self.settings.page_size))]
    pub async fn run(&self) -> Progress {
        let mut progress = Progress::new(self.settings.page_size);
        while !progress.state.is_terminal() {
            if progress.offset > 0 && !self.settings.page_delay.is_zero() {
                sleep(self.settings.page_delay).await;
            }
            progress = self.step(progress).await;
        }
        progress
    }

    /// Fetch and process the page at `progress.offset`, then decide the next state.
    pub async fn step(&self, mut progress: Progress) -> Progress {
        if progress.state.is_terminal() {
            return progress;
        }

        match self.ingest_page(&mut progress).await {
            Ok(PageOutcome::ReachedCutoff) => {
                progress.state = RunState::StoppedByCutoff;
            }
            Ok(PageOutcome::Completed) => {
                progress.offset += self.settings.page_size;
                if progress.offset >= progress.total_results {
                    progress.state = RunState::StoppedByExhaustion;
                }
            }
            Err(e) => {
                progress.state = RunState::Failed;
                progress.error = Some(e);
            }
        }
        progress
    }

    async fn ingest_page(&self, progress: &mut Progress) -> Result<PageOutcome, IngestError> {
        let page = self
            .fetcher
            .fetch(progress.offset, self.settings.page_size)
            .await?;
        progress.stats.pages_fetched += 1;

        if progress.offset == 0
            && let Some(total) = page.total_results
        {
            progress.total_results = total;
        }
        info!(
            offset = progress.offset,
            total_results = progress.total_results,
            entries = page.entries.len(),
            "Processing page"
        );

        self.ingest_entries(page, progress).await
    }

    async fn ingest_entries(
        &self,
        page: RemotePage,
        progress: &mut Progress,
    ) -> Result<PageOutcome, IngestError> {
        for (index, raw) in page.entries.iter().enumerate() {
            progress.stats.entries_seen += 1;
            let position = page.offset + index;

            let (entry, warnings) = parse_entry(raw)?;
            for warning in warnings.iter().chain(missing_fields(&entry).iter()) {
                warn!(position, external_id = ?entry.external_id, %warning, "Incomplete entry");
            }

            let Some(key) = article_key(&entry) else {
                warn!(position, "Skipping entry without id or publish time");
                progress.stats.entries_skipped += 1;
                continue;
            };

            if let Err(previous) = progress.order.observe(key.published_at) {
                return Err(IngestError::OutOfOrder {
                    external_id: key.external_id,
                    previous,
                    current: key.published_at,
                });
            }

            if !self.policy.is_within_window(key.published_at) {
                info!(
                    position,
                    external_id = %key.external_id,
                    published_at = %key.published_at,
                    cutoff = %self.policy.cutoff(),
                    "Reached entry older than cutoff; stopping"
                );
                return Ok(PageOutcome::ReachedCutoff);
            }

            let upsert = self.store.upsert_article(&key, &entry.author_names).await?;
            if upsert.article_created {
                progress.stats.articles_created += 1;
            } else {
                progress.stats.articles_existing += 1;
            }
            progress.stats.authors_created += upsert.authors_created;
            debug!(
                position,
                article_id = upsert.article.id,
                created = upsert.article_created,
                "Ingested entry"
            );
        }
        Ok(PageOutcome::Completed)
    }
}

//! Crawl engine - worker pool, admission and shutdown
//!
//! The engine owns a bounded frontier drained by a fixed pool of workers.
//! Workers are producers as well as consumers, so natural completion is
//! detected with the in-flight counter: a task is counted before it is
//! pushed and released only after every admission it makes has finished.
//! The reaper closes the frontier when the count reaches zero, which can only
//! happen once no task is left that could admit more work.

use crate::crawler::fetcher::{read_body, Fetcher};
use crate::crawler::frontier::{Admitted, Frontier, InFlight, InFlightGuard, Pop};
use crate::crawler::parser::LinkExtractor;
use crate::crawler::{CrawlSummary, CrawledRecord, Task};
use crate::storage::{RecordStore, VisitedSet};
use crate::url::{host_key, parse_seed, HostScope};
use crate::CrawlError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Upper bound on a single record save
pub const SAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for a crawl run
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Number of workers, and the frontier capacity
    pub worker_count: usize,

    /// Deepest level whose links are still followed; the seed is depth 0
    pub max_depth: u32,

    /// Only admit links whose host matches the seed's host
    pub same_host: bool,

    /// Upper bound on a single record save
    pub save_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            worker_count: 10,
            max_depth: 2,
            same_host: true,
            save_timeout: SAVE_TIMEOUT,
        }
    }
}

/// Breadth-first crawl engine
pub struct Engine {
    settings: EngineSettings,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn LinkExtractor>,
    records: Arc<dyn RecordStore>,
    visited: Arc<dyn VisitedSet>,
}

impl Engine {
    /// Creates an engine from its collaborators
    pub fn new(
        settings: EngineSettings,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn LinkExtractor>,
        records: Arc<dyn RecordStore>,
        visited: Arc<dyn VisitedSet>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            extractor,
            records,
            visited,
        }
    }

    /// Crawls outward from `start_url` until the frontier is exhausted or
    /// `cancel` fires
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlSummary)` - Every reachable task was processed
    /// * `Err(CrawlError::InvalidSeed)` - `start_url` is not an absolute HTTP(S) URL
    /// * `Err(CrawlError::StateUnavailable)` - The visited set failed while admitting the seed
    /// * `Err(CrawlError::Cancelled)` - `cancel` fired before the crawl finished
    /// * `Err(CrawlError::WorkerFailed)` - A worker panicked
    ///
    /// No worker or admission task outlives this call.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        start_url: &str,
    ) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();

        let seed = parse_seed(start_url).map_err(|e| CrawlError::InvalidSeed {
            url: start_url.to_string(),
            reason: e.to_string(),
        })?;
        let start_host = host_key(&seed).ok_or_else(|| CrawlError::InvalidSeed {
            url: start_url.to_string(),
            reason: "missing host".to_string(),
        })?;

        // Workers and admissions stop on this token; a failed worker cancels
        // it without cancelling the caller's token.
        let run_cancel = cancel.child_token();

        let worker_count = self.settings.worker_count.max(1);
        let frontier = Frontier::new(worker_count);
        let in_flight = InFlight::new();
        let admissions = TaskTracker::new();

        let shared = Arc::new(Shared {
            settings: self.settings.clone(),
            scope: HostScope::new(start_host, self.settings.same_host),
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            records: Arc::clone(&self.records),
            visited: Arc::clone(&self.visited),
            frontier: frontier.clone(),
            in_flight: in_flight.clone(),
            admissions: admissions.clone(),
            cancel: run_cancel.clone(),
            stats: Stats::default(),
        });

        tracing::info!(
            "Starting crawl of {} with {} workers (max depth {}, same host: {})",
            seed,
            worker_count,
            self.settings.max_depth,
            self.settings.same_host
        );

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(Arc::clone(&shared).work(id));
        }

        // Seed admission
        match until_cancelled(&run_cancel, self.visited.try_insert(seed.as_str())).await {
            None => tracing::info!("Cancelled before the seed was admitted"),
            Some(Err(e)) => {
                tracing::error!("Visited set unavailable while admitting seed: {}", e);
                frontier.close();
                join_workers(&mut workers).await;
                return Err(CrawlError::StateUnavailable(e));
            }
            Some(Ok(false)) => {
                tracing::info!("Seed already visited, nothing to crawl: {}", seed);
            }
            Some(Ok(true)) => {
                if shared.admit(Task::seed(seed.as_str())).await.is_err() {
                    tracing::info!("Cancelled before the seed reached the frontier");
                }
            }
        }

        let reaper = {
            let frontier = frontier.clone();
            let in_flight = in_flight.clone();
            tokio::spawn(async move {
                in_flight.wait_idle().await;
                tracing::debug!("No tasks in flight, closing frontier");
                frontier.close();
            })
        };

        let worker_error = join_workers(&mut workers).await;
        if worker_error.is_some() {
            run_cancel.cancel();
        }

        // Pushes abort once the run is cancelled, so no admission can block
        // on a full frontier here.
        admissions.close();
        admissions.wait().await;

        // Tasks still queued after cancellation; dropping them releases their
        // counts so the reaper can finish.
        let discarded = frontier.discard_pending().await;
        if discarded > 0 {
            tracing::info!("Discarded {} queued tasks after cancellation", discarded);
        }

        reaper.await?;

        if let Some(e) = worker_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        let summary = shared.stats.summary(started.elapsed());
        tracing::info!(
            "Crawl completed: {} pages saved, {} dropped, {} links admitted in {:?}",
            summary.pages_saved,
            summary.pages_dropped,
            summary.links_admitted,
            summary.elapsed
        );

        Ok(summary)
    }
}

/// Waits for every worker; returns the first failure other than cancellation
async fn join_workers(workers: &mut JoinSet<Result<(), CrawlError>>) -> Option<CrawlError> {
    let mut first_error = None;

    while let Some(joined) = workers.join_next().await {
        let error = match joined {
            Ok(Ok(())) | Ok(Err(CrawlError::Cancelled)) => continue,
            Ok(Err(e)) => e,
            Err(e) => CrawlError::WorkerFailed(e),
        };

        tracing::error!("Worker failed: {}", error);
        first_error.get_or_insert(error);
    }

    first_error
}

/// Runs `fut` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

#[derive(Debug, Default)]
struct Stats {
    pages_saved: AtomicU64,
    pages_dropped: AtomicU64,
    save_failures: AtomicU64,
    links_admitted: AtomicU64,
}

impl Stats {
    fn summary(&self, elapsed: Duration) -> CrawlSummary {
        CrawlSummary {
            pages_saved: self.pages_saved.load(Ordering::Relaxed),
            pages_dropped: self.pages_dropped.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
            links_admitted: self.links_admitted.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Outcome of the fetch, read and parse steps for one page
#[derive(Debug)]
enum Download {
    Links(Vec<String>),
    /// The page could not be fetched or parsed and is dropped
    Failed,
    /// The run was cancelled mid-download
    Cancelled,
}

/// State shared by the workers and admission tasks of one run
struct Shared {
    settings: EngineSettings,
    scope: HostScope,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn LinkExtractor>,
    records: Arc<dyn RecordStore>,
    visited: Arc<dyn VisitedSet>,
    frontier: Frontier,
    in_flight: InFlight,
    admissions: TaskTracker,
    cancel: CancellationToken,
    stats: Stats,
}

impl Shared {
    /// Worker loop: process tasks until the frontier closes or the run is
    /// cancelled
    async fn work(self: Arc<Self>, id: usize) -> Result<(), CrawlError> {
        tracing::trace!("Worker {} started", id);

        loop {
            match self.frontier.pop(&self.cancel).await {
                Pop::Task(Admitted { task, guard }) => self.process(task, guard).await,
                Pop::Closed => {
                    tracing::trace!("Worker {} done, frontier closed", id);
                    return Ok(());
                }
                Pop::Cancelled => {
                    tracing::trace!("Worker {} stopping, crawl cancelled", id);
                    return Err(CrawlError::Cancelled);
                }
            }
        }
    }

    /// Counts `task` as in flight and pushes it onto the frontier
    ///
    /// If the push is aborted the task is dropped together with its guard,
    /// so the count is released on that path as well.
    async fn admit(&self, task: Task) -> Result<(), CrawlError> {
        let guard = self.in_flight.acquire();
        self.frontier
            .push(Admitted { task, guard }, &self.cancel)
            .await
            .map_err(|_| CrawlError::Cancelled)
    }

    /// Fetches, parses and saves one page, then hands its links to an
    /// admission task
    ///
    /// `guard` is released when this page and all of its admissions are done.
    async fn process(self: &Arc<Self>, task: Task, guard: InFlightGuard) {
        let span = tracing::info_span!("page", url = %task.url, depth = task.depth);
        self.process_page(task, guard).instrument(span).await
    }

    async fn process_page(self: &Arc<Self>, task: Task, guard: InFlightGuard) {
        tracing::info!("Processing page");

        let links = match self.download_links(&task).await {
            Download::Links(links) => links,
            Download::Failed => {
                self.stats.pages_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Download::Cancelled => {
                tracing::debug!("Cancelled while downloading page");
                return;
            }
        };

        let record = CrawledRecord::new(&task, links);
        let save = tokio::time::timeout(self.settings.save_timeout, self.records.save(&record));
        match until_cancelled(&self.cancel, save).await {
            None => {
                tracing::debug!("Cancelled while saving record");
                return;
            }
            Some(Err(_)) => {
                tracing::warn!("Saving record timed out after {:?}", self.settings.save_timeout);
                self.stats.save_failures.fetch_add(1, Ordering::Relaxed);
            }
            Some(Ok(Err(e))) => {
                tracing::warn!("Failed to save record: {}", e);
                self.stats.save_failures.fetch_add(1, Ordering::Relaxed);
            }
            Some(Ok(Ok(()))) => {
                self.stats.pages_saved.fetch_add(1, Ordering::Relaxed);
            }
        }

        if task.depth >= self.settings.max_depth {
            tracing::debug!("Maximum depth reached, links not followed");
            return;
        }

        if record.found_links.is_empty() {
            return;
        }

        // Admissions block on a full frontier. Running them beside the
        // worker keeps the pool draining while they wait.
        let shared = Arc::clone(self);
        self.admissions.spawn(async move {
            shared.admit_links(&task, record.found_links).await;
            drop(guard);
        });
    }

    /// Fetch, read and parse steps
    async fn download_links(&self, task: &Task) -> Download {
        let body = match until_cancelled(&self.cancel, self.fetcher.fetch(&task.url)).await {
            None => return Download::Cancelled,
            Some(Ok(body)) => body,
            Some(Err(e)) => {
                tracing::warn!("Failed to fetch page: {}", e);
                return Download::Failed;
            }
        };

        let html = match until_cancelled(&self.cancel, read_body(body)).await {
            None => return Download::Cancelled,
            Some(Ok(html)) => html,
            Some(Err(e)) => {
                tracing::warn!("Failed to read response body: {}", e);
                return Download::Failed;
            }
        };

        match self.extractor.parse_links(&task.url, &html) {
            Ok(links) => {
                tracing::debug!("Found {} links", links.len());
                Download::Links(links)
            }
            Err(e) => {
                tracing::warn!("Failed to parse page: {}", e);
                Download::Failed
            }
        }
    }

    /// Scope filter, visited-set check and push for each link of `parent`
    async fn admit_links(&self, parent: &Task, links: Vec<String>) {
        for link in links {
            if !self.scope.allows(&link) {
                tracing::debug!(url = %link, "Out of scope, skipped");
                continue;
            }

            match until_cancelled(&self.cancel, self.visited.try_insert(&link)).await {
                None => break,
                Some(Err(e)) => {
                    tracing::warn!(url = %link, "Visited set insert failed, link skipped: {}", e);
                    continue;
                }
                Some(Ok(false)) => continue,
                Some(Ok(true)) => {}
            }

            if self.admit(parent.child(link)).await.is_err() {
                tracing::debug!(url = %parent.url, "Cancelled while admitting links");
                break;
            }
            self.stats.links_admitted.fetch_add(1, Ordering::Relaxed);
        }
    }
}

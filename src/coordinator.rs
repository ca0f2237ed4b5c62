//! Drives seeds through list pages, detail pages, admission and the store.

use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::CrawlConfig;
use crate::error::{CrawlError, StoreError};
use crate::filter::{FilterChain, FilterDecision};
use crate::http_client::FetchClient;
use crate::movie_store::{DedupStore, UpsertOutcome, KEY_FIELD};
use crate::parser::{extract_candidates, extract_director};
use crate::planner::{DetailRequest, RequestPlanner, SeedRequest, Skip};
use crate::rate_limiter::RateLimiter;
use crate::state::CrawlState;
use crate::stats::{CrawlPhase, CrawlerStats, DropReason};

/// Work item on the shared queue. A detail request carries the candidate it will enrich.
#[derive(Debug, Clone)]
pub enum CrawlRequest {
    List(SeedRequest),
    Detail(DetailRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    Completed,
    /// The store went away; records persisted before that remain.
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,
    pub persisted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub lists_fetched: usize,
    pub details_fetched: usize,
    pub drops: BTreeMap<DropReason, usize>,
}

impl CrawlReport {
    pub fn dropped(&self, reason: DropReason) -> usize {
        self.drops.get(&reason).copied().unwrap_or(0)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, CrawlOutcome::Aborted { .. })
    }
}

/// Queue shared by list and detail requests. Closes itself once nothing is queued or in flight.
struct Frontier {
    tx: Mutex<Option<mpsc::UnboundedSender<CrawlRequest>>>,
    pending: AtomicUsize,
}

impl Frontier {
    fn new(tx: mpsc::UnboundedSender<CrawlRequest>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            pending: AtomicUsize::new(0),
        }
    }

    /// `false` once the frontier has been closed.
    fn push(&self, request: CrawlRequest) -> bool {
        let Ok(guard) = self.tx.lock() else {
            return false;
        };
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        if tx.send(request).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Marks one request as resolved. Requests only enqueue children before they resolve,
    /// so reaching zero means no more work can appear.
    fn resolve_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.close();
        }
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

/// Per-run mutable state. A new run starts from zero.
struct Run {
    frontier: Frontier,
    state: CrawlState,
    aborted: AtomicBool,
    abort_reason: Mutex<Option<String>>,
}

impl Run {
    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// `true` for the call that actually aborted the run.
    fn abort(&self, err: &StoreError) -> bool {
        if self.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Ok(mut reason) = self.abort_reason.lock() {
            *reason = Some(err.to_string());
        }
        self.frontier.close();
        true
    }
}

pub struct CrawlCoordinator<C, S> {
    config: CrawlConfig,
    client: C,
    store: S,
    planner: RequestPlanner,
    filters: FilterChain,
    rate_limiter: RateLimiter,
    stats: Arc<CrawlerStats>,
}

impl<C: FetchClient, S: DedupStore> CrawlCoordinator<C, S> {
    /// Fails fast on invalid configuration, before anything is fetched.
    pub fn new(config: CrawlConfig, client: C, store: S) -> Result<Self, CrawlError> {
        config.validate()?;
        Ok(Self {
            planner: RequestPlanner::new(&config),
            filters: FilterChain::standard(config.min_rating, config.quota),
            rate_limiter: RateLimiter::new(config.dispatch_delay),
            stats: Arc::new(CrawlerStats::new()),
            config,
            client,
            store,
        })
    }

    /// Handle for observers such as the dashboard.
    pub fn stats(&self) -> Arc<CrawlerStats> {
        self.stats.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the crawl to completion. Counters start from zero on every call.
    ///
    /// Errors only if the store cannot be prepared. Losing the store mid-run is reported
    /// through [`CrawlOutcome::Aborted`] together with what was persisted before.
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        self.stats.reset();
        self.store.ensure_unique_key(KEY_FIELD)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let run = Run {
            frontier: Frontier::new(tx),
            state: CrawlState::new(self.config.quota),
            aborted: AtomicBool::new(false),
            abort_reason: Mutex::new(None),
        };

        self.stats.set_phase(CrawlPhase::Seeding);
        info!(
            concurrency = self.config.concurrency,
            delay_ms = self.rate_limiter.delay().as_millis() as u64,
            quota = self.config.quota,
            "starting crawl"
        );
        let mut seeds = 0;
        for seed in self.planner.seed_requests(self.config.start_year, self.config.year_span) {
            info!(year = seed.year, min_votes = self.config.min_votes, "queuing list request");
            if run.frontier.push(CrawlRequest::List(seed)) {
                seeds += 1;
            }
        }
        self.stats.queue_size.store(seeds, Ordering::Relaxed);
        if run.frontier.pending() == 0 {
            run.frontier.close();
        }

        self.stats.set_phase(CrawlPhase::Crawling);
        UnboundedReceiverStream::new(rx)
            .for_each_concurrent(self.config.concurrency, |request| {
                let run = &run;
                async move {
                    self.stats.queue_size.fetch_sub(1, Ordering::Relaxed);
                    self.stats.active_workers.fetch_add(1, Ordering::Relaxed);

                    self.handle(request, run).await;

                    self.stats.active_workers.fetch_sub(1, Ordering::Relaxed);
                    run.frontier.resolve_one();
                }
            })
            .await;

        let outcome = match run.abort_reason.lock().ok().and_then(|mut r| r.take()) {
            Some(reason) => {
                self.stats.set_phase(CrawlPhase::Aborted);
                CrawlOutcome::Aborted { reason }
            }
            None => {
                self.stats.set_phase(CrawlPhase::Done);
                CrawlOutcome::Completed
            }
        };

        let report = self.report(outcome);
        info!(
            persisted = report.persisted,
            lists = report.lists_fetched,
            details = report.details_fetched,
            aborted = report.is_aborted(),
            "crawl finished"
        );
        Ok(report)
    }

    async fn handle(&self, request: CrawlRequest, run: &Run) {
        if run.is_aborted() {
            self.stats.record_drop(DropReason::Discarded);
            return;
        }
        match request {
            CrawlRequest::List(seed) => self.handle_list(seed, run).await,
            CrawlRequest::Detail(detail) => self.handle_detail(detail, run).await,
        }
    }

    async fn handle_list(&self, seed: SeedRequest, run: &Run) {
        if run.state.quota_reached() {
            debug!(year = seed.year, "quota reached, skipping list page");
            self.stats.record_drop(DropReason::QuotaExceeded);
            return;
        }
        run.state.advance_year_cursor();

        let Some(html) = self.fetch(&seed.url, run).await else {
            return;
        };
        self.stats.lists_fetched.fetch_add(1, Ordering::Relaxed);

        let candidates = extract_candidates(&html, &seed.url);
        if candidates.is_empty() {
            debug!(year = seed.year, "list page has no entries");
            return;
        }
        info!(year = seed.year, candidates = candidates.len(), "parsed list page");

        for candidate in candidates {
            let title = candidate.title.clone();
            match self.planner.plan_detail(candidate, &self.filters, &run.state) {
                Ok(detail) => {
                    // Counted before the push so a worker popping it never sees the queue go negative.
                    self.stats.queue_size.fetch_add(1, Ordering::Relaxed);
                    if !run.frontier.push(CrawlRequest::Detail(detail)) {
                        self.stats.queue_size.fetch_sub(1, Ordering::Relaxed);
                        self.stats.record_drop(DropReason::Discarded);
                    }
                }
                Err(Skip::MissingUrl) => {
                    debug!(%title, "no detail link");
                    self.stats.record_drop(DropReason::MissingUrl);
                }
                Err(Skip::Rejected(reason)) => {
                    debug!(%title, %reason, "not expanded");
                    self.stats.record_drop(reason.into());
                }
            }
        }
    }

    async fn handle_detail(&self, detail: DetailRequest, run: &Run) {
        let Some(html) = self.fetch(&detail.url, run).await else {
            return;
        };
        self.stats.details_fetched.fetch_add(1, Ordering::Relaxed);

        let record = detail.candidate.enrich(extract_director(&html));

        if let FilterDecision::Reject(reason) = self.filters.admit(&record.candidate, &run.state) {
            debug!(title = %record.candidate.title, %reason, "not admitted");
            self.stats.record_drop(reason.into());
            return;
        }
        if !run.state.try_admit() {
            debug!(title = %record.candidate.title, "quota taken by a concurrent worker");
            self.stats.record_drop(DropReason::QuotaExceeded);
            return;
        }

        match self.store.upsert(&record) {
            Ok(outcome) => {
                self.stats.persisted.fetch_add(1, Ordering::Relaxed);
                let counter = match outcome {
                    UpsertOutcome::Inserted => &self.stats.inserted,
                    UpsertOutcome::Updated => &self.stats.updated,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                info!(
                    title = %record.candidate.title,
                    rating = record.candidate.effective_rating(),
                    director = %record.director,
                    admitted = run.state.admitted(),
                    quota = run.state.quota(),
                    "stored movie"
                );
            }
            Err(e) if e.is_fatal() => {
                run.state.release();
                if run.abort(&e) {
                    error!(error = %e, "store unavailable, aborting crawl");
                    self.stats.add_error(e.to_string());
                    self.stats.record_drop(DropReason::StoreUnavailable);
                } else {
                    debug!(url = %detail.url, "write failed after abort");
                    self.stats.record_drop(DropReason::Discarded);
                }
            }
            Err(e) => {
                run.state.release();
                error!(url = %detail.url, error = %e, "store rejected movie");
                self.stats.add_error(format!("{}: {}", detail.url, e));
                self.stats.record_drop(DropReason::ConstraintViolation);
            }
        }
    }

    /// Throttled fetch. `None` means the request was dropped and already counted.
    async fn fetch(&self, url: &str, run: &Run) -> Option<String> {
        self.rate_limiter.wait_if_needed().await;
        if run.is_aborted() {
            self.stats.record_drop(DropReason::Discarded);
            return None;
        }

        let result = self.client.fetch(url).await;
        if run.is_aborted() {
            self.stats.record_drop(DropReason::Discarded);
            return None;
        }

        match result {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                self.stats.add_error(format!("{url}: {e}"));
                self.stats.record_drop(DropReason::TransportFailure);
                None
            }
        }
    }

    fn report(&self, outcome: CrawlOutcome) -> CrawlReport {
        let drops = DropReason::ALL
            .iter()
            .map(|reason| (*reason, self.stats.dropped(*reason)))
            .filter(|(_, count)| *count > 0)
            .collect();

        CrawlReport {
            outcome,
            persisted: self.stats.persisted.load(Ordering::Relaxed),
            inserted: self.stats.inserted.load(Ordering::Relaxed),
            updated: self.stats.updated.load(Ordering::Relaxed),
            lists_fetched: self.stats.lists_fetched.load(Ordering::Relaxed),
            details_fetched: self.stats.details_fetched.load(Ordering::Relaxed),
            drops,
        }
    }
}

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::filter::RejectReason;

const MAX_ERRORS: usize = 10;
const MAX_RATE_SAMPLES: usize = 60;
const DROP_REASONS: usize = 7;

/// Every request or candidate the crawl gives up on is counted under exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    RatingBelowThreshold,
    QuotaExceeded,
    MissingUrl,
    TransportFailure,
    ConstraintViolation,
    /// The write that found the store gone and aborted the run.
    StoreUnavailable,
    /// Result arrived after the run was aborted.
    Discarded,
}

impl DropReason {
    pub const ALL: [DropReason; DROP_REASONS] = [
        DropReason::RatingBelowThreshold,
        DropReason::QuotaExceeded,
        DropReason::MissingUrl,
        DropReason::TransportFailure,
        DropReason::ConstraintViolation,
        DropReason::StoreUnavailable,
        DropReason::Discarded,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl From<RejectReason> for DropReason {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::RatingBelowThreshold => DropReason::RatingBelowThreshold,
            RejectReason::QuotaExceeded => DropReason::QuotaExceeded,
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropReason::RatingBelowThreshold => "rating-below-threshold",
            DropReason::QuotaExceeded => "quota-exceeded",
            DropReason::MissingUrl => "missing-url",
            DropReason::TransportFailure => "transport-failure",
            DropReason::ConstraintViolation => "constraint-violation",
            DropReason::StoreUnavailable => "store-unavailable",
            DropReason::Discarded => "discarded",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Seeding,
    Crawling,
    Done,
    Aborted,
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Live counters of one crawl, shared between the workers and the dashboard.
pub struct CrawlerStats {
    pub lists_fetched: AtomicUsize,
    pub details_fetched: AtomicUsize,
    pub persisted: AtomicUsize,
    pub inserted: AtomicUsize,
    pub updated: AtomicUsize,
    pub queue_size: AtomicUsize,
    pub active_workers: AtomicUsize,
    drops: [AtomicUsize; DROP_REASONS],
    phase: Mutex<CrawlPhase>,
    pub errors: Mutex<VecDeque<String>>,
    pub rate_history: Mutex<VecDeque<u64>>,
    pub start_time: Instant,
    detached: AtomicBool,
}

impl CrawlerStats {
    pub fn new() -> Self {
        Self {
            lists_fetched: AtomicUsize::new(0),
            details_fetched: AtomicUsize::new(0),
            persisted: AtomicUsize::new(0),
            inserted: AtomicUsize::new(0),
            updated: AtomicUsize::new(0),
            queue_size: AtomicUsize::new(0),
            active_workers: AtomicUsize::new(0),
            drops: Default::default(),
            phase: Mutex::new(CrawlPhase::Idle),
            errors: Mutex::new(VecDeque::with_capacity(MAX_ERRORS)),
            rate_history: Mutex::new(VecDeque::with_capacity(MAX_RATE_SAMPLES)),
            start_time: Instant::now(),
            detached: AtomicBool::new(false),
        }
    }

    /// Zeroes every per-run counter. Observers holding this handle keep seeing the new run.
    pub fn reset(&self) {
        for counter in [
            &self.lists_fetched,
            &self.details_fetched,
            &self.persisted,
            &self.inserted,
            &self.updated,
            &self.queue_size,
            &self.active_workers,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for drop in &self.drops {
            drop.store(0, Ordering::Relaxed);
        }
        if let Ok(mut errors) = self.errors.lock() {
            errors.clear();
        }
        if let Ok(mut history) = self.rate_history.lock() {
            history.clear();
        }
        self.set_phase(CrawlPhase::Idle);
    }

    pub fn record_drop(&self, reason: DropReason) {
        self.drops[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self, reason: DropReason) -> usize {
        self.drops[reason.index()].load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> usize {
        DropReason::ALL.iter().map(|r| self.dropped(*r)).sum()
    }

    pub fn set_phase(&self, phase: CrawlPhase) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase.lock().map(|p| *p).unwrap_or(CrawlPhase::Aborted)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase(), CrawlPhase::Done | CrawlPhase::Aborted)
    }

    pub fn add_error(&self, error: String) {
        if let Ok(mut errors) = self.errors.lock() {
            if errors.len() >= MAX_ERRORS {
                errors.pop_front();
            }
            errors.push_back(error);
        }
    }

    pub fn add_rate(&self, rate: u64) {
        if let Ok(mut history) = self.rate_history.lock() {
            if history.len() >= MAX_RATE_SAMPLES {
                history.pop_front();
            }
            history.push_back(rate);
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.lists_fetched.load(Ordering::Relaxed) + self.details_fetched.load(Ordering::Relaxed)
    }

    /// The dashboard was closed; the crawl keeps going.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Relaxed);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }
}

impl Default for CrawlerStats {
    fn default() -> Self {
        Self::new()
    }
}

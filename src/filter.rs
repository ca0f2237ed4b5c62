//! Admission rules applied before a candidate is expanded and again before it is stored.

use std::fmt;

use crate::record::CandidateRecord;
use crate::state::CrawlState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    RatingBelowThreshold,
    QuotaExceeded,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::RatingBelowThreshold => write!(f, "rating-below-threshold"),
            RejectReason::QuotaExceeded => write!(f, "quota-exceeded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Admit,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_admit(&self) -> bool {
        matches!(self, FilterDecision::Admit)
    }
}

/// One admission predicate.
pub trait AdmissionRule: Send + Sync {
    fn check(&self, record: &CandidateRecord, state: &CrawlState) -> FilterDecision;
}

/// Inclusive rating floor. A missing rating counts as 0.0.
#[derive(Debug, Clone, Copy)]
pub struct MinRating(pub f64);

impl AdmissionRule for MinRating {
    fn check(&self, record: &CandidateRecord, _state: &CrawlState) -> FilterDecision {
        if record.rating.is_some() && record.effective_rating() >= self.0 {
            FilterDecision::Admit
        } else {
            FilterDecision::Reject(RejectReason::RatingBelowThreshold)
        }
    }
}

/// Hard global cap on admitted records.
#[derive(Debug, Clone, Copy)]
pub struct Quota(pub usize);

impl AdmissionRule for Quota {
    fn check(&self, _record: &CandidateRecord, state: &CrawlState) -> FilterDecision {
        if state.admitted() < self.0 {
            FilterDecision::Admit
        } else {
            FilterDecision::Reject(RejectReason::QuotaExceeded)
        }
    }
}

/// Rules run in insertion order; the first rejection wins.
pub struct FilterChain {
    rules: Vec<Box<dyn AdmissionRule>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Rating floor, then quota.
    pub fn standard(min_rating: f64, quota: usize) -> Self {
        Self::new().with(MinRating(min_rating)).with(Quota(quota))
    }

    pub fn with(mut self, rule: impl AdmissionRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn admit(&self, record: &CandidateRecord, state: &CrawlState) -> FilterDecision {
        self.rules
            .iter()
            .map(|rule| rule.check(record, state))
            .find(|decision| !decision.is_admit())
            .unwrap_or(FilterDecision::Admit)
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

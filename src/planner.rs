use crate::config::CrawlConfig;
use crate::filter::{FilterChain, FilterDecision, RejectReason};
use crate::record::CandidateRecord;
use crate::state::CrawlState;

/// List page fetch for one release year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRequest {
    pub year: i32,
    pub url: String,
}

/// Detail page fetch for a candidate that passed the pre-filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRequest {
    pub url: String,
    pub candidate: CandidateRecord,
}

/// Why a list entry was not expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    MissingUrl,
    Rejected(RejectReason),
}

/// Builds seed URLs and turns list entries into detail fetches.
#[derive(Debug, Clone)]
pub struct RequestPlanner {
    base_url: String,
    min_rating: f64,
    min_votes: u64,
    items_per_page: u32,
}

impl RequestPlanner {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            min_rating: config.min_rating,
            min_votes: config.min_votes,
            items_per_page: config.items_per_page,
        }
    }

    /// One request per year in `start_year - year_span + 1 ..= start_year`, newest first.
    ///
    /// The iterator holds no state beyond its range, so calling this again restarts the sequence.
    pub fn seed_requests(
        &self,
        start_year: i32,
        year_span: u32,
    ) -> impl Iterator<Item = SeedRequest> + '_ {
        (0..year_span).map(move |offset| {
            let year = start_year.saturating_sub_unsigned(offset);
            SeedRequest { year, url: self.seed_url(year) }
        })
    }

    pub fn seed_url(&self, year: i32) -> String {
        format!(
            "{}/search/title/?title_type=feature&release_date={year}-01-01,{year}-12-31&user_rating={:.1},10.0&num_votes={},&sort=user_rating,desc&count={}",
            self.base_url, self.min_rating, self.min_votes, self.items_per_page
        )
    }

    /// `None` when there is nowhere to go or the list-level data already disqualifies the candidate.
    pub fn expand(
        &self,
        candidate: CandidateRecord,
        filters: &FilterChain,
        state: &CrawlState,
    ) -> Option<DetailRequest> {
        self.plan_detail(candidate, filters, state).ok()
    }

    /// Like [`expand`](Self::expand) but says why nothing was planned.
    /// Filter rules are checked before the URL so a bad rating wins over a missing link.
    pub fn plan_detail(
        &self,
        candidate: CandidateRecord,
        filters: &FilterChain,
        state: &CrawlState,
    ) -> Result<DetailRequest, Skip> {
        if let FilterDecision::Reject(reason) = filters.admit(&candidate, state) {
            return Err(Skip::Rejected(reason));
        }
        match candidate.url.clone() {
            Some(url) => Ok(DetailRequest { url, candidate }),
            None => Err(Skip::MissingUrl),
        }
    }
}

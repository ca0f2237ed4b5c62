//! Crawl parameters, store location and their command-line surface.

use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://www.imdb.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const MAX_ITEMS_PER_PAGE: u32 = 250;

/// Seed and admission parameters for one crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub start_year: i32,
    pub year_span: u32,
    pub min_rating: f64,
    pub min_votes: u64,
    pub items_per_page: u32,
    pub quota: usize,
    pub concurrency: usize,
    pub dispatch_delay: Duration,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_year: 2024,
            year_span: 55,
            min_rating: 8.0,
            min_votes: 25_000,
            items_per_page: 50,
            quota: 1000,
            concurrency: 16,
            dispatch_delay: Duration::from_millis(250),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CrawlConfig {
    /// Rejects values that would make the run meaningless. Called before any request is issued.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quota == 0 {
            return Err(ConfigError::ZeroQuota);
        }
        if self.year_span == 0 {
            return Err(ConfigError::ZeroYearSpan);
        }
        if i64::from(self.start_year) - i64::from(self.year_span) + 1 < 1 {
            return Err(ConfigError::YearSpanTooLong {
                start: self.start_year,
                span: self.year_span,
            });
        }
        if !(0.0..=10.0).contains(&self.min_rating) {
            return Err(ConfigError::RatingOutOfRange(self.min_rating));
        }
        if self.items_per_page == 0 || self.items_per_page > MAX_ITEMS_PER_PAGE {
            return Err(ConfigError::ItemsPerPage {
                got: self.items_per_page,
                max: MAX_ITEMS_PER_PAGE,
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        match Url::parse(&self.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => return Err(ConfigError::BaseUrl(self.base_url.clone())),
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Empty("user agent"));
        }
        Ok(())
    }
}

/// Where movies are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub uri: PathBuf,
    pub namespace: String,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: PathBuf::from("output/movies.db"),
            namespace: "imdb_db".to_string(),
            collection: "top_movies".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Empty("namespace"));
        }
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Empty("collection"));
        }
        Ok(())
    }

    /// Column family that holds the movies of this namespace/collection pair.
    pub fn family_name(&self) -> String {
        format!("{}.{}", self.namespace, self.collection)
    }
}

/// Store flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Directory of the movie database
    #[arg(long = "store", env = "TOPFILMS_STORE", default_value = "output/movies.db", global = true)]
    pub uri: PathBuf,

    /// Logical database name
    #[arg(long, env = "TOPFILMS_NAMESPACE", default_value = "imdb_db", global = true)]
    pub namespace: String,

    /// Collection holding the movies
    #[arg(long, env = "TOPFILMS_COLLECTION", default_value = "top_movies", global = true)]
    pub collection: String,
}

impl StoreArgs {
    pub fn build_store_config(&self) -> StoreConfig {
        StoreConfig {
            uri: self.uri.clone(),
            namespace: self.namespace.clone(),
            collection: self.collection.clone(),
        }
    }
}

/// Flags of the `crawl` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Most recent release year to seed
    #[arg(long, env = "TOPFILMS_START_YEAR", default_value_t = 2024)]
    pub start_year: i32,

    /// Number of years to walk backwards from the start year
    #[arg(long, env = "TOPFILMS_YEAR_SPAN", default_value_t = 55)]
    pub year_span: u32,

    /// Inclusive rating floor
    #[arg(long, env = "TOPFILMS_MIN_RATING", default_value_t = 8.0)]
    pub min_rating: f64,

    /// Vote floor pushed into the seed query
    #[arg(long, env = "TOPFILMS_MIN_VOTES", default_value_t = 25_000)]
    pub min_votes: u64,

    /// Candidates requested per list page
    #[arg(long, env = "TOPFILMS_ITEMS_PER_PAGE", default_value_t = 50)]
    pub items_per_page: u32,

    /// Global cap on admitted movies
    #[arg(long, env = "TOPFILMS_QUOTA", default_value_t = 1000)]
    pub quota: usize,

    /// Requests in flight at once
    #[arg(long, env = "TOPFILMS_CONCURRENCY", default_value_t = 16)]
    pub concurrency: usize,

    /// Milliseconds between two dispatched requests, across all workers
    #[arg(long, env = "TOPFILMS_DELAY_MS", default_value_t = 250)]
    pub delay_ms: u64,

    /// Site root the seed URLs are built against
    #[arg(long, env = "TOPFILMS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, env = "TOPFILMS_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "TOPFILMS_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Keep results in memory instead of writing the store
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Show the terminal dashboard while crawling
    #[arg(long, default_value_t = false)]
    pub tui: bool,
}

impl CrawlArgs {
    pub fn build_config(&self) -> CrawlConfig {
        CrawlConfig {
            start_year: self.start_year,
            year_span: self.year_span,
            min_rating: self.min_rating,
            min_votes: self.min_votes,
            items_per_page: self.items_per_page,
            quota: self.quota,
            concurrency: self.concurrency,
            dispatch_delay: Duration::from_millis(self.delay_ms),
            base_url: self.base_url.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

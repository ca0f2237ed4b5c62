pub mod admin;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod http_client;
pub mod movie_store;
pub mod parser;
pub mod planner;
pub mod rate_limiter;
pub mod record;
pub mod state;
pub mod stats;
pub mod ui;

pub use config::{CrawlConfig, StoreConfig};
pub use coordinator::{CrawlCoordinator, CrawlOutcome, CrawlReport, CrawlRequest};
pub use error::{ConfigError, CrawlError, FetchError, StoreError};
pub use filter::{FilterChain, FilterDecision, RejectReason};
pub use http_client::{FetchClient, HttpClient};
pub use movie_store::{DedupStore, MemoryMovieStore, RocksMovieStore, UpsertOutcome};
pub use record::{CandidateRecord, EnrichedRecord, StoredMovie};
pub use state::CrawlState;
pub use stats::{CrawlerStats, DropReason};

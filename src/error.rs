use thiserror::Error;

/// Per-request transport failure. The coordinator drops the request and moves on.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    HttpError(u16),

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Response too large: {0} bytes")]
    TooLarge(u64),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend could not be opened or refused a write. Fatal for a crawl run.
    #[error("store unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Key normalization produced something the unique key cannot accept.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::ConnectionUnavailable(err.into_string())
    }
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::ConnectionUnavailable(_))
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("quota must be greater than zero")]
    ZeroQuota,

    #[error("year span must be greater than zero")]
    ZeroYearSpan,

    #[error("year span {span} reaches before year 1 from start year {start}")]
    YearSpanTooLong { start: i32, span: u32 },

    #[error("minimum rating {0} is outside 0.0..=10.0")]
    RatingOutOfRange(f64),

    #[error("items per page must be within 1..={max}, got {got}")]
    ItemsPerPage { got: u32, max: u32 },

    #[error("concurrency must be greater than zero")]
    ZeroConcurrency,

    #[error("invalid base URL {0}")]
    BaseUrl(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;

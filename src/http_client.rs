use reqwest::Client;
use std::future::Future;

use crate::config::CrawlConfig;
use crate::error::FetchError;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Anything that can turn a URL into an HTML document.
pub trait FetchClient: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(config.concurrency)
            .build()?;

        Ok(Self { client })
    }
}

impl FetchClient for HttpClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError(status.as_u16()));
        }

        if let Some(content_type) = response.headers().get("content-type") {
            let content_type_str = content_type.to_str().unwrap_or("");
            if !content_type_str.contains("text/html") {
                return Err(FetchError::InvalidContentType(content_type_str.to_string()));
            }
        }

        if let Some(content_length) = response.content_length()
            && content_length > MAX_RESPONSE_SIZE as u64
        {
            return Err(FetchError::TooLarge(content_length));
        }

        let body = response.text().await?;
        if body.len() > MAX_RESPONSE_SIZE {
            return Err(FetchError::TooLarge(body.len() as u64));
        }

        Ok(body)
    }
}

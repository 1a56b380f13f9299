//! The fetch module retrieves page markup, either directly over HTTP or
//! through the Firecrawl scraping service.

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::Credentials;
use crate::constants::USER_AGENT;
use crate::error::FetchError;

/// Markup returned by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPage {
    /// Raw HTML of the page.
    Html(String),
    /// Main content already converted to Markdown, with scraper metadata.
    Markdown {
        markdown: String,
        title: Option<String>,
        description: Option<String>,
        language: Option<String>,
    },
}

/// Retrieves the markup of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`, using whichever credentials the implementation needs.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the page or the scraping service cannot
    /// be reached or answers with a failure.
    async fn fetch(&self, url: &Url, credentials: &Credentials) -> Result<RawPage, FetchError>;
}

/// Parses a caller-supplied URL, accepting only http and https.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] if the string is not an absolute
/// http(s) URL.
pub fn parse_page_url(input: &str) -> Result<Url, FetchError> {
    let url = Url::parse(input.trim()).map_err(|e| FetchError::InvalidUrl {
        url: input.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(FetchError::InvalidUrl {
            url: input.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

/// Plain HTTP GET fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests identify as the FAQ bot.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    async fn fetch_html(&self, url: &Url) -> Result<RawPage, FetchError> {
        info!("Fetching {url}");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!("Fetched {} bytes from {url}", html.len());

        Ok(RawPage::Html(html))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, _credentials: &Credentials) -> Result<RawPage, FetchError> {
        self.fetch_html(url).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FirecrawlRequest<'a> {
    url: &'a str,
    formats: [&'static str; 2],
    only_main_content: bool,
    wait_for: u64,
}

#[derive(Debug, Deserialize)]
struct FirecrawlResponse {
    success: bool,
    data: Option<FirecrawlData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlData {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    metadata: FirecrawlMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirecrawlMetadata {
    title: Option<String>,
    description: Option<String>,
    language: Option<String>,
}

/// Fetcher backed by the Firecrawl scrape API.
///
/// Without a scraper key the service is considered unavailable and the
/// direct fetcher is used instead. Errors from the service itself are
/// returned as-is.
pub struct FirecrawlFetcher {
    client: reqwest::Client,
    endpoint: Url,
    wait_for_ms: u64,
    fallback: HttpFetcher,
}

impl FirecrawlFetcher {
    /// Creates a fetcher posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or an HTTP client
    /// cannot be built.
    pub fn new(endpoint: &str, wait_for_ms: u64, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint).map_err(|e| FetchError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        // The service waits for dynamic content before answering.
        let client = reqwest::Client::builder()
            .timeout(timeout + Duration::from_millis(wait_for_ms))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            wait_for_ms,
            fallback: HttpFetcher::new(timeout)?,
        })
    }

    async fn scrape(&self, url: &Url, api_key: &str) -> Result<RawPage, FetchError> {
        info!("Scraping {url} with Firecrawl");
        let request = FirecrawlRequest {
            url: url.as_str(),
            formats: ["markdown", "html"],
            only_main_content: true,
            wait_for: self.wait_for_ms,
        };

        let response = self
            .client
            .post(self.endpoint.as_str())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Scraper {
                status: status.as_u16(),
                body,
            });
        }

        let result: FirecrawlResponse = response
            .json()
            .await
            .map_err(|e| FetchError::ScraperFailed(e.to_string()))?;

        match result.data {
            Some(data) if result.success => Ok(RawPage::Markdown {
                markdown: data.markdown,
                title: data.metadata.title,
                description: data.metadata.description,
                language: data.metadata.language,
            }),
            _ => Err(FetchError::ScraperFailed(
                result.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

#[async_trait]
impl PageFetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &Url, credentials: &Credentials) -> Result<RawPage, FetchError> {
        match credentials.scraper_api_key.as_deref() {
            Some(api_key) => self.scrape(url, api_key).await,
            None => {
                info!("No Firecrawl key configured, fetching {url} directly");
                self.fallback.fetch_html(url).await
            }
        }
    }
}

//! Pipeline configuration and per-invocation credentials.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_LLM_BACKEND, DEFAULT_LLM_BASE_URL, DEFAULT_LOG_PATH, DEFAULT_MODEL,
    DEFAULT_SCRAPER_ENDPOINT, DEFAULT_SEARCH_ENDPOINT, FIRECRAWL_API_KEY_ENV_NAME,
    OPENROUTER_API_KEY_ENV_NAME, SERPER_API_KEY_ENV_NAME,
};
use crate::{FetchStrategy, KeywordSource, SearchPolicy};

/// Sampling parameters for one LLM-calling stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub model: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            max_tokens: None,
        }
    }
}

impl ModelParams {
    /// Keyword extraction needs consistent, short answers.
    pub fn keywords() -> Self {
        Self {
            temperature: Some(0.2),
            top_p: Some(0.9),
            frequency_penalty: Some(0.1),
            max_tokens: Some(500),
            ..Self::default()
        }
    }

    /// Content analysis reads the whole page and answers with a JSON object.
    pub fn content_analysis() -> Self {
        Self {
            temperature: Some(0.3),
            top_p: Some(0.9),
            frequency_penalty: Some(0.15),
            max_tokens: Some(1500),
            ..Self::default()
        }
    }

    /// Schema generation balances coverage and accuracy.
    pub fn faq_schema() -> Self {
        Self {
            temperature: Some(0.3),
            top_p: Some(0.95),
            frequency_penalty: Some(0.2),
            presence_penalty: Some(0.1),
            max_tokens: Some(2000),
            ..Self::default()
        }
    }

    /// Formatting must follow the template exactly.
    pub fn format_faq() -> Self {
        Self {
            temperature: Some(0.1),
            top_p: Some(0.8),
            presence_penalty: Some(0.1),
            max_tokens: Some(3000),
            ..Self::default()
        }
    }
}

/// Everything a [`crate::Pipeline`] needs besides credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `llm` crate backend name
    pub llm_backend: String,
    /// Base URL of the OpenAI-compatible chat completion API
    pub llm_base_url: String,
    pub keyword_source: KeywordSource,
    pub keywords_model: ModelParams,
    pub content_analysis_model: ModelParams,
    pub faq_schema_model: ModelParams,
    pub format_faq_model: ModelParams,
    /// Number of questions to ask for; `None` asks for a complete schema
    pub faq_count: Option<usize>,
    pub search_policy: SearchPolicy,
    pub fetch_strategy: FetchStrategy,
    pub search_endpoint: String,
    pub scraper_endpoint: String,
    pub scraper_wait_for_ms: u64,
    pub http_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    /// LLM requests per minute across all invocations (default: no limit)
    pub rpm: Option<u32>,
    pub log_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_backend: DEFAULT_LLM_BACKEND.to_string(),
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            keyword_source: KeywordSource::default(),
            keywords_model: ModelParams::keywords(),
            content_analysis_model: ModelParams::content_analysis(),
            faq_schema_model: ModelParams::faq_schema(),
            format_faq_model: ModelParams::format_faq(),
            faq_count: Some(6),
            search_policy: SearchPolicy::default(),
            fetch_strategy: FetchStrategy::default(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            scraper_endpoint: DEFAULT_SCRAPER_ENDPOINT.to_string(),
            scraper_wait_for_ms: 2000,
            http_timeout_secs: 30,
            llm_timeout_secs: 60,
            rpm: None,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON configuration file; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }
}

/// Third-party API keys for one invocation. Read-only for its lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub llm_api_key: String,
    pub search_api_key: String,
    /// Scraping service key; the direct fetcher is used without it
    pub scraper_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("llm_api_key", &"<redacted>")
            .field("search_api_key", &"<redacted>")
            .field(
                "scraper_api_key",
                &self.scraper_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Credentials gathered from several sources before they are validated.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialCredentials {
    #[serde(alias = "openRouterApiKey")]
    pub llm_api_key: Option<String>,
    #[serde(alias = "serperApiKey")]
    pub search_api_key: Option<String>,
    #[serde(alias = "firecrawlApiKey")]
    pub scraper_api_key: Option<String>,
}

impl std::fmt::Debug for PartialCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PartialCredentials")
            .field("llm_api_key", &self.llm_api_key.is_some())
            .field("search_api_key", &self.search_api_key.is_some())
            .field("scraper_api_key", &self.scraper_api_key.is_some())
            .finish()
    }
}

impl PartialCredentials {
    /// Reads the keys from the process environment.
    pub fn from_env() -> Self {
        Self {
            llm_api_key: non_empty(std::env::var(OPENROUTER_API_KEY_ENV_NAME).ok()),
            search_api_key: non_empty(std::env::var(SERPER_API_KEY_ENV_NAME).ok()),
            scraper_api_key: non_empty(std::env::var(FIRECRAWL_API_KEY_ENV_NAME).ok()),
        }
    }

    /// Keeps the keys set on `self`, filling the gaps from `fallback`.
    pub fn or(self, fallback: &PartialCredentials) -> Self {
        Self {
            llm_api_key: non_empty(self.llm_api_key).or_else(|| fallback.llm_api_key.clone()),
            search_api_key: non_empty(self.search_api_key)
                .or_else(|| fallback.search_api_key.clone()),
            scraper_api_key: non_empty(self.scraper_api_key)
                .or_else(|| fallback.scraper_api_key.clone()),
        }
    }

    /// Validates that the mandatory keys are present.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing mandatory key.
    pub fn into_credentials(self) -> Result<Credentials> {
        let llm_api_key = non_empty(self.llm_api_key).with_context(|| {
            format!("An OpenRouter API key is required (set {OPENROUTER_API_KEY_ENV_NAME})")
        })?;
        let search_api_key = non_empty(self.search_api_key).with_context(|| {
            format!("A Serper API key is required (set {SERPER_API_KEY_ENV_NAME})")
        })?;

        Ok(Credentials {
            llm_api_key,
            search_api_key,
            scraper_api_key: non_empty(self.scraper_api_key),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

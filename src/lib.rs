//! The schemafaq library turns a webpage into FAQPage structured data: it fetches
//! the page, derives keywords, collects "People Also Ask" questions and prompts
//! an LLM for JSON-LD plus a plain-text rendering of it.

use serde::{Deserialize, Serialize};

pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod format;
pub mod keywords;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod schema;
pub mod search;
pub mod server;
pub mod storage;

/// Position of an invocation in the linear pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Extracting,
    ExtractingKeywords,
    Searching,
    GeneratingSchema,
    FormattingText,
    Done,
    Failed,
}

impl Stage {
    /// Rough completion percentage reported once the stage starts.
    pub fn progress(self) -> u8 {
        match self {
            Stage::Fetching => 5,
            Stage::Extracting => 20,
            Stage::ExtractingKeywords => 35,
            Stage::Searching => 50,
            Stage::GeneratingSchema => 65,
            Stage::FormattingText => 85,
            Stage::Done | Stage::Failed => 100,
        }
    }
}

/// Enum representing what happens when a related-question query fails.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPolicy {
    /// Skip the failing keyword and continue with the rest.
    #[default]
    Tolerant,
    /// Abort the invocation on the first failing keyword.
    Strict,
}

impl std::str::FromStr for SearchPolicy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "tolerant" => Ok(SearchPolicy::Tolerant),
            "strict" => Ok(SearchPolicy::Strict),
            _ => Err(format!("Invalid search policy: {}", input)),
        }
    }
}

/// Enum representing how the page markup is retrieved.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Plain HTTP GET of the page.
    #[default]
    Direct,
    /// Firecrawl scraping service, falling back to a direct GET when no key is configured.
    Firecrawl,
}

impl std::str::FromStr for FetchStrategy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "direct" => Ok(FetchStrategy::Direct),
            "firecrawl" => Ok(FetchStrategy::Firecrawl),
            _ => Err(format!("Invalid fetch strategy: {}", input)),
        }
    }
}

/// Enum representing where search keywords come from.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordSource {
    /// Ask the model for keywords describing the page title.
    #[default]
    Title,
    /// Ask the model to analyse the page content first; the title source is the fallback.
    ContentAnalysis,
}

impl std::str::FromStr for KeywordSource {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().replace('-', "_").as_str() {
            "title" => Ok(KeywordSource::Title),
            "content_analysis" => Ok(KeywordSource::ContentAnalysis),
            _ => Err(format!("Invalid keyword source: {}", input)),
        }
    }
}

pub use config::{Credentials, PartialCredentials, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineResult};
pub use storage::{LogEntry, LogStore};

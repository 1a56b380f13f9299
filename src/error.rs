//! Error types for the FAQ pipeline.
//!
//! Stage errors are split by how the orchestrator treats them:
//!
//! * [`FetchError`] and [`ExtractError`] abort an invocation.
//! * [`LlmError`] never escapes on its own: the keyword stage falls back to
//!   title tokens and the late stages turn it into a placeholder payload.
//! * [`SearchError`] is skipped per keyword unless the search policy is strict.
//!
//! [`PipelineError`] is what a caller of [`crate::Pipeline::run`] sees.

use thiserror::Error;

use crate::Stage;

/// Failures while retrieving the raw page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The page answered with a non-2xx status.
    #[error("Failed to fetch URL: {status} {reason}")]
    Status { status: u16, reason: String },

    #[error("Error fetching URL: {0}")]
    Transport(String),

    /// The scraping service answered with a non-2xx status.
    #[error("Scraping service error ({status}): {body}")]
    Scraper { status: u16, body: String },

    /// The scraping service answered but reported a failed scrape.
    #[error("Scraping service failed: {0}")]
    ScraperFailed(String),
}

/// Failures while isolating title and body from the fetched markup.
///
/// The variants are distinct because downstream stages have different
/// minimum requirements: keywords need a title, schema generation a body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Could not extract title or content from the URL.")]
    Empty,

    #[error("Could not extract title from the URL. A title is required for keyword extraction.")]
    MissingTitle,

    #[error("Could not extract relevant page content from the URL.")]
    MissingBody,
}

/// Failures talking to the LLM provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Failed to build LLM model: {0}")]
    Build(String),

    #[error("LLM error: {0}")]
    Provider(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

/// Failure of a single related-question query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search API error for '{keyword}': {status} - {body}")]
    Status {
        keyword: String,
        status: u16,
        body: String,
    },

    #[error("Search request for '{keyword}' failed: {message}")]
    Transport { keyword: String, message: String },

    #[error("Search response for '{keyword}' could not be decoded: {message}")]
    Decode { keyword: String, message: String },
}

/// Terminal failure of a pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Failed to extract keywords and title is too short for fallback.")]
    NoKeywords,

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl PipelineError {
    /// The stage the invocation was in when it failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch(_) => Stage::Fetching,
            PipelineError::Extract(_) => Stage::Extracting,
            PipelineError::NoKeywords => Stage::ExtractingKeywords,
            PipelineError::Search(_) => Stage::Searching,
        }
    }
}

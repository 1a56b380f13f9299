//! The search module collects "People Also Ask" questions for each keyword.

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::SearchPolicy;
use crate::error::SearchError;
use crate::keywords::KeywordSet;

/// A related question surfaced by the search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedQuestion {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Search API returning related questions for a query.
#[async_trait]
pub trait QuestionSearch: Send + Sync {
    /// Returns the related questions listed for `query`.
    ///
    /// # Errors
    ///
    /// Returns a [`SearchError`] naming the query if the request fails.
    async fn people_also_ask(
        &self,
        query: &str,
        api_key: &str,
    ) -> Result<Vec<RelatedQuestion>, SearchError>;
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperResponse {
    #[serde(default)]
    people_also_ask: Vec<RelatedQuestion>,
}

/// Serper.dev search client.
pub struct SerperClient {
    endpoint: String,
    client: reqwest::Client,
}

impl SerperClient {
    /// Creates a client posting queries to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[async_trait]
impl QuestionSearch for SerperClient {
    async fn people_also_ask(
        &self,
        query: &str,
        api_key: &str,
    ) -> Result<Vec<RelatedQuestion>, SearchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&SerperRequest { q: query })
            .send()
            .await
            .map_err(|e| SearchError::Transport {
                keyword: query.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                keyword: query.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let result: SerperResponse = response.json().await.map_err(|e| SearchError::Decode {
            keyword: query.to_string(),
            message: e.to_string(),
        })?;

        Ok(result.people_also_ask)
    }
}

/// Questions gathered across all keywords, plus the queries that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub questions: Vec<RelatedQuestion>,
    pub failures: Vec<SearchError>,
}

/// Queries the search provider once per keyword, in keyword order, and
/// concatenates the results without de-duplication.
///
/// # Errors
///
/// Under [`SearchPolicy::Strict`] the first failing query aborts the stage.
/// Under [`SearchPolicy::Tolerant`] this never fails: failed keywords are
/// skipped and reported in [`SearchOutcome::failures`].
pub async fn search_related_questions(
    search: &dyn QuestionSearch,
    keywords: &KeywordSet,
    api_key: &str,
    policy: SearchPolicy,
) -> Result<SearchOutcome, SearchError> {
    let mut outcome = SearchOutcome::default();

    for keyword in keywords {
        match search.people_also_ask(keyword, api_key).await {
            Ok(questions) => {
                info!("Found {} related questions for '{keyword}'", questions.len());
                outcome.questions.extend(questions);
            }
            Err(error) if policy == SearchPolicy::Strict => return Err(error),
            Err(error) => {
                warn!("Skipping keyword: {error}");
                outcome.failures.push(error);
            }
        }
    }

    Ok(outcome)
}

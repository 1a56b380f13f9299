//! The pipeline module sequences the stages of one FAQ invocation:
//! fetch, extract, keywords, search, schema, plain text.
//!
//! Fetching and extraction abort the invocation. Keyword extraction degrades
//! from content analysis (when configured) to title keywords to title tokens.
//! Search skips failing keywords unless the policy is strict. Schema
//! generation and formatting never abort: their errors travel as placeholder
//! text. Whatever happens, exactly one [`LogEntry`] is written per
//! invocation.

use llm::chat::ChatProvider;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::{LlmBuilderFactory, LlmContext, ModelFactory, RateLimiter};
use crate::config::{Credentials, ModelParams, PipelineConfig};
use crate::constants::{
    CONTENT_ANALYSIS_SYSTEM_PROMPT, FORMAT_SYSTEM_PROMPT, KEYWORDS_SYSTEM_PROMPT,
    SCHEMA_SYSTEM_PROMPT,
};
use crate::error::{LlmError, PipelineError};
use crate::fetch::{FirecrawlFetcher, HttpFetcher, PageFetcher, parse_page_url};
use crate::format::{PlainTextFaq, format_faq_text};
use crate::keywords::{KeywordSet, analyze_content, extract_keywords};
use crate::parse::{PageContent, extract_page};
use crate::progress::{EventSink, NoopSink, ProgressEvent};
use crate::schema::{FaqDocument, SchemaRequest, generate_faq_schema};
use crate::search::{QuestionSearch, RelatedQuestion, SerperClient, search_related_questions};
use crate::storage::{LogEntry, LogStore};
use crate::{FetchStrategy, KeywordSource, Stage};

/// Aggregate output of a successful invocation.
///
/// `error` is set when a late stage failed; the failed stage's field then
/// holds a readable error message instead of generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub keywords: Vec<String>,
    #[serde(rename = "peopleAlsoAsk")]
    pub related_questions: Vec<RelatedQuestion>,
    pub faq_schema: String,
    pub plain_text_faq: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The FAQ pipeline with its collaborators. Holds no per-invocation state,
/// so one instance serves concurrent invocations.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn PageFetcher>,
    search: Arc<dyn QuestionSearch>,
    models: Arc<dyn ModelFactory>,
    log_store: LogStore,
    rate_limiter: Option<RateLimiter>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn PageFetcher>,
        search: Arc<dyn QuestionSearch>,
        models: Arc<dyn ModelFactory>,
        log_store: LogStore,
    ) -> Self {
        let rate_limiter = config.rpm.and_then(RateLimiter::per_minute);

        Self {
            config,
            fetcher,
            search,
            models,
            log_store,
            rate_limiter,
        }
    }

    /// Builds the production collaborators described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built or the scraper
    /// endpoint is not a valid URL.
    pub fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        let http_timeout = Duration::from_secs(config.http_timeout_secs);

        let fetcher: Arc<dyn PageFetcher> = match config.fetch_strategy {
            FetchStrategy::Direct => Arc::new(HttpFetcher::new(http_timeout)?),
            FetchStrategy::Firecrawl => Arc::new(FirecrawlFetcher::new(
                &config.scraper_endpoint,
                config.scraper_wait_for_ms,
                http_timeout,
            )?),
        };
        let search = Arc::new(SerperClient::new(&config.search_endpoint, http_timeout)?);
        let models = Arc::new(LlmBuilderFactory::new(
            &config.llm_backend,
            &config.llm_base_url,
            config.llm_timeout_secs,
        ));
        let log_store = LogStore::new(config.log_path.clone());

        Ok(Self::new(config, fetcher, search, models, log_store))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn log_store(&self) -> &LogStore {
        &self.log_store
    }

    /// Runs one invocation for `url` without progress reporting.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run_with_events`].
    pub async fn run(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<PipelineResult, PipelineError> {
        self.run_with_events(url, credentials, &NoopSink).await
    }

    /// Runs one invocation for `url`, reporting progress to `events`, and
    /// writes its log entry before returning.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] if the page cannot be fetched or has no
    /// usable title/body, if no keywords can be derived, or if a search query
    /// fails under the strict search policy.
    pub async fn run_with_events(
        &self,
        url: &str,
        credentials: &Credentials,
        events: &dyn EventSink,
    ) -> Result<PipelineResult, PipelineError> {
        let mut entry = LogEntry::new(url);
        let outcome = self.execute(url, credentials, events, &mut entry).await;

        match &outcome {
            Ok(result) => {
                info!("FAQ pipeline finished for {url}");
                let message = match &result.error {
                    Some(e) => format!("Finished with errors: {e}"),
                    None => "FAQ generated".to_string(),
                };
                events.emit(ProgressEvent::complete(Stage::Done, message));
            }
            Err(e) => {
                error!("FAQ pipeline failed for {url} at {:?}: {e}", e.stage());
                entry.push_error(e.to_string());
                events.emit(ProgressEvent::error(e.stage(), e.to_string()));
            }
        }

        if let Err(e) = self.log_store.append(entry).await {
            error!("Failed to write log entry for {url}: {e}");
        }

        outcome
    }

    async fn execute(
        &self,
        url: &str,
        credentials: &Credentials,
        events: &dyn EventSink,
        entry: &mut LogEntry,
    ) -> Result<PipelineResult, PipelineError> {
        events.emit(ProgressEvent::start(Stage::Fetching, "Fetching page"));
        let page_url = parse_page_url(url)?;
        let raw = self.fetcher.fetch(&page_url, credentials).await?;
        events.emit(ProgressEvent::complete(Stage::Fetching, "Page fetched"));

        events.emit(ProgressEvent::start(Stage::Extracting, "Extracting content"));
        let page = extract_page(&raw)?;
        info!(
            "Extracted '{}' with {} characters of content",
            page.title,
            page.body_text.chars().count()
        );
        events.emit(ProgressEvent::complete(
            Stage::Extracting,
            format!("Extracted '{}'", page.title),
        ));

        events.emit(ProgressEvent::start(
            Stage::ExtractingKeywords,
            "Extracting keywords",
        ));
        let keywords = self.keywords(&page, credentials, entry).await?;
        entry.keywords = Some(keywords.iter().cloned().collect());
        events.emit(ProgressEvent::complete(
            Stage::ExtractingKeywords,
            format!("Keywords: {}", keywords.joined()),
        ));

        events.emit(ProgressEvent::start(
            Stage::Searching,
            format!("Searching related questions for {} keywords", keywords.len()),
        ));
        let outcome = search_related_questions(
            self.search.as_ref(),
            &keywords,
            &credentials.search_api_key,
            self.config.search_policy,
        )
        .await?;
        for failure in &outcome.failures {
            entry.push_error(failure.to_string());
        }
        let related_questions = outcome.questions;
        entry.people_also_ask = Some(related_questions.clone());
        events.emit(ProgressEvent::complete(
            Stage::Searching,
            format!("Found {} related questions", related_questions.len()),
        ));

        events.emit(ProgressEvent::start(
            Stage::GeneratingSchema,
            "Generating FAQ schema",
        ));
        let document = self
            .faq_schema(&keywords, &page, &related_questions, credentials)
            .await;
        entry.faq_schema = Some(document.as_str().to_string());
        events.emit(ProgressEvent::complete(
            Stage::GeneratingSchema,
            stage_summary(document.is_failed(), "FAQ schema generated", document.as_str()),
        ));

        events.emit(ProgressEvent::start(
            Stage::FormattingText,
            "Formatting plain text FAQ",
        ));
        let plain_text = self.plain_text(&document, credentials).await;
        if !plain_text.is_failed() {
            entry.plain_text_faq = Some(plain_text.as_str().to_string());
        }
        events.emit(ProgressEvent::complete(
            Stage::FormattingText,
            stage_summary(plain_text.is_failed(), "Plain text FAQ ready", plain_text.as_str()),
        ));

        let error = late_error(&document, &plain_text, entry);

        Ok(PipelineResult {
            keywords: keywords.into_vec(),
            related_questions,
            faq_schema: document.into_string(),
            plain_text_faq: plain_text.into_string(),
            error,
        })
    }

    /// Content-analysis keywords when configured, then model keywords for
    /// the title, then title tokens: the first non-empty set wins.
    async fn keywords(
        &self,
        page: &PageContent,
        credentials: &Credentials,
        entry: &mut LogEntry,
    ) -> Result<KeywordSet, PipelineError> {
        if self.config.keyword_source == KeywordSource::ContentAnalysis {
            match self.analysed_keywords(page, credentials).await {
                Ok(keywords) if !keywords.is_empty() => return Ok(keywords),
                Ok(_) => warn!("Content analysis gave no keywords, using the title instead"),
                Err(e) => {
                    warn!("Content analysis failed, using the title instead: {e}");
                    entry.push_error(format!("Error analysing content: {e}"));
                }
            }
        }

        let title = page.title.as_str();
        let model = self.model(&self.config.keywords_model, KEYWORDS_SYSTEM_PROMPT, credentials);
        let extracted = match model {
            Ok(model) => extract_keywords(title, &self.context(model.as_ref())).await,
            Err(e) => Err(e),
        };

        let keywords = match extracted {
            Ok(keywords) if !keywords.is_empty() => return Ok(keywords),
            Ok(_) => {
                warn!("Model returned no keywords, falling back to title tokens");
                KeywordSet::from_title_tokens(title)
            }
            Err(e) => {
                warn!("Keyword extraction failed, falling back to title tokens: {e}");
                entry.push_error(format!("Error extracting keywords: {e}"));
                KeywordSet::from_title_tokens(title)
            }
        };

        if keywords.is_empty() {
            return Err(PipelineError::NoKeywords);
        }
        Ok(keywords)
    }

    async fn analysed_keywords(
        &self,
        page: &PageContent,
        credentials: &Credentials,
    ) -> Result<KeywordSet, LlmError> {
        let model = self.model(
            &self.config.content_analysis_model,
            CONTENT_ANALYSIS_SYSTEM_PROMPT,
            credentials,
        )?;
        let analysis = analyze_content(page, &self.context(model.as_ref())).await?;
        Ok(analysis.search_keywords())
    }

    async fn faq_schema(
        &self,
        keywords: &KeywordSet,
        page: &PageContent,
        related_questions: &[RelatedQuestion],
        credentials: &Credentials,
    ) -> FaqDocument {
        let request = SchemaRequest {
            keywords,
            page,
            related_questions,
            faq_count: self.config.faq_count,
        };

        match self.model(&self.config.faq_schema_model, SCHEMA_SYSTEM_PROMPT, credentials) {
            Ok(model) => generate_faq_schema(&request, &self.context(model.as_ref())).await,
            Err(e) => FaqDocument::from_completion(Err(e)),
        }
    }

    /// Plain text for `document`; skipped when there is no schema to format.
    async fn plain_text(&self, document: &FaqDocument, credentials: &Credentials) -> PlainTextFaq {
        if document.is_failed() || document.as_str().trim().is_empty() {
            return PlainTextFaq::unavailable();
        }

        match self.model(&self.config.format_faq_model, FORMAT_SYSTEM_PROMPT, credentials) {
            Ok(model) => format_faq_text(document, &self.context(model.as_ref())).await,
            Err(e) => PlainTextFaq::from_completion(Err(e)),
        }
    }

    fn model(
        &self,
        params: &ModelParams,
        system: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn ChatProvider>, LlmError> {
        self.models.chat_model(params, system, &credentials.llm_api_key)
    }

    fn context<'a>(&'a self, model: &'a dyn ChatProvider) -> LlmContext<'a> {
        LlmContext {
            model,
            rate_limiter: self.rate_limiter.as_ref(),
        }
    }
}

/// Records schema and format failures in `entry` and joins them for the
/// result. A skipped format after a failed schema is not a second error.
fn late_error(
    document: &FaqDocument,
    plain_text: &PlainTextFaq,
    entry: &mut LogEntry,
) -> Option<String> {
    let late_errors: Vec<&str> = [
        document.is_failed().then(|| document.as_str()),
        (plain_text.is_failed() && !document.is_failed()).then(|| plain_text.as_str()),
    ]
    .into_iter()
    .flatten()
    .collect();
    for late_error in &late_errors {
        entry.push_error(late_error);
    }
    (!late_errors.is_empty()).then(|| late_errors.join("; "))
}

/// Completion message of a late stage, which finishes even when it failed.
fn stage_summary(failed: bool, done: &str, text: &str) -> String {
    if failed {
        text.to_string()
    } else {
        done.to_string()
    }
}

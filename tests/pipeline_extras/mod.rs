#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use llm::{
    chat::{ChatMessage, ChatProvider, ChatResponse, Tool},
    error::LLMError,
};
use schemafaq::chat::ModelFactory;
use schemafaq::config::{Credentials, ModelParams};
use schemafaq::error::{FetchError, LlmError, SearchError};
use schemafaq::fetch::{PageFetcher, RawPage};
use schemafaq::progress::{EventSink, ProgressEvent};
use schemafaq::search::{QuestionSearch, RelatedQuestion};
use schemafaq::{LogStore, Pipeline, PipelineConfig};
use url::Url;

/// Runs the coffee page with `response` as the keyword model's answer and
/// checks the keywords the pipeline ends up searching for.
#[macro_export]
macro_rules! assert_keywords {
    (
        $(
            $test_name:ident : response => $response:expr, result => $result:expr
        ),+ $(,)?
    ) => {
        $(
            #[tokio::test]
            async fn $test_name() {
                let dir = tempfile::tempdir().expect("temp dir");
                let pipeline = $crate::pipeline_extras::pipeline(
                    $crate::pipeline_extras::config(dir.path()),
                    std::sync::Arc::new($crate::pipeline_extras::StubFetcher::page(
                        $crate::pipeline_extras::COFFEE_PAGE,
                    )),
                    std::sync::Arc::new($crate::pipeline_extras::StubSearch::new()),
                    std::sync::Arc::new(
                        $crate::pipeline_extras::StubModelFactory::coffee()
                            .answer($crate::pipeline_extras::KEYWORDS_MODEL, $response),
                    ),
                );

                let result = pipeline
                    .run(
                        "https://example.com/how-to-brew-coffee",
                        &$crate::pipeline_extras::credentials(),
                    )
                    .await
                    .expect("Expected successful processing.");

                let expected: Vec<String> = $result.iter().map(|k| k.to_string()).collect();
                assert_that(&result.keywords).is_equal_to(expected);
            }
        )+
    }
}

pub const KEYWORDS_MODEL: &str = "stub/keywords";
pub const CONTENT_MODEL: &str = "stub/content-analysis";
pub const SCHEMA_MODEL: &str = "stub/faq-schema";
pub const FORMAT_MODEL: &str = "stub/format-faq";

pub const COFFEE_PAGE: &str = "<html><head><title>How to Brew Coffee</title>\
    <script>var tracking = true;</script></head>\
    <body><nav>Home | Shop</nav><main><h1>How to Brew Coffee</h1>\
    <p>Grind the beans medium-fine and use water just off the boil.</p>\
    <p>Pour slowly in circles and let it steep for four minutes.</p></main></body></html>";

pub const COFFEE_SCHEMA: &str = r#"{"@context": "https://schema.org", "@type": "FAQPage", "mainEntity": [{"@type": "Question", "name": "How long should coffee steep?", "acceptedAnswer": {"@type": "Answer", "text": "About four minutes."}}, {"@type": "Question", "name": "What grind size is best?", "acceptedAnswer": {"@type": "Answer", "text": "Medium-fine."}}]}"#;

pub const COFFEE_TEXT: &str =
    "問：How long should coffee steep?\n答：About four minutes.\n\n問：What grind size is best?\n答：Medium-fine.";

pub fn credentials() -> Credentials {
    Credentials {
        llm_api_key: "llm-key".to_string(),
        search_api_key: "search-key".to_string(),
        scraper_api_key: None,
    }
}

pub fn question(text: &str) -> RelatedQuestion {
    RelatedQuestion {
        question: text.to_string(),
        snippet: Some(format!("Snippet for {text}")),
        title: None,
        link: None,
    }
}

/// Chat model answering every prompt with the same canned result.
pub(crate) struct StubChatModel {
    response: Result<String, String>,
}

impl StubChatModel {
    fn respond(&self) -> Result<Box<dyn ChatResponse>, LLMError> {
        #[derive(Debug)]
        struct StringResponse(String);

        impl ChatResponse for StringResponse {
            fn text(&self) -> Option<String> {
                Some(self.0.clone())
            }

            fn tool_calls(&self) -> Option<Vec<llm::ToolCall>> {
                None
            }

            fn thinking(&self) -> Option<String> {
                None
            }

            fn usage(&self) -> Option<llm::chat::Usage> {
                None
            }
        }

        impl std::fmt::Display for StringResponse {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        match &self.response {
            Ok(text) => Ok(Box::new(StringResponse(text.clone())) as Box<dyn ChatResponse>),
            Err(message) => Err(LLMError::ProviderError(message.clone())),
        }
    }
}

#[async_trait]
impl ChatProvider for StubChatModel {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<Box<dyn ChatResponse>, LLMError> {
        self.respond()
    }

    async fn chat_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[Tool]>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        self.respond()
    }
}

/// Hands out [`StubChatModel`]s keyed by model name and remembers which
/// models were requested.
#[derive(Default)]
pub(crate) struct StubModelFactory {
    responses: HashMap<String, Result<String, String>>,
    requested: Mutex<Vec<String>>,
}

impl StubModelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers for the whole happy path of the coffee page.
    pub fn coffee() -> Self {
        Self::new()
            .answer(KEYWORDS_MODEL, r#"["coffee", "brewing", "how to brew"]"#)
            .answer(SCHEMA_MODEL, COFFEE_SCHEMA)
            .answer(FORMAT_MODEL, COFFEE_TEXT)
    }

    pub fn answer(mut self, model: &str, text: &str) -> Self {
        self.responses
            .insert(model.to_string(), Ok(text.to_string()));
        self
    }

    pub fn fail(mut self, model: &str, message: &str) -> Self {
        self.responses
            .insert(model.to_string(), Err(message.to_string()));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("lock").clone()
    }
}

impl ModelFactory for StubModelFactory {
    fn chat_model(
        &self,
        params: &ModelParams,
        _system: &str,
        _api_key: &str,
    ) -> Result<Box<dyn ChatProvider>, LlmError> {
        self.requested
            .lock()
            .expect("lock")
            .push(params.model.clone());

        let response = self
            .responses
            .get(&params.model)
            .cloned()
            .unwrap_or_else(|| Err(format!("no stub for {}", params.model)));
        Ok(Box::new(StubChatModel { response }))
    }
}

/// Serves a fixed page, or a 404, optionally after a delay.
pub(crate) struct StubFetcher {
    html: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<usize>,
}

impl StubFetcher {
    pub fn page(html: &str) -> Self {
        Self {
            html: Some(html.to_string()),
            delay: None,
            calls: Mutex::new(0),
        }
    }

    pub fn not_found() -> Self {
        Self {
            html: None,
            delay: None,
            calls: Mutex::new(0),
        }
    }

    /// Serves `html` only after `delay`.
    pub fn slow_page(html: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::page(html)
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().expect("lock")
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, _url: &Url, _credentials: &Credentials) -> Result<RawPage, FetchError> {
        *self.calls.lock().expect("lock") += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.html {
            Some(html) => Ok(RawPage::Html(html.clone())),
            None => Err(FetchError::Status {
                status: 404,
                reason: "Not Found".to_string(),
            }),
        }
    }
}

/// Answers every keyword with two questions derived from it, except the
/// keywords configured to fail.
#[derive(Default)]
pub(crate) struct StubSearch {
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, keyword: &str) -> Self {
        self.failing.insert(keyword.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("lock").clone()
    }
}

#[async_trait]
impl QuestionSearch for StubSearch {
    async fn people_also_ask(
        &self,
        query: &str,
        _api_key: &str,
    ) -> Result<Vec<RelatedQuestion>, SearchError> {
        self.queries.lock().expect("lock").push(query.to_string());

        if self.failing.contains(query) {
            return Err(SearchError::Status {
                keyword: query.to_string(),
                status: 500,
                body: "upstream error".to_string(),
            });
        }
        Ok(vec![
            question(&format!("What is {query}?")),
            question(&format!("Is {query} worth it?")),
        ])
    }
}

/// Keeps every event it receives.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("lock").clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().expect("lock").push(event);
    }
}

pub fn config(log_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.keywords_model.model = KEYWORDS_MODEL.to_string();
    config.content_analysis_model.model = CONTENT_MODEL.to_string();
    config.faq_schema_model.model = SCHEMA_MODEL.to_string();
    config.format_faq_model.model = FORMAT_MODEL.to_string();
    config.log_path = log_dir.join("admin_logs.json");
    config
}

pub fn pipeline(
    config: PipelineConfig,
    fetcher: Arc<StubFetcher>,
    search: Arc<StubSearch>,
    models: Arc<StubModelFactory>,
) -> Pipeline {
    let log_store = LogStore::new(config.log_path.clone());
    Pipeline::new(config, fetcher, search, models, log_store)
}

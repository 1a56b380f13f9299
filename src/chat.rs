//! The chat module builds chat models for the pipeline stages and sends prompts
//! to them.

use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ChatProvider};
use log::debug;
use once_cell::sync::Lazy;
use rate_guard::{RateLimit, StdTokenBucket, TokenBucketBuilder};
use regex::{Captures, Regex};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::ModelParams;
use crate::constants::{PLACEHOLDER_PATTERN, THINK_STRIPPER};
use crate::error::LlmError;

static THINK_STRIPPER_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(THINK_STRIPPER).ok());
static PLACEHOLDER_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(PLACEHOLDER_PATTERN).ok());

/// Creates the chat model used by one stage.
pub trait ModelFactory: Send + Sync {
    /// Builds a model for `params`, primed with the `system` prompt.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Build`] if the backend rejects the configuration.
    fn chat_model(
        &self,
        params: &ModelParams,
        system: &str,
        api_key: &str,
    ) -> Result<Box<dyn ChatProvider>, LlmError>;
}

/// [`ModelFactory`] backed by the `llm` crate builder, talking to an
/// OpenAI-compatible endpoint.
pub struct LlmBuilderFactory {
    backend: String,
    base_url: String,
    timeout_secs: u64,
}

impl LlmBuilderFactory {
    pub fn new(backend: &str, base_url: &str, timeout_secs: u64) -> Self {
        Self {
            backend: backend.to_string(),
            base_url: base_url.to_string(),
            timeout_secs,
        }
    }
}

impl ModelFactory for LlmBuilderFactory {
    fn chat_model(
        &self,
        params: &ModelParams,
        system: &str,
        api_key: &str,
    ) -> Result<Box<dyn ChatProvider>, LlmError> {
        let backend = LLMBackend::from_str(&self.backend)
            .map_err(|e| LlmError::Build(format!("Invalid LLM backend: {e}")))?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .base_url(self.base_url.as_str())
            .api_key(api_key)
            .model(params.model.as_str())
            .system(system)
            .timeout_seconds(self.timeout_secs);

        if let Some(temperature) = params.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(top_p) = params.top_p {
            builder = builder.top_p(top_p);
        }
        if let Some(max_tokens) = params.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if params.frequency_penalty.is_some() || params.presence_penalty.is_some() {
            debug!(
                "Model {} ignores frequency/presence penalties: not supported by the backend",
                params.model
            );
        }

        let model: Box<dyn ChatProvider> =
            builder.build().map_err(|e| LlmError::Build(e.to_string()))?;
        Ok(model)
    }
}

/// Requests-per-minute ceiling shared by every LLM call of a pipeline.
pub struct RateLimiter {
    bucket: Mutex<StdTokenBucket>,
}

impl RateLimiter {
    /// Returns `None` if the bucket cannot be built.
    pub fn per_minute(rpm: u32) -> Option<Self> {
        let capacity = u64::from(rpm.max(1));
        let refill_interval = Duration::from_secs_f64(60.0 / capacity as f64);

        TokenBucketBuilder::builder()
            .capacity(capacity)
            .refill_amount(1_u64)
            .refill_every(refill_interval)
            .with_time(rate_guard::StdTimeSource::new())
            .with_precision::<rate_guard::Nanos>()
            .build()
            .ok()
            .map(|bucket| Self {
                bucket: Mutex::new(bucket),
            })
    }

    fn try_acquire(&self) -> bool {
        self.bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(1)
            .is_ok()
    }

    /// Waits until a request may be sent.
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Model and shared limits for one stage call.
pub struct LlmContext<'a> {
    /// LLM model to send the prompt to
    pub model: &'a dyn ChatProvider,
    /// Rate limiter for controlling request frequency
    pub rate_limiter: Option<&'a RateLimiter>,
}

/// Sends a single user prompt and returns the trimmed answer, without any
/// `<think>` block the model may have emitted.
///
/// # Errors
///
/// Returns [`LlmError::Provider`] if the chat call fails and
/// [`LlmError::EmptyResponse`] if nothing is left after cleaning.
pub async fn complete(ctx: &LlmContext<'_>, prompt: String) -> Result<String, LlmError> {
    let messages = vec![ChatMessage::user().content(prompt).build()];

    if let Some(limiter) = ctx.rate_limiter {
        limiter.acquire().await;
    }

    let response = ctx
        .model
        .chat(&messages)
        .await
        .map_err(|err| LlmError::Provider(err.to_string()))?;
    let text = response.text().unwrap_or_default();

    let cleaned = match THINK_STRIPPER_REGEX.as_ref() {
        Some(re) => re.replace_all(&text, "").trim().to_string(),
        None => text.trim().to_string(),
    };

    if cleaned.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(cleaned)
}

/// Returns the first balanced JSON array (`open = '['`) or object
/// (`open = '{'`) in free text, ignoring brackets inside string literals.
///
/// Models wrap JSON in prose or code fences despite instructions; this finds
/// the payload without trusting the surroundings.
pub fn extract_json_block(text: &str, open: char) -> Option<&str> {
    let close = match open {
        '[' => ']',
        '{' => '}',
        _ => return None,
    };

    let start = text.find(open)?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.get(start..)?.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return text.get(start..start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Fills the `{name}` slots of a prompt template in one pass.
///
/// Substituted text is never scanned again, so page content quoting a slot
/// name stays literal. Slots without a value are left as they are.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let Some(re) = PLACEHOLDER_REGEX.as_ref() else {
        return template.to_string();
    };

    re.replace_all(template, |caps: &Captures<'_>| {
        let slot = caps.get(0).map_or("", |m| m.as_str());
        let name = caps.get(1).map_or("", |m| m.as_str());
        values
            .iter()
            .find(|(key, _)| *key == name)
            .map_or(slot, |(_, value)| *value)
            .to_string()
    })
    .into_owned()
}

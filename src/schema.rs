//! The schema module prompts the LLM for FAQPage JSON-LD.

use log::{info, warn};
use serde_json::Value;

use crate::chat::{LlmContext, complete, extract_json_block, fill_template};
use crate::constants::SCHEMA_PROMPT_TEMPLATE;
use crate::error::LlmError;
use crate::keywords::KeywordSet;
use crate::parse::PageContent;
use crate::search::RelatedQuestion;

/// JSON-LD text as produced by the model, or a readable error in its place.
///
/// The text is kept verbatim; [`FaqDocument::json_ld`] is the defensive
/// reader for consumers that need actual JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaqDocument {
    text: String,
    failed: bool,
}

impl FaqDocument {
    pub fn generated(text: String) -> Self {
        Self {
            text,
            failed: false,
        }
    }

    pub fn from_error(error: &LlmError) -> Self {
        Self {
            text: format!("Error generating FAQ schema: {error}"),
            failed: true,
        }
    }

    pub fn from_completion(completion: Result<String, LlmError>) -> Self {
        match completion {
            Ok(text) => Self::generated(text),
            Err(error) => {
                warn!("FAQ schema generation failed: {error}");
                Self::from_error(&error)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Parses the first JSON object in the text, skipping code fences and
    /// any commentary around it.
    pub fn json_ld(&self) -> Option<Value> {
        if self.failed {
            return None;
        }
        extract_json_block(&self.text, '{').and_then(|block| serde_json::from_str(block).ok())
    }

    /// Number of entries in the `mainEntity` array, if the text parses.
    pub fn question_count(&self) -> Option<usize> {
        self.json_ld()?
            .get("mainEntity")
            .and_then(Value::as_array)
            .map(Vec::len)
    }
}

/// Inputs of the schema prompt.
pub struct SchemaRequest<'a> {
    pub keywords: &'a KeywordSet,
    pub page: &'a PageContent,
    pub related_questions: &'a [RelatedQuestion],
    /// Target question count; `None` asks for a complete schema
    pub faq_count: Option<usize>,
}

pub fn schema_prompt(request: &SchemaRequest<'_>) -> String {
    let people_also_ask =
        serde_json::to_string_pretty(request.related_questions).unwrap_or_else(|_| "[]".to_string());
    let count_instruction = match request.faq_count {
        Some(count) => format!(
            "Generate exactly {count} questions in the mainEntity array of a schema.org FAQPage."
        ),
        None => "Output the complete schema.org FAQPage JSON-LD schema.".to_string(),
    };

    fill_template(
        SCHEMA_PROMPT_TEMPLATE,
        &[
            ("keywords", request.keywords.joined().as_str()),
            ("content", request.page.body_text.as_str()),
            ("people_also_ask", people_also_ask.as_str()),
            ("count_instruction", count_instruction.as_str()),
        ],
    )
}

/// Generates the FAQ JSON-LD. Never fails: provider errors become the
/// document text so the invocation can still be logged and reported.
pub async fn generate_faq_schema(request: &SchemaRequest<'_>, ctx: &LlmContext<'_>) -> FaqDocument {
    info!(
        "Generating FAQ schema from {} related questions",
        request.related_questions.len()
    );
    FaqDocument::from_completion(complete(ctx, schema_prompt(request)).await)
}

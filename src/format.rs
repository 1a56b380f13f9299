//! The format module renders the FAQ JSON-LD as a plain-text Q&A transcript.

use log::{info, warn};

use crate::chat::{LlmContext, complete, fill_template};
use crate::constants::{FORMAT_PROMPT_TEMPLATE, PLAIN_TEXT_UNAVAILABLE};
use crate::error::LlmError;
use crate::schema::FaqDocument;

/// Plain-text rendering of a [`FaqDocument`], or a readable error in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainTextFaq {
    text: String,
    failed: bool,
}

impl PlainTextFaq {
    /// Placeholder used when there is no schema to format.
    pub fn unavailable() -> Self {
        Self {
            text: PLAIN_TEXT_UNAVAILABLE.to_string(),
            failed: true,
        }
    }

    pub fn from_completion(completion: Result<String, LlmError>) -> Self {
        match completion {
            Ok(text) => Self {
                text,
                failed: false,
            },
            Err(error) => {
                warn!("Plain text formatting failed: {error}");
                Self {
                    text: format!("Error formatting FAQ to plain text: {error}"),
                    failed: true,
                }
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
}

pub fn format_prompt(document: &FaqDocument) -> String {
    fill_template(FORMAT_PROMPT_TEMPLATE, &[("schema", document.as_str())])
}

/// Converts the schema into `問：` / `答：` pairs separated by blank lines.
/// Never fails: provider errors become the returned text.
pub async fn format_faq_text(document: &FaqDocument, ctx: &LlmContext<'_>) -> PlainTextFaq {
    info!("Formatting FAQ schema as plain text");
    PlainTextFaq::from_completion(complete(ctx, format_prompt(document)).await)
}

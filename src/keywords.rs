//! The keywords module asks the LLM for search keywords, either derived from a
//! page title or from an analysis of the whole page.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::chat::{LlmContext, complete, extract_json_block, fill_template};
use crate::constants::{
    CONTENT_ANALYSIS_PROMPT_TEMPLATE, KEYWORDS_PROMPT_TEMPLATE, MAX_ANALYSIS_CONTENT_LENGTH,
    MAX_KEYWORDS,
};
use crate::error::LlmError;
use crate::parse::PageContent;

/// Ordered keywords used as search queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Trims entries, drops empty ones and keeps at most [`MAX_KEYWORDS`].
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keywords
                .into_iter()
                .map(|keyword| keyword.as_ref().trim().to_string())
                .filter(|keyword| !keyword.is_empty())
                .take(MAX_KEYWORDS)
                .collect(),
        )
    }

    /// Fallback keywords: the title's whitespace-separated tokens longer than
    /// three characters.
    pub fn from_title_tokens(title: &str) -> Self {
        Self(
            title
                .split_whitespace()
                .filter(|token| token.chars().count() > 3)
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn joined(&self) -> String {
        self.0.join(", ")
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> IntoIterator for &'a KeywordSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub fn keywords_prompt(title: &str) -> String {
    fill_template(KEYWORDS_PROMPT_TEMPLATE, &[("title", title)])
}

/// Asks the model for 3-5 keywords describing `title`.
///
/// A response without a parseable JSON string array yields an empty set;
/// falling back to title tokens is left to the caller.
///
/// # Errors
///
/// Returns an [`LlmError`] only when the provider call itself fails.
pub async fn extract_keywords(title: &str, ctx: &LlmContext<'_>) -> Result<KeywordSet, LlmError> {
    let response = match complete(ctx, keywords_prompt(title)).await {
        Ok(response) => response,
        Err(LlmError::EmptyResponse) => return Ok(KeywordSet::default()),
        Err(e) => return Err(e),
    };

    let keywords = parse_keywords(&response);
    debug!("Model suggested {} keywords for '{title}'", keywords.len());
    Ok(keywords)
}

/// Reads the first JSON string array out of a model response.
pub fn parse_keywords(response: &str) -> KeywordSet {
    let Some(block) = extract_json_block(response, '[') else {
        warn!("No JSON array in keyword response");
        return KeywordSet::default();
    };

    match serde_json::from_str::<Vec<String>>(block) {
        Ok(keywords) => KeywordSet::new(keywords),
        Err(e) => {
            warn!("Unable to parse keyword array: {e}");
            KeywordSet::default()
        }
    }
}

/// Keyword analysis of a whole page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentAnalysis {
    pub primary_keywords: Vec<String>,
    pub secondary_keywords: Vec<String>,
    pub long_tail_keywords: Vec<String>,
    pub semantic_keywords: Vec<String>,
}

impl ContentAnalysis {
    /// Primary keywords, then secondary ones, without case-insensitive
    /// duplicates.
    pub fn search_keywords(&self) -> KeywordSet {
        let mut seen = Vec::new();
        KeywordSet::new(
            self.primary_keywords
                .iter()
                .chain(&self.secondary_keywords)
                .filter(|keyword| {
                    let key = keyword.trim().to_lowercase();
                    if key.is_empty() || seen.contains(&key) {
                        return false;
                    }
                    seen.push(key);
                    true
                }),
        )
    }
}

pub fn content_analysis_prompt(page: &PageContent) -> String {
    let excerpt: String = page
        .body_text
        .chars()
        .take(MAX_ANALYSIS_CONTENT_LENGTH)
        .collect();
    fill_template(
        CONTENT_ANALYSIS_PROMPT_TEMPLATE,
        &[("title", page.title.as_str()), ("content", excerpt.as_str())],
    )
}

/// Asks the model to analyse the page's title and content.
///
/// A response without a parseable JSON object yields an empty analysis.
///
/// # Errors
///
/// Returns an [`LlmError`] only when the provider call itself fails.
pub async fn analyze_content(
    page: &PageContent,
    ctx: &LlmContext<'_>,
) -> Result<ContentAnalysis, LlmError> {
    let response = match complete(ctx, content_analysis_prompt(page)).await {
        Ok(response) => response,
        Err(LlmError::EmptyResponse) => return Ok(ContentAnalysis::default()),
        Err(e) => return Err(e),
    };

    let analysis = parse_content_analysis(&response);
    debug!(
        "Content analysis found {} primary and {} secondary keywords",
        analysis.primary_keywords.len(),
        analysis.secondary_keywords.len()
    );
    Ok(analysis)
}

/// Reads the first JSON object out of a model response.
pub fn parse_content_analysis(response: &str) -> ContentAnalysis {
    let Some(block) = extract_json_block(response, '{') else {
        warn!("No JSON object in content analysis response");
        return ContentAnalysis::default();
    };

    serde_json::from_str(block).unwrap_or_else(|e| {
        warn!("Unable to parse content analysis: {e}");
        ContentAnalysis::default()
    })
}

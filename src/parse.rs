//! The parse module isolates a title and a bounded body text from fetched markup.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector as ScraperSelector};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_CONTENT_LENGTH, TRUNCATION_MARKER};
use crate::error::ExtractError;
use crate::fetch::RawPage;

/// Title and body text of a page, as handed to the LLM stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub title: String,
    pub body_text: String,
}

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: [&str; 6] = ["script", "style", "head", "noscript", "template", "svg"];

/// Order in which content containers are preferred.
const CONTENT_CONTAINERS: [&str; 3] = ["main", "article", "body"];

/// Words that mark a Markdown line as navigation rather than a heading.
const NAVIGATION_WORDS: [&str; 2] = ["menu", "navigation"];

/// Markdown syntax removals, applied in order. The replacement keeps the
/// capture group where the syntax wraps visible text.
static MARKDOWN_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"```[\s\S]*?```", ""),
        (r"!\[[^\]]*\]\([^)]*\)", ""),
        (r"\[([^\]]+)\]\([^)]+\)", "$1"),
        (r"(?m)^#{1,6}\s+", ""),
        (r"\*\*([^*]+)\*\*", "$1"),
        (r"\*([^*\n]+)\*", "$1"),
        (r"`([^`]+)`", "$1"),
        (r"(?m)^\s*-{3,}\s*$", ""),
        (r"(?m)^>\s*", ""),
        (r"(?m)^\s*[-*+]\s+", ""),
        (r"(?m)^\s*\d+\.\s+", ""),
        (r"(?m)^[ \t]+|[ \t]+$", ""),
        (r"[ \t]+", " "),
        (r"\n\s*\n", "\n\n"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Extracts a [`PageContent`] from raw page markup.
///
/// HTML pages take their title from `<title>`, falling back to the first
/// `<h1>`. Markdown pages take it from the scraper metadata, falling back to
/// the first plausible heading line. In both cases the body is cut at
/// [`MAX_CONTENT_LENGTH`] characters.
///
/// # Errors
///
/// Returns [`ExtractError::Empty`] if neither a title nor body text was found,
/// [`ExtractError::MissingTitle`] or [`ExtractError::MissingBody`] if only one
/// of them is missing.
pub fn extract_page(raw: &RawPage) -> Result<PageContent, ExtractError> {
    let (title, body_text) = match raw {
        RawPage::Html(html) => extract_html(html),
        RawPage::Markdown {
            markdown, title, ..
        } => extract_markdown(markdown, title.as_deref()),
    };

    match (title.is_empty(), body_text.is_empty()) {
        (true, true) => Err(ExtractError::Empty),
        (true, false) => Err(ExtractError::MissingTitle),
        (false, true) => Err(ExtractError::MissingBody),
        (false, false) => Ok(PageContent { title, body_text }),
    }
}

fn extract_html(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let body = CONTENT_CONTAINERS
        .iter()
        .filter_map(|tag| first_element(&document, tag))
        .map(visible_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    let title = ["title", "h1"]
        .iter()
        .filter_map(|tag| first_element(&document, tag))
        .map(|element| collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")))
        .find(|text| !text.is_empty())
        .unwrap_or_default();

    (title, truncate_body(&body))
}

fn first_element<'a>(document: &'a Html, tag: &str) -> Option<ElementRef<'a>> {
    let selector = ScraperSelector::parse(tag).ok()?;
    document.select(&selector).next()
}

/// Collects the text below `element`, skipping scripts, styles and similar.
fn visible_text(element: ElementRef<'_>) -> String {
    let parts: Vec<&str> = element
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
                    Node::Element(parent) => SKIPPED_ELEMENTS.contains(&parent.name()),
                    _ => false,
                });
                (!hidden).then_some(&**text)
            }
            _ => None,
        })
        .collect();

    collapse_whitespace(&parts.join(" "))
}

fn extract_markdown(markdown: &str, metadata_title: Option<&str>) -> (String, String) {
    let cleaned = clean_markdown(markdown);
    let title = metadata_title
        .map(collapse_whitespace)
        .filter(|title| !title.is_empty())
        .or_else(|| title_from_lines(&cleaned))
        .unwrap_or_default();

    (title, truncate_body(&cleaned))
}

/// Strips Markdown syntax, keeping link text and paragraph breaks.
pub fn clean_markdown(markdown: &str) -> String {
    MARKDOWN_RULES
        .iter()
        .fold(markdown.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
        .trim()
        .to_string()
}

/// Picks the first short line among the opening lines that looks like a heading.
fn title_from_lines(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(5)
        .find(|line| {
            let length = line.chars().count();
            let lowered = line.to_lowercase();
            length > 5
                && length < 100
                && !line.contains('|')
                && !NAVIGATION_WORDS.iter().any(|word| lowered.contains(word))
        })
        .map(str::to_string)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to [`MAX_CONTENT_LENGTH`] characters and appends the
/// truncation marker when anything was cut.
pub fn truncate_body(text: &str) -> String {
    match text.char_indices().nth(MAX_CONTENT_LENGTH) {
        Some((cut, _)) => {
            let kept = text.get(..cut).unwrap_or(text);
            format!("{kept}{TRUNCATION_MARKER}")
        }
        None => text.to_string(),
    }
}

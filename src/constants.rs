pub const OPENROUTER_API_KEY_ENV_NAME: &str = "SCHEMAFAQ_OPENROUTER_API_KEY";
pub const SERPER_API_KEY_ENV_NAME: &str = "SCHEMAFAQ_SERPER_API_KEY";
pub const FIRECRAWL_API_KEY_ENV_NAME: &str = "SCHEMAFAQ_FIRECRAWL_API_KEY";

pub const USER_AGENT: &str = "SchemaFAQBot/1.0";

pub const DEFAULT_LLM_BACKEND: &str = "openai";
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1/";
pub const DEFAULT_MODEL: &str = "google/gemma-3-27b-it:free";
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://google.serper.dev/search";
pub const DEFAULT_SCRAPER_ENDPOINT: &str = "https://api.firecrawl.dev/v1/scrape";
pub const DEFAULT_LOG_PATH: &str = "admin_logs.json";

/// Maximum number of characters of page body handed to the LLM.
pub const MAX_CONTENT_LENGTH: usize = 15_000;
pub const TRUNCATION_MARKER: &str = "... (truncated)";

pub const MAX_KEYWORDS: usize = 5;

pub const PLAIN_TEXT_UNAVAILABLE: &str = "Could not generate plain text FAQ.";

pub(crate) const THINK_STRIPPER: &str = r"<think>[\s\S]*</think>\s*";

/// `{name}` slots of the prompt templates
pub(crate) const PLACEHOLDER_PATTERN: &str = r"\{(\w+)\}";

pub(crate) const KEYWORDS_SYSTEM_PROMPT: &str = "You are an expert in SEO and keyword extraction. \
Your task is to extract the most relevant search keywords from the given webpage title.";

pub(crate) const KEYWORDS_PROMPT_TEMPLATE: &str = r#"Title: {title}

Return between 3 and 5 SEO-relevant keywords for this title.
Output ONLY a JSON array of strings, for example ["keyword one", "keyword two", "keyword three"].
Do not add any explanation before or after the array."#;

/// Characters of page body the content analysis sees.
pub const MAX_ANALYSIS_CONTENT_LENGTH: usize = 3_000;

pub(crate) const CONTENT_ANALYSIS_SYSTEM_PROMPT: &str = "You are an SEO keyword analysis expert. \
Analyse the content and extract the relevant keywords. Reply with pure JSON and no other text.";

pub(crate) const CONTENT_ANALYSIS_PROMPT_TEMPLATE: &str = r#"Title: {title}
Content: {content}

Analyse this page and return a JSON object of this shape:
{"primaryKeywords": ["3-5 primary keywords"], "secondaryKeywords": ["5-8 secondary keywords"], "longTailKeywords": ["3-5 long-tail keywords"], "semanticKeywords": ["10-15 semantically related terms"]}"#;

pub(crate) const SCHEMA_SYSTEM_PROMPT: &str = "You are an AI SEO expert. Your task is to generate FAQ \
schema structured data in JSON-LD format, based on the provided page content and \"People Also Ask\" \
data. Ensure the generated schema is valid JSON-LD and follows the schema.org FAQPage schema guidelines.";

pub(crate) const SCHEMA_PROMPT_TEMPLATE: &str = r#"Title Keywords: {keywords}
Page Content: {content}
People Also Ask: {people_also_ask}

{count_instruction}
Every answer must be supported by the page content.
Output exactly one JSON-LD block and nothing else: no commentary before or after it."#;

pub(crate) const FORMAT_SYSTEM_PROMPT: &str = "You are a text formatting assistant. Your task is to \
convert the given JSON-LD FAQPage schema into a plain text question and answer format. For each \
question and answer pair found in the 'mainEntity' array of the JSON-LD, format it strictly as:\n\
問：[Question text from the 'name' field of the Question object]\n\
答：[Answer text from the 'text' field of the acceptedAnswer object]\n\n\
Ensure each Q&A pair is separated by exactly one blank line. If the input JSON-LD is invalid or \
does not contain FAQ data, return an appropriate message like \"Could not parse FAQ content for \
plain text display.\"";

pub(crate) const FORMAT_PROMPT_TEMPLATE: &str = "JSON-LD Input:\n{schema}\n\nPlain Text Output:";

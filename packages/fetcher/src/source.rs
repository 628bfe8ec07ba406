//! Book-source documents.
//!
//! A book source is the JSON document users import to teach the reader one
//! website. Field names are camelCase; unknown fields are ignored and every
//! rule is optional, so partial or older documents still load.
//!
//! ```json
//! {
//!   "bookSourceName": "Example",
//!   "bookSourceUrl": "https://www.example.com",
//!   "searchUrl": "/search?q={{key}}&page={{page}}",
//!   "ruleSearch": { "bookList": "class.item", "name": "tag.h3@text", "bookUrl": "tag.a@href" },
//!   "ruleToc": { "chapterList": "id.list@tag.a", "chapterName": "text", "chapterUrl": "href" },
//!   "ruleContent": { "content": "id.content@html" }
//! }
//! ```

use crate::error::{FetcherError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Rules for the search results page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRule {
    /// Rows, one per book. A leading `-` reverses the row order.
    pub book_list: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
    pub kind: Option<String>,
    pub word_count: Option<String>,
    pub last_chapter: Option<String>,
    pub intro: Option<String>,
    pub cover_url: Option<String>,
    pub book_url: Option<String>,
}

/// Rules for the book detail page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookInfoRule {
    /// Narrows the page to one element before the other rules run
    pub init: Option<String>,
    pub name: Option<String>,
    pub author: Option<String>,
    pub intro: Option<String>,
    pub kind: Option<String>,
    pub word_count: Option<String>,
    pub last_chapter: Option<String>,
    pub cover_url: Option<String>,
    /// Chapter list location; the detail page itself when absent
    pub toc_url: Option<String>,
}

/// Rules for chapter-list pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TocRule {
    /// Rows, one per chapter. A leading `-` reverses the row order.
    pub chapter_list: Option<String>,
    pub chapter_name: Option<String>,
    pub chapter_url: Option<String>,
    pub next_toc_url: Option<String>,
}

/// Rules for chapter pages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentRule {
    pub content: Option<String>,
    pub next_content_url: Option<String>,
    /// Rule applied to the assembled chapter text, usually `##pattern##replacement`
    pub replace_regex: Option<String>,
}

/// One imported book source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookSource {
    pub book_source_name: String,
    pub book_source_url: String,
    pub book_source_group: Option<String>,
    pub enabled: bool,
    /// Extra request headers as JSON object text
    pub header: Option<String>,
    pub search_url: Option<String>,
    pub rule_search: SearchRule,
    pub rule_book_info: BookInfoRule,
    pub rule_toc: TocRule,
    pub rule_content: ContentRule,
}

impl Default for BookSource {
    fn default() -> Self {
        Self {
            book_source_name: String::new(),
            book_source_url: String::new(),
            book_source_group: None,
            enabled: true,
            header: None,
            search_url: None,
            rule_search: SearchRule::default(),
            rule_book_info: BookInfoRule::default(),
            rule_toc: TocRule::default(),
            rule_content: ContentRule::default(),
        }
    }
}

impl BookSource {
    /// Display name, falling back to the source URL.
    pub fn display_name(&self) -> &str {
        if self.book_source_name.is_empty() {
            &self.book_source_url
        } else {
            &self.book_source_name
        }
    }

    /// True when the source can take part in a search.
    pub fn is_searchable(&self) -> bool {
        self.enabled && !rule(&self.search_url).is_empty() && !rule(&self.rule_search.book_list).is_empty()
    }

    /// Headers from the `header` field.
    ///
    /// Header text that is not a JSON object is ignored with a warning.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let text = rule(&self.header);
        if text.is_empty() {
            return BTreeMap::new();
        }
        match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(text) {
            Ok(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(source = %self.display_name(), error = %e, "Ignoring unusable header field");
                BTreeMap::new()
            }
        }
    }

    /// True when `url` belongs to this source's site.
    pub fn serves(&self, url: &str) -> bool {
        match (Url::parse(&self.book_source_url), Url::parse(url)) {
            (Ok(own), Ok(other)) => own.host_str().is_some() && own.host_str() == other.host_str(),
            _ => false,
        }
    }

    fn validate(self) -> Result<Self> {
        if self.book_source_url.trim().is_empty() {
            return Err(FetcherError::InvalidSource(format!(
                "'{}' has no bookSourceUrl",
                self.book_source_name
            )));
        }
        Url::parse(&self.book_source_url).map_err(|e| {
            FetcherError::InvalidSource(format!("'{}': bookSourceUrl {e}", self.book_source_name))
        })?;
        Ok(self)
    }
}

/// Rule text of an optional field, empty when absent.
pub fn rule(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or_default().trim()
}

/// Parse a document holding one source or an array of sources.
pub fn parse_sources(text: &str) -> Result<Vec<BookSource>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let sources: Vec<BookSource> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(value)?],
        _ => {
            return Err(FetcherError::InvalidSource(
                "expected a source object or an array of sources".to_string(),
            ))
        }
    };
    sources.into_iter().map(BookSource::validate).collect()
}

/// Load sources from a JSON file.
pub fn load_sources(path: &Path) -> Result<Vec<BookSource>> {
    let text = std::fs::read_to_string(path)?;
    let sources = parse_sources(&text)?;
    tracing::debug!(path = %path.display(), count = sources.len(), "Loaded book sources");
    Ok(sources)
}

/// Pick the source for `url`: by name or source URL when `name` is given,
/// otherwise the source serving the URL's host.
pub fn find_source<'a>(
    sources: &'a [BookSource],
    name: Option<&str>,
    url: &str,
) -> Result<&'a BookSource> {
    let found = match name {
        Some(name) => sources
            .iter()
            .find(|s| s.book_source_name == name || s.book_source_url == name),
        None => sources.iter().find(|s| s.serves(url)),
    };
    found.ok_or_else(|| FetcherError::SourceNotFound(name.unwrap_or(url).to_string()))
}

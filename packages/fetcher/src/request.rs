//! Requests built from book-source URL templates.
//!
//! A source URL is a template plus an optional JSON option suffix:
//!
//! ```text
//! /search?q={{key}}&page={{page}}
//! /api/search,{"method":"POST","body":"kw={{key}}","headers":{"X-Token":"t"}}
//! /list?start={{(page - 1) * 20}}
//! ```
//!
//! `{{key}}` / `{{searchKey}}` become the percent-encoded keyword and
//! `{{page}}` / `{{searchPage}}` the page number. Any other `{{expr}}` is
//! handed to the rule engine after `key` and `page` inside it are replaced by
//! their values.

use crate::error::{FetcherError, Result};
use crate::source::{rule, BookSource};
use bookscout_engine::{absolute_url, extract_string, Context, Node};
use regex::{NoExpand, Regex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static KEY_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(?:searchKey|key)\s*\}\}").expect("valid regex"));

#[allow(clippy::expect_used)]
static PAGE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(?:searchPage|page)\s*\}\}").expect("valid regex"));

#[allow(clippy::expect_used)]
static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("valid regex"));

#[allow(clippy::expect_used)]
static KEY_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:searchKey|key)\b").expect("valid regex"));

#[allow(clippy::expect_used)]
static PAGE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:searchPage|page)\b").expect("valid regex"));

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A resolved request, ready for a [`Transport`](crate::http::Transport).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    /// Plain GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Request for a page URL found on a source's site.
    ///
    /// The URL may carry an option suffix; it is resolved against
    /// `bookSourceUrl` and receives the source headers.
    pub fn for_source(source: &BookSource, url: &str) -> Result<Self> {
        let (target, options) = split_options(url);
        let resolved = absolute_url(&source.book_source_url, target)?;
        Ok(Self::with_options(source, resolved, options))
    }

    fn with_options(source: &BookSource, url: String, options: Option<UrlOptions>) -> Self {
        let mut request = Self {
            url,
            method: Method::Get,
            body: None,
            headers: source.headers(),
        };
        if let Some(options) = options {
            if options.method.eq_ignore_ascii_case("post") {
                request.method = Method::Post;
            }
            request.body = options.body;
            request.headers.extend(
                options
                    .headers
                    .into_iter()
                    .map(|(k, v)| match v {
                        serde_json::Value::String(s) => (k, s),
                        other => (k, other.to_string()),
                    }),
            );
        }
        request
    }
}

/// Option suffix of a URL template.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UrlOptions {
    method: String,
    body: Option<String>,
    headers: BTreeMap<String, serde_json::Value>,
}

/// Split `url,{options}` at the first `,{` whose remainder is a JSON object.
fn split_options(template: &str) -> (&str, Option<UrlOptions>) {
    for (at, _) in template.match_indices(",{") {
        let suffix = &template[at + 1..];
        if let Ok(options) = serde_json::from_str::<UrlOptions>(suffix) {
            return (template[..at].trim(), Some(options));
        }
    }
    (template.trim(), None)
}

/// Build the search request for one page of results.
pub fn search_request(source: &BookSource, keyword: &str, page: u32) -> Result<Request> {
    let template = rule(&source.search_url);
    if template.is_empty() {
        return Err(FetcherError::InvalidSource(format!(
            "'{}' has no searchUrl",
            source.display_name()
        )));
    }

    let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
    let filled = KEY_PLACEHOLDER.replace_all(template, NoExpand(&encoded));
    let filled = PAGE_PLACEHOLDER.replace_all(&filled, NoExpand(&page.to_string()));
    let filled = if filled.contains("{{") {
        evaluate_expressions(source, &filled, keyword, page)
    } else {
        filled.into_owned()
    };

    let (target, options) = split_options(&filled);
    let url = absolute_url(&source.book_source_url, target)?;
    tracing::debug!(source = %source.display_name(), %url, "Built search request");
    Ok(Request::with_options(source, url, options))
}

/// Evaluate the remaining `{{expr}}` placeholders through the rule engine.
fn evaluate_expressions(source: &BookSource, template: &str, keyword: &str, page: u32) -> String {
    let literal = format!("\"{}\"", keyword.replace('\\', "\\\\").replace('"', "\\\""));
    let page_text = page.to_string();
    let prepared = EXPRESSION.replace_all(template, |caps: &regex::Captures<'_>| {
        let body = KEY_WORD.replace_all(&caps[1], NoExpand(&literal));
        let body = PAGE_WORD.replace_all(&body, NoExpand(&page_text));
        format!("{{{{{body}}}}}")
    });

    let mut context = Context::new().with_base_url(source.book_source_url.clone());
    context.put("key", keyword);
    context.put("page", page_text.clone());
    extract_string(&prepared, &mut context, Node::Text(String::new()))
        .unwrap_or_else(|| prepared.into_owned())
}

//! Helpers for reading source rules through a dispatcher.

use crate::source::{rule, BookSource};
use bookscout_engine::{BookInfo, Context, RuleDispatcher, SourceInfo};

/// Context for one fetched page of `source`.
pub(crate) fn page_context(source: &BookSource, page_url: &str, book: BookInfo) -> Context {
    Context::new()
        .with_source(SourceInfo {
            name: source.book_source_name.clone(),
            url: source.book_source_url.clone(),
        })
        .with_book(book)
        .with_base_url(page_url)
}

/// Strip the `-` prefix of a list rule; true means the rows are reversed.
pub(crate) fn list_rule(text: &str) -> (&str, bool) {
    match text.strip_prefix('-') {
        Some(rest) => (rest.trim_start(), true),
        None => (text.strip_prefix('+').unwrap_or(text), false),
    }
}

/// Trimmed field value, empty when the rule is absent or extracts nothing.
pub(crate) fn text(dispatcher: &mut RuleDispatcher<'_>, field: &Option<String>) -> String {
    let rule = rule(field);
    if rule.is_empty() {
        return String::new();
    }
    dispatcher
        .get_string(rule)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Absolute URL a field points at.
pub(crate) fn url(dispatcher: &mut RuleDispatcher<'_>, field: &Option<String>) -> Option<String> {
    let rule = rule(field);
    if rule.is_empty() {
        return None;
    }
    dispatcher.get_url(rule)
}

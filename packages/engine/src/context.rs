//! Extraction context
//!
//! Holds the variable store that `@put` writes and `@get` reads, plus
//! read-only views of the book and book source an extraction runs for.
//!
//! # Lifecycle
//!
//! One context per top-level extraction call (one search request, one TOC
//! fetch, one chapter fetch). It is dropped when the call completes and is
//! never shared between in-flight extractions.
//!
//! # Resolution Priority
//!
//! [`Context::get`] resolves a key in the following order (first match wins):
//! 1. **Variables** - values stored with `@put` / [`Context::put`]
//! 2. **Book fields** - `bookName`, `bookAuthor`, `bookUrl`, `tocUrl`, ...
//! 3. **Source fields** - `sourceName`, `sourceUrl`
//! 4. **Base URL** - `baseUrl`
//! 5. **Book variables** - variables persisted on the book record

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read-only view of the book an extraction runs for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookInfo {
    pub name: String,
    pub author: String,
    pub book_url: String,
    pub toc_url: String,
    pub cover_url: String,
    pub intro: String,
    pub kind: String,
    pub last_chapter: String,
    /// Variables persisted with the book by earlier extractions
    pub variables: HashMap<String, String>,
}

impl BookInfo {
    /// Book with a name and author, the two fields scripts see.
    pub fn new(name: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            ..Self::default()
        }
    }
}

/// Read-only view of the book source an extraction runs for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceInfo {
    pub name: String,
    pub url: String,
}

/// Variable store and record accessors for one extraction call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Values stored by `@put` directives
    variables: HashMap<String, String>,

    /// Book the extraction runs for
    book: BookInfo,

    /// Source the extraction runs for
    source: SourceInfo,

    /// URL of the document currently being extracted
    base_url: String,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the book record.
    pub fn with_book(mut self, book: BookInfo) -> Self {
        self.book = book;
        self
    }

    /// Set the source record.
    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = source;
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Store a variable.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        tracing::trace!(key = %key, value = %value, "Context variable stored");
        self.variables.insert(key, value);
    }

    /// Resolve a key following the priority order in the module docs.
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.variables.get(key) {
            return Some(value);
        }
        let builtin = match key {
            "bookName" | "name" => Some(self.book.name.as_str()),
            "bookAuthor" | "author" => Some(self.book.author.as_str()),
            "bookUrl" => Some(self.book.book_url.as_str()),
            "tocUrl" => Some(self.book.toc_url.as_str()),
            "sourceName" => Some(self.source.name.as_str()),
            "sourceUrl" => Some(self.source.url.as_str()),
            "baseUrl" => Some(self.base_url.as_str()),
            _ => None,
        };
        builtin
            .filter(|v| !v.is_empty())
            .or_else(|| self.book.variables.get(key).map(String::as_str))
    }

    /// Resolve a key, empty string when unknown.
    pub fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Variables stored so far.
    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    /// Book record.
    pub fn book(&self) -> &BookInfo {
        &self.book
    }

    /// Source record.
    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// URL of the current document.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Re-point the context at a new page (next TOC page, redirect target).
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context::new()
            .with_book(BookInfo::new("Dune", "Frank Herbert"))
            .with_source(SourceInfo {
                name: "Example".to_string(),
                url: "https://example.com".to_string(),
            })
            .with_base_url("https://example.com/book/1")
    }

    #[test]
    fn test_put_and_get() {
        let mut ctx = context();
        ctx.put("bid", "42");
        assert_eq!(ctx.get("bid"), Some("42"));
    }

    #[test]
    fn test_builtin_fields() {
        let ctx = context();
        assert_eq!(ctx.get("bookName"), Some("Dune"));
        assert_eq!(ctx.get("bookAuthor"), Some("Frank Herbert"));
        assert_eq!(ctx.get("sourceUrl"), Some("https://example.com"));
        assert_eq!(ctx.get("baseUrl"), Some("https://example.com/book/1"));
    }

    #[test]
    fn test_variables_shadow_builtins() {
        let mut ctx = context();
        ctx.put("bookName", "Override");
        assert_eq!(ctx.get("bookName"), Some("Override"));
    }

    #[test]
    fn test_book_variables_are_last_resort() {
        let mut book = BookInfo::new("Dune", "");
        book.variables.insert("tocId".to_string(), "7".to_string());
        let ctx = Context::new().with_book(book);
        assert_eq!(ctx.get("tocId"), Some("7"));
        assert_eq!(ctx.get("missing"), None);
        assert_eq!(ctx.get_or_empty("missing"), "");
    }

    #[test]
    fn test_empty_builtin_is_unresolved() {
        let ctx = Context::new();
        assert_eq!(ctx.get("bookName"), None);
    }
}

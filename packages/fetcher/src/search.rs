//! Multi-source search.
//!
//! Every searchable source is queried concurrently, bounded by
//! [`MAX_CONCURRENT_SOURCES`]. Rule evaluation is synchronous and runs
//! between awaits, so parsed documents never cross a task boundary.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{FIRST_PAGE, MAX_CONCURRENT_SOURCES};
use crate::error::Result;
use crate::extract::{list_rule, page_context, text, url};
use crate::http::Transport;
use crate::request::search_request;
use crate::source::{rule, BookSource};
use bookscout_engine::{BookInfo, Node, RuleDispatcher};

/// One search result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBook {
    pub name: String,
    pub author: String,
    pub kind: String,
    pub word_count: String,
    pub last_chapter: String,
    pub intro: String,
    pub cover_url: Option<String>,
    pub book_url: String,
    /// `bookSourceUrl` of the source that found the book
    pub origin: String,
    pub origin_name: String,
}

/// Search all enabled sources for `keyword`.
///
/// Results arrive in completion order and are de-duplicated by book URL. A
/// failing source is logged and skipped.
pub async fn search(
    transport: Arc<dyn Transport>,
    sources: &[BookSource],
    keyword: &str,
) -> Vec<SearchBook> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_SOURCES));
    let mut tasks = JoinSet::new();

    for source in sources.iter().filter(|s| s.is_searchable()) {
        let transport = Arc::clone(&transport);
        let semaphore = Arc::clone(&semaphore);
        let source = source.clone();
        let keyword = keyword.to_string();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let found = search_source(transport.as_ref(), &source, &keyword).await;
            (source.book_source_name, found)
        });
    }

    let mut seen = HashSet::new();
    let mut books = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(found))) => {
                books.extend(found.into_iter().filter(|b| seen.insert(b.book_url.clone())));
            }
            Ok((name, Err(e))) => {
                tracing::warn!(source = %name, error = %e, "Search failed, skipping source");
            }
            Err(e) => tracing::warn!(error = %e, "Search task aborted"),
        }
    }
    tracing::debug!(keyword, results = books.len(), "Search finished");
    books
}

/// Search one source, first page of results.
pub async fn search_source(
    transport: &dyn Transport,
    source: &BookSource,
    keyword: &str,
) -> Result<Vec<SearchBook>> {
    let request = search_request(source, keyword, FIRST_PAGE)?;
    let body = transport.fetch(&request).await?;
    Ok(parse_search_page(source, &body, &request.url, keyword, FIRST_PAGE))
}

/// Extract search results from a fetched page.
///
/// Rows without a name are skipped. A missing `bookUrl` rule means the page
/// itself is the book page.
pub fn parse_search_page(
    source: &BookSource,
    body: &str,
    page_url: &str,
    keyword: &str,
    page: u32,
) -> Vec<SearchBook> {
    let rules = &source.rule_search;
    let mut context = page_context(source, page_url, BookInfo::default());
    context.put("key", keyword);
    context.put("page", page.to_string());

    let (list, reverse) = list_rule(rule(&rules.book_list));
    let mut dispatcher = RuleDispatcher::new(&mut context, Node::parse(body));
    let mut rows = dispatcher.get_elements(list);
    if reverse {
        rows.reverse();
    }
    tracing::debug!(source = %source.display_name(), rows = rows.len(), "Search rows");

    let mut books = Vec::new();
    for row in rows {
        dispatcher.set_content(row);
        let name = text(&mut dispatcher, &rules.name);
        if name.is_empty() {
            continue;
        }
        books.push(SearchBook {
            name,
            author: text(&mut dispatcher, &rules.author),
            kind: text(&mut dispatcher, &rules.kind),
            word_count: text(&mut dispatcher, &rules.word_count),
            last_chapter: text(&mut dispatcher, &rules.last_chapter),
            intro: text(&mut dispatcher, &rules.intro),
            cover_url: url(&mut dispatcher, &rules.cover_url),
            book_url: url(&mut dispatcher, &rules.book_url).unwrap_or_else(|| page_url.to_string()),
            origin: source.book_source_url.clone(),
            origin_name: source.book_source_name.clone(),
        });
    }
    books
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SearchRule;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"
        <div class="result">
          <div class="item"><h3><a href="/book/1/">Dune</a></h3><span class="author">Frank Herbert</span>
            <img src="/covers/1.jpg"></div>
          <div class="item"><h3><a href="/book/2/">Emma</a></h3><span class="author">Jane Austen</span></div>
          <div class="item"><span class="author">Nobody</span></div>
        </div>"#;

    fn source() -> BookSource {
        BookSource {
            book_source_name: "Example".to_string(),
            book_source_url: "https://www.example.com".to_string(),
            search_url: Some("/search?q={{key}}".to_string()),
            rule_search: SearchRule {
                book_list: Some("class.item".to_string()),
                name: Some("tag.h3@text".to_string()),
                author: Some("class.author@text".to_string()),
                cover_url: Some("tag.img@src".to_string()),
                book_url: Some("tag.a@href".to_string()),
                ..SearchRule::default()
            },
            ..BookSource::default()
        }
    }

    #[test]
    fn test_parse_search_page() {
        let books = parse_search_page(&source(), PAGE, "https://www.example.com/search?q=x", "x", 1);
        assert_eq!(books.len(), 2, "row without a name is skipped");
        assert_eq!(books[0].name, "Dune");
        assert_eq!(books[0].author, "Frank Herbert");
        assert_eq!(books[0].book_url, "https://www.example.com/book/1/");
        assert_eq!(books[0].cover_url.as_deref(), Some("https://www.example.com/covers/1.jpg"));
        assert_eq!(books[1].cover_url, None);
        assert_eq!(books[1].origin_name, "Example");
    }

    #[test]
    fn test_reversed_rows() {
        let mut src = source();
        src.rule_search.book_list = Some("-class.item".to_string());
        let books = parse_search_page(&src, PAGE, "https://www.example.com/search?q=x", "x", 1);
        let names: Vec<&str> = books.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Emma", "Dune"]);
    }

    #[test]
    fn test_missing_book_url_rule_uses_page_url() {
        let mut src = source();
        src.rule_search.book_url = None;
        let books = parse_search_page(&src, PAGE, "https://www.example.com/search?q=x", "x", 1);
        assert_eq!(books[0].book_url, "https://www.example.com/search?q=x");
    }

    #[test]
    fn test_keyword_is_visible_to_rules() {
        let mut src = source();
        src.rule_search.intro = Some("@get:{key}".to_string());
        let books = parse_search_page(&src, PAGE, "https://www.example.com/search?q=x", "dune", 1);
        assert_eq!(books[0].intro, "dune");
    }

    #[test]
    fn test_search_book_serializes_camel_case() {
        let book = SearchBook {
            name: "Dune".to_string(),
            book_url: "https://www.example.com/book/1/".to_string(),
            ..SearchBook::default()
        };
        let value = serde_json::to_value(&book).unwrap();
        assert_eq!(value["bookUrl"], "https://www.example.com/book/1/");
        assert_eq!(value["wordCount"], "");
    }
}

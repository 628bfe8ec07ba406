//! Book details, chapter lists and chapter text.
//!
//! Each operation fetches pages through a [`Transport`] and evaluates the
//! source rules on them synchronously. Paged chapter lists follow
//! `nextTocUrl`; paged chapters follow `nextContentUrl`. A failure on the
//! first page is an error, a failure on a later page ends the walk with what
//! was collected so far.

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::config::{MAX_CONTENT_PAGES, MAX_TOC_PAGES, PAGE_FETCH_DELAY_MS};
use crate::error::Result;
use crate::extract::{list_rule, page_context, text, url};
use crate::http::Transport;
use crate::request::Request;
use crate::source::{rule, BookSource};
use bookscout_engine::{BookInfo, Node, RuleDispatcher};

#[allow(clippy::expect_used)]
static LINE_BREAK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</?p(?:\s[^>]*)?>|</div>").expect("valid regex"));

#[allow(clippy::expect_used)]
static HIDDEN_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<!--.*?-->")
        .expect("valid regex")
});

#[allow(clippy::expect_used)]
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Book detail page fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDetail {
    pub name: String,
    pub author: String,
    pub intro: String,
    pub kind: String,
    pub word_count: String,
    pub last_chapter: String,
    pub cover_url: Option<String>,
    pub book_url: String,
    /// Where the chapter list lives; the book URL when the source has no `tocUrl` rule
    pub toc_url: String,
}

/// One entry of a chapter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// Chapters and follow-up links found on one chapter-list page.
#[derive(Debug, Default)]
pub struct TocPage {
    pub chapters: Vec<Chapter>,
    pub next_urls: Vec<String>,
}

/// Text and follow-up links found on one chapter page.
#[derive(Debug, Default)]
pub struct ContentPage {
    pub text: String,
    pub next_urls: Vec<String>,
}

/// Fetch and parse a book detail page.
pub async fn book_info(
    transport: &dyn Transport,
    source: &BookSource,
    book_url: &str,
) -> Result<BookDetail> {
    let request = Request::for_source(source, book_url)?;
    let body = transport.fetch(&request).await?;
    Ok(parse_book_info(source, &body, &request.url))
}

/// Extract book details from a fetched detail page.
///
/// The `init` rule, when present, narrows the page to its first match.
pub fn parse_book_info(source: &BookSource, body: &str, book_url: &str) -> BookDetail {
    let rules = &source.rule_book_info;
    let mut context = page_context(source, book_url, BookInfo::default());
    let mut dispatcher = RuleDispatcher::new(&mut context, Node::parse(body));

    let init = rule(&rules.init);
    if !init.is_empty() {
        match dispatcher.get_elements(init).into_iter().next() {
            Some(scope) => dispatcher.set_content(scope),
            None => tracing::debug!(rule = %init, "init rule matched nothing, using whole page"),
        }
    }

    BookDetail {
        name: text(&mut dispatcher, &rules.name),
        author: text(&mut dispatcher, &rules.author),
        intro: text(&mut dispatcher, &rules.intro),
        kind: text(&mut dispatcher, &rules.kind),
        word_count: text(&mut dispatcher, &rules.word_count),
        last_chapter: text(&mut dispatcher, &rules.last_chapter),
        cover_url: url(&mut dispatcher, &rules.cover_url),
        book_url: book_url.to_string(),
        toc_url: url(&mut dispatcher, &rules.toc_url).unwrap_or_else(|| book_url.to_string()),
    }
}

/// Fetch the full chapter list starting at `toc_url`.
///
/// Chapters are de-duplicated by URL and numbered from 0 in reading order.
pub async fn toc(transport: &dyn Transport, source: &BookSource, toc_url: &str) -> Result<Vec<Chapter>> {
    let first = Request::for_source(source, toc_url)?.url;
    let mut queue = VecDeque::from([first]);
    let mut visited = HashSet::new();
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut seen_urls = HashSet::new();
    let dedupe = !rule(&source.rule_toc.chapter_url).is_empty();

    while let Some(page_url) = queue.pop_front() {
        if visited.len() >= MAX_TOC_PAGES {
            tracing::warn!(source = %source.display_name(), pages = visited.len(), "Chapter list page limit reached");
            break;
        }
        if !visited.insert(page_url.clone()) {
            continue;
        }
        if visited.len() > 1 {
            tokio::time::sleep(Duration::from_millis(PAGE_FETCH_DELAY_MS)).await;
        }

        let request = Request::for_source(source, &page_url)?;
        let body = match transport.fetch(&request).await {
            Ok(body) => body,
            Err(e) if visited.len() > 1 => {
                tracing::warn!(url = %page_url, error = %e, "Chapter list page failed, stopping");
                break;
            }
            Err(e) => return Err(e),
        };

        let page = parse_toc_page(source, &body, &request.url);
        chapters.extend(
            page.chapters
                .into_iter()
                .filter(|c| !dedupe || seen_urls.insert(c.url.clone())),
        );
        queue.extend(page.next_urls.into_iter().filter(|u| !visited.contains(u)));
    }

    if list_rule(rule(&source.rule_toc.chapter_list)).1 {
        chapters.reverse();
    }
    for (index, chapter) in chapters.iter_mut().enumerate() {
        chapter.index = index;
    }
    tracing::debug!(source = %source.display_name(), pages = visited.len(), chapters = chapters.len(), "Chapter list fetched");
    Ok(chapters)
}

/// Extract chapters and next-page links from one chapter-list page.
///
/// Rows without a title are skipped. Row order is the page order; `-`
/// reversal applies to the whole list in [`toc`].
pub fn parse_toc_page(source: &BookSource, body: &str, page_url: &str) -> TocPage {
    let rules = &source.rule_toc;
    let mut context = page_context(source, page_url, BookInfo::default());
    let mut dispatcher = RuleDispatcher::new(&mut context, Node::parse(body));

    let next_rule = rule(&rules.next_toc_url);
    let next_urls = if next_rule.is_empty() {
        Vec::new()
    } else {
        dispatcher
            .get_url_list(next_rule)
            .unwrap_or_default()
            .into_iter()
            .filter(|u| u != page_url)
            .collect()
    };

    let (list, _) = list_rule(rule(&rules.chapter_list));
    let rows = dispatcher.get_elements(list);
    let mut chapters = Vec::new();
    for row in rows {
        dispatcher.set_content(row);
        let title = text(&mut dispatcher, &rules.chapter_name);
        if title.is_empty() {
            continue;
        }
        chapters.push(Chapter {
            index: 0,
            title,
            url: url(&mut dispatcher, &rules.chapter_url).unwrap_or_else(|| page_url.to_string()),
        });
    }
    TocPage { chapters, next_urls }
}

/// Fetch one chapter's text, following `nextContentUrl` across pages.
///
/// Paging stops at `next_chapter_url`, at an already visited page or at
/// [`MAX_CONTENT_PAGES`]. The joined text is cleaned with [`format_content`]
/// and then passed through `replaceRegex`.
pub async fn content(
    transport: &dyn Transport,
    source: &BookSource,
    chapter_url: &str,
    next_chapter_url: Option<&str>,
) -> Result<String> {
    let mut next = Some(Request::for_source(source, chapter_url)?.url);
    let mut visited = HashSet::new();
    let mut pages = Vec::new();

    while let Some(page_url) = next.take() {
        if visited.len() >= MAX_CONTENT_PAGES {
            tracing::warn!(url = %chapter_url, pages = visited.len(), "Chapter page limit reached");
            break;
        }
        visited.insert(page_url.clone());
        if visited.len() > 1 {
            tokio::time::sleep(Duration::from_millis(PAGE_FETCH_DELAY_MS)).await;
        }

        let request = Request::for_source(source, &page_url)?;
        let body = match transport.fetch(&request).await {
            Ok(body) => body,
            Err(e) if visited.len() > 1 => {
                tracing::warn!(url = %page_url, error = %e, "Chapter page failed, stopping");
                break;
            }
            Err(e) => return Err(e),
        };

        let page = parse_content_page(source, &body, &request.url);
        pages.push(page.text);
        next = page
            .next_urls
            .into_iter()
            .find(|u| !visited.contains(u) && Some(u.as_str()) != next_chapter_url);
    }

    let text = format_content(&pages.join("\n"));
    Ok(apply_replace_regex(source, &text, chapter_url))
}

/// Extract text and next-page links from one chapter page.
pub fn parse_content_page(source: &BookSource, body: &str, page_url: &str) -> ContentPage {
    let rules = &source.rule_content;
    let mut context = page_context(source, page_url, BookInfo::default());
    let mut dispatcher = RuleDispatcher::new(&mut context, Node::parse(body));

    let next_rule = rule(&rules.next_content_url);
    let next_urls = if next_rule.is_empty() {
        Vec::new()
    } else {
        dispatcher.get_url_list(next_rule).unwrap_or_default()
    };
    ContentPage {
        text: text(&mut dispatcher, &rules.content),
        next_urls,
    }
}

/// Run `ruleContent.replaceRegex` over finished chapter text.
fn apply_replace_regex(source: &BookSource, text: &str, chapter_url: &str) -> String {
    let replace = rule(&source.rule_content.replace_regex);
    if replace.is_empty() || text.is_empty() {
        return text.to_string();
    }
    let mut context = page_context(source, chapter_url, BookInfo::default());
    let mut dispatcher = RuleDispatcher::new(&mut context, Node::Text(text.to_string()));
    dispatcher.get_string(replace).unwrap_or_default()
}

/// Turn chapter HTML into plain paragraphs.
///
/// Line-breaking tags become newlines, scripts, styles and comments are
/// dropped, other tags are stripped and common entities decoded. Lines are
/// trimmed and blank lines removed.
pub fn format_content(html: &str) -> String {
    let text = HIDDEN_BLOCK.replace_all(html, "");
    let text = LINE_BREAK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

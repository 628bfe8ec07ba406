//! XPath degrade
//!
//! There is no XPath engine. Simple location paths are translated to a CSS
//! selector plus an extraction keyword and evaluated by the CSS selector:
//!
//! - `//div` → `div`, `//div/a` → `div > a`, `//div//a` → `div a`
//! - `//div[1]` → `div:nth-of-type(1)`, `[last()]` → `:last-of-type`
//! - `[@class='x y']` → `.x.y`, `[@id='x']` → `#x`,
//!   `[contains(@class,'x')]` → `[class*="x"]`, `[@attr='v']` → `[attr="v"]`
//! - trailing `/text()` extracts text, trailing `/@attr` extracts an attribute
//! - `[position() > n]` skips the first `n` matches
//!
//! Anything else (axes, functions, unions) is handed to the CSS evaluator
//! verbatim and logged as [`EngineError::UnsupportedMode`].

use super::css;
use crate::document::ElementHandle;
use crate::error::{EngineError, Result};
use crate::splitter::{split_rule, COMBINATORS};
use crate::types::{merge_results, Dialect};
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static POSITION_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*(\d+)\s*\]").expect("valid regex"));

#[allow(clippy::expect_used)]
static LAST_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*last\s*\(\s*\)\s*\]").expect("valid regex"));

#[allow(clippy::expect_used)]
static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[@class\s*=\s*['"]([^'"]+)['"]\]"#).expect("valid regex"));

#[allow(clippy::expect_used)]
static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[@id\s*=\s*['"]([^'"]+)['"]\]"#).expect("valid regex"));

#[allow(clippy::expect_used)]
static CONTAINS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[contains\s*\(\s*@([a-zA-Z_][\w-]*)\s*,\s*['"]([^'"]+)['"]\s*\)\]"#)
        .expect("valid regex")
});

#[allow(clippy::expect_used)]
static GENERIC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[@([a-zA-Z_][\w-]*)\s*=\s*['"]([^'"]*)['"]\]"#).expect("valid regex")
});

#[allow(clippy::expect_used)]
static HAS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[@([a-zA-Z_][\w-]*)\]").expect("valid regex"));

#[allow(clippy::expect_used)]
static POSITION_GT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*position\s*\(\s*\)\s*>\s*(\d+)\s*\]").expect("valid regex")
});

#[allow(clippy::expect_used)]
static SUPPORTED_PSEUDO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":nth-of-type\(\d+\)|:last-of-type").expect("valid regex"));

/// An XPath expression rewritten for the CSS evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    /// CSS selector for the element set
    pub selector: String,
    /// Extraction keyword (`text`, `html`, or an attribute name), if the path
    /// ended in `text()`, `node()` or `@attr`
    pub extract: Option<String>,
    /// Matches to skip (`position() > n`)
    pub skip: usize,
}

/// Translate one XPath location path.
///
/// ```
/// use bookscout_engine::selector::xpath::translate;
///
/// let t = translate("//div[@class='item']/a/@href").unwrap();
/// assert_eq!(t.selector, "div.item > a");
/// assert_eq!(t.extract.as_deref(), Some("href"));
/// ```
pub fn translate(xpath: &str) -> Result<Translated> {
    let mut path = xpath.trim();
    for prefix in [".//", "//", "./", "/"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            path = rest;
            break;
        }
    }
    if path.is_empty() {
        return Err(EngineError::UnsupportedMode(format!("empty XPath: {xpath}")));
    }

    let mut segments = split_segments(path);
    let extract = match segments.last().map(|(_, s)| s.as_str()) {
        Some("text()") => Some("text".to_string()),
        Some("node()") => Some("html".to_string()),
        Some(last) if last.starts_with('@') => Some(last[1..].to_string()),
        _ => None,
    };
    if extract.is_some() {
        segments.pop();
    }

    let mut skip = 0;
    let mut parts = Vec::with_capacity(segments.len());
    for (i, (descendant, segment)) in segments.iter().enumerate() {
        let mut segment = segment.clone();
        if let Some(caps) = POSITION_GT.captures(&segment) {
            skip = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            segment = POSITION_GT.replace_all(&segment, "").into_owned();
        }
        let css = convert_segment(&segment)
            .ok_or_else(|| EngineError::UnsupportedMode(format!("XPath step '{segment}' in {xpath}")))?;
        if i > 0 {
            parts.push(if *descendant { " " } else { " > " }.to_string());
        }
        parts.push(css);
    }

    let selector = parts.concat();
    if selector.trim().is_empty() {
        return Err(EngineError::UnsupportedMode(format!("no element steps in {xpath}")));
    }
    Ok(Translated {
        selector,
        extract,
        skip,
    })
}

/// Split a path on `/` and `//` outside brackets and quotes.
///
/// Each segment carries whether it was reached through `//`.
fn split_segments(path: &str) -> Vec<(bool, String)> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut descendant = false;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => {
                if !current.is_empty() {
                    segments.push((descendant, std::mem::take(&mut current)));
                }
                descendant = chars.peek() == Some(&'/');
                if descendant {
                    chars.next();
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.is_empty() {
        segments.push((descendant, current));
    }
    segments
}

fn convert_segment(segment: &str) -> Option<String> {
    if segment.contains("::") {
        return None;
    }
    let mut element = segment.trim().to_string();
    if let Some(rest) = element.strip_prefix('*') {
        if rest.starts_with('[') {
            element = rest.to_string();
        }
    }

    let element = CLASS_ATTR.replace_all(&element, |caps: &regex::Captures| {
        caps[1]
            .split_whitespace()
            .map(|c| format!(".{c}"))
            .collect::<String>()
    });
    let element = ID_ATTR.replace_all(&element, |caps: &regex::Captures| format!("#{}", &caps[1]));
    let element = CONTAINS_ATTR.replace_all(&element, |caps: &regex::Captures| {
        format!("[{}*=\"{}\"]", &caps[1], &caps[2])
    });
    let element = GENERIC_ATTR.replace_all(&element, |caps: &regex::Captures| {
        format!("[{}=\"{}\"]", &caps[1], &caps[2])
    });
    let element = HAS_ATTR.replace_all(&element, "[$1]");
    let element = LAST_INDEX.replace_all(&element, ":last-of-type");
    let element = POSITION_INDEX
        .replace_all(&element, ":nth-of-type($1)")
        .into_owned();

    let residue = SUPPORTED_PSEUDO.replace_all(&element, "");
    if residue.contains(['(', ')', '@', '|']) {
        return None;
    }
    Some(element)
}

fn evaluate_fragment<T>(
    scope: &[ElementHandle],
    fragment: &str,
    translated: impl FnOnce(&[ElementHandle], &Translated) -> Vec<T>,
    verbatim: impl FnOnce(&[ElementHandle], &str) -> Vec<T>,
) -> Vec<T> {
    match translate(fragment) {
        Ok(t) => translated(scope, &t),
        Err(e) => {
            tracing::debug!(xpath = %fragment, error = %e, "XPath not translatable, evaluating as CSS");
            verbatim(scope, fragment)
        }
    }
}

fn translated_elements(scope: &[ElementHandle], t: &Translated) -> Vec<ElementHandle> {
    css::select_elements(scope, &format!("@css:{}", t.selector))
        .into_iter()
        .skip(t.skip)
        .collect()
}

/// Elements selected by an XPath rule.
pub fn select_elements(scope: &[ElementHandle], rule: &str) -> Vec<ElementHandle> {
    let group = split_rule(rule, &COMBINATORS, Dialect::Rule);
    let results = group
        .fragments
        .iter()
        .map(|fragment| {
            evaluate_fragment(scope, fragment, translated_elements, css::select_elements)
        });
    merge_results(group.kind, results)
}

/// Strings extracted by an XPath rule.
///
/// A path without `text()`, `node()` or `@attr` yields the elements' text.
pub fn select_strings(scope: &[ElementHandle], rule: &str) -> Vec<String> {
    let group = split_rule(rule, &COMBINATORS, Dialect::Rule);
    let results = group
        .fragments
        .iter()
        .map(|fragment| {
            evaluate_fragment(
                scope,
                fragment,
                |scope, t| {
                    let elements = translated_elements(scope, t);
                    let word = t.extract.as_deref().unwrap_or("text");
                    css::select_strings(&elements, &format!("@css:@{word}"))
                },
                css::select_strings,
            )
        });
    merge_results(group.kind, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;
    use pretty_assertions::assert_eq;

    fn root(html: &str) -> Vec<ElementHandle> {
        match Node::html(html) {
            Node::Element(root) => vec![root],
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_translate_paths() {
        assert_eq!(translate("//div").unwrap().selector, "div");
        assert_eq!(translate("//div/a").unwrap().selector, "div > a");
        assert_eq!(translate("//div//a").unwrap().selector, "div a");
        assert_eq!(
            translate("//ul[@id='toc']/li[2]").unwrap().selector,
            "ul#toc > li:nth-of-type(2)"
        );
        assert_eq!(translate("//*[@id='main']").unwrap().selector, "#main");
    }

    #[test]
    fn test_translate_attribute_predicates() {
        assert_eq!(
            translate("//div[contains(@class, 'btn')]").unwrap().selector,
            "div[class*=\"btn\"]"
        );
        assert_eq!(
            translate("//a[@rel='next']").unwrap().selector,
            "a[rel=\"next\"]"
        );
        assert_eq!(translate("//a[@href]").unwrap().selector, "a[href]");
        assert_eq!(translate("//li[last()]").unwrap().selector, "li:last-of-type");
    }

    #[test]
    fn test_translate_terminals() {
        let t = translate("//h3/a/text()").unwrap();
        assert_eq!(t.selector, "h3 > a");
        assert_eq!(t.extract.as_deref(), Some("text"));

        let t = translate("//a[@href='/x/y']/@href").unwrap();
        assert_eq!(t.selector, "a[href=\"/x/y\"]");
        assert_eq!(t.extract.as_deref(), Some("href"));
    }

    #[test]
    fn test_position_filter() {
        let t = translate("//tr[position() > 1]").unwrap();
        assert_eq!(t.selector, "tr");
        assert_eq!(t.skip, 1);
    }

    #[test]
    fn test_axes_and_functions_are_unsupported() {
        assert!(matches!(
            translate("//div/following-sibling::p"),
            Err(EngineError::UnsupportedMode(_))
        ));
        assert!(translate("//p[contains(text(),'x')]").is_err());
        assert!(translate("//a | //b").is_err());
    }

    #[test]
    fn test_select_strings_through_css() {
        let scope = root(
            r#"<ul id="toc"><li><a href="/1">One</a></li><li><a href="/2">Two</a></li></ul>"#,
        );
        assert_eq!(select_strings(&scope, "//ul[@id='toc']/li/a/text()"), vec!["One", "Two"]);
        assert_eq!(select_strings(&scope, "//li/a/@href"), vec!["/1", "/2"]);
        assert_eq!(select_strings(&scope, "//li[2]/a"), vec!["Two"]);
        assert_eq!(select_elements(&scope, "//li[position() > 1]").len(), 1);
    }

    #[test]
    fn test_absolute_path_from_root() {
        let scope = root("<p>hi</p>");
        assert_eq!(select_strings(&scope, "/html/body/p/text()"), vec!["hi"]);
    }
}

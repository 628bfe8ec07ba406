//! CSS-mode path selector
//!
//! Evaluates one CSS-mode rule against a set of elements. Two syntaxes:
//!
//! - **Chained**: `class.list@tag.li[0]@tag.a@href`. The rule splits on
//!   top-level `@` into steps; every step but the last navigates from each
//!   element in scope, the last step picks what to extract.
//! - **Literal**: `@CSS:div.list > li a@href`. Everything before the last `@`
//!   is a plain CSS selector, the remainder picks what to extract.
//!
//! Both accept `&&`, `||` and `%%` between fragments.
//!
//! # Step Grammar
//!
//! | Step | Meaning |
//! |------|---------|
//! | `children` | direct child elements |
//! | `class.NAME` | descendants with class NAME |
//! | `tag.NAME` | descendants with tag NAME |
//! | `id.NAME` | first descendant with id NAME |
//! | `text.NAME` | descendants whose own text contains NAME |
//! | anything else | CSS selector over descendants |
//!
//! Any step may carry an index filter, see [`super::index`].

use super::index::split_index;
use crate::document::ElementHandle;
use crate::error::{EngineError, Result};
use crate::splitter::{split_rule, COMBINATORS};
use crate::types::{merge_results, Dialect};
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid regex")
});

/// What the last step of a chained rule extracts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Extract {
    Text,
    TextNodes,
    OwnText,
    Html,
    All,
    Attr(String),
}

impl Extract {
    fn parse(word: &str) -> Self {
        match word.trim() {
            "text" => Extract::Text,
            "textNodes" => Extract::TextNodes,
            "ownText" => Extract::OwnText,
            "html" => Extract::Html,
            "all" => Extract::All,
            other => Extract::Attr(other.to_string()),
        }
    }
}

fn strip_css_prefix(rule: &str) -> Option<&str> {
    rule.get(..5)
        .filter(|p| p.eq_ignore_ascii_case("@css:"))
        .map(|_| rule[5..].trim())
}

/// Elements selected by `rule`.
///
/// In chained syntax every step navigates; there is no extraction step.
pub fn select_elements(scope: &[ElementHandle], rule: &str) -> Vec<ElementHandle> {
    let (literal, body) = match strip_css_prefix(rule) {
        Some(rest) => (true, rest),
        None => (false, rule.trim()),
    };
    let group = split_rule(body, &COMBINATORS, Dialect::Rule);

    let results = group
        .fragments
        .iter()
        .map(|fragment| {
            let selected = if literal {
                select_literal(scope, fragment)
            } else {
                navigate(scope, &chain_steps(fragment))
            };
            selected.unwrap_or_else(|e| {
                tracing::debug!(fragment = %fragment, error = %e, "CSS fragment selected nothing");
                Vec::new()
            })
        });
    merge_results(group.kind, results)
}

/// Strings extracted by `rule`.
pub fn select_strings(scope: &[ElementHandle], rule: &str) -> Vec<String> {
    let (literal, body) = match strip_css_prefix(rule) {
        Some(rest) => (true, rest),
        None => (false, rule.trim()),
    };
    let group = split_rule(body, &COMBINATORS, Dialect::Rule);

    let results = group
        .fragments
        .iter()
        .map(|fragment| {
            let extracted = if literal {
                extract_literal(scope, fragment)
            } else {
                extract_chained(scope, fragment)
            };
            extracted.unwrap_or_else(|e| {
                tracing::debug!(fragment = %fragment, error = %e, "CSS fragment extracted nothing");
                Vec::new()
            })
        });
    merge_results(group.kind, results)
}

fn chain_steps(fragment: &str) -> Vec<String> {
    split_rule(fragment, &["@"], Dialect::Rule).fragments
}

fn extract_chained(scope: &[ElementHandle], fragment: &str) -> Result<Vec<String>> {
    let mut steps = chain_steps(fragment);
    let Some(last) = steps.pop() else {
        return Ok(Vec::new());
    };
    let elements = navigate(scope, &steps)?;
    Ok(extract(&elements, &Extract::parse(&last)))
}

/// Split `selector@mode` on the last `@` that is not part of the selector.
fn split_literal(fragment: &str) -> (&str, Option<&str>) {
    match fragment.rfind('@') {
        Some(at) if !fragment[at + 1..].contains([']', '\'', '"', ')']) => {
            (fragment[..at].trim(), Some(fragment[at + 1..].trim()))
        }
        _ => (fragment.trim(), None),
    }
}

fn select_literal(scope: &[ElementHandle], fragment: &str) -> Result<Vec<ElementHandle>> {
    select_css(scope, fragment.trim())
}

fn extract_literal(scope: &[ElementHandle], fragment: &str) -> Result<Vec<String>> {
    let (selector, mode) = split_literal(fragment);
    let elements = if selector.is_empty() {
        scope.to_vec()
    } else {
        select_css(scope, selector)?
    };
    let mode = mode.map(Extract::parse).unwrap_or(Extract::Text);
    Ok(extract(&elements, &mode))
}

/// Resolve navigation steps against every element in scope, flattening in
/// order.
fn navigate(scope: &[ElementHandle], steps: &[String]) -> Result<Vec<ElementHandle>> {
    let mut current = scope.to_vec();
    for step in steps {
        let mut next = Vec::new();
        for element in &current {
            next.extend(resolve_step(element, step)?);
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    Ok(current)
}

/// Resolve one step (with its index filter) against one element.
fn resolve_step(element: &ElementHandle, step: &str) -> Result<Vec<ElementHandle>> {
    let (selector, filter) = split_index(step);
    let found = resolve_selector(element, selector)?;
    Ok(match filter {
        Some(filter) => filter.apply(found),
        None => found,
    })
}

fn resolve_selector(element: &ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
    let selector = selector.trim();
    if selector.is_empty() || selector == "children" {
        return Ok(children(element));
    }

    let (kind, name) = selector.split_once('.').unwrap_or(("", selector));
    match kind {
        "class" => {
            let classes: Vec<&str> = name.split_whitespace().collect();
            if classes.is_empty() {
                return Ok(Vec::new());
            }
            let css = classes
                .iter()
                .map(|c| format!(".{}", escape_ident(c)))
                .collect::<String>();
            select_css(std::slice::from_ref(element), &css)
        }
        "tag" => select_css(std::slice::from_ref(element), name),
        "id" => {
            let css = format!("#{}", escape_ident(name));
            let mut found = select_css(std::slice::from_ref(element), &css)?;
            found.truncate(1);
            Ok(found)
        }
        "text" => Ok(containing_own_text(element, name)),
        _ => select_css(std::slice::from_ref(element), selector),
    }
}

/// Escape characters a CSS identifier cannot carry unquoted.
fn escape_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        let needs_escape = !(c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii())
            || (i == 0 && c.is_ascii_digit());
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| EngineError::InvalidSelector(format!("{css}: {e}")))
}

fn select_css(scope: &[ElementHandle], css: &str) -> Result<Vec<ElementHandle>> {
    let selector = parse_selector(css)?;
    let mut out = Vec::new();
    for handle in scope {
        if let Some(element) = handle.element() {
            out.extend(
                element
                    .select(&selector)
                    .map(|found| ElementHandle::new(handle.document(), found)),
            );
        }
    }
    Ok(out)
}

fn children(element: &ElementHandle) -> Vec<ElementHandle> {
    let Some(e) = element.element() else {
        return Vec::new();
    };
    e.children()
        .filter_map(scraper::ElementRef::wrap)
        .map(|child| ElementHandle::new(element.document(), child))
        .collect()
}

fn containing_own_text(element: &ElementHandle, needle: &str) -> Vec<ElementHandle> {
    let Some(e) = element.element() else {
        return Vec::new();
    };
    let needle = needle.to_lowercase();
    e.descendants()
        .skip(1)
        .filter_map(scraper::ElementRef::wrap)
        .map(|found| ElementHandle::new(element.document(), found))
        .filter(|handle| handle.own_text().to_lowercase().contains(&needle))
        .collect()
}

fn extract(elements: &[ElementHandle], mode: &Extract) -> Vec<String> {
    match mode {
        Extract::Text => elements
            .iter()
            .map(ElementHandle::text)
            .filter(|t| !t.is_empty())
            .collect(),
        Extract::TextNodes => elements
            .iter()
            .map(|e| e.text_nodes().join("\n"))
            .filter(|t| !t.is_empty())
            .collect(),
        Extract::OwnText => elements
            .iter()
            .map(ElementHandle::own_text)
            .filter(|t| !t.is_empty())
            .collect(),
        Extract::Html => elements
            .iter()
            .map(|e| SCRIPT_OR_STYLE.replace_all(&e.inner_html(), "").trim().to_string())
            .filter(|h| !h.is_empty())
            .collect(),
        Extract::All => elements
            .iter()
            .map(ElementHandle::outer_html)
            .filter(|h| !h.is_empty())
            .collect(),
        Extract::Attr(name) => {
            let mut seen = HashSet::new();
            elements
                .iter()
                .filter_map(|e| {
                    e.element()
                        .and_then(|el| el.value().attr(name).map(str::to_string))
                })
                .filter(|v| !v.trim().is_empty())
                .filter(|v| seen.insert(v.clone()))
                .collect()
        }
    }
}

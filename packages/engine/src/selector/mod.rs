//! Mode-specific path selectors
//!
//! - [`css`]: chained and literal CSS over HTML element trees
//! - [`xpath`]: simple XPath translated to CSS
//! - [`json`]: JSONPath over `serde_json` values
//! - [`index`]: index filters shared by CSS steps and JSONPath brackets
//!
//! The functions here adapt a [`Node`] of any kind to what a selector needs:
//! HTML selectors parse text and JSON into a tree, JSON selectors parse text
//! into a value.

pub mod css;
pub mod index;
pub mod json;
pub mod xpath;

use crate::document::{ElementHandle, Node};
use crate::error::{EngineError, Result};
use crate::types::RuleMode;
use regex::Regex;
use serde_json::Value as JsonValue;

/// Element scope for HTML selectors.
pub fn html_scope(node: &Node) -> Vec<ElementHandle> {
    match node {
        Node::Element(handle) => vec![handle.clone()],
        other => match Node::html(&other.to_text()) {
            Node::Element(root) => vec![root],
            _ => Vec::new(),
        },
    }
}

/// JSON value for JSONPath selectors.
///
/// Text that does not parse as JSON becomes a JSON string.
pub fn json_value(node: &Node) -> JsonValue {
    match node {
        Node::Json(value) => value.clone(),
        Node::Groups(groups) => {
            JsonValue::Array(groups.iter().cloned().map(JsonValue::String).collect())
        }
        other => {
            let text = other.to_text();
            serde_json::from_str(text.trim()).unwrap_or(JsonValue::String(text))
        }
    }
}

/// Strings a selector-mode rule extracts from one node.
///
/// Template and script modes are not selectors and yield nothing here.
pub fn select_strings(mode: RuleMode, rule: &str, node: &Node) -> Vec<String> {
    match mode {
        RuleMode::Css => css::select_strings(&html_scope(node), rule),
        RuleMode::XPath => xpath::select_strings(&html_scope(node), rule),
        RuleMode::JsonPath => json::select_strings(&json_value(node), rule),
        RuleMode::Script | RuleMode::Regex => Vec::new(),
    }
}

/// Nodes a selector-mode rule selects from one node.
pub fn select_nodes(mode: RuleMode, rule: &str, node: &Node) -> Vec<Node> {
    match mode {
        RuleMode::Css => css::select_elements(&html_scope(node), rule)
            .into_iter()
            .map(Node::Element)
            .collect(),
        RuleMode::XPath => xpath::select_elements(&html_scope(node), rule)
            .into_iter()
            .map(Node::Element)
            .collect(),
        RuleMode::JsonPath => json::select_values(&json_value(node), rule)
            .into_iter()
            .map(Node::Json)
            .collect(),
        RuleMode::Script | RuleMode::Regex => Vec::new(),
    }
}

/// All-in-one regex rows: every match of the last pattern becomes one
/// [`Node::Groups`] row (index 0 is the whole match).
///
/// Patterns joined with `&&` narrow the text step by step: each earlier
/// pattern's matches are concatenated and handed to the next one.
pub fn regex_rows(text: &str, patterns: &str) -> Result<Vec<Node>> {
    let patterns: Vec<&str> = patterns.split("&&").filter(|p| !p.is_empty()).collect();
    let Some((last, narrowing)) = patterns.split_last() else {
        return Err(EngineError::MalformedRule("empty all-in-one pattern".to_string()));
    };

    let mut haystack = text.to_string();
    for pattern in narrowing {
        let re = Regex::new(pattern)?;
        haystack = re.find_iter(&haystack).map(|m| m.as_str()).collect();
    }

    let re = Regex::new(last)?;
    Ok(re
        .captures_iter(&haystack)
        .map(|caps| {
            Node::Groups(
                caps.iter()
                    .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_regex_rows() {
        let rows = regex_rows(
            r#"<a href="/1">One</a><a href="/2">Two</a>"#,
            r#"<a href="([^"]+)">([^<]+)</a>"#,
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![
                Node::Groups(vec![r#"<a href="/1">One</a>"#.into(), "/1".into(), "One".into()]),
                Node::Groups(vec![r#"<a href="/2">Two</a>"#.into(), "/2".into(), "Two".into()]),
            ]
        );
    }

    #[test]
    fn test_regex_rows_narrowing() {
        let rows = regex_rows("skip 1 <ul>a-1 b-2</ul> skip 2", r"<ul>.*?</ul>&&(\w)-(\d)").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], Node::Groups(vec!["b-2".into(), "b".into(), "2".into()]));
    }

    #[test]
    fn test_regex_rows_invalid_pattern() {
        assert!(matches!(regex_rows("x", "("), Err(EngineError::InvalidRegex(_))));
    }

    #[test]
    fn test_json_value_from_text() {
        assert_eq!(json_value(&Node::Text(r#"{"a":1}"#.into())), json!({"a": 1}));
        assert_eq!(json_value(&Node::Text("plain".into())), json!("plain"));
    }

    #[test]
    fn test_css_over_text_node() {
        let node = Node::Text("<p class=x>hi</p>".into());
        assert_eq!(select_strings(RuleMode::Css, "class.x@text", &node), vec!["hi"]);
    }
}

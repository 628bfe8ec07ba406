//! Core types for the Bookscout rule engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Evaluation mode of one pipeline stage.
///
/// Decided once per stage by [`crate::rule::detect_mode`]; evaluation
/// dispatches on it with an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Custom chained CSS syntax (`class.x@tag.a@href`) or `@CSS:` literal selectors
    Css,
    /// XPath, evaluated by translating to the CSS engine
    XPath,
    /// JSONPath over a JSON value tree
    JsonPath,
    /// Embedded rhai snippet
    Script,
    /// Template text: after placeholder and `$N` substitution the text is the result
    Regex,
}

impl RuleMode {
    /// Short lowercase name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleMode::Css => "css",
            RuleMode::XPath => "xpath",
            RuleMode::JsonPath => "jsonpath",
            RuleMode::Script => "script",
            RuleMode::Regex => "regex",
        }
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the fragments of a [`CombinatorGroup`] are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinatorKind {
    /// Single fragment, nothing to combine
    None,
    /// `&&`: concatenate results in fragment order
    And,
    /// `||`: first fragment with a non-empty result wins
    Or,
    /// `%%`: interleave results index-wise
    Combine,
    /// `@`: CSS navigation chain (only produced when splitting on `@`)
    Chain,
}

impl CombinatorKind {
    /// Map a separator token to its kind.
    pub fn from_token(token: &str) -> Self {
        match token {
            "&&" => CombinatorKind::And,
            "||" => CombinatorKind::Or,
            "%%" => CombinatorKind::Combine,
            "@" => CombinatorKind::Chain,
            _ => CombinatorKind::None,
        }
    }
}

/// Result of splitting a rule on its top-level combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinatorGroup {
    /// Which combinator separated the fragments
    pub kind: CombinatorKind,
    /// Trimmed, non-empty fragments in source order
    pub fragments: Vec<String>,
}

impl CombinatorGroup {
    /// A group holding one fragment and no combinator.
    pub fn single(fragment: impl Into<String>) -> Self {
        Self {
            kind: CombinatorKind::None,
            fragments: vec![fragment.into()],
        }
    }

    /// True when the group has exactly one fragment.
    pub fn is_single(&self) -> bool {
        self.fragments.len() == 1
    }
}

/// Bracket-balancing dialect used by the splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Quotes suppress bracket counting, backslash escapes the next char
    Rule,
    /// Escape-aware quotes plus independent `[`/`]` depth tracking
    Script,
}

/// Merge per-fragment results according to a combinator.
///
/// - `And` / `None` / `Chain`: concatenate in fragment order
/// - `Or`: first non-empty result; later fragments are never evaluated
/// - `Combine`: interleave up to the first fragment's length, skipping
///   fragments that are too short at a given index
///
/// `results` is consumed lazily, so callers pass an iterator that evaluates
/// each fragment on demand.
pub fn merge_results<T, I>(kind: CombinatorKind, results: I) -> Vec<T>
where
    I: IntoIterator<Item = Vec<T>>,
{
    match kind {
        CombinatorKind::Or => results
            .into_iter()
            .find(|r| !r.is_empty())
            .unwrap_or_default(),
        CombinatorKind::Combine => {
            let results: Vec<Vec<T>> = results.into_iter().collect();
            let width = results.first().map(Vec::len).unwrap_or(0);
            let mut columns: Vec<std::vec::IntoIter<T>> =
                results.into_iter().map(Vec::into_iter).collect();
            let mut merged = Vec::new();
            for _ in 0..width {
                for column in columns.iter_mut() {
                    if let Some(item) = column.next() {
                        merged.push(item);
                    }
                }
            }
            merged
        }
        CombinatorKind::And | CombinatorKind::None | CombinatorKind::Chain => {
            results.into_iter().flatten().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_combine_zips_up_to_first_fragment() {
        let merged = merge_results(
            CombinatorKind::Combine,
            vec![strings(&["a", "b"]), strings(&["1", "2", "3"])],
        );
        assert_eq!(merged, strings(&["a", "1", "b", "2"]));
    }

    #[test]
    fn test_combine_skips_short_fragments() {
        let merged = merge_results(
            CombinatorKind::Combine,
            vec![strings(&["a", "b", "c"]), strings(&["1"])],
        );
        assert_eq!(merged, strings(&["a", "1", "b", "c"]));
    }

    #[test]
    fn test_or_takes_first_non_empty() {
        let merged = merge_results(
            CombinatorKind::Or,
            vec![vec![], strings(&["x"]), strings(&["y"])],
        );
        assert_eq!(merged, strings(&["x"]));
    }

    #[test]
    fn test_or_stops_evaluating_after_first_match() {
        let evaluated = std::cell::Cell::new(0);
        let fragments = [vec![], strings(&["x"]), strings(&["y"]), strings(&["z"])];
        let merged = merge_results(
            CombinatorKind::Or,
            fragments.iter().map(|f| {
                evaluated.set(evaluated.get() + 1);
                f.clone()
            }),
        );
        assert_eq!(merged, strings(&["x"]));
        assert_eq!(evaluated.get(), 2);
    }

    #[test]
    fn test_and_concatenates() {
        let merged = merge_results(
            CombinatorKind::And,
            vec![strings(&["a"]), strings(&["b", "c"])],
        );
        assert_eq!(merged, strings(&["a", "b", "c"]));
    }

    #[test]
    fn test_kind_from_token() {
        assert_eq!(CombinatorKind::from_token("%%"), CombinatorKind::Combine);
        assert_eq!(CombinatorKind::from_token("@"), CombinatorKind::Chain);
        assert_eq!(CombinatorKind::from_token("??"), CombinatorKind::None);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(RuleMode::JsonPath.to_string(), "jsonpath");
    }
}

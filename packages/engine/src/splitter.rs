//! Combinator-aware rule splitting
//!
//! Rule strings combine fragments with `&&`, `||` and `%%`, and chain CSS
//! navigation steps with `@`. Those tokens also appear inside CSS attribute
//! selectors, JSONPath filters and quoted literals, so splitting has to track
//! bracket depth and quote state.
//!
//! Every scan is a pure function over the input; no cursor state outlives a
//! call, so splitting is reentrant.
//!
//! # Dialects
//!
//! - [`Dialect::Rule`]: quotes suppress bracket counting, a backslash escapes
//!   the next character. Used for CSS rules.
//! - [`Dialect::Script`]: quotes are escape-aware and `[`/`]` depth is tracked
//!   on its own while balancing another pair. Used for JSONPath rules and
//!   embedded `{...}` blocks.
//!
//! # Example
//!
//! ```
//! use bookscout_engine::splitter::split_rule;
//! use bookscout_engine::types::{CombinatorKind, Dialect};
//!
//! let group = split_rule("a[x&&y]&&b", &["&&", "||", "%%"], Dialect::Rule);
//! assert_eq!(group.kind, CombinatorKind::And);
//! assert_eq!(group.fragments, vec!["a[x&&y]", "b"]);
//! ```

use crate::types::{CombinatorGroup, CombinatorKind, Dialect};

/// The three fragment combinators, in the order they are tried.
pub const COMBINATORS: [&str; 3] = ["&&", "||", "%%"];

/// Find the closing quote for a quote opened just before `from`.
///
/// Returns `None` for an unmatched quote, which the caller then treats as a
/// literal character.
fn closing_quote(bytes: &[u8], from: usize, quote: u8, dialect: Dialect) -> Option<usize> {
    let mut j = from;
    while j < bytes.len() {
        let b = bytes[j];
        if b == b'\\' && dialect == Dialect::Script {
            j += 2;
            continue;
        }
        if b == quote {
            return Some(j);
        }
        j += 1;
    }
    None
}

/// Split `text` on the first top-level occurrence of any of `tokens`.
///
/// The first token found fixes the combinator kind; later occurrences of the
/// other tokens stay inside their fragment. Unbalanced brackets are not an
/// error: everything after the unclosed bracket ends up in the last fragment.
pub fn split_rule(text: &str, tokens: &[&str], dialect: Dialect) -> CombinatorGroup {
    let trimmed = text.trim();
    let bytes = trimmed.as_bytes();

    let mut fixed: Option<&str> = None;
    let mut fragments: Vec<String> = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut square = 0usize;
    let mut paren = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            quote @ (b'\'' | b'"') => {
                if let Some(end) = closing_quote(bytes, i + 1, quote, dialect) {
                    i = end + 1;
                    continue;
                }
            }
            b'[' => square += 1,
            b']' => square = square.saturating_sub(1),
            b'(' => paren += 1,
            b')' => paren = paren.saturating_sub(1),
            _ => {}
        }

        if square == 0 && paren == 0 {
            let rest = &bytes[i..];
            let hit = match fixed {
                Some(token) => rest.starts_with(token.as_bytes()).then_some(token),
                None => tokens
                    .iter()
                    .copied()
                    .find(|token| !token.is_empty() && rest.starts_with(token.as_bytes())),
            };
            if let Some(token) = hit {
                push_fragment(&mut fragments, &trimmed[start..i]);
                i += token.len();
                start = i;
                fixed = Some(token);
                continue;
            }
        }
        i += 1;
    }

    let Some(token) = fixed else {
        return CombinatorGroup::single(trimmed);
    };
    push_fragment(&mut fragments, trimmed.get(start..).unwrap_or_default());
    if fragments.is_empty() {
        return CombinatorGroup::single("");
    }

    CombinatorGroup {
        kind: CombinatorKind::from_token(token),
        fragments,
    }
}

fn push_fragment(fragments: &mut Vec<String>, fragment: &str) {
    let fragment = fragment.trim();
    if !fragment.is_empty() {
        fragments.push(fragment.to_string());
    }
}

/// Find the end of a balanced `open`/`close` pair starting at `open_at`.
///
/// Returns the byte index just past the matching `close`, or `None` when the
/// pair never closes.
pub fn find_balanced(
    text: &str,
    open_at: usize,
    open: u8,
    close: u8,
    dialect: Dialect,
) -> Option<usize> {
    let bytes = text.as_bytes();
    let track_square = dialect == Dialect::Script && open != b'[';
    let mut depth = 0usize;
    let mut square = 0usize;
    let mut i = open_at;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' {
            i += 2;
            continue;
        }
        if b == b'\'' || b == b'"' {
            if let Some(end) = closing_quote(bytes, i + 1, b, dialect) {
                i = end + 1;
                continue;
            }
        }
        if track_square && b == b'[' {
            square += 1;
        } else if track_square && b == b']' {
            square = square.saturating_sub(1);
        } else if square == 0 {
            if b == open {
                depth += 1;
            } else if b == close {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
        }
        i += 1;
    }
    None
}

/// Substitute every `{...}` span that starts with `marker`.
///
/// `marker` must begin with one or more `{`; that many braces are stripped
/// from both ends of the span before the enclosed text is handed to
/// `resolve`. A `None` from the resolver leaves the span untouched.
///
/// Returns `None` when nothing was substituted, so callers can tell "no
/// placeholder" apart from "placeholder resolved to an empty string".
///
/// ```
/// use bookscout_engine::splitter::inner_rule;
///
/// let out = inner_rule("/book/{$.id}.html", "{$.", |path| {
///     (path == "$.id").then(|| "42".to_string())
/// });
/// assert_eq!(out.as_deref(), Some("/book/42.html"));
/// assert_eq!(inner_rule("plain", "{$.", |_| None), None);
/// ```
pub fn inner_rule<F>(text: &str, marker: &str, mut resolve: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let braces = marker.bytes().take_while(|b| *b == b'{').count();
    if braces == 0 {
        return None;
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut cursor = 0;
    let mut substituted = false;

    while let Some(offset) = text.get(cursor..).and_then(|rest| rest.find(marker)) {
        let at = cursor + offset;
        let replacement = find_balanced(text, at, b'{', b'}', Dialect::Script)
            .filter(|end| end - at >= braces * 2)
            .and_then(|end| {
                let inner = &text[at + braces..end - braces];
                resolve(inner).map(|value| (end, value))
            });

        match replacement {
            Some((end, value)) => {
                out.push_str(&text[last..at]);
                out.push_str(&value);
                last = end;
                cursor = end;
                substituted = true;
            }
            None => cursor = at + marker.len(),
        }
    }

    if !substituted {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split(text: &str) -> CombinatorGroup {
        split_rule(text, &COMBINATORS, Dialect::Rule)
    }

    #[test]
    fn test_no_combinator_returns_trimmed_input() {
        let group = split("  class.item@tag.a@href  ");
        assert_eq!(group.kind, CombinatorKind::None);
        assert_eq!(group.fragments, vec!["class.item@tag.a@href"]);
    }

    #[test]
    fn test_brackets_protect_combinators() {
        let group = split("a[x&&y]&&b");
        assert_eq!(group.kind, CombinatorKind::And);
        assert_eq!(group.fragments, vec!["a[x&&y]", "b"]);
    }

    #[test]
    fn test_parentheses_protect_combinators() {
        let group = split("p:contains(a||b)||div");
        assert_eq!(group.kind, CombinatorKind::Or);
        assert_eq!(group.fragments, vec!["p:contains(a||b)", "div"]);
    }

    #[test]
    fn test_quotes_protect_combinators() {
        let group = split(r#"a[title="x%%y"]%%b"#);
        assert_eq!(group.kind, CombinatorKind::Combine);
        assert_eq!(group.fragments, vec![r#"a[title="x%%y"]"#, "b"]);
    }

    #[test]
    fn test_unmatched_quote_is_literal() {
        let group = split("text.Tom's@text&&tag.b");
        assert_eq!(group.fragments, vec!["text.Tom's@text", "tag.b"]);
    }

    #[test]
    fn test_first_combinator_fixes_kind() {
        let group = split("a||b&&c||d");
        assert_eq!(group.kind, CombinatorKind::Or);
        assert_eq!(group.fragments, vec!["a", "b&&c", "d"]);
    }

    #[test]
    fn test_escaped_combinator_does_not_split() {
        let group = split(r"a\&&b");
        assert_eq!(group.kind, CombinatorKind::None);
    }

    #[test]
    fn test_unbalanced_bracket_degrades() {
        let group = split("a&&b[c&&d");
        assert_eq!(group.kind, CombinatorKind::And);
        assert_eq!(group.fragments, vec!["a", "b[c&&d"]);
    }

    #[test]
    fn test_split_on_navigation_token() {
        let group = split_rule("@class.list@tag.li[0]@text", &["@"], Dialect::Rule);
        assert_eq!(group.kind, CombinatorKind::Chain);
        assert_eq!(group.fragments, vec!["class.list", "tag.li[0]", "text"]);
    }

    #[test]
    fn test_navigation_token_inside_attribute_selector() {
        let group = split_rule("a[href*='@']@href", &["@"], Dialect::Rule);
        assert_eq!(group.fragments, vec!["a[href*='@']", "href"]);
    }

    #[test]
    fn test_script_dialect_escaped_quote() {
        let group = split_rule(r#"$.a[?(@.t == 'x\'&&')]&&$.b"#, &COMBINATORS, Dialect::Script);
        assert_eq!(group.fragments.len(), 2);
        assert_eq!(group.fragments[1], "$.b");
    }

    #[test]
    fn test_find_balanced_braces() {
        let text = "x{a{b}c}y";
        assert_eq!(find_balanced(text, 1, b'{', b'}', Dialect::Script), Some(8));
    }

    #[test]
    fn test_find_balanced_ignores_braces_in_brackets() {
        let text = "{$.a['}']}";
        assert_eq!(
            find_balanced(text, 0, b'{', b'}', Dialect::Script),
            Some(text.len())
        );
    }

    #[test]
    fn test_find_balanced_unclosed() {
        assert_eq!(find_balanced("{abc", 0, b'{', b'}', Dialect::Script), None);
    }

    #[test]
    fn test_inner_rule_multiple_markers() {
        let out = inner_rule("{$.a}-{$.b}", "{$.", |p| Some(p.to_uppercase()));
        assert_eq!(out.as_deref(), Some("$.A-$.B"));
    }

    #[test]
    fn test_inner_rule_double_braces() {
        let out = inner_rule("/s?q={{key}}&p={{page}}", "{{", |p| Some(format!("<{p}>")));
        assert_eq!(out.as_deref(), Some("/s?q=<key>&p=<page>"));
    }

    #[test]
    fn test_inner_rule_empty_substitution_is_distinct() {
        let out = inner_rule("a{$.x}b", "{$.", |_| Some(String::new()));
        assert_eq!(out.as_deref(), Some("ab"));
    }

    #[test]
    fn test_inner_rule_unresolved_span_kept() {
        let out = inner_rule("{$.x}{$.y}", "{$.", |p| (p == "$.y").then(|| "Y".to_string()));
        assert_eq!(out.as_deref(), Some("{$.x}Y"));
    }

    #[test]
    fn test_multibyte_text_is_safe() {
        let group = split("书名@text&&作者@text");
        assert_eq!(group.fragments, vec!["书名@text", "作者@text"]);
    }
}

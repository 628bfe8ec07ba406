//! JSONPath-mode path selector
//!
//! A small JSONPath evaluator over `serde_json::Value` trees, covering what
//! book sources use:
//!
//! - `$.a.b`, `$['a']`, `$['a','b']`
//! - `$.a[0]`, `$.a[-1]`, `$.a[0,2]`, `$.a[1:3]`, `$.a[::2]`
//! - `$.a[*]`, `$.a.*`
//! - `$..key`, `$..*`, `$..[0]`
//! - `$.a[?(@.k)]`, `$.a[?(@.k == 'v')]` with `== != < <= > >=`
//!
//! Paths that start with neither `$` nor `@` are `$.`-relative. Matches come
//! back in document order; object key order is the source order.
//!
//! Rules may combine paths with `&&`, `||` and `%%`, and may be templates:
//! `/book/{$.id}.html` substitutes each embedded path's string value.

use super::index::IndexFilter;
use crate::config;
use crate::document::json_to_text;
use crate::error::{EngineError, Result};
use crate::splitter::{inner_rule, split_rule, COMBINATORS};
use crate::types::{merge_results, Dialect};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(@[^=!<>]*?)\s*(==|!=|<=|>=|<|>)\s*(.+?)\s*$").expect("valid regex")
});

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// `.name` or `['a','b']`
    Child(Vec<String>),
    /// `.*` or `[*]`
    Wildcard,
    /// `[0]`, `[0,2]`, `[1:3]`, `[::2]`
    Indices(IndexFilter),
    /// `..X`
    Descend(Box<Step>),
    /// `[?(...)]`
    Filter(Predicate),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Exists(JsonPath),
    Compare {
        left: JsonPath,
        op: CompareOp,
        right: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }

    fn holds(self, left: &Value, right: &Value) -> bool {
        let ordering = match (left, right) {
            (Value::Number(a), Value::Number(b)) => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => (left == right).then_some(Ordering::Equal),
        };
        match self {
            CompareOp::Eq => ordering == Some(Ordering::Equal),
            CompareOp::Ne => ordering != Some(Ordering::Equal),
            CompareOp::Lt => ordering == Some(Ordering::Less),
            CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ordering == Some(Ordering::Greater),
            CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

/// A parsed JSONPath expression.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    steps: Vec<Step>,
}

impl JsonPath {
    /// Parse a path. A missing `$` / `@` root means `$.`.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        let body = if let Some(rest) = path.strip_prefix('$').or_else(|| path.strip_prefix('@')) {
            rest.to_string()
        } else if path.starts_with('[') || path.starts_with('.') {
            path.to_string()
        } else {
            format!(".{path}")
        };
        Ok(Self {
            steps: parse_steps(&body)?,
        })
    }

    /// Every match, in document order.
    pub fn query<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for step in &self.steps {
            current = apply_step(step, current);
            if current.is_empty() {
                break;
            }
        }
        current
    }
}

fn malformed(path: &str, reason: &str) -> EngineError {
    EngineError::MalformedRule(format!("JSONPath '{path}': {reason}"))
}

fn parse_steps(body: &str) -> Result<Vec<Step>> {
    let bytes = body.as_bytes();
    let mut steps = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'.' if bytes.get(i + 1) == Some(&b'.') => {
                i += 2;
                let (inner, next) = parse_step_after_dot(body, i, true)?;
                steps.push(Step::Descend(Box::new(inner)));
                i = next;
            }
            b'.' => {
                let (step, next) = parse_step_after_dot(body, i + 1, false)?;
                steps.push(step);
                i = next;
            }
            b'[' => {
                let (step, next) = parse_bracket(body, i)?;
                steps.push(step);
                i = next;
            }
            b' ' => i += 1,
            _ => return Err(malformed(body, "expected '.' or '['")),
        }
    }
    Ok(steps)
}

/// Parse the step after `.` or `..`: `*`, a name, or (after `..`) a bracket.
fn parse_step_after_dot(body: &str, at: usize, descend: bool) -> Result<(Step, usize)> {
    let rest = &body[at..];
    if rest.starts_with('*') {
        return Ok((Step::Wildcard, at + 1));
    }
    if descend && rest.starts_with('[') {
        return parse_bracket(body, at);
    }
    let len = rest.find(['.', '[']).unwrap_or(rest.len());
    let name = rest[..len].trim();
    if name.is_empty() {
        return Err(malformed(body, "empty member name"));
    }
    Ok((Step::Child(vec![name.to_string()]), at + len))
}

/// Find the `]` closing the bracket at `open`, skipping quotes and nested
/// brackets.
fn closing_bracket(body: &str, open: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' => depth += 1,
                b']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn parse_bracket(body: &str, open: usize) -> Result<(Step, usize)> {
    let close = closing_bracket(body, open).ok_or_else(|| malformed(body, "unclosed '['"))?;
    let inner = body[open + 1..close].trim();
    let next = close + 1;

    if inner == "*" {
        return Ok((Step::Wildcard, next));
    }
    if let Some(filter) = inner.strip_prefix('?') {
        return Ok((Step::Filter(parse_predicate(filter)?), next));
    }
    if inner.starts_with('\'') || inner.starts_with('"') {
        let names = inner
            .split(',')
            .map(|n| n.trim().trim_matches(['\'', '"']).to_string())
            .collect();
        return Ok((Step::Child(names), next));
    }
    if let Some(filter) = IndexFilter::parse(inner) {
        return Ok((Step::Indices(filter), next));
    }
    if inner.is_empty() {
        return Err(malformed(body, "empty brackets"));
    }
    Ok((Step::Child(vec![inner.to_string()]), next))
}

fn parse_predicate(filter: &str) -> Result<Predicate> {
    let expr = filter.trim();
    let expr = expr
        .strip_prefix('(')
        .and_then(|e| e.strip_suffix(')'))
        .unwrap_or(expr)
        .trim();

    if let Some(caps) = COMPARISON.captures(expr) {
        let (Some(left), Some(op), Some(right)) = (caps.get(1), caps.get(2), caps.get(3)) else {
            return Err(malformed(expr, "bad comparison"));
        };
        let op = CompareOp::parse(op.as_str()).ok_or_else(|| malformed(expr, "unknown operator"))?;
        return Ok(Predicate::Compare {
            left: JsonPath::parse(left.as_str())?,
            op,
            right: parse_literal(right.as_str()),
        });
    }
    if expr.starts_with('@') {
        return Ok(Predicate::Exists(JsonPath::parse(expr)?));
    }
    Err(malformed(expr, "unsupported filter"))
}

fn parse_literal(text: &str) -> Value {
    let text = text.trim();
    if let Some(inner) = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
    {
        return Value::String(inner.to_string());
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

impl Predicate {
    fn matches(&self, item: &Value) -> bool {
        match self {
            Predicate::Exists(path) => path.query(item).iter().any(|v| !v.is_null()),
            Predicate::Compare { left, op, right } => {
                left.query(item).iter().any(|v| op.holds(v, right))
            }
        }
    }
}

fn children(value: &Value) -> Vec<&Value> {
    match value {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

/// `value` and all of its descendants in pre-order.
fn descendants_or_self(value: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        if out.len() >= config::MAX_JSON_MATCHES {
            tracing::debug!(limit = config::MAX_JSON_MATCHES, "JSON descent truncated");
            break;
        }
        out.push(node);
        let mut kids = children(node);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

fn apply_step<'a>(step: &Step, nodes: Vec<&'a Value>) -> Vec<&'a Value> {
    let mut out = Vec::new();
    for node in nodes {
        match step {
            Step::Child(names) => {
                if let Value::Object(map) = node {
                    out.extend(names.iter().filter_map(|name| map.get(name)));
                }
            }
            Step::Wildcard => out.extend(children(node)),
            Step::Indices(filter) => {
                if let Value::Array(items) = node {
                    out.extend(filter.apply(items.iter().collect()));
                }
            }
            Step::Filter(predicate) => {
                out.extend(children(node).into_iter().filter(|v| predicate.matches(v)));
            }
            Step::Descend(inner) => {
                for descendant in descendants_or_self(node) {
                    out.extend(apply_step(inner, vec![descendant]));
                }
            }
        }
        if out.len() >= config::MAX_JSON_MATCHES {
            out.truncate(config::MAX_JSON_MATCHES);
            break;
        }
    }
    out
}

/// Matches of one path, arrays flattened one level.
fn query_flat(root: &Value, path: &str) -> Result<Vec<Value>> {
    let parsed = JsonPath::parse(path)?;
    let mut out = Vec::new();
    for value in parsed.query(root) {
        match value {
            Value::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

fn fragment_strings(root: &Value, fragment: &str) -> Vec<String> {
    if fragment.contains("{$.") {
        let substituted = inner_rule(fragment, "{$.", |path| {
            Some(select_strings(root, path).join("\n"))
        });
        if let Some(text) = substituted {
            return vec![text];
        }
    }
    match query_flat(root, fragment) {
        Ok(values) => values.iter().filter_map(json_to_text).collect(),
        Err(e) => {
            tracing::debug!(path = %fragment, error = %e, "JSONPath fragment matched nothing");
            Vec::new()
        }
    }
}

/// Values selected by `rule`, arrays flattened one level.
pub fn select_values(root: &Value, rule: &str) -> Vec<Value> {
    let group = split_rule(rule, &COMBINATORS, Dialect::Script);
    let results = group
        .fragments
        .iter()
        .map(|fragment| {
            query_flat(root, fragment).unwrap_or_else(|e| {
                tracing::debug!(path = %fragment, error = %e, "JSONPath fragment matched nothing");
                Vec::new()
            })
        });
    merge_results(group.kind, results)
}

/// Strings selected by `rule`.
///
/// ```
/// use bookscout_engine::selector::json::select_strings;
/// use serde_json::json;
///
/// let doc = json!({"a": {"title": "T1"}, "b": [{"title": "T2"}]});
/// assert_eq!(select_strings(&doc, "$..title"), vec!["T1", "T2"]);
/// ```
pub fn select_strings(root: &Value, rule: &str) -> Vec<String> {
    let group = split_rule(rule, &COMBINATORS, Dialect::Script);
    let results = group
        .fragments
        .iter()
        .map(|fragment| fragment_strings(root, fragment));
    merge_results(group.kind, results)
}

//! Rule dispatcher
//!
//! The facade callers use: bind a document and a [`Context`], then ask for
//! one field at a time.
//!
//! ```
//! use bookscout_engine::{Context, Node, RuleDispatcher};
//!
//! let html = r#"<div class="book"><h3>Dune</h3><a href="/b/1">read</a></div>"#;
//! let mut ctx = Context::new().with_base_url("https://example.com/search");
//! let mut dispatcher = RuleDispatcher::new(&mut ctx, Node::parse(html));
//!
//! assert_eq!(dispatcher.get_string("class.book@tag.h3@text").as_deref(), Some("Dune"));
//! assert_eq!(
//!     dispatcher.get_url("class.book@tag.a@href").as_deref(),
//!     Some("https://example.com/b/1")
//! );
//! ```
//!
//! # Evaluation
//!
//! Every rule is parsed into a pipeline of stages (see [`crate::rule`]). For
//! each stage, in order:
//!
//! 1. `@put` directives are evaluated and stored in the context
//! 2. placeholders (`@get:{key}`, `{{expr}}`, `$N`) are substituted
//! 3. the stage is evaluated against the previous stage's value
//! 4. the `##` replacement is applied
//!
//! Nothing here returns an error. A stage that fails is logged and yields an
//! empty value; the rest of the pipeline still runs.

use crate::config;
use crate::context::Context;
use crate::document::Node;
use crate::error::{EngineError, Result};
use crate::rule::{
    replace_regex, split_replace, ContentKind, PipelineCache, ReplaceSplit, Segment, SubRule,
};
use crate::script::{ScriptBridge, ScriptValue};
use crate::selector;
use crate::types::RuleMode;
use serde_json::Value as JsonValue;
use std::cell::OnceCell;
use std::collections::HashSet;
use url::Url;

/// Value flowing between pipeline stages.
#[derive(Debug, Clone)]
enum Value {
    Node(Node),
    Nodes(Vec<Node>),
    Text(String),
    List(Vec<String>),
}

impl Value {
    fn to_text(&self) -> String {
        match self {
            Value::Node(node) => node.to_text(),
            Value::Nodes(nodes) => nodes
                .iter()
                .map(Node::to_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Value::Text(text) => text.clone(),
            Value::List(items) => items.join("\n"),
        }
    }

    fn to_node(&self) -> Node {
        match self {
            Value::Node(node) => node.clone(),
            other => Node::Text(other.to_text()),
        }
    }

    /// Structured nodes a selector stage runs against.
    fn to_nodes(&self) -> Vec<Node> {
        match self {
            Value::Node(node) => vec![node.clone().into_structured()],
            Value::Nodes(nodes) => nodes.iter().cloned().map(Node::into_structured).collect(),
            Value::Text(text) => match Node::parse(text) {
                Node::Json(JsonValue::Array(items)) => items.into_iter().map(Node::Json).collect(),
                node => vec![node],
            },
            Value::List(items) => items.iter().map(|item| Node::parse(item)).collect(),
        }
    }

    fn to_script(&self) -> ScriptValue {
        match self {
            Value::Node(Node::Json(value)) => ScriptValue::Json(value.clone()),
            Value::Node(Node::Groups(groups)) => ScriptValue::List(groups.clone()),
            Value::Node(node) => ScriptValue::Text(node.to_text()),
            Value::Nodes(nodes) => ScriptValue::List(nodes.iter().map(Node::to_text).collect()),
            Value::Text(text) => ScriptValue::Text(text.clone()),
            Value::List(items) => ScriptValue::List(items.clone()),
        }
    }

    fn into_list(self) -> Vec<String> {
        let items = match self {
            Value::Node(node) => vec![node.to_text()],
            Value::Nodes(nodes) => nodes.iter().map(Node::to_text).collect(),
            Value::Text(text) => text.split('\n').map(str::to_string).collect(),
            Value::List(items) => items,
        };
        items.into_iter().filter(|item| !item.is_empty()).collect()
    }
}

impl From<ScriptValue> for Value {
    fn from(value: ScriptValue) -> Self {
        match value {
            ScriptValue::Empty => Value::Text(String::new()),
            ScriptValue::Text(text) => Value::Text(text),
            ScriptValue::List(items) => Value::List(items),
            ScriptValue::Json(json) => Value::Node(Node::Json(json)),
        }
    }
}

/// What an extraction call returns, which decides how stage output is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    String,
    List,
    Elements,
}

/// Evaluates rules against one bound document.
///
/// Borrows the context mutably for its whole life: `@put` writes land in the
/// caller's context and are visible to later calls.
pub struct RuleDispatcher<'c> {
    context: &'c mut Context,
    content: Node,
    cache: PipelineCache,
    scripts: OnceCell<ScriptBridge>,
    depth: usize,
}

impl<'c> RuleDispatcher<'c> {
    /// Bind `content` and `context`.
    pub fn new(context: &'c mut Context, content: Node) -> Self {
        Self {
            context,
            content,
            cache: PipelineCache::new(),
            scripts: OnceCell::new(),
            depth: 0,
        }
    }

    /// Re-point the dispatcher at another node (typically one row of a list).
    ///
    /// Context variables are kept.
    pub fn set_content(&mut self, content: Node) {
        self.content = content;
    }

    /// The bound node.
    pub fn content(&self) -> &Node {
        &self.content
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        self.context
    }

    /// First value, or `None` when the rule extracts nothing.
    ///
    /// Multiple selector matches are joined with `\n`.
    pub fn get_string(&mut self, rule: &str) -> Option<String> {
        let value = self.run(rule, Shape::String)?;
        let text = value.to_text();
        (!text.is_empty()).then_some(text)
    }

    /// All values, or `None` when the rule extracts nothing.
    pub fn get_string_list(&mut self, rule: &str) -> Option<Vec<String>> {
        let items = self.run(rule, Shape::List)?.into_list();
        (!items.is_empty()).then_some(items)
    }

    /// Nodes for per-row extraction.
    ///
    /// A rule starting with `:` is an all-in-one regex: every match becomes a
    /// [`Node::Groups`] row whose fields are read with `$1`, `$2`, ...
    pub fn get_elements(&mut self, rule: &str) -> Vec<Node> {
        let rule = rule.trim();
        if let Some(patterns) = rule.strip_prefix(':') {
            let text = self.content.to_text();
            return selector::regex_rows(&text, patterns).unwrap_or_else(|e| {
                tracing::warn!(rule = %rule, error = %e, "All-in-one regex unusable");
                Vec::new()
            });
        }
        match self.run(rule, Shape::Elements) {
            Some(Value::Nodes(nodes)) => nodes,
            Some(other) => other.to_nodes(),
            None => Vec::new(),
        }
    }

    /// One URL, resolved against the context base URL.
    ///
    /// An empty rule yields the base URL itself.
    pub fn get_url(&mut self, rule: &str) -> Option<String> {
        if rule.trim().is_empty() {
            let base = self.context.base_url();
            return (!base.is_empty()).then(|| base.to_string());
        }
        let first = self.get_string_list(rule)?.into_iter().next()?;
        Some(self.resolve_url(first.trim()))
    }

    /// All URLs, resolved against the base URL and de-duplicated in order.
    pub fn get_url_list(&mut self, rule: &str) -> Option<Vec<String>> {
        if rule.trim().is_empty() {
            return self.get_url(rule).map(|url| vec![url]);
        }
        let mut seen = HashSet::new();
        let urls: Vec<String> = self
            .get_string_list(rule)?
            .into_iter()
            .map(|item| self.resolve_url(item.trim()))
            .filter(|url| seen.insert(url.clone()))
            .collect();
        (!urls.is_empty()).then_some(urls)
    }

    fn resolve_url(&self, value: &str) -> String {
        match absolute_url(self.context.base_url(), value) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = %value, error = %e, "URL kept unresolved");
                value.to_string()
            }
        }
    }

    fn content_kind(&self) -> ContentKind {
        match &self.content {
            Node::Json(_) => ContentKind::Json,
            Node::Groups(_) => ContentKind::Groups,
            Node::Text(text) if looks_like_json(text) => ContentKind::Json,
            Node::Text(_) | Node::Element(_) => ContentKind::Markup,
        }
    }

    fn scripts(&self) -> &ScriptBridge {
        self.scripts.get_or_init(ScriptBridge::new)
    }

    /// Evaluate a rule through its whole pipeline.
    fn run(&mut self, rule: &str, shape: Shape) -> Option<Value> {
        if self.depth >= config::MAX_RULE_DEPTH {
            tracing::warn!(rule = %rule, depth = self.depth, "Rule nesting too deep, giving up");
            return None;
        }
        if rule.trim().is_empty() {
            return None;
        }

        let pipeline = self.cache.get_or_parse(rule, self.content_kind());
        self.depth += 1;
        let mut value = Value::Node(self.content.clone());
        for stage in &pipeline.stages {
            value = self.run_stage(stage, value, shape);
        }
        self.depth -= 1;
        Some(value)
    }

    fn run_stage(&mut self, stage: &SubRule, input: Value, shape: Shape) -> Value {
        self.apply_puts(stage, &input);

        let resolved = if stage.is_template() {
            let text = self.make_up(&stage.segments, &input);
            split_replace(&text)
        } else {
            ReplaceSplit {
                rule: stage.expression.clone(),
                replace_regex: stage.replace_regex.clone(),
                replacement: stage.replacement.clone(),
                replace_first: stage.replace_first,
            }
        };

        let mut value = input;
        if !resolved.rule.is_empty() || resolved.replace_regex.is_empty() {
            value = match self.evaluate(stage.mode, &resolved.rule, &value, shape) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(mode = %stage.mode, rule = %resolved.rule, error = %e, "Stage produced no value");
                    Value::Text(String::new())
                }
            };
        }

        if resolved.replace_regex.is_empty() || shape == Shape::Elements {
            return value;
        }
        let replace = |text: &str| {
            replace_regex(
                text,
                &resolved.replace_regex,
                &resolved.replacement,
                resolved.replace_first,
            )
        };
        match (shape, value) {
            (Shape::List, Value::List(items)) => {
                Value::List(items.iter().map(|item| replace(item)).collect())
            }
            (_, other) => Value::Text(replace(&other.to_text())),
        }
    }

    fn evaluate(&mut self, mode: RuleMode, rule: &str, input: &Value, shape: Shape) -> Result<Value> {
        match mode {
            RuleMode::Script => {
                let output = self
                    .scripts()
                    .eval(rule, input.to_script(), self.context)
                    .ok_or_else(|| EngineError::ScriptFailure(format!("no result from {rule}")))?;
                Ok(Value::from(output))
            }
            RuleMode::Regex => Ok(Value::Text(rule.to_string())),
            RuleMode::Css | RuleMode::XPath | RuleMode::JsonPath => {
                let nodes = input.to_nodes();
                match shape {
                    Shape::Elements => Ok(Value::Nodes(
                        nodes
                            .iter()
                            .flat_map(|node| selector::select_nodes(mode, rule, node))
                            .collect(),
                    )),
                    Shape::List => Ok(Value::List(
                        nodes
                            .iter()
                            .flat_map(|node| selector::select_strings(mode, rule, node))
                            .collect(),
                    )),
                    Shape::String => Ok(Value::Text(
                        nodes
                            .iter()
                            .flat_map(|node| selector::select_strings(mode, rule, node))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    )),
                }
            }
        }
    }

    /// Store `@put` values, each evaluated against the stage input.
    fn apply_puts(&mut self, stage: &SubRule, input: &Value) {
        if stage.variable_bindings.is_empty() {
            return;
        }
        let row = input.to_node();
        for (key, rule) in &stage.variable_bindings {
            let value = self
                .with_content(row.clone(), |d| d.get_string(rule))
                .unwrap_or_else(|| rule.clone());
            self.context.put(key.clone(), value);
        }
    }

    /// Substitute placeholder segments into stage text.
    fn make_up(&mut self, segments: &[Segment], input: &Value) -> String {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Get(key) => out.push_str(&self.context.get_or_empty(key)),
                Segment::Rule(rule) => {
                    if let Some(value) = self.get_string(rule) {
                        out.push_str(&value);
                    }
                }
                Segment::Script(source) => {
                    let output = self.scripts().eval(source, input.to_script(), self.context);
                    if let Some(output) = output {
                        out.push_str(&Value::from(output).to_text());
                    }
                }
                Segment::Group(index) => match input {
                    Value::Node(Node::Groups(groups)) => {
                        out.push_str(groups.get(*index).map(String::as_str).unwrap_or_default());
                    }
                    _ => {
                        out.push('$');
                        out.push_str(&index.to_string());
                    }
                },
            }
        }
        out
    }

    fn with_content<T>(&mut self, content: Node, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.content, content);
        let out = f(self);
        self.content = saved;
        out
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<JsonValue>(trimmed).is_ok()
}

/// Resolve `value` against `base`. An empty base requires an absolute value.
pub fn absolute_url(base: &str, value: &str) -> Result<String> {
    if base.is_empty() {
        return Ok(Url::parse(value)?.to_string());
    }
    Ok(Url::parse(base)?.join(value)?.to_string())
}

/// First value `rule` extracts from `content`.
pub fn extract_string(rule: &str, context: &mut Context, content: Node) -> Option<String> {
    RuleDispatcher::new(context, content).get_string(rule)
}

/// All values `rule` extracts from `content`.
pub fn extract_string_list(rule: &str, context: &mut Context, content: Node) -> Option<Vec<String>> {
    RuleDispatcher::new(context, content).get_string_list(rule)
}

/// Nodes `rule` selects from `content`.
pub fn extract_elements(rule: &str, context: &mut Context, content: Node) -> Vec<Node> {
    RuleDispatcher::new(context, content).get_elements(rule)
}

//! Rule pipeline parsing
//!
//! A raw rule string is split into an ordered [`RulePipeline`] of
//! [`SubRule`] stages. Script blocks (`<script>…</script>`, `@script:…` and
//! the `<js>` / `@js:` aliases) become [`RuleMode::Script`] stages; the text
//! between them becomes selector stages whose mode is picked by
//! [`detect_mode`].
//!
//! Each selector stage is further decomposed into:
//! - `@put:{json}` directives ([`SubRule::variable_bindings`])
//! - placeholder segments (`@get:{key}`, `{{expr}}`, `$N`) resolved at
//!   evaluation time
//! - the `##pattern##replacement###` post-processing suffix
//!
//! Parsed pipelines are immutable and memoized per dispatcher in a
//! [`PipelineCache`].

use crate::config;
use crate::types::RuleMode;
use regex::{NoExpand, Regex};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::LazyLock;

/// Script spans: `<script>…</script>`, `<js>…</js>`, or `@script:` / `@js:`
/// to the end of the field.
#[allow(clippy::expect_used)]
static SCRIPT_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script>(.*?)</script>|<js>(.*?)</js>|@(?:script|js):(.*)")
        .expect("valid regex")
});

/// `@put:{...}` directives.
#[allow(clippy::expect_used)]
static PUT_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@put:(\{[^}]+?\})").expect("valid regex"));

/// `@get:{key}` and `{{expr}}` placeholders.
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)@get:\{([^}]+?)\}|\{\{(.*?)\}\}").expect("valid regex")
});

/// `$1` .. `$99` capture-group references.
#[allow(clippy::expect_used)]
static GROUP_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d{1,2})").expect("valid regex"));

/// What the dispatcher is currently bound to, as far as mode detection cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// HTML element tree or plain text
    Markup,
    /// JSON value
    Json,
    /// Capture groups of an all-in-one regex row
    Groups,
}

/// One piece of a templated stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied verbatim
    Literal(String),
    /// `@get:{key}`: context variable lookup
    Get(String),
    /// `{{rule}}` whose body looks like a rule (`@…`, `$.…`, `$[…`, `//…`)
    Rule(String),
    /// `{{expr}}` whose body is a script snippet
    Script(String),
    /// `$N`: capture group of the bound regex row
    Group(usize),
}

/// One stage of a rule pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRule {
    pub mode: RuleMode,

    /// Selector text with the mode prefix handled and the `##` suffix removed.
    /// For script stages, the script source.
    pub expression: String,

    /// Pattern of the `##` post-processing step, empty when absent
    pub replace_regex: String,

    /// Replacement text, `$N` refers to capture groups
    pub replacement: String,

    /// `###` suffix: replace only the first match and keep only that match
    pub replace_first: bool,

    /// `@put` directives, evaluated before the stage itself
    pub variable_bindings: BTreeMap<String, String>,

    /// Placeholder segments covering the whole stage text (including the
    /// `##` suffix). Empty for stages without placeholders; when present, the
    /// dispatcher substitutes them and re-splits the result with
    /// [`split_replace`].
    pub segments: Vec<Segment>,
}

impl SubRule {
    /// A script stage.
    pub fn script(source: &str) -> Self {
        Self {
            mode: RuleMode::Script,
            expression: source.trim().to_string(),
            replace_regex: String::new(),
            replacement: String::new(),
            replace_first: false,
            variable_bindings: BTreeMap::new(),
            segments: Vec::new(),
        }
    }

    /// Parse one non-script stage.
    pub fn parse(text: &str, content: ContentKind) -> Self {
        let (variable_bindings, rest) = extract_puts(text);
        let (mut mode, body) = detect_mode(rest.trim(), content);

        let (segments, templated) = scan_segments(body);
        if templated {
            mode = RuleMode::Regex;
        }
        let segments = match segments.as_slice() {
            [] | [Segment::Literal(_)] => Vec::new(),
            _ => segments,
        };

        let split = split_replace(body);
        Self {
            mode,
            expression: split.rule,
            replace_regex: split.replace_regex,
            replacement: split.replacement,
            replace_first: split.replace_first,
            variable_bindings,
            segments,
        }
    }

    /// True when the stage has placeholders to substitute at evaluation time.
    pub fn is_template(&self) -> bool {
        !self.segments.is_empty()
    }
}

/// Ordered stages of one raw rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RulePipeline {
    pub stages: Vec<SubRule>,
}

impl RulePipeline {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

/// Split a raw rule into stages.
///
/// ```
/// use bookscout_engine::rule::{parse_pipeline, ContentKind};
/// use bookscout_engine::types::RuleMode;
///
/// let pipeline = parse_pipeline("class.title@text<js>result.trim()</js>", ContentKind::Markup);
/// let modes: Vec<_> = pipeline.stages.iter().map(|s| s.mode).collect();
/// assert_eq!(modes, vec![RuleMode::Css, RuleMode::Script]);
/// ```
pub fn parse_pipeline(raw: &str, content: ContentKind) -> RulePipeline {
    let mut stages = Vec::new();
    let mut start = 0;

    for caps in SCRIPT_SPAN.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        push_stage(&mut stages, &raw[start..whole.start()], content);

        let source = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if !source.trim().is_empty() {
            stages.push(SubRule::script(source));
        }
        start = whole.end();
    }
    push_stage(&mut stages, raw.get(start..).unwrap_or_default(), content);

    tracing::trace!(rule = %raw, stages = stages.len(), "Parsed rule pipeline");
    RulePipeline { stages }
}

fn push_stage(stages: &mut Vec<SubRule>, text: &str, content: ContentKind) {
    let text = text.trim();
    if !text.is_empty() {
        stages.push(SubRule::parse(text, content));
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &text[prefix.len()..])
}

/// Classify a stage and strip its mode prefix.
///
/// `@css:` is kept because the CSS evaluator reads it as "literal selector
/// syntax". Bound regex rows make every stage a template.
///
/// ```
/// use bookscout_engine::rule::{detect_mode, ContentKind};
/// use bookscout_engine::types::RuleMode;
///
/// assert_eq!(detect_mode("@json:$.a", ContentKind::Markup), (RuleMode::JsonPath, "$.a"));
/// assert_eq!(detect_mode("//div/a", ContentKind::Markup), (RuleMode::XPath, "//div/a"));
/// assert_eq!(detect_mode("@CSS:div a@href", ContentKind::Markup), (RuleMode::Css, "@CSS:div a@href"));
/// assert_eq!(detect_mode("class.x@text", ContentKind::Markup), (RuleMode::Css, "class.x@text"));
/// ```
pub fn detect_mode(text: &str, content: ContentKind) -> (RuleMode, &str) {
    if content == ContentKind::Groups {
        return (RuleMode::Regex, text);
    }
    if strip_prefix_ci(text, "@css:").is_some() {
        return (RuleMode::Css, text);
    }
    if let Some(rest) = text.strip_prefix("@@") {
        return (RuleMode::Css, rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "@xpath:") {
        return (RuleMode::XPath, rest);
    }
    if let Some(rest) = strip_prefix_ci(text, "@json:") {
        return (RuleMode::JsonPath, rest);
    }
    if content == ContentKind::Json || text.starts_with("$.") || text.starts_with("$[") {
        return (RuleMode::JsonPath, text);
    }
    if text.starts_with('/') {
        return (RuleMode::XPath, text);
    }
    (RuleMode::Css, text)
}

/// Remove `@put:{...}` directives and collect their key/rule pairs.
///
/// A directive whose body is not a JSON object of strings is dropped with a
/// warning; the rest of the stage is still used.
fn extract_puts(text: &str) -> (BTreeMap<String, String>, String) {
    let mut bindings = BTreeMap::new();
    if !PUT_DIRECTIVE.is_match(text) {
        return (bindings, text.to_string());
    }

    for caps in PUT_DIRECTIVE.captures_iter(text) {
        let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(body) {
            Ok(map) => {
                for (key, value) in map {
                    let rule = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    bindings.insert(key, rule);
                }
            }
            Err(e) => tracing::warn!(directive = %body, error = %e, "Ignoring malformed @put directive"),
        }
    }
    let rest = PUT_DIRECTIVE.replace_all(text, NoExpand("")).into_owned();
    (bindings, rest)
}

/// True when `{{body}}` should be evaluated as a rule rather than a script.
pub fn looks_like_rule(body: &str) -> bool {
    let body = body.trim_start();
    body.starts_with('@') || body.starts_with("$.") || body.starts_with("$[") || body.starts_with("//")
}

/// Split a stage into placeholder segments.
///
/// The flag is true when a placeholder or `$N` reference appears in the rule
/// part (before the first `##`), which makes the stage a template.
fn scan_segments(text: &str) -> (Vec<Segment>, bool) {
    let mut segments = Vec::new();
    let mut templated = false;
    let mut last = 0;
    let mut rule_part_open = true;

    for caps in PLACEHOLDER.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &text[last..whole.start()];
        templated |= push_literal(&mut segments, gap, rule_part_open);
        if gap.contains("##") {
            rule_part_open = false;
        }
        if rule_part_open {
            templated = true;
        }

        if let Some(key) = caps.get(1) {
            segments.push(Segment::Get(key.as_str().trim().to_string()));
        } else if let Some(body) = caps.get(2) {
            let body = body.as_str().trim().to_string();
            if looks_like_rule(&body) {
                segments.push(Segment::Rule(body));
            } else {
                segments.push(Segment::Script(body));
            }
        }
        last = whole.end();
    }

    templated |= push_literal(&mut segments, &text[last..], rule_part_open);
    (segments, templated)
}

/// Push a literal gap, splitting out `$N` references from the part of the
/// gap that still belongs to the rule (before any `##`).
///
/// Returns true when a group reference was found.
fn push_literal(segments: &mut Vec<Segment>, gap: &str, in_rule: bool) -> bool {
    if gap.is_empty() {
        return false;
    }
    let (rule_text, suffix) = match (in_rule, gap.find("##")) {
        (false, _) => ("", gap),
        (true, Some(at)) => gap.split_at(at),
        (true, None) => (gap, ""),
    };

    let mut found = false;
    let mut last = 0;
    for caps in GROUP_REF.captures_iter(rule_text) {
        let (Some(whole), Some(index)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(index) = index.as_str().parse::<usize>() else {
            continue;
        };
        push_text(segments, &rule_text[last..whole.start()]);
        segments.push(Segment::Group(index));
        last = whole.end();
        found = true;
    }
    push_text(segments, &rule_text[last..]);
    push_text(segments, suffix);
    found
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Literal(prev)) = segments.last_mut() {
        prev.push_str(text);
    } else {
        segments.push(Segment::Literal(text.to_string()));
    }
}

/// Rule text split at its `##` post-processing markers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplaceSplit {
    pub rule: String,
    pub replace_regex: String,
    pub replacement: String,
    pub replace_first: bool,
}

/// Split `rule##pattern##replacement###` into its parts.
pub fn split_replace(text: &str) -> ReplaceSplit {
    let parts: Vec<&str> = text.split("##").collect();
    ReplaceSplit {
        rule: parts.first().map(|s| s.trim()).unwrap_or_default().to_string(),
        replace_regex: parts.get(1).copied().unwrap_or_default().to_string(),
        replacement: parts.get(2).copied().unwrap_or_default().to_string(),
        replace_first: parts.len() > 3,
    }
}

/// Rewrite `$N` group references into the `${N}` form the regex crate expects
/// and escape every other `$`.
fn expand_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        if digits.is_empty() {
            out.push_str("$$");
        } else {
            out.push_str("${");
            out.push_str(&digits);
            out.push('}');
        }
    }
    out
}

/// Apply `##` post-processing to a value.
///
/// With `first_only`, only the first match is kept and rewritten; no match
/// gives an empty string. An invalid pattern falls back to literal substring
/// replacement.
///
/// ```
/// use bookscout_engine::rule::replace_regex;
///
/// assert_eq!(replace_regex("abc123def456", r"\d+", "X", false), "abcXdefX");
/// assert_eq!(replace_regex("abc123def456", r"\d+", "X", true), "X");
/// assert_eq!(replace_regex("chapter 12", r"chapter (\d+)", "$1", false), "12");
/// ```
pub fn replace_regex(input: &str, pattern: &str, replacement: &str, first_only: bool) -> String {
    match Regex::new(pattern) {
        Ok(re) => {
            let template = expand_replacement(replacement);
            if first_only {
                re.captures(input)
                    .map(|caps| {
                        let mut out = String::new();
                        caps.expand(&template, &mut out);
                        out
                    })
                    .unwrap_or_default()
            } else {
                re.replace_all(input, template.as_str()).into_owned()
            }
        }
        Err(e) => {
            tracing::debug!(pattern = %pattern, error = %e, "Invalid replace pattern, using literal replacement");
            if first_only {
                if input.contains(pattern) {
                    replacement.to_string()
                } else {
                    String::new()
                }
            } else {
                input.replace(pattern, replacement)
            }
        }
    }
}

/// Per-dispatcher memo of parsed pipelines, keyed by raw rule text and the
/// content kind the rule was parsed for.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: HashMap<(String, ContentKind), Rc<RulePipeline>>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed pipeline for `raw`, parsing on first use.
    pub fn get_or_parse(&mut self, raw: &str, content: ContentKind) -> Rc<RulePipeline> {
        let key = (raw.to_string(), content);
        if let Some(pipeline) = self.entries.get(&key) {
            return Rc::clone(pipeline);
        }
        if self.entries.len() >= config::MAX_CACHED_PIPELINES {
            tracing::debug!(entries = self.entries.len(), "Pipeline cache full, clearing");
            self.entries.clear();
        }
        let pipeline = Rc::new(parse_pipeline(raw, content));
        self.entries.insert(key, Rc::clone(&pipeline));
        pipeline
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

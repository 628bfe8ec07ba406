//! Documents and nodes the rule engine evaluates against
//!
//! A document is whatever the transport returned, parsed once: an HTML tree
//! (via `scraper`) or a JSON value tree (via `serde_json`). Nodes are cheap
//! handles into a document. HTML element handles share the parsed tree
//! through an `Rc`, so a node list returned by
//! [`crate::RuleDispatcher::get_elements`] stays usable after the dispatcher
//! is re-pointed with `set_content`.
//!
//! `Rc` makes nodes `!Send`. That is deliberate: every concurrent extraction
//! builds its own document, dispatcher and context.

use ego_tree::NodeId;
use scraper::{ElementRef, Html};
use serde_json::Value as JsonValue;
use std::fmt;
use std::rc::Rc;

/// Handle to one element of a shared HTML tree.
#[derive(Clone)]
pub struct ElementHandle {
    doc: Rc<Html>,
    id: NodeId,
}

impl ElementHandle {
    /// Handle for `element`, which must belong to `doc`.
    pub fn new(doc: &Rc<Html>, element: ElementRef<'_>) -> Self {
        Self {
            doc: Rc::clone(doc),
            id: element.id(),
        }
    }

    /// Handle for the root `<html>` element of `doc`.
    pub fn root(doc: Rc<Html>) -> Self {
        let id = doc.root_element().id();
        Self { doc, id }
    }

    /// The shared tree this element lives in.
    pub fn document(&self) -> &Rc<Html> {
        &self.doc
    }

    /// Borrow the element.
    ///
    /// Always `Some` for handles built through this module; the `Option`
    /// mirrors the tree lookup.
    pub fn element(&self) -> Option<ElementRef<'_>> {
        self.doc.tree.get(self.id).and_then(ElementRef::wrap)
    }

    /// Serialized element including its own tag.
    pub fn outer_html(&self) -> String {
        self.element().map(|e| e.html()).unwrap_or_default()
    }

    /// Serialized children.
    pub fn inner_html(&self) -> String {
        self.element().map(|e| e.inner_html()).unwrap_or_default()
    }

    /// Visible text with whitespace runs collapsed.
    ///
    /// Script and style contents are skipped; block elements and `<br>`
    /// separate their neighbours with a space.
    pub fn text(&self) -> String {
        let mut raw = String::new();
        if let Some(e) = self.element() {
            collect_text(e, &mut raw, 0);
        }
        normalize_text(std::iter::once(raw.as_str()))
    }

    /// Text of the element's direct text children only.
    pub fn own_text(&self) -> String {
        normalize_text(self.direct_text_nodes().into_iter())
    }

    /// Direct text children, trimmed, blanks dropped.
    pub fn text_nodes(&self) -> Vec<String> {
        self.direct_text_nodes()
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn direct_text_nodes(&self) -> Vec<&str> {
        self.element()
            .map(|e| {
                e.children()
                    .filter_map(|child| match child.value() {
                        scraper::Node::Text(text) => Some(&**text),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

const MAX_TEXT_DEPTH: usize = 256;

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "address" | "article" | "aside" | "blockquote" | "br" | "dd" | "div" | "dl" | "dt"
            | "footer" | "form" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "header" | "hr"
            | "li" | "main" | "nav" | "ol" | "p" | "pre" | "section" | "table" | "td" | "th"
            | "tr" | "ul"
    )
}

fn collect_text(element: ElementRef<'_>, out: &mut String, depth: usize) {
    if depth > MAX_TEXT_DEPTH {
        return;
    }
    for child in element.children() {
        match child.value() {
            scraper::Node::Text(text) => out.push_str(text),
            scraper::Node::Element(data) => {
                let tag = data.name();
                if matches!(tag, "script" | "style") {
                    continue;
                }
                let block = is_block(tag);
                if block {
                    out.push(' ');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out, depth + 1);
                }
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for ElementHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.doc, &other.doc) && self.id == other.id
    }
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .element()
            .map(|e| e.value().name().to_string())
            .unwrap_or_default();
        f.debug_struct("ElementHandle")
            .field("tag", &name)
            .field("id", &self.id)
            .finish()
    }
}

/// One value the engine can evaluate a rule against.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// HTML element in a shared tree
    Element(ElementHandle),
    /// JSON value
    Json(JsonValue),
    /// Capture groups of one all-in-one regex match (index 0 is the whole match)
    Groups(Vec<String>),
    /// Plain text, parsed lazily when a selector needs structure
    Text(String),
}

impl Node {
    /// Parse transport output into a document.
    ///
    /// Text that starts with `{` or `[` and parses as JSON becomes a JSON
    /// document; everything else is parsed as HTML.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            match serde_json::from_str::<JsonValue>(trimmed) {
                Ok(value) => return Node::Json(value),
                Err(e) => tracing::trace!(error = %e, "Content looks like JSON but is not, parsing as HTML"),
            }
        }
        Self::html(text)
    }

    /// Parse `text` as an HTML document.
    pub fn html(text: &str) -> Self {
        Node::Element(ElementHandle::root(Rc::new(Html::parse_document(text))))
    }

    /// True for JSON nodes.
    pub fn is_json(&self) -> bool {
        matches!(self, Node::Json(_))
    }

    /// String form used when a node is fed to a text-based stage.
    ///
    /// Elements serialize to outer HTML, JSON coerces per
    /// [`json_to_text`] (null becomes empty), groups yield the whole match.
    pub fn to_text(&self) -> String {
        match self {
            Node::Element(handle) => handle.outer_html(),
            Node::Json(value) => json_to_text(value).unwrap_or_default(),
            Node::Groups(groups) => groups.first().cloned().unwrap_or_default(),
            Node::Text(text) => text.clone(),
        }
    }

    /// Re-interpret the node structurally: text is parsed, everything else is
    /// returned unchanged.
    pub fn into_structured(self) -> Self {
        match self {
            Node::Text(text) => Node::parse(&text),
            other => other,
        }
    }
}

impl From<JsonValue> for Node {
    fn from(value: JsonValue) -> Self {
        Node::Json(value)
    }
}

impl From<ElementHandle> for Node {
    fn from(handle: ElementHandle) -> Self {
        Node::Element(handle)
    }
}

/// Coerce a JSON value to text.
///
/// - `null` is no result
/// - strings are returned as-is, without quotes
/// - integral floats render without a fractional part
/// - arrays join their element strings with `\n`, skipping nulls
/// - objects serialize as compact JSON
pub fn json_to_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
            _ => n.to_string(),
        }),
        JsonValue::Array(items) => Some(
            items
                .iter()
                .filter_map(json_to_text)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        JsonValue::Object(_) => Some(value.to_string()),
    }
}

/// Join text fragments and collapse whitespace runs into single spaces.
pub fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let joined: String = parts.collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

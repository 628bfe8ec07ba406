//! World struct for Cucumber BDD tests
//!
//! Contains the test state that persists across steps in a scenario.
//!
//! Documents are kept as source text and parsed per step: parsed HTML nodes
//! are not `Send`, and every step builds its own dispatcher anyway.

use bookscout_engine::{BookInfo, Context, Node, RuleDispatcher};
use cucumber::World;

/// What the last extraction step produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    #[default]
    Nothing,
    Single(Option<String>),
    List(Option<Vec<String>>),
    /// One value per row of a row-then-field extraction
    Rows(Vec<Option<String>>),
}

/// Test world that holds state across steps in a Cucumber scenario.
#[derive(Debug, Default, World)]
pub struct ExtractionWorld {
    /// Page source the rules run against
    pub document: String,
    /// Extraction context shared by every step of the scenario
    pub context: Context,
    /// Result of the last When step
    pub outcome: Outcome,
}

impl ExtractionWorld {
    pub fn set_page(&mut self, url: &str, source: &str) {
        self.document = source.to_string();
        self.context.set_base_url(url);
    }

    pub fn set_book(&mut self, name: &str, author: &str) {
        let context = std::mem::take(&mut self.context);
        let base_url = context.base_url().to_string();
        let mut next = Context::new()
            .with_book(BookInfo::new(name, author))
            .with_base_url(base_url);
        for (key, value) in context.variables() {
            next.put(key.clone(), value.clone());
        }
        self.context = next;
    }

    /// Run `f` with a dispatcher bound to the scenario document.
    pub fn with_dispatcher<T>(&mut self, f: impl FnOnce(&mut RuleDispatcher<'_>) -> T) -> T {
        let node = Node::parse(&self.document);
        let mut dispatcher = RuleDispatcher::new(&mut self.context, node);
        f(&mut dispatcher)
    }

    pub fn single(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Single(value) => value.clone(),
            other => panic!("Expected a single value, last step produced {other:?}"),
        }
    }

    pub fn list(&self) -> Option<Vec<String>> {
        match &self.outcome {
            Outcome::List(value) => value.clone(),
            other => panic!("Expected a list, last step produced {other:?}"),
        }
    }

    pub fn rows(&self) -> Vec<Option<String>> {
        match &self.outcome {
            Outcome::Rows(rows) => rows.clone(),
            other => panic!("Expected per-row values, last step produced {other:?}"),
        }
    }
}

//! Given step definitions
//!
//! Steps that set up the page and context for scenarios.

use cucumber::{gherkin::Step, given};

use crate::world::ExtractionWorld;

fn docstring(step: &Step) -> String {
    step.docstring
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

#[given(expr = "a page at {string}:")]
fn set_page(world: &mut ExtractionWorld, url: String, step: &Step) {
    world.set_page(&url, &docstring(step));
}

#[given(expr = "a JSON response from {string}:")]
fn set_json(world: &mut ExtractionWorld, url: String, step: &Step) {
    let source = docstring(step);
    assert!(
        serde_json::from_str::<serde_json::Value>(&source).is_ok(),
        "Scenario JSON does not parse: {source}"
    );
    world.set_page(&url, &source);
}

#[given(expr = "the book {string} by {string}")]
fn set_book(world: &mut ExtractionWorld, name: String, author: String) {
    world.set_book(&name, &author);
}

#[given(expr = "the variable {string} is {string}")]
fn set_variable(world: &mut ExtractionWorld, key: String, value: String) {
    world.context.put(key, value);
}

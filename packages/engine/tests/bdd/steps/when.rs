//! When step definitions
//!
//! Steps that run extraction rules.

use bookscout_engine::RuleDispatcher;
use cucumber::when;

use crate::world::{ExtractionWorld, Outcome};

#[when(regex = r"^I extract the string `(.*)`$")]
fn extract_string(world: &mut ExtractionWorld, rule: String) {
    let value = world.with_dispatcher(|d| d.get_string(&rule));
    world.outcome = Outcome::Single(value);
}

#[when(regex = r"^I extract the list `(.*)`$")]
fn extract_list(world: &mut ExtractionWorld, rule: String) {
    let value = world.with_dispatcher(|d| d.get_string_list(&rule));
    world.outcome = Outcome::List(value);
}

#[when(regex = r"^I extract the URL `(.*)`$")]
fn extract_url(world: &mut ExtractionWorld, rule: String) {
    let value = world.with_dispatcher(|d| d.get_url(&rule));
    world.outcome = Outcome::Single(value);
}

#[when(regex = r"^I extract the URL list `(.*)`$")]
fn extract_url_list(world: &mut ExtractionWorld, rule: String) {
    let value = world.with_dispatcher(|d| d.get_url_list(&rule));
    world.outcome = Outcome::List(value);
}

#[when(regex = r"^for each row of `(.*)` I extract `(.*)`$")]
fn extract_per_row(world: &mut ExtractionWorld, rows: String, field: String) {
    let values = world.with_dispatcher(|d| per_row(d, &rows, &field));
    world.outcome = Outcome::Rows(values);
}

fn per_row(dispatcher: &mut RuleDispatcher<'_>, rows: &str, field: &str) -> Vec<Option<String>> {
    let nodes = dispatcher.get_elements(rows);
    nodes
        .into_iter()
        .map(|node| {
            dispatcher.set_content(node);
            dispatcher.get_string(field)
        })
        .collect()
}

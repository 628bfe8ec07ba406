//! Then step definitions
//!
//! Steps that verify extraction results.

use cucumber::{gherkin::Step, then};

use crate::world::ExtractionWorld;

fn table_column(step: &Step) -> Vec<String> {
    let table = step.table.as_ref().expect("Step needs a data table");
    table
        .rows
        .iter()
        .map(|row| row.first().cloned().unwrap_or_default())
        .collect()
}

#[then(regex = r"^the result is `(.*)`$")]
fn assert_result(world: &mut ExtractionWorld, expected: String) {
    assert_eq!(world.single().as_deref(), Some(expected.as_str()));
}

#[then("the result is absent")]
fn assert_absent(world: &mut ExtractionWorld) {
    let value = world.single();
    assert!(value.is_none(), "Expected no value, got {value:?}");
}

#[then("the list is:")]
fn assert_list(world: &mut ExtractionWorld, step: &Step) {
    let expected = table_column(step);
    assert_eq!(world.list(), Some(expected));
}

#[then("the list is absent")]
fn assert_list_absent(world: &mut ExtractionWorld) {
    let value = world.list();
    assert!(value.is_none(), "Expected no list, got {value:?}");
}

#[then("the rows are:")]
fn assert_rows(world: &mut ExtractionWorld, step: &Step) {
    let expected: Vec<Option<String>> = table_column(step)
        .into_iter()
        .map(|cell| (cell != "<absent>").then_some(cell))
        .collect();
    assert_eq!(world.rows(), expected);
}

#[then(regex = r#"^the variable "([^"]+)" is "([^"]*)"$"#)]
fn assert_variable(world: &mut ExtractionWorld, key: String, expected: String) {
    assert_eq!(world.context.get(&key), Some(expected.as_str()));
}

//! Embedded script evaluation
//!
//! Book sources embed short snippets (`<js>result.trim()</js>`,
//! `{{ page * 20 }}`) to post-process a value. They run on the `rhai`
//! runtime with a fresh [`rhai::Scope`] per snippet.
//!
//! # Bindings
//!
//! | Name | Kind | Value |
//! |------|------|-------|
//! | `result` | variable | current pipeline value (string, string array or JSON-mapped) |
//! | `baseUrl` | constant | URL of the current document |
//! | `bookName` | constant | name of the current book |
//! | `bookAuthor` | constant | author of the current book |
//! | `get(key)` | function | context lookup, `""` when unknown |
//!
//! # Budgets
//!
//! Each snippet gets [`config::SCRIPT_MAX_OPERATIONS`] operations and
//! [`config::SCRIPT_TIME_BUDGET_MS`] milliseconds of wall-clock time. Either
//! limit aborts the snippet, which then has no result.

use crate::config;
use crate::context::Context;
use crate::error::{EngineError, Result};
use rhai::{Array, Dynamic, Engine, Scope};
use serde_json::Value as JsonValue;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Value exchanged with a snippet.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// No value yet (first stage of a pipeline)
    Empty,
    Text(String),
    List(Vec<String>),
    /// Structured JSON, mapped to rhai maps and arrays
    Json(JsonValue),
}

impl ScriptValue {
    fn into_dynamic(self) -> Dynamic {
        match self {
            ScriptValue::Empty => Dynamic::UNIT,
            ScriptValue::Text(text) => Dynamic::from(text),
            ScriptValue::List(items) => {
                Dynamic::from_array(items.into_iter().map(Dynamic::from).collect::<Array>())
            }
            ScriptValue::Json(value) => rhai::serde::to_dynamic(&value).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "JSON value not representable in script, passing text");
                Dynamic::from(value.to_string())
            }),
        }
    }
}

/// Rhai runtime with the engine's budgets applied.
pub struct ScriptBridge {
    engine: Engine,
    deadline: Rc<Cell<Instant>>,
    context: Rc<RefCell<Context>>,
}

impl std::fmt::Debug for ScriptBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBridge").finish_non_exhaustive()
    }
}

impl Default for ScriptBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptBridge {
    pub fn new() -> Self {
        let deadline = Rc::new(Cell::new(Instant::now()));
        let context = Rc::new(RefCell::new(Context::new()));

        let mut engine = Engine::new();
        engine.set_max_operations(config::SCRIPT_MAX_OPERATIONS);
        engine.set_max_expr_depths(config::SCRIPT_MAX_EXPR_DEPTH, config::SCRIPT_MAX_EXPR_DEPTH);
        engine.set_max_string_size(config::SCRIPT_MAX_STRING_SIZE);
        engine.disable_symbol("eval");

        let progress_deadline = Rc::clone(&deadline);
        engine.on_progress(move |_ops| {
            if Instant::now() >= progress_deadline.get() {
                Some(Dynamic::from("time budget exceeded"))
            } else {
                None
            }
        });

        let lookup = Rc::clone(&context);
        engine.register_fn("get", move |key: &str| -> String {
            lookup.borrow().get_or_empty(key)
        });

        Self {
            engine,
            deadline,
            context,
        }
    }

    /// Run `source` with `input` bound to `result`.
    ///
    /// Failures (parse errors, runtime errors, exhausted budgets) are logged
    /// at debug level and give `None`, as does a unit result.
    pub fn eval(&self, source: &str, input: ScriptValue, ctx: &Context) -> Option<ScriptValue> {
        match self.try_eval(source, input, ctx) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(script = %source, error = %e, "Script produced no result");
                None
            }
        }
    }

    fn try_eval(
        &self,
        source: &str,
        input: ScriptValue,
        ctx: &Context,
    ) -> Result<Option<ScriptValue>> {
        *self.context.borrow_mut() = ctx.clone();
        self.deadline
            .set(Instant::now() + Duration::from_millis(config::SCRIPT_TIME_BUDGET_MS));

        let mut scope = Scope::new();
        scope.push("result", input.into_dynamic());
        scope.push_constant("baseUrl", ctx.base_url().to_string());
        scope.push_constant("bookName", ctx.book().name.clone());
        scope.push_constant("bookAuthor", ctx.book().author.clone());

        let output = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, source)
            .map_err(|e| EngineError::ScriptFailure(e.to_string()))?;
        Ok(from_dynamic(output))
    }
}

fn float_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

fn from_dynamic(value: Dynamic) -> Option<ScriptValue> {
    if value.is_array() {
        let items = value.into_array().ok()?;
        return Some(ScriptValue::List(
            items.into_iter().filter_map(item_text).collect(),
        ));
    }
    item_text(value).map(ScriptValue::Text)
}

fn item_text(value: Dynamic) -> Option<String> {
    if value.is_unit() {
        return None;
    }
    if value.is_map() {
        return rhai::serde::from_dynamic::<JsonValue>(&value)
            .ok()
            .map(|json| json.to_string());
    }
    if let Ok(f) = value.as_float() {
        return Some(float_text(f));
    }
    if value.is_string() {
        return value.into_string().ok();
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BookInfo;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> Context {
        let mut ctx = Context::new()
            .with_book(BookInfo::new("Dune", "Frank Herbert"))
            .with_base_url("https://example.com/b/1");
        ctx.put("bid", "42");
        ctx
    }

    fn run(source: &str, input: ScriptValue) -> Option<ScriptValue> {
        ScriptBridge::new().eval(source, input, &context())
    }

    fn text(s: &str) -> Option<ScriptValue> {
        Some(ScriptValue::Text(s.to_string()))
    }

    #[test]
    fn test_result_binding() {
        assert_eq!(run(r#"result + "!""#, ScriptValue::Text("hi".into())), text("hi!"));
    }

    #[test]
    fn test_context_constants_and_get() {
        assert_eq!(
            run(r#"bookName + "/" + bookAuthor"#, ScriptValue::Empty),
            text("Dune/Frank Herbert")
        );
        assert_eq!(run(r#"baseUrl"#, ScriptValue::Empty), text("https://example.com/b/1"));
        assert_eq!(run(r#"get("bid")"#, ScriptValue::Empty), text("42"));
        assert_eq!(run(r#"get("nope")"#, ScriptValue::Empty), text(""));
    }

    #[test]
    fn test_constants_are_read_only() {
        assert_eq!(run(r#"bookName = "x"; bookName"#, ScriptValue::Empty), None);
    }

    #[test]
    fn test_list_in_list_out() {
        let input = ScriptValue::List(vec!["a".into(), "b".into()]);
        assert_eq!(
            run("result.map(|s| s + s)", input),
            Some(ScriptValue::List(vec!["aa".into(), "bb".into()]))
        );
    }

    #[test]
    fn test_json_input() {
        let input = ScriptValue::Json(json!({"name": "Dune", "year": 1965}));
        assert_eq!(run("result.name", input.clone()), text("Dune"));
        assert_eq!(run("result.year + 1", input), text("1966"));
    }

    #[test]
    fn test_integral_float_output() {
        assert_eq!(run("2.0 * 3.0", ScriptValue::Empty), text("6"));
        assert_eq!(run("1.5", ScriptValue::Empty), text("1.5"));
    }

    #[test]
    fn test_unit_is_no_result() {
        assert_eq!(run("let x = 1;", ScriptValue::Empty), None);
    }

    #[test]
    fn test_errors_are_no_result() {
        assert_eq!(run("throw \"boom\"", ScriptValue::Empty), None);
        assert_eq!(run("this is not rhai (", ScriptValue::Empty), None);
        assert_eq!(run("undefined_fn()", ScriptValue::Empty), None);
    }

    #[test]
    fn test_runaway_loop_is_stopped() {
        assert_eq!(run("loop { }", ScriptValue::Empty), None);
    }

    #[test]
    fn test_bridge_is_reusable_after_failure() {
        let bridge = ScriptBridge::new();
        let ctx = context();
        assert_eq!(bridge.eval("throw 1", ScriptValue::Empty, &ctx), None);
        assert_eq!(
            bridge.eval("result.len()", ScriptValue::Text("abc".into()), &ctx),
            text("3")
        );
    }
}

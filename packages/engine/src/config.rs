//! Configuration constants for the Bookscout rule engine
//!
//! Centralized limits used throughout the engine for:
//! - Script execution budgets (runaway third-party snippets)
//! - Recursion depth limits (rules that reference themselves through `{{ }}`)
//! - Size limits on intermediate values
//!
//! # Customization
//!
//! These are compile-time constants. Callers that need different limits for a
//! specific source can wrap the dispatcher; the engine itself has no runtime
//! configuration surface.

/// Maximum number of rhai operations a single embedded snippet may perform.
///
/// Rule snippets are one-liners (`result + "/"`, a short loop over a list).
/// 100k operations is orders of magnitude above that and still finishes in
/// milliseconds.
pub const SCRIPT_MAX_OPERATIONS: u64 = 100_000;

/// Wall-clock budget per embedded snippet, in milliseconds.
///
/// Checked from the runtime's progress callback, so it also bounds snippets
/// that stay under the operation limit but call slow built-ins.
pub const SCRIPT_TIME_BUDGET_MS: u64 = 200;

/// Maximum expression nesting depth accepted by the script parser.
pub const SCRIPT_MAX_EXPR_DEPTH: usize = 64;

/// Maximum length of any string produced inside a script (bytes).
///
/// Chapter text is the largest legitimate value (a few hundred KB).
pub const SCRIPT_MAX_STRING_SIZE: usize = 4 * 1024 * 1024;

/// Maximum nesting depth when a rule re-enters the dispatcher.
///
/// `{{ }}` placeholders and `@put` values are themselves rules; a source that
/// stores a rule referencing itself would otherwise recurse forever.
pub const MAX_RULE_DEPTH: usize = 16;

/// Maximum number of pipelines kept in a dispatcher's per-call cache.
///
/// A search or TOC call touches ten to twenty distinct rules. The cap only
/// matters for callers that reuse one dispatcher across many sources.
pub const MAX_CACHED_PIPELINES: usize = 256;

/// Maximum number of matches collected by JSONPath recursive descent.
pub const MAX_JSON_MATCHES: usize = 100_000;

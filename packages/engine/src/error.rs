//! Error types for the Bookscout rule engine
//!
//! Extraction never surfaces these to callers: the dispatcher catches them at
//! stage granularity and degrades the stage to an empty value. They exist so
//! the internal helpers can use `?` and so degradations can be logged with a
//! precise reason.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rule text could not be interpreted (e.g. a broken `@put` directive)
    #[error("Malformed rule: {0}")]
    MalformedRule(String),

    /// Embedded script failed to parse, threw, or exceeded its budget
    #[error("Script failure: {0}")]
    ScriptFailure(String),

    /// Mode that is only emulated (XPath) was asked for something it cannot express
    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    /// CSS selector rejected by the selector parser
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Regular expression failed to compile
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// JSON parse error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL could not be resolved against the base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

//! Error types for the fetcher.
//!
//! Extraction itself never fails (a missing field is `None`); these cover
//! everything around it: transport, book-source documents and files.

use thiserror::Error;

/// Main error type for the fetcher library.
#[derive(Debug, Error)]
pub enum FetcherError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Transient failures persisted through every retry.
    #[error("Giving up on {url} after {attempts} attempts: {message}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        message: String,
    },

    /// Book-source document is unusable.
    #[error("Invalid book source: {0}")]
    InvalidSource(String),

    /// JSON parse error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL could not be built or resolved.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No loaded book source matches the request.
    #[error("No book source matches '{0}'")]
    SourceNotFound(String),
}

impl From<bookscout_engine::EngineError> for FetcherError {
    fn from(e: bookscout_engine::EngineError) -> Self {
        FetcherError::InvalidUrl(e.to_string())
    }
}

/// Result type alias for fetcher operations.
pub type Result<T> = std::result::Result<T, FetcherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let err = FetcherError::Status {
            url: "https://example.com/s".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP 404 from https://example.com/s");
    }

    #[test]
    fn test_engine_url_error_converts() {
        let engine_err = bookscout_engine::absolute_url("", "relative").unwrap_err();
        let err: FetcherError = engine_err.into();
        assert!(matches!(err, FetcherError::InvalidUrl(_)));
    }
}

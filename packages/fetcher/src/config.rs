//! Configuration constants for the fetcher.
//!
//! Centralized limits used throughout the fetcher for:
//! - HTTP behavior (timeouts, retries, user agent)
//! - Politeness towards source websites (concurrency, page delays)
//! - Pagination bounds (chapter lists and chapter pages)

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("bookscout/", env!("CARGO_PKG_VERSION"));

/// HTTP timeout in seconds.
///
/// Book sites are often slow hobby servers; 15 seconds keeps a dead source
/// from holding a search open for long.
pub const HTTP_TIMEOUT_SECS: u64 = 15;

/// Maximum number of attempts for transient failures.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Maximum number of sources queried at the same time during a search.
pub const MAX_CONCURRENT_SOURCES: usize = 8;

/// Delay between consecutive page requests to the same site (milliseconds).
///
/// Applies to paged chapter lists and multi-page chapters.
pub const PAGE_FETCH_DELAY_MS: u64 = 300;

/// Maximum number of chapter-list pages followed through `nextTocUrl`.
pub const MAX_TOC_PAGES: usize = 100;

/// Maximum number of pages one chapter may span through `nextContentUrl`.
pub const MAX_CONTENT_PAGES: usize = 20;

/// Search results page requested by default.
pub const FIRST_PAGE: u32 = 1;

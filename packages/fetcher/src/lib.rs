//! Bookscout Fetcher
//!
//! Drives the bookscout rule engine against live websites: loads book-source
//! documents, builds requests from their URL templates, fetches pages over
//! HTTP and runs the source rules to produce search results, book details,
//! chapter lists and chapter text.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bookscout_fetcher::{load_sources, search, HttpTransport, Transport};
//!
//! # async fn demo() -> bookscout_fetcher::Result<()> {
//! let sources = load_sources("sources.json".as_ref())?;
//! let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
//! for book in search(transport, &sources, "dune").await {
//!     println!("{} by {} ({})", book.name, book.author, book.book_url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod book;
pub mod cli;
pub mod config;
pub mod error;
mod extract;
pub mod http;
pub mod request;
pub mod search;
pub mod source;

// Re-export commonly used items
pub use book::{book_info, content, format_content, toc, BookDetail, Chapter};
pub use error::{FetcherError, Result};
pub use http::{HttpTransport, Transport};
pub use request::{search_request, Method, Request};
pub use search::{search, search_source, SearchBook};
pub use source::{find_source, load_sources, parse_sources, BookSource};

//! Bookscout Engine
//!
//! Rule engine for community book sources. A book source describes, for one
//! website, how to pull search results, book details, chapter lists and
//! chapter text out of the pages it serves. Each field is a rule string in a
//! compact mixed language:
//! - chained CSS steps (`class.item.0@tag.a@href`) or literal CSS (`@css:div > a@href`)
//! - XPath (`//div[@class='title']/text()`)
//! - JSONPath (`$.data[*].name`)
//! - embedded scripts (`<js>result.trim()</js>`, `{{ page * 20 }}`)
//! - regex post-processing (`##pattern##replacement`)
//!
//! Rules combine with `&&` (concatenate), `||` (first non-empty) and `%%`
//! (interleave).
//!
//! # Example
//!
//! ```
//! use bookscout_engine::{Context, Node, RuleDispatcher};
//!
//! let page = r#"
//!     <ul>
//!       <li class="item"><a href="/b/1">Dune</a></li>
//!       <li class="item"><a href="/b/2">Emma</a></li>
//!     </ul>"#;
//!
//! let mut ctx = Context::new().with_base_url("https://example.com/search");
//! let mut dispatcher = RuleDispatcher::new(&mut ctx, Node::parse(page));
//!
//! let mut books = Vec::new();
//! for row in dispatcher.get_elements("class.item") {
//!     dispatcher.set_content(row);
//!     books.push((
//!         dispatcher.get_string("tag.a@text").unwrap_or_default(),
//!         dispatcher.get_url("tag.a@href").unwrap_or_default(),
//!     ));
//! }
//!
//! assert_eq!(books[1], ("Emma".to_string(), "https://example.com/b/2".to_string()));
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod rule;
pub mod script;
pub mod selector;
pub mod splitter;
pub mod types;

// Re-export commonly used items
pub use context::{BookInfo, Context, SourceInfo};
pub use dispatcher::{
    absolute_url, extract_elements, extract_string, extract_string_list, RuleDispatcher,
};
pub use document::{ElementHandle, Node};
pub use error::{EngineError, Result};
pub use rule::{parse_pipeline, ContentKind, RulePipeline, SubRule};
pub use script::{ScriptBridge, ScriptValue};
pub use splitter::split_rule;
pub use types::{CombinatorGroup, CombinatorKind, Dialect, RuleMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

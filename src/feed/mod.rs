//! Syndication source retrieval.
//!
//! - [`parser`] - RSS/Atom parsing via `feed-rs` into [`RawEntry`](crate::model::RawEntry) values
//! - [`fetcher`] - HTTP retrieval with retry, timeout and size limits; implements
//!   [`SourceReader`](crate::engine::SourceReader)
//!
//! # Example
//!
//! ```ignore
//! use feed_aggregator::feed::{FetchOptions, HttpSourceReader};
//!
//! let reader = HttpSourceReader::new(reqwest::Client::new(), FetchOptions::default());
//! let feed = reader.fetch_feed("https://example.com/rss.xml").await?;
//! ```

mod fetcher;
mod parser;

pub use fetcher::{FetchError, FetchOptions, HttpSourceReader};
pub use parser::{parse_feed, ParsedFeed};

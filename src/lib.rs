//! Refresh-decision and aggregation engine for syndication feeds.
//!
//! Channels are polled according to their TTL, retrieved entries are keyed by
//! link, and only entries not already stored are persisted and flagged fresh.

pub mod config;
pub mod engine;
pub mod feed;
pub mod model;
pub mod storage;

//! Refresh-decision and aggregation engine.
//!
//! The engine decides per channel whether stored entries are stale, retrieves
//! stale channels, and merges retrieved entries into the store so that only
//! the delta is written:
//!
//! - [`is_stale`] - TTL policy
//! - [`Aggregator::refresh`] - one channel, sequential
//! - [`Aggregator::aggregate`] - every eligible channel, fanned out concurrently
//! - [`Aggregator::merge`] - link-based dedup and batch persistence
//!
//! Storage and retrieval are reached through the [`ChannelRegistry`],
//! [`EntryStore`] and [`SourceReader`] traits.

mod aggregate;
mod entry_set;
mod refresh;
mod ttl;

#[cfg(test)]
mod testing;

pub use entry_set::EntrySet;
pub use ttl::is_stale;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::feed::FetchError;
use crate::model::{Channel, Entry, RawEntry};

/// Default bound on simultaneous retrievals during aggregation.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 10;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown channel [id: {0}]")]
    ChannelNotFound(i64),

    /// The source reader could not produce entries for the channel's URL.
    #[error("The channel's URL isn't a valid feed source [url: {url}]")]
    InvalidSource {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Registry or entry store failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

// ============================================================================
// Collaborators
// ============================================================================

/// Lookup and refresh-time bookkeeping for subscribed channels.
#[async_trait]
pub trait ChannelRegistry: Send + Sync {
    async fn get(&self, id: i64) -> anyhow::Result<Option<Channel>>;

    async fn list(&self) -> anyhow::Result<Vec<Channel>>;

    async fn set_last_refresh(&self, id: i64, when: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Persistent entry storage.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn find_by_channel(&self, channel_ids: &[i64]) -> anyhow::Result<Vec<Entry>>;

    async fn find_all(&self) -> anyhow::Result<Vec<Entry>>;

    /// Write a batch of entries. Entries whose channel and link are already
    /// stored must be ignored, so repeating a batch is harmless.
    async fn save_all(&self, entries: &[Entry]) -> anyhow::Result<()>;

    /// Remove every entry of the given channels, returning how many were removed.
    async fn delete_by_channel(&self, channel_ids: &[i64]) -> anyhow::Result<u64>;
}

/// Retrieves the current raw entries of a syndication source.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FetchError>;
}

/// Source of "now" for refresh decisions and refresh-time updates.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Entry point of the engine. Cheap to clone.
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<dyn ChannelRegistry>,
    store: Arc<dyn EntryStore>,
    reader: Arc<dyn SourceReader>,
    clock: Arc<dyn Clock>,
    max_concurrent_fetches: usize,
}

impl Aggregator {
    pub fn new(
        registry: Arc<dyn ChannelRegistry>,
        store: Arc<dyn EntryStore>,
        reader: Arc<dyn SourceReader>,
    ) -> Self {
        Self {
            registry,
            store,
            reader,
            clock: Arc::new(SystemClock),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound on simultaneous retrievals during [`aggregate`](Self::aggregate).
    /// Clamped to at least 1.
    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    /// Fetch a channel's source and tag the results with the channel id.
    ///
    /// Raw items without a link cannot be deduplicated and are dropped.
    async fn retrieve(&self, channel: &Channel) -> Result<Vec<Entry>, EngineError> {
        let raw = self
            .reader
            .fetch(&channel.url)
            .await
            .map_err(|source| EngineError::InvalidSource {
                url: channel.url.clone(),
                source,
            })?;

        let total = raw.len();
        let entries: Vec<Entry> = raw
            .into_iter()
            .filter_map(|r| Entry::from_raw(r, channel.id))
            .collect();

        if entries.len() < total {
            tracing::warn!(
                channel_id = channel.id,
                url = %channel.url,
                skipped = total - entries.len(),
                "Entries without a link skipped"
            );
        }

        Ok(entries)
    }
}

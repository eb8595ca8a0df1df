use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Channel, ContentBlock, Entry, EntryLink};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database
    #[error("The database is locked by another process. Please wait for it to finish and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored entry's JSON columns could not be decoded
    #[error("Stored entry {id} is corrupt: {source}")]
    Corrupt {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// A channel to subscribe to.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub url: String,
    pub ttl: Option<u32>,
}

/// Changes to a subscribed channel. The URL cannot be changed.
///
/// A blank or missing `name` keeps the current name; `ttl` always replaces the
/// current value, so `None` removes the TTL.
#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub ttl: Option<u32>,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for channel queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ChannelRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub ttl: Option<i64>,
    pub last_refresh: Option<i64>,
    pub created: i64,
    pub updated: i64,
}

impl ChannelRow {
    pub(crate) fn into_channel(self) -> Channel {
        Channel {
            id: self.id,
            name: self.name,
            url: self.url,
            // Out-of-range values behave like a missing TTL: always stale.
            ttl: self.ttl.and_then(|t| u32::try_from(t).ok()),
            last_refresh: self.last_refresh.map(from_timestamp_millis),
            created: from_timestamp_millis(self.created),
            updated: from_timestamp_millis(self.updated),
        }
    }
}

/// Internal row type for entry queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub id: i64,
    pub channel_id: i64,
    pub link: String,
    pub publication_date: Option<i64>,
    pub title: Option<String>,
    pub contents: String,
    pub authors: String,
}

impl EntryRow {
    pub(crate) fn into_entry(self) -> Result<Entry, DatabaseError> {
        let id = self.id;
        let contents: Vec<ContentBlock> = serde_json::from_str(&self.contents)
            .map_err(|source| DatabaseError::Corrupt { id, source })?;
        let authors: Vec<String> = serde_json::from_str(&self.authors)
            .map_err(|source| DatabaseError::Corrupt { id, source })?;

        Ok(Entry {
            id: Some(id),
            channel_id: self.channel_id,
            link: EntryLink::new(self.link),
            publication_date: self.publication_date.map(from_timestamp_millis),
            title: self.title,
            contents,
            authors,
            fresh: false,
        })
    }
}

pub(crate) const CHANNEL_COLUMNS: &str = "id, name, url, ttl, last_refresh, created, updated";

pub(crate) const ENTRY_COLUMNS: &str =
    "id, channel_id, link, publication_date, title, contents, authors";

/// Unix milliseconds to UTC; unrepresentable values fall back to the epoch.
pub(crate) fn from_timestamp_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

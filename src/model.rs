//! Channel and entry types shared by the engine and its collaborators.
//!
//! An [`Entry`] has two identities: the store-assigned `id` and the business
//! identity [`EntryLink`]. Only the link takes part in deduplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

// ============================================================================
// Channel
// ============================================================================

/// A subscribed syndication source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Freshness window in seconds. `None` means the channel is always stale.
    pub ttl: Option<u32>,
    /// `None` until the channel has been refreshed once.
    pub last_refresh: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

// ============================================================================
// Entry identity
// ============================================================================

/// Canonical link of an entry, the key used for equality and dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryLink(String);

impl EntryLink {
    pub fn new(link: impl Into<String>) -> Self {
        Self(link.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntryLink {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntryLink {
    fn from(link: &str) -> Self {
        Self(link.to_string())
    }
}

// ============================================================================
// Entry
// ============================================================================

/// One block of entry content, e.g. an HTML description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Media type as declared by the source (`text/html`, `text/plain`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub value: String,
}

impl ContentBlock {
    pub fn new(content_type: Option<&str>, value: impl Into<String>) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            value: value.into(),
        }
    }
}

/// An item retrieved from a channel.
///
/// `fresh` is only ever set on the in-memory value handed back to callers and is
/// never written to the store.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// Store key; `None` for entries created during the current operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub channel_id: i64,
    pub link: EntryLink,
    pub publication_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub contents: Vec<ContentBlock>,
    pub authors: Vec<String>,
    pub fresh: bool,
}

impl Entry {
    /// Build an entry from a raw source item, tagged with its channel.
    ///
    /// Returns `None` when the item carries no link, since it then has no identity.
    pub fn from_raw(raw: RawEntry, channel_id: i64) -> Option<Self> {
        let link = raw
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())?;

        let mut contents = Vec::with_capacity(raw.contents.len() + 1);
        contents.extend(raw.description);
        contents.extend(raw.contents);

        let mut authors = raw.authors;
        authors.extend(raw.contributors);

        Some(Self {
            id: None,
            channel_id,
            link: EntryLink::new(link),
            publication_date: raw.published.or(raw.updated),
            title: raw.title,
            contents,
            authors,
            fresh: false,
        })
    }
}

/// An item exactly as the source reader produced it, before tagging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<ContentBlock>,
    pub contents: Vec<ContentBlock>,
    pub authors: Vec<String>,
    pub contributors: Vec<String>,
}

//! In-memory collaborators for engine unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Aggregator, ChannelRegistry, Clock, EntryStore, SourceReader};
use crate::feed::FetchError;
use crate::model::{Channel, Entry, EntryLink, RawEntry};

pub(crate) fn entry(channel_id: i64, link: &str) -> Entry {
    Entry {
        id: None,
        channel_id,
        link: EntryLink::from(link),
        publication_date: None,
        title: None,
        contents: Vec::new(),
        authors: Vec::new(),
        fresh: false,
    }
}

pub(crate) fn raw(link: &str) -> RawEntry {
    RawEntry {
        link: Some(link.to_string()),
        title: Some(format!("Item {link}")),
        ..RawEntry::default()
    }
}

pub(crate) struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
pub(crate) struct FakeRegistry {
    channels: Mutex<Vec<Channel>>,
}

impl FakeRegistry {
    pub(crate) fn add(
        &self,
        url: &str,
        ttl: Option<u32>,
        last_refresh: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut channels = self.channels.lock().unwrap();
        let id = channels.len() as i64 + 1;
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        channels.push(Channel {
            id,
            name: format!("Channel {id}"),
            url: url.to_string(),
            ttl,
            last_refresh,
            created,
            updated: created,
        });
        id
    }

    pub(crate) fn last_refresh(&self, id: i64) -> Option<DateTime<Utc>> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.last_refresh)
    }
}

#[async_trait]
impl ChannelRegistry for FakeRegistry {
    async fn get(&self, id: i64) -> anyhow::Result<Option<Channel>> {
        let channels = self.channels.lock().unwrap();
        Ok(channels.iter().find(|c| c.id == id).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<Channel>> {
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn set_last_refresh(&self, id: i64, when: DateTime<Utc>) -> anyhow::Result<()> {
        let mut channels = self.channels.lock().unwrap();
        if let Some(c) = channels.iter_mut().find(|c| c.id == id) {
            c.last_refresh = Some(when);
        }
        Ok(())
    }
}

// ============================================================================
// Entry store
// ============================================================================

#[derive(Default)]
pub(crate) struct FakeStore {
    entries: Mutex<Vec<Entry>>,
    saved: Mutex<Vec<Vec<Entry>>>,
    finds: AtomicUsize,
}

impl FakeStore {
    pub(crate) fn seed<const N: usize>(&self, entries: [Entry; N]) {
        let mut stored = self.entries.lock().unwrap();
        for (i, mut e) in entries.into_iter().enumerate() {
            e.id = Some(1000 + i as i64);
            stored.push(e);
        }
    }

    pub(crate) fn find_calls(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub(crate) fn save_calls(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub(crate) fn last_batch_len(&self) -> Option<usize> {
        self.saved.lock().unwrap().last().map(Vec::len)
    }

    /// Links of every entry passed to `save_all`, sorted.
    pub(crate) fn saved_links(&self) -> Vec<String> {
        let mut links: Vec<String> = self
            .saved
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|e| e.link.to_string())
            .collect();
        links.sort();
        links
    }

    pub(crate) fn stored_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl EntryStore for FakeStore {
    async fn find_by_channel(&self, channel_ids: &[i64]) -> anyhow::Result<Vec<Entry>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| channel_ids.contains(&e.channel_id))
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> anyhow::Result<Vec<Entry>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn save_all(&self, entries: &[Entry]) -> anyhow::Result<()> {
        assert!(
            entries.iter().all(|e| !e.fresh),
            "fresh flag must not be persisted"
        );
        self.saved.lock().unwrap().push(entries.to_vec());

        let mut stored = self.entries.lock().unwrap();
        for e in entries {
            let exists = stored
                .iter()
                .any(|s| s.channel_id == e.channel_id && s.link == e.link);
            if !exists {
                let mut e = e.clone();
                e.id = Some(stored.len() as i64 + 1);
                stored.push(e);
            }
        }
        Ok(())
    }

    async fn delete_by_channel(&self, channel_ids: &[i64]) -> anyhow::Result<u64> {
        let mut stored = self.entries.lock().unwrap();
        let before = stored.len();
        stored.retain(|e| !channel_ids.contains(&e.channel_id));
        Ok((before - stored.len()) as u64)
    }
}

// ============================================================================
// Source reader
// ============================================================================

#[derive(Default)]
pub(crate) struct FakeReader {
    sources: Mutex<HashMap<String, Option<Vec<RawEntry>>>>,
    delays: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<String>>,
}

impl FakeReader {
    pub(crate) fn serve<const N: usize>(&self, url: &str, entries: [RawEntry; N]) {
        self.sources
            .lock()
            .unwrap()
            .insert(url.to_string(), Some(entries.to_vec()));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.sources.lock().unwrap().insert(url.to_string(), None);
    }

    /// Make fetches of `url` yield `turns` extra times before answering.
    pub(crate) fn delay(&self, url: &str, turns: usize) {
        self.delays.lock().unwrap().insert(url.to_string(), turns);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl SourceReader for FakeReader {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        // Let sibling tasks interleave like real I/O would.
        let turns = self.delays.lock().unwrap().get(url).copied();
        for _ in 0..=turns.unwrap_or(0) {
            tokio::task::yield_now().await;
        }

        match self.sources.lock().unwrap().get(url) {
            Some(Some(entries)) => Ok(entries.clone()),
            Some(None) => Err(FetchError::Parse("not a feed".to_string())),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

pub(crate) struct Harness {
    pub registry: Arc<FakeRegistry>,
    pub store: Arc<FakeStore>,
    pub reader: Arc<FakeReader>,
    now: DateTime<Utc>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::default(),
            store: Arc::default(),
            reader: Arc::default(),
            now: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub(crate) fn aggregator(&self) -> Aggregator {
        Aggregator::new(
            self.registry.clone(),
            self.store.clone(),
            self.reader.clone(),
        )
        .with_clock(Arc::new(FixedClock(self.now)))
    }
}

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use super::{is_stale, Aggregator, EngineError, EntrySet};
use crate::model::{Channel, Entry};

impl Aggregator {
    /// Refresh every eligible channel concurrently and return the whole entry set.
    ///
    /// The store is read once up front and written once at the end. A channel is
    /// eligible when `force_refresh` is set or its TTL has expired.
    ///
    /// Unlike [`refresh`](Self::refresh), each channel's refresh time is written
    /// when its task starts, before the fetch completes. A failed fetch therefore
    /// still counts as a refresh.
    ///
    /// All tasks are drained before results are inspected. If any task failed the
    /// first error is returned and nothing is merged or persisted.
    pub async fn aggregate(&self, force_refresh: bool) -> Result<EntrySet, EngineError> {
        let baseline: EntrySet = self.store.find_all().await?.into_iter().collect();

        let now = self.clock.now();
        let eligible: Vec<Channel> = self
            .registry
            .list()
            .await?
            .into_iter()
            .filter(|c| force_refresh || is_stale(c.ttl, c.last_refresh, now))
            .collect();

        tracing::info!(
            channels = eligible.len(),
            existing = baseline.len(),
            force_refresh,
            "Aggregating channels"
        );

        let results: Vec<_> = stream::iter(eligible.into_iter().enumerate())
            .map(|(position, channel)| async move {
                (position, self.refresh_detached(&channel, now).await)
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .collect()
            .await;

        let failures = results.iter().filter(|(_, r)| r.is_err()).count();
        if failures > 0 {
            tracing::warn!(failures, "Aggregation aborted, discarding retrieved entries");
        }

        let mut retrieved = Vec::with_capacity(results.len());
        for (position, result) in results {
            retrieved.push((position, result?));
        }

        // Registry order, not completion order, decides which channel keeps a
        // link that several channels return.
        retrieved.sort_by_key(|(position, _)| *position);
        let candidates: EntrySet = retrieved
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect();

        self.merge(baseline, candidates).await
    }

    /// Dedup `candidates` against `baseline`, persist the delta in one batch and
    /// return `baseline ∪ delta` with the delta flagged fresh.
    pub async fn merge(
        &self,
        baseline: EntrySet,
        candidates: EntrySet,
    ) -> Result<EntrySet, EngineError> {
        let mut delta = candidates.difference(&baseline);

        let batch: Vec<Entry> = delta.iter().cloned().collect();
        self.store.save_all(&batch).await?;

        tracing::info!(
            existing = baseline.len(),
            new = delta.len(),
            "Persisted new entries"
        );

        delta.mark_fresh();

        let mut merged = baseline;
        merged.extend(delta);
        Ok(merged)
    }

    async fn refresh_detached(
        &self,
        channel: &Channel,
        now: DateTime<Utc>,
    ) -> Result<Vec<Entry>, EngineError> {
        self.registry.set_last_refresh(channel.id, now).await?;

        let entries = self.retrieve(channel).await;
        match &entries {
            Ok(entries) => tracing::debug!(
                channel_id = channel.id,
                retrieved = entries.len(),
                "Fetched channel"
            ),
            Err(e) => tracing::warn!(channel_id = channel.id, error = %e, "Channel fetch failed"),
        }
        entries
    }
}

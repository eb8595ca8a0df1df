use super::{is_stale, Aggregator, EngineError, EntrySet};

impl Aggregator {
    /// Refresh a single channel and return all of its entries.
    ///
    /// Stored entries are returned unchanged unless `force_refresh` is set or the
    /// channel's TTL has expired. Otherwise the source is fetched, the channel's
    /// refresh time is updated, and entries whose link is not yet stored for this
    /// channel are persisted and returned with `fresh = true`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ChannelNotFound`] - no channel with this id
    /// - [`EngineError::InvalidSource`] - the fetch failed; nothing is written
    /// - [`EngineError::Store`] - registry or store failure
    pub async fn refresh(
        &self,
        channel_id: i64,
        force_refresh: bool,
    ) -> Result<EntrySet, EngineError> {
        let channel = self
            .registry
            .get(channel_id)
            .await?
            .ok_or(EngineError::ChannelNotFound(channel_id))?;

        let stored: EntrySet = self
            .store
            .find_by_channel(&[channel_id])
            .await?
            .into_iter()
            .collect();

        tracing::info!(
            channel_id,
            name = %channel.name,
            existing = stored.len(),
            "Loaded stored entries for channel"
        );

        let now = self.clock.now();
        if !force_refresh && !is_stale(channel.ttl, channel.last_refresh, now) {
            tracing::debug!(channel_id, ttl = ?channel.ttl, "Channel is fresh, skipping fetch");
            return Ok(stored);
        }

        let retrieved: EntrySet = self.retrieve(&channel).await?.into_iter().collect();

        tracing::info!(
            channel_id,
            force_refresh,
            retrieved = retrieved.len(),
            "Fetched channel"
        );

        // Only reached after a successful fetch, before the delta is known.
        self.registry.set_last_refresh(channel_id, now).await?;

        self.merge(stored, retrieved).await
    }
}

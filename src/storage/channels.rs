use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{ChannelRow, ChannelUpdate, NewChannel, CHANNEL_COLUMNS};
use crate::engine::{ChannelRegistry, EntryStore};
use crate::model::Channel;

impl Database {
    // ========================================================================
    // Subscription Management
    // ========================================================================

    /// Subscribe to a channel. Fails if the URL is already subscribed.
    pub async fn insert_channel(&self, channel: &NewChannel) -> Result<Channel> {
        let now = Utc::now().timestamp_millis();
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "INSERT INTO channels (name, url, ttl, created, updated) VALUES (?, ?, ?, ?, ?) RETURNING {CHANNEL_COLUMNS}"
        ))
        .bind(&channel.name)
        .bind(&channel.url)
        .bind(channel.ttl.map(i64::from))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(channel_id = row.id, url = %row.url, "Channel subscribed");
        Ok(row.into_channel())
    }

    /// Apply a [`ChannelUpdate`]. Returns `None` if the channel does not exist.
    pub async fn update_channel(&self, id: i64, update: &ChannelUpdate) -> Result<Option<Channel>> {
        let name = update
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "UPDATE channels SET name = COALESCE(?, name), ttl = ?, updated = ? WHERE id = ? RETURNING {CHANNEL_COLUMNS}"
        ))
        .bind(name)
        .bind(update.ttl.map(i64::from))
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ChannelRow::into_channel))
    }

    /// Unsubscribe from a channel and drop its stored entries.
    ///
    /// Returns the number of entries removed, or `None` if the channel does not exist.
    pub async fn delete_channel(&self, id: i64) -> Result<Option<u64>> {
        let result = sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let removed = self.delete_by_channel(&[id]).await?;
        tracing::info!(channel_id = id, entries = removed, "Channel deleted");
        Ok(Some(removed))
    }
}

#[async_trait]
impl ChannelRegistry for Database {
    async fn get(&self, id: i64) -> Result<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ChannelRow::into_channel))
    }

    async fn list(&self) -> Result<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ChannelRow::into_channel).collect())
    }

    async fn set_last_refresh(&self, id: i64, when: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE channels SET last_refresh = ? WHERE id = ?")
            .bind(when.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::debug!(channel_id = id, "Channel refresh time updated");
        Ok(())
    }
}

use anyhow::Result;
use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{EntryRow, ENTRY_COLUMNS};
use crate::engine::EntryStore;
use crate::model::Entry;

/// 6 bound columns * 50 rows stays under SQLite's 999 parameter limit.
const BATCH_SIZE: usize = 50;

impl Database {
    /// Insert entries that are not stored yet for their channel.
    ///
    /// Runs in a single transaction with `INSERT OR IGNORE`, so entries whose
    /// `(channel_id, link)` already exists are skipped and repeating a batch is
    /// a no-op. Returns the number of rows actually inserted.
    pub async fn insert_entries(&self, entries: &[Entry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted: usize = 0;

        for chunk in entries.chunks(BATCH_SIZE) {
            let mut encoded: Vec<(String, String)> = Vec::with_capacity(chunk.len());
            for entry in chunk {
                encoded.push((
                    serde_json::to_string(&entry.contents)?,
                    serde_json::to_string(&entry.authors)?,
                ));
            }

            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO entries (channel_id, link, publication_date, title, contents, authors) ",
            );

            let rows = chunk.iter().zip(encoded);
            builder.push_values(rows, |mut b, (entry, (contents, authors))| {
                b.push_bind(entry.channel_id)
                    .push_bind(entry.link.as_str().to_string())
                    .push_bind(entry.publication_date.map(|d| d.timestamp_millis()))
                    .push_bind(entry.title.clone())
                    .push_bind(contents)
                    .push_bind(authors);
            });

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    fn decode_rows(rows: Vec<EntryRow>) -> Result<Vec<Entry>> {
        rows.into_iter()
            .map(|row| row.into_entry().map_err(anyhow::Error::from))
            .collect()
    }
}

#[async_trait]
impl EntryStore for Database {
    async fn find_by_channel(&self, channel_ids: &[i64]) -> Result<Vec<Entry>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE channel_id IN ("
        ));
        let mut separated = builder.separated(", ");
        for id in channel_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let rows = builder
            .build_query_as::<EntryRow>()
            .fetch_all(&self.pool)
            .await?;

        Self::decode_rows(rows)
    }

    async fn find_all(&self) -> Result<Vec<Entry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Self::decode_rows(rows)
    }

    async fn save_all(&self, entries: &[Entry]) -> Result<()> {
        let inserted = self.insert_entries(entries).await?;
        if inserted < entries.len() {
            tracing::debug!(
                batch = entries.len(),
                inserted,
                "Entries already stored were ignored"
            );
        }
        Ok(())
    }

    async fn delete_by_channel(&self, channel_ids: &[i64]) -> Result<u64> {
        if channel_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("DELETE FROM entries WHERE channel_id IN (");
        let mut separated = builder.separated(", ");
        for id in channel_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

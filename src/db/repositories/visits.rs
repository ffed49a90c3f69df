use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::Database;

impl Database {
    pub async fn insert_visit(&self, timestamp: DateTime<Utc>) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO visits (timestamp_ms) VALUES (?1)",
                params![timestamp.timestamp_millis()],
            )
            .context("failed to insert visit")?;
            Ok(())
        })
        .await
    }

    /// Cached visit timestamps (ms) in `(after, until]`, ascending.
    pub async fn visit_timestamps_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<i64>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp_ms FROM visits
                 WHERE timestamp_ms > ?1 AND timestamp_ms <= ?2
                 ORDER BY timestamp_ms ASC",
            )?;
            let timestamps = stmt
                .query_map(
                    params![after.timestamp_millis(), until.timestamp_millis()],
                    |row| row.get(0),
                )?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(timestamps)
        })
        .await
    }

    pub async fn prune_visits_before(&self, watermark: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM visits WHERE timestamp_ms < ?1",
                    params![watermark.timestamp_millis()],
                )
                .context("failed to prune visits")?;
            Ok(removed)
        })
        .await
    }

    pub async fn count_visits(&self) -> Result<i64> {
        self.execute(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
    }

    pub async fn delete_visits(&self) -> Result<usize> {
        self.execute(|conn| Ok(conn.execute("DELETE FROM visits", [])?))
            .await
    }
}

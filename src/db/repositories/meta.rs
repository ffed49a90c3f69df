use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{helpers::parse_datetime, Database};

pub(crate) const LAST_HISTORY_PROCESSING: &str = "history.last_processing";
pub(crate) const PRESET_TREE: &str = "domains.presets";

impl Database {
    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
                .with_context(|| format!("failed to read meta key {key}"))?;
            Ok(value)
        })
        .await
    }

    pub async fn set_meta(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .with_context(|| format!("failed to write meta key {key}"))?;
            Ok(())
        })
        .await
    }

    pub async fn last_history_processing(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_meta(LAST_HISTORY_PROCESSING)
            .await?
            .map(|raw| parse_datetime(&raw, LAST_HISTORY_PROCESSING))
            .transpose()
    }

    pub async fn set_last_history_processing(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_meta(LAST_HISTORY_PROCESSING, at.to_rfc3339()).await
    }
}

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::Database;

impl Database {
    pub async fn load_domain_overrides(&self) -> Result<HashMap<String, bool>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT entity, enabled FROM domain_overrides")?;
            let overrides = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<HashMap<String, bool>, _>>()?;
            Ok(overrides)
        })
        .await
    }

    /// `None` removes the user's choice and falls back to the preset.
    pub async fn set_domain_override(&self, entity: &str, enabled: Option<bool>) -> Result<()> {
        let entity = entity.to_string();
        self.execute(move |conn| {
            match enabled {
                Some(enabled) => conn.execute(
                    "INSERT INTO domain_overrides (entity, enabled, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(entity) DO UPDATE SET
                         enabled = excluded.enabled,
                         updated_at = excluded.updated_at",
                    params![entity, enabled, Utc::now().to_rfc3339()],
                ),
                None => conn.execute(
                    "DELETE FROM domain_overrides WHERE entity = ?1",
                    params![entity],
                ),
            }
            .with_context(|| format!("failed to store domain override for {entity}"))?;
            Ok(())
        })
        .await
    }
}

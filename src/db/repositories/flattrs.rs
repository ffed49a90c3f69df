use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{from_str, to_string};
use uuid::Uuid;

use crate::db::{
    helpers::{conversion_error, parse_datetime},
    models::{FlattrRecord, FlattrRequest, FlattrType},
    Database,
};

const FLATTR_COLUMNS: &str =
    "id, entity, url, title, flattr_type, timestamps_json, created_at, updated_at";

fn row_to_flattr(row: &Row) -> Result<FlattrRecord, rusqlite::Error> {
    let flattr_type: String = row.get("flattr_type")?;
    let timestamps_json: String = row.get("timestamps_json")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(FlattrRecord {
        id: row.get("id")?,
        entity: row.get("entity")?,
        url: row.get("url")?,
        title: row.get("title")?,
        flattr_type: FlattrType::parse(&flattr_type)
            .ok_or_else(|| conversion_error(anyhow!("unknown flattr type {flattr_type}")))?,
        timestamps: from_str::<Vec<DateTime<Utc>>>(&timestamps_json)
            .map_err(|err| conversion_error(err.into()))?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(conversion_error)?,
    })
}

/// Appends one occurrence to the (url, entity) record, creating it if needed.
pub(crate) fn record_flattr(
    conn: &Connection,
    request: &FlattrRequest,
    at: DateTime<Utc>,
) -> Result<FlattrRecord> {
    let existing = conn
        .query_row(
            &format!("SELECT {FLATTR_COLUMNS} FROM flattrs WHERE url = ?1 AND entity = ?2"),
            params![request.url, request.entity],
            row_to_flattr,
        )
        .optional()
        .context("failed to look up flattr")?;

    let record = match existing {
        Some(mut record) => {
            record.timestamps.push(at);
            if request.title.is_some() {
                record.title = request.title.clone();
            }
            record.updated_at = at;
            record
        }
        None => FlattrRecord {
            id: format!("fl_{}", Uuid::new_v4()),
            entity: request.entity.clone(),
            url: request.url.clone(),
            title: request.title.clone(),
            flattr_type: request.flattr_type,
            timestamps: vec![at],
            created_at: at,
            updated_at: at,
        },
    };

    let timestamps_json =
        to_string(&record.timestamps).context("failed to serialize flattr timestamps")?;

    conn.execute(
        "INSERT INTO flattrs (id, entity, url, title, flattr_type, timestamps_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(url, entity) DO UPDATE SET
             title = excluded.title,
             timestamps_json = excluded.timestamps_json,
             updated_at = excluded.updated_at",
        params![
            record.id,
            record.entity,
            record.url,
            record.title,
            record.flattr_type.as_str(),
            timestamps_json,
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    )
    .context("failed to persist flattr")?;

    Ok(record)
}

impl Database {
    pub async fn list_flattrs(&self) -> Result<Vec<FlattrRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLATTR_COLUMNS} FROM flattrs ORDER BY updated_at DESC"
            ))?;
            let records = stmt
                .query_map([], row_to_flattr)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    pub async fn get_flattrs_for_url(&self, url: &str) -> Result<Vec<FlattrRecord>> {
        let url = url.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLATTR_COLUMNS} FROM flattrs WHERE url = ?1"
            ))?;
            let records = stmt
                .query_map(params![url], row_to_flattr)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    pub async fn delete_flattrs(&self, entity: Option<String>) -> Result<usize> {
        self.execute(move |conn| {
            let removed = match entity {
                Some(entity) => {
                    conn.execute("DELETE FROM flattrs WHERE entity = ?1", params![entity])?
                }
                None => conn.execute("DELETE FROM flattrs", [])?,
            };
            Ok(removed)
        })
        .await
    }
}

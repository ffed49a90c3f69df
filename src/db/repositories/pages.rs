use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    helpers::{conversion_error, parse_datetime},
    models::PageRecord,
    Database,
};

const PAGE_COLUMNS: &str =
    "url, entity, title, attention, manual_attention, is_audio, updated_at";

fn row_to_page(row: &Row) -> Result<PageRecord, rusqlite::Error> {
    let updated_at: String = row.get("updated_at")?;
    Ok(PageRecord {
        url: row.get("url")?,
        entity: row.get("entity")?,
        title: row.get("title")?,
        attention: row.get("attention")?,
        manual_attention: row.get("manual_attention")?,
        is_audio: row.get("is_audio")?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(conversion_error)?,
    })
}

pub(crate) fn select_page(conn: &Connection, url: &str) -> Result<Option<PageRecord>> {
    conn.query_row(
        &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE url = ?1"),
        params![url],
        row_to_page,
    )
    .optional()
    .with_context(|| format!("failed to load page {url}"))
}

pub(crate) fn upsert_page(conn: &Connection, page: &PageRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO pages (url, entity, title, attention, manual_attention, is_audio, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(url) DO UPDATE SET
             entity = excluded.entity,
             title = excluded.title,
             attention = excluded.attention,
             manual_attention = excluded.manual_attention,
             is_audio = excluded.is_audio,
             updated_at = excluded.updated_at",
        params![
            page.url,
            page.entity,
            page.title,
            page.attention,
            page.manual_attention,
            page.is_audio,
            page.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("failed to persist page {}", page.url))?;
    Ok(())
}

impl Database {
    pub async fn get_page(&self, url: &str) -> Result<Option<PageRecord>> {
        let url = url.to_string();
        self.execute(move |conn| select_page(conn, &url)).await
    }

    pub async fn list_pages(&self) -> Result<Vec<PageRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PAGE_COLUMNS} FROM pages ORDER BY updated_at DESC"
            ))?;
            let pages = stmt
                .query_map([], row_to_page)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(pages)
        })
        .await
    }

    /// Sets the sticky audio flag, creating the page row if necessary.
    pub async fn mark_page_audio(&self, url: &str, entity: &str) -> Result<()> {
        let url = url.to_string();
        let entity = entity.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut page = select_page(&tx, &url)?
                .unwrap_or_else(|| PageRecord::new(url.clone(), entity.clone(), Utc::now()));
            if !page.is_audio {
                page.is_audio = true;
                page.updated_at = Utc::now();
                upsert_page(&tx, &page)?;
            }
            tx.commit().context("failed to commit audio flag")?;
            Ok(())
        })
        .await
    }

    /// Deletes ledger rows for one entity, or all of them. Returns the row count.
    pub async fn delete_pages(&self, entity: Option<String>) -> Result<usize> {
        self.execute(move |conn| {
            let removed = match entity {
                Some(entity) => {
                    conn.execute("DELETE FROM pages WHERE entity = ?1", params![entity])?
                }
                None => conn.execute("DELETE FROM pages", [])?,
            };
            Ok(removed)
        })
        .await
    }
}

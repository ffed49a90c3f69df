use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    helpers::{conversion_error, parse_datetime, to_u32},
    models::PendingSubmission,
    Database,
};

fn row_to_submission(row: &Row) -> Result<PendingSubmission, rusqlite::Error> {
    let attempts: i64 = row.get("attempts")?;
    let created_at: String = row.get("created_at")?;
    Ok(PendingSubmission {
        id: row.get("id")?,
        url: row.get("url")?,
        attempts: to_u32(attempts, "attempts").map_err(conversion_error)?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
    })
}

pub(crate) fn enqueue_submission(conn: &Connection, url: &str, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO pending_submissions (url, attempts, created_at) VALUES (?1, 0, ?2)",
        params![url, at.to_rfc3339()],
    )
    .context("failed to enqueue submission")?;
    Ok(())
}

impl Database {
    pub async fn pending_submissions(&self, limit: usize) -> Result<Vec<PendingSubmission>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, attempts, created_at FROM pending_submissions
                 ORDER BY id ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_submission)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn count_pending_submissions(&self) -> Result<i64> {
        self.execute(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM pending_submissions", [], |row| {
                row.get(0)
            })?;
            Ok(count)
        })
        .await
    }

    pub async fn remove_submissions(&self, ids: Vec<i64>) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for id in &ids {
                tx.execute("DELETE FROM pending_submissions WHERE id = ?1", params![id])?;
            }
            tx.commit().context("failed to remove submissions")?;
            Ok(())
        })
        .await
    }

    pub async fn bump_submission_attempts(&self, ids: Vec<i64>) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for id in &ids {
                tx.execute(
                    "UPDATE pending_submissions SET attempts = attempts + 1 WHERE id = ?1",
                    params![id],
                )?;
            }
            tx.commit().context("failed to update submission attempts")?;
            Ok(())
        })
        .await
    }
}

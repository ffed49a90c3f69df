use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::browser::TabId;
use crate::db::repositories::{flattrs::record_flattr, submissions::enqueue_submission};
use crate::db::{Database, FlattrRecord, FlattrRequest};
use crate::events::{EventBus, FlattrEvent};

use super::queue::SubmissionQueue;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Stores one attribution and queues it for submission.
///
/// Runs inside the caller's transaction so a page update and the flattr it
/// triggered are committed together.
pub(crate) fn persist_flattr(
    conn: &Connection,
    request: &FlattrRequest,
    at: DateTime<Utc>,
) -> Result<FlattrRecord> {
    let record = record_flattr(conn, request, at)?;
    enqueue_submission(conn, &request.url, at)?;
    Ok(record)
}

/// Merges attributions per (url, entity), persists them and feeds the
/// outbound queue.
#[derive(Clone)]
pub struct FlattrCoordinator {
    db: Database,
    events: EventBus,
    queue: SubmissionQueue,
}

impl FlattrCoordinator {
    pub fn new(db: Database, events: EventBus, queue: SubmissionQueue) -> Self {
        Self { db, events, queue }
    }

    pub fn queue(&self) -> &SubmissionQueue {
        &self.queue
    }

    pub async fn submit(&self, request: FlattrRequest, tab_id: Option<TabId>) -> Result<FlattrRecord> {
        let record = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let record = persist_flattr(&tx, &request, Utc::now())?;
                tx.commit().context("failed to commit flattr")?;
                Ok(record)
            })
            .await?;

        self.announce(record.clone(), tab_id);
        Ok(record)
    }

    /// Publishes an attribution that is already persisted.
    pub(crate) fn announce(&self, record: FlattrRecord, tab_id: Option<TabId>) {
        log_info!(
            "Flattr {:?} for {} ({} total)",
            record.flattr_type,
            record.url,
            record.count()
        );
        let flattr_type = record.flattr_type;
        self.events.emit(FlattrEvent::FlattrAdded {
            flattr: record,
            tab_id,
            flattr_type,
        });
        self.queue.notify();
    }

    /// Forgets local attributions for `entity`. Already queued submissions
    /// are left alone.
    pub async fn remove_by_entity(&self, entity: &str) -> Result<usize> {
        let removed = self.db.delete_flattrs(Some(entity.to_string())).await?;
        self.events.emit(FlattrEvent::FlattrsRemoved {
            entity: entity.to_string(),
        });
        Ok(removed)
    }

    pub async fn reset(&self) -> Result<usize> {
        let removed = self.db.delete_flattrs(None).await?;
        self.events.emit(FlattrEvent::FlattrsReset);
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<FlattrRecord>> {
        self.db.list_flattrs().await
    }
}

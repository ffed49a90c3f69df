use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;

use crate::account::Account;
use crate::db::{Database, FlattrRecord, FlattrRequest, FlattrType};
use crate::domains::{is_multi_author, DomainResolver};
use crate::flattrs::FlattrCoordinator;
use crate::page_url::PageUrl;
use crate::settings::SettingsStore;
use crate::tabs::TabRegistry;

use super::conditions::{qualifying_entities, EntityVisit};
use super::schedule::{day_boundary_after, day_boundary_at_or_before};
use super::source::HistorySource;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// What a scheduled run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum HistoryRun {
    /// First start; the watermark was set and nothing was processed.
    Initialized { watermark: DateTime<Utc> },
    NotDue { due: DateTime<Utc> },
    /// The period was skipped because the account is inactive.
    Skipped { watermark: DateTime<Utc> },
    Processed {
        watermark: DateTime<Utc>,
        flattrs: Vec<FlattrRecord>,
    },
}

#[derive(Clone)]
pub struct HistoryEngine {
    db: Database,
    source: Arc<dyn HistorySource>,
    resolver: DomainResolver,
    coordinator: FlattrCoordinator,
    registry: TabRegistry,
    account: Account,
    settings: Arc<SettingsStore>,
}

impl HistoryEngine {
    pub fn new(
        db: Database,
        source: Arc<dyn HistorySource>,
        resolver: DomainResolver,
        coordinator: FlattrCoordinator,
        registry: TabRegistry,
        account: Account,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            db,
            source,
            resolver,
            coordinator,
            registry,
            account,
            settings,
        }
    }

    /// Caches a visit the browser just reported. Visits stamped too far
    /// from `now` are synced or replayed history and are ignored.
    pub async fn record_visit(
        &self,
        url: &str,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !self.account.is_active() {
            return Ok(false);
        }
        let page = match PageUrl::parse(url) {
            Ok(page) => page,
            Err(err) => {
                log_debug!("not caching visit to {}: {}", url, err);
                return Ok(false);
            }
        };
        if !self.resolver.classify_url(&page).is_enabled() {
            return Ok(false);
        }

        let max_deviation = self.settings.history().max_visit_deviation_secs;
        if (now - timestamp).num_seconds().abs() > max_deviation {
            log_debug!("visit to {} at {} is too far from now", url, timestamp);
            return Ok(false);
        }

        self.db.insert_visit(timestamp).await?;
        Ok(true)
    }

    /// Entities earning a visit flattr for the window `(last, until]`.
    /// Reads only, so running it twice gives the same answer.
    pub async fn collect_qualifying(
        &self,
        last: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let cached: HashSet<i64> = self
            .db
            .visit_timestamps_between(last, until)
            .await?
            .into_iter()
            .collect();

        let mut visits = Vec::new();
        for url in self.source.urls_visited_since(last).await? {
            let Ok(page) = PageUrl::parse(&url) else {
                continue;
            };
            if is_multi_author(page.entity()) || !self.resolver.classify_url(&page).is_enabled() {
                continue;
            }

            for visit in self.source.visits_for_url(&url).await? {
                if !visit.transition.is_meaningful() {
                    continue;
                }
                if visit.visit_time <= last || visit.visit_time > until {
                    continue;
                }
                if !cached.contains(&visit.visit_time.timestamp_millis()) {
                    continue;
                }
                visits.push(EntityVisit::new(page.entity(), visit.visit_time));
            }
        }

        visits.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.entity.cmp(&b.entity))
        });

        let settings = self.settings.history();
        Ok(qualifying_entities(
            &visits,
            &settings.long_condition,
            &settings.short_condition,
        ))
    }

    /// Flattrs every qualifying entity of `(last, until]` and moves the
    /// watermark to `until`.
    pub async fn process_history(
        &self,
        last: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<FlattrRecord>> {
        let entities = self.collect_qualifying(last, until).await?;
        log_info!(
            "History window {} .. {}: {} qualifying entities",
            last,
            until,
            entities.len()
        );

        let mut flattrs = Vec::with_capacity(entities.len());
        for entity in entities {
            let page = match PageUrl::for_entity(&entity) {
                Ok(page) => page,
                Err(err) => {
                    log_warn!("Skipping visit flattr for {}: {}", entity, err);
                    continue;
                }
            };
            let request = FlattrRequest {
                entity,
                url: page.as_str().to_string(),
                title: None,
                flattr_type: FlattrType::Visit,
            };
            flattrs.push(self.coordinator.submit(request, None).await?);
        }

        self.advance(until).await?;
        Ok(flattrs)
    }

    async fn advance(&self, watermark: DateTime<Utc>) -> Result<()> {
        self.db.set_last_history_processing(watermark).await?;
        self.registry.reset_attention_for_entity(None);
        let pruned = self.db.prune_visits_before(watermark).await?;
        self.source.forget_before(watermark).await;
        log_debug!("history watermark {}; pruned {} visits", watermark, pruned);
        Ok(())
    }

    /// When the next run is due, given the stored watermark.
    pub async fn next_due(&self) -> Result<Option<DateTime<Utc>>> {
        let hour = self.settings.history().day_start_hour;
        let last = self.db.last_history_processing().await?;
        Ok(last.map(|last| day_boundary_after(last, hour, &Local)))
    }

    /// Processes the last completed day if it is due.
    pub async fn run_scheduled(&self, now: DateTime<Utc>) -> Result<HistoryRun> {
        self.run_scheduled_in(now, &Local).await
    }

    pub async fn run_scheduled_in<Tz: TimeZone>(
        &self,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Result<HistoryRun> {
        let hour = self.settings.history().day_start_hour;

        let Some(last) = self.db.last_history_processing().await? else {
            self.db.set_last_history_processing(now).await?;
            log_info!("History processing starts from {}", now);
            return Ok(HistoryRun::Initialized { watermark: now });
        };

        let due = day_boundary_after(last, hour, tz);
        if now < due {
            return Ok(HistoryRun::NotDue { due });
        }
        let until = day_boundary_at_or_before(now, hour, tz);

        if !self.account.is_active() {
            log_info!("Account inactive; skipping history up to {}", until);
            self.advance(until).await?;
            return Ok(HistoryRun::Skipped { watermark: until });
        }

        let flattrs = self.process_history(last, until).await?;
        Ok(HistoryRun::Processed {
            watermark: until,
            flattrs,
        })
    }
}

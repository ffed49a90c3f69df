//! Durable per-url attention totals and the threshold check that turns them
//! into flattrs.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::account::Account;
use crate::browser::TabId;
use crate::db::repositories::pages::{select_page, upsert_page};
use crate::db::{Database, FlattrRecord, FlattrRequest, FlattrType, PageRecord};
use crate::domains::DomainResolver;
use crate::events::{EventBus, FlattrEvent};
use crate::flattrs::{coordinator::persist_flattr, FlattrCoordinator};
use crate::page_url::PageUrl;
use crate::tabs::TabRegistry;

use super::threshold::{self, ThresholdError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy)]
enum Delta {
    Seconds(f64),
    /// Whatever the page still needs to reach its next threshold.
    ToNextThreshold,
}

#[derive(Clone)]
pub struct PageLedger {
    db: Database,
    resolver: DomainResolver,
    registry: TabRegistry,
    coordinator: FlattrCoordinator,
    events: EventBus,
    account: Account,
}

impl PageLedger {
    pub fn new(
        db: Database,
        resolver: DomainResolver,
        registry: TabRegistry,
        coordinator: FlattrCoordinator,
        events: EventBus,
        account: Account,
    ) -> Self {
        Self {
            db,
            resolver,
            registry,
            coordinator,
            events,
            account,
        }
    }

    /// Adds `delta` seconds to `page` and returns the new total.
    ///
    /// `Ok(None)` means nothing was recorded because the account is inactive
    /// or the domain is not enabled.
    pub async fn add_attention(
        &self,
        tab_id: TabId,
        page: &PageUrl,
        delta: f64,
        is_manual: bool,
    ) -> Result<Option<f64>> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(ThresholdError::InvalidAttention(delta).into());
        }
        self.apply(tab_id, page, Delta::Seconds(delta), is_manual).await
    }

    /// Grants the tab's page exactly what it needs for its next flattr.
    pub async fn fast_forward(&self, tab_id: TabId) -> Result<Option<f64>> {
        let Some(session) = self.registry.get(tab_id) else {
            log_debug!("fast forward for unknown tab {}", tab_id);
            return Ok(None);
        };
        self.apply(tab_id, &session.page, Delta::ToNextThreshold, true)
            .await
    }

    async fn apply(
        &self,
        tab_id: TabId,
        page: &PageUrl,
        delta: Delta,
        is_manual: bool,
    ) -> Result<Option<f64>> {
        if !self.account.is_active() {
            return Ok(None);
        }
        let classification = self.resolver.classify_url(page);
        if !classification.is_enabled() {
            log_debug!(
                "not recording {} ({})",
                page,
                classification.combined.as_str()
            );
            return Ok(None);
        }

        let url = page.as_str().to_string();
        let entity = page.entity().to_string();
        let title = self
            .registry
            .get(tab_id)
            .filter(|session| session.url() == url)
            .and_then(|session| session.title);

        let (total, flattr) = self
            .db
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let now = Utc::now();
                let mut record = select_page(&tx, &url)?
                    .unwrap_or_else(|| PageRecord::new(url.clone(), entity.clone(), now));

                let before = record.total();
                let next = threshold::next_threshold(&record.entity, record.is_audio, before)?;
                match delta {
                    Delta::Seconds(seconds) if is_manual => record.manual_attention += seconds,
                    Delta::Seconds(seconds) => record.attention += seconds,
                    Delta::ToNextThreshold => {
                        record.manual_attention = manual_to_reach(record.attention, next);
                    }
                }
                if title.is_some() {
                    record.title = title;
                }
                record.updated_at = now;
                upsert_page(&tx, &record)?;

                // One flattr per call, however many thresholds the delta spans.
                let flattr = if record.total() >= next {
                    let flattr_type = if is_manual {
                        FlattrType::Manual
                    } else if record.is_audio {
                        FlattrType::Audio
                    } else {
                        FlattrType::Attention
                    };
                    let request = FlattrRequest {
                        entity: record.entity.clone(),
                        url: record.url.clone(),
                        title: record.title.clone(),
                        flattr_type,
                    };
                    Some(persist_flattr(&tx, &request, now)?)
                } else {
                    None
                };

                tx.commit().context("failed to commit attention")?;
                Ok((record.total(), flattr))
            })
            .await?;

        if let Some(flattr) = flattr {
            self.coordinator.announce(flattr, Some(tab_id));
        }
        self.publish(page.as_str(), total);
        Ok(Some(total))
    }

    /// Updates every tab still showing `url`. Tabs that navigated away
    /// while the write was in flight are skipped.
    fn publish(&self, url: &str, attention: f64) {
        for tab_id in self.registry.apply_attention(url, attention) {
            self.events.emit(FlattrEvent::AttentionChanged {
                tab_id,
                url: url.to_string(),
                attention,
            });
        }
    }

    pub async fn page(&self, url: &str) -> Result<Option<PageRecord>> {
        self.db.get_page(url).await
    }

    /// Re-reads the ledger for a tab whose url just changed.
    pub async fn sync_tab(&self, tab_id: TabId) -> Result<()> {
        let Some(url) = self.registry.current_url(tab_id) else {
            return Ok(());
        };
        let (attention, is_audio) = match self.db.get_page(&url).await? {
            Some(page) => (page.total(), page.is_audio),
            None => (0.0, false),
        };
        if self.registry.restore(tab_id, &url, attention, is_audio) {
            self.events.emit(FlattrEvent::AttentionChanged {
                tab_id,
                url,
                attention,
            });
        }
        Ok(())
    }

    /// Sets the sticky audio flag for `page`.
    pub async fn mark_audio(&self, page: &PageUrl) -> Result<()> {
        self.db.mark_page_audio(page.as_str(), page.entity()).await?;
        self.registry.mark_audio(page.as_str());
        Ok(())
    }

    /// Clears ledger rows for `entity`, or every row.
    pub async fn reset(&self, entity: Option<&str>) -> Result<usize> {
        let removed = self.db.delete_pages(entity.map(str::to_string)).await?;
        self.registry.reset_attention_for_entity(entity);
        log_info!(
            "Cleared {} ledger rows for {}",
            removed,
            entity.unwrap_or("all entities")
        );

        for (tab_id, session) in self.registry.get_all() {
            if entity.map_or(true, |entity| session.entity() == entity) {
                self.events.emit(FlattrEvent::AttentionChanged {
                    tab_id,
                    url: session.url().to_string(),
                    attention: 0.0,
                });
            }
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<PageRecord>> {
        self.db.list_pages().await
    }

    pub async fn flattrs_for(&self, url: &str) -> Result<Vec<FlattrRecord>> {
        self.db.get_flattrs_for_url(url).await
    }
}

/// Manual seconds that bring `attention + manual` to at least `target`.
fn manual_to_reach(attention: f64, target: f64) -> f64 {
    let mut manual = (target - attention).max(0.0);
    while attention + manual < target {
        manual = f64::from_bits(manual.to_bits() + 1);
    }
    manual
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_top_up_never_lands_below_the_target() {
        for attention in [0.0, 6.736095838, 13.672994137, 33.3, 49.999] {
            let manual = manual_to_reach(attention, 50.0);
            assert!(attention + manual >= 50.0, "{attention} + {manual}");
            assert!(attention + manual - 50.0 < 1e-9);
        }
    }
}

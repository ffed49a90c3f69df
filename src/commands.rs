//! Request/response pairs served over the extension's message channel.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attention::threshold;
use crate::browser::TabId;
use crate::db::{FlattrRecord, PageRecord};
use crate::domains::{Classification, DomainStatus, PresetTree};
use crate::history::HistoryRun;
use crate::settings::AccountSettings;
use crate::AppState;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "request", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    TabSummary { tab_id: TabId },
    GetDomainStatus { domain: String },
    /// `enabled: null` clears the user's choice.
    SetDomainStatus {
        entity: String,
        #[serde(default)]
        enabled: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    FastForward { tab_id: TabId },
    ListFlattrs,
    RemoveFlattrs { entity: String },
    Export,
    ResetAll,
    GetAccount,
    SetAccount { state: AccountSettings },
    UpdatePresets { presets: PresetTree },
    ProcessHistory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSummary {
    pub tab_id: TabId,
    pub url: String,
    pub entity: String,
    pub title: Option<String>,
    pub attention: f64,
    pub progress: f64,
    pub remaining: f64,
    pub flattrs: usize,
    pub status: DomainStatus,
    pub is_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub exported_at: DateTime<Utc>,
    pub pages: Vec<PageRecord>,
    pub flattrs: Vec<FlattrRecord>,
    pub domain_overrides: HashMap<String, bool>,
    pub last_history_processing: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "response", rename_all = "camelCase")]
pub enum Response {
    TabSummary {
        summary: Option<TabSummary>,
    },
    DomainStatus {
        domain: String,
        classification: Classification,
    },
    #[serde(rename_all = "camelCase")]
    Attention {
        tab_id: TabId,
        attention: Option<f64>,
    },
    Flattrs {
        flattrs: Vec<FlattrRecord>,
    },
    Removed {
        entity: String,
        pages: usize,
        flattrs: usize,
    },
    Export {
        document: ExportDocument,
    },
    Reset {
        pages: usize,
        flattrs: usize,
        visits: usize,
    },
    Account {
        state: AccountSettings,
    },
    PresetsUpdated,
    History {
        run: HistoryRun,
    },
    Error {
        message: String,
    },
}

impl AppState {
    /// Serves one request. Failures come back as `Response::Error`.
    pub async fn handle_request(&self, request: Request) -> Response {
        match self.dispatch_request(request).await {
            Ok(response) => response,
            Err(err) => {
                log_error!("Request failed: {err:#}");
                Response::Error {
                    message: format!("{err:#}"),
                }
            }
        }
    }

    async fn dispatch_request(&self, request: Request) -> Result<Response> {
        match request {
            Request::TabSummary { tab_id } => Ok(Response::TabSummary {
                summary: self.tab_summary(tab_id).await?,
            }),
            Request::GetDomainStatus { domain } => {
                let classification = self.resolver.classify_domain(&domain);
                Ok(Response::DomainStatus {
                    domain,
                    classification,
                })
            }
            Request::SetDomainStatus { entity, enabled } => {
                self.set_domain_status(entity, enabled).await
            }
            Request::FastForward { tab_id } => {
                // Commit what the running timer earned so far first.
                self.timers.interrupt(tab_id, false);
                self.timers.settle().await;
                let attention = self.ledger.fast_forward(tab_id).await?;
                Ok(Response::Attention { tab_id, attention })
            }
            Request::ListFlattrs => Ok(Response::Flattrs {
                flattrs: self.coordinator.list().await?,
            }),
            Request::RemoveFlattrs { entity } => self.remove_entity(entity).await,
            Request::Export => Ok(Response::Export {
                document: self.export().await?,
            }),
            Request::ResetAll => self.reset_all().await,
            Request::GetAccount => Ok(Response::Account {
                state: self.account.state(),
            }),
            Request::SetAccount { state } => {
                self.account.set_state(state)?;
                if self.account.is_active() {
                    self.coordinator.queue().notify();
                }
                Ok(Response::Account {
                    state: self.account.state(),
                })
            }
            Request::UpdatePresets { presets } => {
                self.resolver.replace_presets(presets).await?;
                Ok(Response::PresetsUpdated)
            }
            Request::ProcessHistory => Ok(Response::History {
                run: self.history.run_scheduled(Utc::now()).await?,
            }),
        }
    }

    pub async fn tab_summary(&self, tab_id: TabId) -> Result<Option<TabSummary>> {
        let Some(session) = self.registry.get(tab_id) else {
            return Ok(None);
        };
        let page = self.ledger.page(session.url()).await?;
        let (attention, is_audio) = match &page {
            Some(page) => (page.total(), page.is_audio || session.is_audio),
            None => (session.attention, session.is_audio),
        };
        let flattrs = self
            .ledger
            .flattrs_for(session.url())
            .await?
            .iter()
            .map(FlattrRecord::count)
            .sum();

        Ok(Some(TabSummary {
            tab_id,
            url: session.url().to_string(),
            entity: session.entity().to_string(),
            title: session.title.clone(),
            attention,
            progress: threshold::progress(session.entity(), is_audio, attention)?,
            remaining: threshold::remaining(session.entity(), is_audio, attention)?,
            flattrs,
            status: self.resolver.classify_url(&session.page).combined,
            is_audio,
        }))
    }

    async fn set_domain_status(&self, entity: String, enabled: Option<bool>) -> Result<Response> {
        let classification = self.resolver.set_user_status(&entity, enabled).await?;
        if enabled == Some(false) {
            self.ledger.reset(Some(entity.as_str())).await?;
            self.coordinator.remove_by_entity(&entity).await?;
        }
        Ok(Response::DomainStatus {
            domain: entity,
            classification,
        })
    }

    async fn remove_entity(&self, entity: String) -> Result<Response> {
        let pages = self.ledger.reset(Some(entity.as_str())).await?;
        let flattrs = self.coordinator.remove_by_entity(&entity).await?;
        Ok(Response::Removed {
            entity,
            pages,
            flattrs,
        })
    }

    pub async fn export(&self) -> Result<ExportDocument> {
        Ok(ExportDocument {
            exported_at: Utc::now(),
            pages: self.ledger.list().await.context("failed to export pages")?,
            flattrs: self
                .coordinator
                .list()
                .await
                .context("failed to export flattrs")?,
            domain_overrides: self.resolver.user_overrides(),
            last_history_processing: self.db.last_history_processing().await?,
        })
    }

    /// Wipes ledger, flattrs and cached visits.
    pub async fn reset_all(&self) -> Result<Response> {
        let pages = self.ledger.reset(None).await?;
        let flattrs = self.coordinator.reset().await?;
        let visits = self.db.delete_visits().await?;
        log_info!(
            "Reset all data: {} pages, {} flattrs, {} visits",
            pages,
            flattrs,
            visits
        );
        Ok(Response::Reset {
            pages,
            flattrs,
            visits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requests_with_camel_case_fields() {
        let request: Request =
            serde_json::from_str(r#"{"request":"fastForward","tabId":4}"#).unwrap();
        assert_eq!(request, Request::FastForward { tab_id: 4 });

        let request: Request = serde_json::from_str(
            r#"{"request":"setDomainStatus","entity":"example.com","enabled":null}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::SetDomainStatus {
                entity: "example.com".into(),
                enabled: None,
            }
        );

        let request: Request = serde_json::from_str(r#"{"request":"listFlattrs"}"#).unwrap();
        assert_eq!(request, Request::ListFlattrs);
    }

    #[test]
    fn errors_serialize_with_message() {
        let value = serde_json::to_value(Response::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(value["response"], "error");
        assert_eq!(value["message"], "boom");
    }
}

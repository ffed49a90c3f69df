use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::db::{repositories::meta::PRESET_TREE, Database};
use crate::events::{EventBus, FlattrEvent};
use crate::page_url::{entity_of, PageUrl};
use crate::utils::{read, write};

use super::presets::{DomainStatus, PresetTree};

/// Result of classifying a url or domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub combined: DomainStatus,
    pub preset: DomainStatus,
    pub user: Option<bool>,
}

impl Classification {
    /// Blocked beats everything, then the user's choice, then the preset.
    /// With neither a preset nor a user choice the domain stays disabled.
    pub fn combine(preset: DomainStatus, user: Option<bool>) -> Self {
        let combined = match (preset, user) {
            (DomainStatus::Blocked, _) => DomainStatus::Blocked,
            (_, Some(true)) => DomainStatus::Enabled,
            (_, Some(false)) => DomainStatus::Disabled,
            (DomainStatus::Undefined, None) => DomainStatus::Disabled,
            (preset, None) => preset,
        };
        Self {
            combined,
            preset,
            user,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.combined == DomainStatus::Enabled
    }
}

/// Synchronous domain classification backed by the preset tree and the
/// durable user-override map (cached in memory).
#[derive(Clone)]
pub struct DomainResolver {
    presets: Arc<RwLock<PresetTree>>,
    overrides: Arc<RwLock<HashMap<String, bool>>>,
    db: Database,
    events: EventBus,
}

impl DomainResolver {
    pub fn new(presets: PresetTree, db: Database, events: EventBus) -> Self {
        Self {
            presets: Arc::new(RwLock::new(presets)),
            overrides: Arc::new(RwLock::new(HashMap::new())),
            db,
            events,
        }
    }

    /// Loads the user overrides and any stored preset update.
    pub async fn load(&self) -> Result<()> {
        let overrides = self.db.load_domain_overrides().await?;
        info!("Loaded {} domain overrides", overrides.len());
        *write(&self.overrides) = overrides;

        if let Some(stored) = self.db.get_meta(PRESET_TREE).await? {
            match PresetTree::from_json(&stored) {
                Ok(tree) => *write(&self.presets) = tree,
                Err(err) => warn!("Ignoring stored preset tree: {err:#}"),
            }
        }
        Ok(())
    }

    pub fn classify_url(&self, page: &PageUrl) -> Classification {
        let preset = read(&self.presets).resolve(page.host(), page.path());
        Classification::combine(preset, self.user_status(page.host(), page.entity()))
    }

    /// Classifies a bare domain (no path information).
    pub fn classify_domain(&self, domain: &str) -> Classification {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        let preset = read(&self.presets).resolve(&domain, "");
        let entity = entity_of(&domain).unwrap_or_else(|_| domain.clone());
        Classification::combine(preset, self.user_status(&domain, &entity))
    }

    fn user_status(&self, host: &str, entity: &str) -> Option<bool> {
        let overrides = read(&self.overrides);
        overrides
            .get(host)
            .or_else(|| overrides.get(entity))
            .copied()
    }

    /// Persists the user's choice for `entity` and announces the new status.
    pub async fn set_user_status(&self, entity: &str, enabled: Option<bool>) -> Result<Classification> {
        self.db.set_domain_override(entity, enabled).await?;
        {
            let mut overrides = write(&self.overrides);
            match enabled {
                Some(enabled) => overrides.insert(entity.to_string(), enabled),
                None => overrides.remove(entity),
            };
        }

        let classification = self.classify_domain(entity);
        info!(
            "Domain {entity} user status {:?}, combined {}",
            enabled,
            classification.combined.as_str()
        );
        self.events.emit(FlattrEvent::StatusChanged {
            entity: entity.to_string(),
            status: classification.combined,
        });
        Ok(classification)
    }

    pub fn user_overrides(&self) -> HashMap<String, bool> {
        read(&self.overrides).clone()
    }

    /// Swaps in an updated preset tree and stores it for the next start.
    pub async fn replace_presets(&self, tree: PresetTree) -> Result<()> {
        let serialized = serde_json::to_string(&tree).context("failed to serialize presets")?;
        self.db.set_meta(PRESET_TREE, serialized).await?;
        *write(&self.presets) = tree;
        info!("Preset tree replaced");
        Ok(())
    }
}

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::history::VisitCondition;
use crate::utils::{read, write};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingSettings {
    /// Length of one attention slice; a running timer never accounts for more.
    pub attention_duration_secs: u64,
    /// Continuous audio needed before a page switches to the audio schedule.
    pub audio_timeout_secs: u64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            attention_duration_secs: 15,
            audio_timeout_secs: 60,
        }
    }
}

impl TrackingSettings {
    pub fn attention_duration(&self) -> Duration {
        Duration::from_secs(self.attention_duration_secs)
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistorySettings {
    pub long_condition: VisitCondition,
    pub short_condition: VisitCondition,
    /// Browser visits further than this from "now" are treated as synced or replayed.
    pub max_visit_deviation_secs: i64,
    pub startup_delay_secs: u64,
    pub day_start_hour: u32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            long_condition: VisitCondition::LONG,
            short_condition: VisitCondition::SHORT,
            max_visit_deviation_secs: 60,
            startup_delay_secs: 60,
            day_start_hour: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubmissionSettings {
    pub debounce_secs: u64,
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            debounce_secs: 5,
            max_attempts: 3,
            base_backoff_secs: 30,
        }
    }
}

impl SubmissionSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountSettings {
    pub authenticated: bool,
    pub subscription_active: bool,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            authenticated: true,
            subscription_active: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub tracking: TrackingSettings,
    pub history: HistorySettings,
    pub submission: SubmissionSettings,
    pub account: AccountSettings,
}

/// JSON-backed settings. `path == None` keeps everything in memory.
pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings file {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn in_memory(settings: UserSettings) -> Self {
        Self {
            path: None,
            data: RwLock::new(settings),
        }
    }

    pub fn snapshot(&self) -> UserSettings {
        read(&self.data).clone()
    }

    pub fn tracking(&self) -> TrackingSettings {
        read(&self.data).tracking.clone()
    }

    pub fn history(&self) -> HistorySettings {
        read(&self.data).history.clone()
    }

    pub fn submission(&self) -> SubmissionSettings {
        read(&self.data).submission.clone()
    }

    pub fn account(&self) -> AccountSettings {
        read(&self.data).account.clone()
    }

    pub fn update_account(&self, account: AccountSettings) -> Result<()> {
        let mut guard = write(&self.data);
        guard.account = account;
        self.persist(&guard)
    }

    pub fn update(&self, settings: UserSettings) -> Result<()> {
        let mut guard = write(&self.data);
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}

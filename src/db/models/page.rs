//! Page ledger record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable attention account for one normalized url.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub url: String,
    pub entity: String,
    pub title: Option<String>,
    /// Seconds accrued by timers and audio ticks.
    pub attention: f64,
    /// Seconds granted instantly by fast-forward.
    pub manual_attention: f64,
    /// Sticky: set once the page sustained audio for the audio timeout.
    pub is_audio: bool,
    pub updated_at: DateTime<Utc>,
}

impl PageRecord {
    pub fn new(url: String, entity: String, now: DateTime<Utc>) -> Self {
        Self {
            url,
            entity,
            title: None,
            attention: 0.0,
            manual_attention: 0.0,
            is_audio: false,
            updated_at: now,
        }
    }

    pub fn total(&self) -> f64 {
        self.attention + self.manual_attention
    }
}

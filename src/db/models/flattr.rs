//! Attribution ("flattr") records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlattrType {
    Attention,
    Audio,
    Manual,
    Visit,
}

impl FlattrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlattrType::Attention => "attention",
            FlattrType::Audio => "audio",
            FlattrType::Manual => "manual",
            FlattrType::Visit => "visit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "attention" => Some(FlattrType::Attention),
            "audio" => Some(FlattrType::Audio),
            "manual" => Some(FlattrType::Manual),
            "visit" => Some(FlattrType::Visit),
            _ => None,
        }
    }
}

/// One attribution occurrence as produced by the ledger or the history engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattrRequest {
    pub entity: String,
    pub url: String,
    pub title: Option<String>,
    pub flattr_type: FlattrType,
}

/// Persisted attribution: one row per (url, entity), one timestamp per occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattrRecord {
    pub id: String,
    pub entity: String,
    pub url: String,
    pub title: Option<String>,
    pub flattr_type: FlattrType,
    pub timestamps: Vec<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlattrRecord {
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }
}

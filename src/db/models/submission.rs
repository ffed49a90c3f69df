use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribution waiting to be accepted by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    pub id: i64,
    pub url: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

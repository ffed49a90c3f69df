use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::lock;

/// How the browser says a navigation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Link,
    Typed,
    AutoBookmark,
    AutoSubframe,
    ManualSubframe,
    Generated,
    AutoToplevel,
    FormSubmit,
    Reload,
    Keyword,
    KeywordGenerated,
}

impl Transition {
    /// Frames, start pages, form posts and reloads say nothing about interest.
    pub fn is_meaningful(&self) -> bool {
        !matches!(
            self,
            Transition::AutoSubframe
                | Transition::AutoToplevel
                | Transition::FormSubmit
                | Transition::Reload
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryVisit {
    pub visit_time: DateTime<Utc>,
    pub transition: Transition,
}

/// Read access to the browser's navigation history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Urls with at least one visit after `since`.
    async fn urls_visited_since(&self, since: DateTime<Utc>) -> Result<Vec<String>>;

    async fn visits_for_url(&self, url: &str) -> Result<Vec<HistoryVisit>>;

    /// Called once everything before `before` has been processed.
    async fn forget_before(&self, _before: DateTime<Utc>) {}
}

/// History kept in memory from the visits the browser reports.
#[derive(Default)]
pub struct HistoryLog {
    entries: Mutex<Vec<(String, HistoryVisit)>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, url: impl Into<String>, visit: HistoryVisit) {
        lock(&self.entries).push((url.into(), visit));
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistorySource for HistoryLog {
    async fn urls_visited_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let mut urls: Vec<String> = lock(&self.entries)
            .iter()
            .filter(|(_, visit)| visit.visit_time > since)
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls.dedup();
        Ok(urls)
    }

    async fn visits_for_url(&self, url: &str) -> Result<Vec<HistoryVisit>> {
        Ok(lock(&self.entries)
            .iter()
            .filter(|(entry_url, _)| entry_url == url)
            .map(|(_, visit)| visit.clone())
            .collect())
    }

    async fn forget_before(&self, before: DateTime<Utc>) {
        lock(&self.entries).retain(|(_, visit)| visit.visit_time >= before);
    }
}

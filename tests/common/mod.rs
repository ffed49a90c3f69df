#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use autoflattr_lib::browser::{BrowserEvent, TabId, TabInfo, WindowId};
use autoflattr_lib::flattrs::{FlattrApi, OutboundFlattr, SubmitOutcome};
use autoflattr_lib::history::HistorySource;
use autoflattr_lib::page_url::PageUrl;
use autoflattr_lib::settings::UserSettings;
use autoflattr_lib::{AppOptions, AppState};

pub async fn start() -> AppState {
    start_with(AppOptions::default()).await
}

pub async fn start_with(options: AppOptions) -> AppState {
    AppState::start(options).await.unwrap()
}

pub async fn start_with_api(api: Arc<FakeApi>) -> AppState {
    start_with(AppOptions {
        api: Some(api as Arc<dyn FlattrApi>),
        ..AppOptions::default()
    })
    .await
}

pub async fn start_on_disk(dir: PathBuf) -> AppState {
    start_with(AppOptions {
        data_dir: Some(dir),
        ..AppOptions::default()
    })
    .await
}

pub async fn start_with_history(source: Arc<dyn HistorySource>) -> AppState {
    start_with(AppOptions {
        history: Some(source),
        ..AppOptions::default()
    })
    .await
}

pub fn settings_with_slice(secs: u64) -> UserSettings {
    let mut settings = UserSettings::default();
    settings.tracking.attention_duration_secs = secs;
    settings
}

pub fn page(url: &str) -> PageUrl {
    PageUrl::parse(url).unwrap()
}

pub fn tab(id: TabId, window_id: WindowId, url: Option<&str>, active: bool) -> TabInfo {
    TabInfo {
        id,
        window_id,
        url: url.map(str::to_string),
        active,
        ..TabInfo::default()
    }
}

pub async fn open_tab(state: &AppState, id: TabId, url: &str) {
    state
        .router
        .handle(BrowserEvent::TabCreated {
            tab: tab(id, 1, Some(url), false),
        })
        .await;
}

pub async fn attention_of(state: &AppState, url: &str) -> f64 {
    state
        .ledger
        .page(page(url).as_str())
        .await
        .unwrap()
        .map(|record| record.total())
        .unwrap_or(0.0)
}

/// Polls the outbound queue once per virtual second until `expected`
/// items are left.
pub async fn wait_for_pending(state: &AppState, expected: i64) {
    for _ in 0..600 {
        if state.db.count_pending_submissions().await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("queue never reached {expected} pending items");
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..600 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("condition never became true");
}

/// Remote API double answering from a script, `Success` once it runs dry.
#[derive(Default)]
pub struct FakeApi {
    script: Mutex<VecDeque<SubmitOutcome>>,
    batches: Mutex<Vec<Vec<OutboundFlattr>>>,
}

impl FakeApi {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(outcomes: impl IntoIterator<Item = SubmitOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn batches(&self) -> Vec<Vec<OutboundFlattr>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl FlattrApi for FakeApi {
    async fn submit(&self, batch: &[OutboundFlattr]) -> SubmitOutcome {
        self.batches.lock().unwrap().push(batch.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitOutcome::Success)
    }
}

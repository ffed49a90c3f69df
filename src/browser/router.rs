//! Turns browser events into registry updates and timer transitions.
//!
//! Every handler logs and absorbs its own errors so one bad event never
//! blocks the ones after it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;

use crate::attention::PageLedger;
use crate::audio::AudioTracker;
use crate::history::{HistoryEngine, HistoryLog, HistoryVisit};
use crate::tabs::{TabChange, TabRegistry, TabUpdate};
use crate::timer::TimerController;
use crate::utils::lock;

use super::events::{BrowserEvent, IdleState, TabId, TabInfo, WindowId};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    /// No focus event seen yet; every window counts as focused.
    Unknown,
    Window(WindowId),
    Lost,
}

#[derive(Debug)]
struct WindowState {
    focus: Focus,
    idle: bool,
    active_tabs: HashMap<WindowId, TabId>,
    tab_windows: HashMap<TabId, WindowId>,
}

impl WindowState {
    fn is_focused(&self, window_id: WindowId) -> bool {
        match self.focus {
            Focus::Unknown => true,
            Focus::Window(focused) => focused == window_id,
            Focus::Lost => false,
        }
    }
}

#[derive(Clone)]
pub struct BrowserRouter {
    registry: TabRegistry,
    timers: TimerController,
    audio: AudioTracker,
    ledger: PageLedger,
    history: HistoryEngine,
    history_log: Option<Arc<HistoryLog>>,
    windows: Arc<Mutex<WindowState>>,
}

impl BrowserRouter {
    pub fn new(
        registry: TabRegistry,
        timers: TimerController,
        audio: AudioTracker,
        ledger: PageLedger,
        history: HistoryEngine,
        history_log: Option<Arc<HistoryLog>>,
    ) -> Self {
        Self {
            registry,
            timers,
            audio,
            ledger,
            history,
            history_log,
            windows: Arc::new(Mutex::new(WindowState {
                focus: Focus::Unknown,
                idle: false,
                active_tabs: HashMap::new(),
                tab_windows: HashMap::new(),
            })),
        }
    }

    pub async fn handle(&self, event: BrowserEvent) {
        log_debug!("browser event {:?}", event);
        if let Err(err) = self.dispatch(event).await {
            log_error!("Browser event handler failed: {err:#}");
        }
    }

    async fn dispatch(&self, event: BrowserEvent) -> Result<()> {
        match event {
            BrowserEvent::TabCreated { tab } | BrowserEvent::TabUpdated { tab } => {
                self.on_tab_info(tab).await
            }
            BrowserEvent::TabRemoved { tab_id } => {
                self.on_removed(tab_id);
                Ok(())
            }
            BrowserEvent::TabActivated { tab_id, window_id } => {
                self.on_activated(tab_id, window_id);
                Ok(())
            }
            BrowserEvent::TabMoved { tab_id, window_id }
            | BrowserEvent::TabAttached { tab_id, window_id } => {
                lock(&self.windows).tab_windows.insert(tab_id, window_id);
                Ok(())
            }
            BrowserEvent::TabDetached { tab_id, window_id } => {
                let mut windows = lock(&self.windows);
                if windows.active_tabs.get(&window_id) == Some(&tab_id) {
                    windows.active_tabs.remove(&window_id);
                }
                windows.tab_windows.remove(&tab_id);
                Ok(())
            }
            BrowserEvent::ZoomChanged { tab_id } | BrowserEvent::UserActivity { tab_id } => {
                self.on_activity(tab_id);
                Ok(())
            }
            BrowserEvent::WindowFocusChanged { window_id } => {
                self.on_focus(window_id);
                Ok(())
            }
            BrowserEvent::NavigationCompleted {
                tab_id,
                url,
                status_code,
            } => self.on_navigation(tab_id, url, status_code).await,
            BrowserEvent::IdleStateChanged { state } => {
                self.on_idle(state);
                Ok(())
            }
            BrowserEvent::Visited { url, visit } => self.on_visit(url, visit).await,
        }
    }

    async fn on_tab_info(&self, tab: TabInfo) -> Result<()> {
        {
            let mut windows = lock(&self.windows);
            windows.tab_windows.insert(tab.id, tab.window_id);
            if tab.active {
                windows.active_tabs.insert(tab.window_id, tab.id);
            }
        }
        if tab.active && self.timers.selected() != Some(tab.id) && self.is_foreground(tab.id) {
            self.move_selection(tab.id);
        }

        let change = self.apply(
            tab.id,
            TabUpdate {
                url: tab.url,
                title: tab.title,
                audible: tab.audible,
                muted: tab.muted,
                ..TabUpdate::default()
            },
        );
        self.after_change(tab.id, &change).await
    }

    async fn on_navigation(&self, tab_id: TabId, url: String, status: Option<u16>) -> Result<()> {
        let change = self.apply(
            tab_id,
            TabUpdate {
                url: Some(url),
                ..TabUpdate::default()
            },
        );
        self.after_change(tab_id, &change).await?;

        let loaded = status.map_or(true, |code| (200..400).contains(&code));
        if loaded && change.current.is_some() {
            self.timers.start(tab_id, false);
        }
        Ok(())
    }

    /// Updates the registry. A new url first commits whatever the old page
    /// earned.
    fn apply(&self, tab_id: TabId, update: TabUpdate) -> TabChange {
        let change = self.registry.update(tab_id, update);
        if change.url_changed && change.previous.is_some() {
            self.timers.stop_tab(tab_id);
        }
        if let Some(err) = &change.rejected {
            log_debug!("tab {} is not trackable: {}", tab_id, err);
        }
        change
    }

    async fn after_change(&self, tab_id: TabId, change: &TabChange) -> Result<()> {
        if change.url_changed && change.current.is_some() {
            if let Err(err) = self.ledger.sync_tab(tab_id).await {
                log_error!("Failed to load ledger state for tab {}: {err:#}", tab_id);
            }
        }

        let audio_changed = match (&change.previous, &change.current) {
            (Some(previous), Some(current)) => {
                previous.is_playing_audio() != current.is_playing_audio()
            }
            (None, Some(current)) => current.is_playing_audio(),
            (Some(_), None) => true,
            (None, None) => false,
        };
        if change.url_changed || audio_changed {
            self.audio.on_state_change(tab_id)?;
        }
        Ok(())
    }

    fn on_removed(&self, tab_id: TabId) {
        self.timers.remove_tab(tab_id);
        self.audio.reset(tab_id);
        self.registry.delete(tab_id);

        let mut windows = lock(&self.windows);
        windows.tab_windows.remove(&tab_id);
        windows.active_tabs.retain(|_, active| *active != tab_id);
    }

    fn on_activated(&self, tab_id: TabId, window_id: WindowId) {
        let focused = {
            let mut windows = lock(&self.windows);
            windows.active_tabs.insert(window_id, tab_id);
            windows.tab_windows.insert(tab_id, window_id);
            windows.is_focused(window_id) && !windows.idle
        };
        if !focused {
            return;
        }

        self.move_selection(tab_id);
        self.timers.start(tab_id, false);
    }

    /// Selects `tab_id`, committing the previously selected tab's slice.
    fn move_selection(&self, tab_id: TabId) {
        if let Some(previous) = self.timers.selected() {
            if previous != tab_id {
                self.timers.stop(previous, false, false);
            }
        }
        self.timers.select(Some(tab_id));
    }

    fn on_activity(&self, tab_id: TabId) {
        if self.timers.selected() == Some(tab_id) && self.is_foreground(tab_id) {
            self.timers.start(tab_id, false);
        }
    }

    fn on_focus(&self, window_id: Option<WindowId>) {
        let active = {
            let mut windows = lock(&self.windows);
            windows.focus = match window_id {
                Some(window_id) => Focus::Window(window_id),
                None => Focus::Lost,
            };
            window_id.and_then(|window_id| windows.active_tabs.get(&window_id).copied())
        };

        self.timers.stop_foreground();
        match active {
            Some(tab_id) => {
                self.timers.select(Some(tab_id));
                if !lock(&self.windows).idle {
                    self.timers.start(tab_id, false);
                }
            }
            None => self.timers.select(None),
        }
    }

    fn on_idle(&self, state: IdleState) {
        let idle = state != IdleState::Active;
        lock(&self.windows).idle = idle;
        if idle {
            self.timers.stop_foreground();
        } else if let Some(tab_id) = self.timers.selected() {
            self.timers.start(tab_id, false);
        }
    }

    async fn on_visit(&self, url: String, visit: HistoryVisit) -> Result<()> {
        if let Some(log) = &self.history_log {
            log.record(url.clone(), visit.clone());
        }
        let accepted = self
            .history
            .record_visit(&url, visit.visit_time, Utc::now())
            .await?;
        if !accepted {
            log_debug!("visit to {} not cached", url);
        }
        Ok(())
    }

    fn is_foreground(&self, tab_id: TabId) -> bool {
        let windows = lock(&self.windows);
        if windows.idle {
            return false;
        }
        match windows.tab_windows.get(&tab_id) {
            Some(window_id) => windows.is_focused(*window_id),
            None => {
                log_warn!("tab {} has no known window", tab_id);
                !matches!(windows.focus, Focus::Lost)
            }
        }
    }

    /// Stops every timer and commits what they earned.
    pub async fn shutdown(&self) {
        self.audio.shutdown();
        self.timers.shutdown().await;
        self.audio.settle().await;
    }
}

//! Continuous-attention tracking for tabs that play sound.
//!
//! An audible, unmuted tab keeps a background attention timer alive by
//! restarting it every slice, whether or not it has focus. After a sustained
//! stretch of audio the page is flagged `is_audio` and moves to the longer
//! threshold schedule.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::attention::PageLedger;
use crate::browser::TabId;
use crate::page_url::PageUrl;
use crate::tabs::TabRegistry;
use crate::timer::{TimerController, TimerStatus};
use crate::utils::lock;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AudioTrackerError {
    #[error("tab {0} already has audio timers")]
    AlreadyTracking(TabId),
}

/// Handles owned by one audible tab. Kept off the session record.
struct AudioTimers {
    interval: CancellationToken,
    timeout: Option<CancellationToken>,
}

impl AudioTimers {
    fn cancel(&self) {
        self.interval.cancel();
        if let Some(timeout) = &self.timeout {
            timeout.cancel();
        }
    }
}

#[derive(Clone)]
pub struct AudioTracker {
    timers: Arc<Mutex<HashMap<TabId, AudioTimers>>>,
    registry: TabRegistry,
    ledger: PageLedger,
    attention: TimerController,
    audio_timeout: Duration,
    writes: TaskTracker,
}

impl AudioTracker {
    pub fn new(
        registry: TabRegistry,
        ledger: PageLedger,
        attention: TimerController,
        audio_timeout: Duration,
    ) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            registry,
            ledger,
            attention,
            audio_timeout,
            writes: TaskTracker::new(),
        }
    }

    /// Re-evaluates a tab after its audible or muted state changed.
    pub fn on_state_change(&self, tab_id: TabId) -> Result<(), AudioTrackerError> {
        self.reset(tab_id);
        match self.registry.get(tab_id) {
            Some(session) if session.is_playing_audio() => {
                self.register(tab_id, &session.page, session.is_audio)
            }
            _ => Ok(()),
        }
    }

    /// Starts tracking an audible tab. Registering a tab twice is a bug in
    /// the caller.
    pub fn register(
        &self,
        tab_id: TabId,
        page: &PageUrl,
        is_audio: bool,
    ) -> Result<(), AudioTrackerError> {
        let mut timers = lock(&self.timers);
        if timers.contains_key(&tab_id) {
            return Err(AudioTrackerError::AlreadyTracking(tab_id));
        }

        let timeout = (!is_audio).then(|| self.spawn_timeout(tab_id, page.clone()));
        let interval = self.spawn_interval(tab_id);
        timers.insert(tab_id, AudioTimers { interval, timeout });

        log_debug!("tracking audio for tab {} on {}", tab_id, page);
        Ok(())
    }

    /// Cancels both timers for the tab and commits its running slice.
    pub fn reset(&self, tab_id: TabId) {
        let removed = lock(&self.timers).remove(&tab_id);
        if let Some(timers) = removed {
            timers.cancel();
            self.attention.stop(tab_id, true, false);
            log_debug!("stopped audio tracking for tab {}", tab_id);
        }
    }

    pub fn is_tracking(&self, tab_id: TabId) -> bool {
        lock(&self.timers).contains_key(&tab_id)
    }

    pub fn tracked_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = lock(&self.timers).keys().copied().collect();
        tabs.sort_unstable();
        tabs
    }

    /// Waits for pending `is_audio` writes.
    pub async fn settle(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    pub fn shutdown(&self) {
        let drained: Vec<(TabId, AudioTimers)> = lock(&self.timers).drain().collect();
        for (tab_id, timers) in drained {
            timers.cancel();
            self.attention.stop(tab_id, true, false);
        }
    }

    /// One background slice now and a fresh one every period after that.
    fn spawn_interval(&self, tab_id: TabId) -> CancellationToken {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let attention = self.attention.clone();
        let period = attention.slice();

        attention.start(tab_id, true);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if attention.start(tab_id, true) == TimerStatus::Idle {
                            log_debug!("audio interval for tab {} found no page", tab_id);
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
        cancel
    }

    fn spawn_timeout(&self, tab_id: TabId, page: PageUrl) -> CancellationToken {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tracker = self.clone();
        let delay = self.audio_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => tracker.on_sustained_audio(tab_id, page),
                _ = token.cancelled() => {}
            }
        });
        cancel
    }

    fn on_sustained_audio(&self, tab_id: TabId, page: PageUrl) {
        if let Some(timers) = lock(&self.timers).get_mut(&tab_id) {
            timers.timeout = None;
        }
        let still_playing = matches!(
            self.registry.get(tab_id),
            Some(session) if session.page == page && session.is_playing_audio()
        );
        if !still_playing {
            return;
        }

        log_info!("Sustained audio on {}; using the audio schedule", page);
        let ledger = self.ledger.clone();
        self.writes.spawn(async move {
            if let Err(err) = ledger.mark_audio(&page).await {
                log_error!("Failed to flag {} as audio: {err:#}", page);
            }
        });
    }
}

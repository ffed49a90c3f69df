use std::sync::{Arc, Mutex};

use tokio::time::{Duration, Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::attention::PageLedger;
use crate::browser::TabId;
use crate::tabs::TabRegistry;
use crate::utils::lock;

use super::state::{ActiveTimer, Slot, TimerStatus, TimerTable};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error};

/// Per-slot attention timers.
///
/// Every transition happens synchronously under one lock; only the ledger
/// writes that commit elapsed time run in the background.
#[derive(Clone)]
pub struct TimerController {
    table: Arc<Mutex<TimerTable>>,
    registry: TabRegistry,
    ledger: PageLedger,
    slice: Duration,
    flushes: TaskTracker,
}

impl TimerController {
    pub fn new(registry: TabRegistry, ledger: PageLedger, slice: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(TimerTable::default())),
            registry,
            ledger,
            slice,
            flushes: TaskTracker::new(),
        }
    }

    pub fn slice(&self) -> Duration {
        self.slice
    }

    /// Starts a slice for `tab_id`. Whatever occupied the slot is stopped and
    /// flushed first. Foreground starts only apply to the selected tab.
    pub fn start(&self, tab_id: TabId, background: bool) -> TimerStatus {
        let slot = Slot::for_start(tab_id, background);
        let mut table = lock(&self.table);

        if let Some(previous) = table.timers.remove(&slot) {
            self.finish(previous, Instant::now());
        }

        if !background && table.selected != Some(tab_id) {
            log_debug!("ignoring foreground start for unselected tab {}", tab_id);
            return TimerStatus::Idle;
        }
        let Some(session) = self.registry.get(tab_id) else {
            return TimerStatus::Idle;
        };

        let generation = table.next_generation();
        let cancel = CancellationToken::new();
        let started_at = Instant::now();

        let controller = self.clone();
        let expiry_cancel = cancel.clone();
        let deadline = started_at + self.slice;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => controller.expire(slot, generation),
                _ = expiry_cancel.cancelled() => {}
            }
        });

        log_debug!("timer {:?} running for tab {} on {}", slot, tab_id, session.page);
        table.timers.insert(
            slot,
            ActiveTimer {
                tab_id,
                page: session.page,
                started_at,
                generation,
                cancel,
            },
        );
        TimerStatus::Running
    }

    /// Commits the elapsed time of the timer `tab_id` owns. A resumable stop
    /// keeps the timer running from now; otherwise it is removed.
    pub fn stop(&self, tab_id: TabId, background: bool, resumable: bool) -> TimerStatus {
        let mut table = lock(&self.table);
        let Some(slot) = table.slot_for_stop(tab_id, background) else {
            return TimerStatus::Idle;
        };
        let now = Instant::now();

        if resumable {
            if let Some(timer) = table.timers.get_mut(&slot) {
                self.flush(timer, now);
                timer.started_at = now;
            }
            return TimerStatus::Interrupted;
        }

        if let Some(timer) = table.timers.remove(&slot) {
            self.finish(timer, now);
        }
        TimerStatus::Stopped
    }

    pub fn interrupt(&self, tab_id: TabId, background: bool) -> TimerStatus {
        self.stop(tab_id, background, true)
    }

    /// Changes which tab counts as foreground. Starts nothing.
    pub fn select(&self, tab_id: Option<TabId>) {
        lock(&self.table).selected = tab_id;
    }

    pub fn selected(&self) -> Option<TabId> {
        lock(&self.table).selected
    }

    /// Stops the foreground timer whoever owns it (focus lost, user idle).
    pub fn stop_foreground(&self) -> TimerStatus {
        let mut table = lock(&self.table);
        match table.timers.remove(&Slot::Foreground) {
            Some(timer) => {
                self.finish(timer, Instant::now());
                TimerStatus::Stopped
            }
            None => TimerStatus::Idle,
        }
    }

    /// Stops every timer the tab owns, foreground and background.
    pub fn stop_tab(&self, tab_id: TabId) {
        let mut table = lock(&self.table);
        self.stop_owned(&mut table, tab_id);
    }

    /// Like `stop_tab`, and forgets the tab's selection.
    pub fn remove_tab(&self, tab_id: TabId) {
        let mut table = lock(&self.table);
        self.stop_owned(&mut table, tab_id);
        if table.selected == Some(tab_id) {
            table.selected = None;
        }
    }

    fn stop_owned(&self, table: &mut TimerTable, tab_id: TabId) {
        let now = Instant::now();
        while let Some(slot) = table.slot_for_stop(tab_id, false) {
            if let Some(timer) = table.timers.remove(&slot) {
                self.finish(timer, now);
            }
        }
    }

    pub fn status(&self, slot: Slot) -> TimerStatus {
        if lock(&self.table).timers.contains_key(&slot) {
            TimerStatus::Running
        } else {
            TimerStatus::Idle
        }
    }

    pub fn foreground_count(&self) -> usize {
        lock(&self.table).foreground_count()
    }

    pub fn running_slots(&self) -> Vec<(Slot, TabId)> {
        lock(&self.table)
            .timers
            .iter()
            .map(|(slot, timer)| (*slot, timer.tab_id))
            .collect()
    }

    /// Waits for every pending ledger write started by a stop or expiry.
    pub async fn settle(&self) {
        self.flushes.close();
        self.flushes.wait().await;
        self.flushes.reopen();
    }

    /// Stops everything, e.g. on shutdown.
    pub async fn shutdown(&self) {
        let timers: Vec<ActiveTimer> = {
            let mut table = lock(&self.table);
            table.selected = None;
            table.timers.drain().map(|(_, timer)| timer).collect()
        };
        let now = Instant::now();
        for timer in timers {
            self.finish(timer, now);
        }
        self.settle().await;
    }

    fn expire(&self, slot: Slot, generation: u64) {
        let mut table = lock(&self.table);
        let current = matches!(table.timers.get(&slot), Some(timer) if timer.generation == generation);
        if !current {
            return;
        }
        if let Some(timer) = table.timers.remove(&slot) {
            log_debug!("timer {:?} for tab {} -> {:?}", slot, timer.tab_id, TimerStatus::Expired);
            self.finish(timer, Instant::now());
        }
    }

    fn finish(&self, timer: ActiveTimer, now: Instant) {
        timer.cancel.cancel();
        self.flush(&timer, now);
    }

    fn flush(&self, timer: &ActiveTimer, now: Instant) {
        let elapsed = timer.elapsed(now, self.slice);
        if elapsed.is_zero() {
            return;
        }

        let ledger = self.ledger.clone();
        let page = timer.page.clone();
        let tab_id = timer.tab_id;
        self.flushes.spawn(async move {
            if let Err(err) = ledger
                .add_attention(tab_id, &page, elapsed.as_secs_f64(), false)
                .await
            {
                log_error!("Failed to record attention for {}: {err:#}", page);
            }
        });
    }
}

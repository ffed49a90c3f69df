use std::collections::HashMap;

use serde::Serialize;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::browser::TabId;
use crate::page_url::PageUrl;

/// Where a timer lives. There is a single foreground slot; background
/// timers are keyed by their tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Slot {
    Foreground,
    Tab(TabId),
}

impl Slot {
    pub fn for_start(tab_id: TabId, background: bool) -> Self {
        if background {
            Slot::Tab(tab_id)
        } else {
            Slot::Foreground
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    Idle,
    Running,
    /// The slice ran out and its time was committed.
    Expired,
    /// Elapsed time was committed; the timer keeps running.
    Interrupted,
    Stopped,
}

#[derive(Debug)]
pub(crate) struct ActiveTimer {
    pub tab_id: TabId,
    pub page: PageUrl,
    pub started_at: Instant,
    pub generation: u64,
    pub cancel: CancellationToken,
}

impl ActiveTimer {
    /// Time to commit at `now`, never more than one slice.
    pub fn elapsed(&self, now: Instant, slice: Duration) -> Duration {
        now.saturating_duration_since(self.started_at).min(slice)
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerTable {
    pub timers: HashMap<Slot, ActiveTimer>,
    pub selected: Option<TabId>,
    next_generation: u64,
}

impl TimerTable {
    pub fn next_generation(&mut self) -> u64 {
        self.next_generation = self.next_generation.wrapping_add(1);
        self.next_generation
    }

    /// Slot holding the timer a stop for `tab_id` applies to: the tab's own
    /// timer, else the foreground timer if it belongs to that tab.
    pub fn slot_for_stop(&self, tab_id: TabId, background: bool) -> Option<Slot> {
        let own = Slot::Tab(tab_id);
        if self.timers.contains_key(&own) {
            return Some(own);
        }
        if background {
            return None;
        }
        match self.timers.get(&Slot::Foreground) {
            Some(timer) if timer.tab_id == tab_id => Some(Slot::Foreground),
            _ => None,
        }
    }

    pub fn foreground_count(&self) -> usize {
        self.timers
            .keys()
            .filter(|slot| **slot == Slot::Foreground)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(tab_id: TabId) -> ActiveTimer {
        ActiveTimer {
            tab_id,
            page: PageUrl::parse("https://example.com/").unwrap(),
            started_at: Instant::now(),
            generation: 1,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn stop_prefers_tab_timer_then_owned_foreground() {
        let mut table = TimerTable::default();
        table.timers.insert(Slot::Foreground, timer(1));
        assert_eq!(table.slot_for_stop(1, false), Some(Slot::Foreground));
        assert_eq!(table.slot_for_stop(1, true), None);
        assert_eq!(table.slot_for_stop(2, false), None);

        table.timers.insert(Slot::Tab(1), timer(1));
        assert_eq!(table.slot_for_stop(1, false), Some(Slot::Tab(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_clipped_to_the_slice() {
        let active = timer(1);
        let slice = Duration::from_secs(15);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(active.elapsed(Instant::now(), slice), Duration::from_secs(4));
        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(active.elapsed(Instant::now(), slice), slice);
    }
}

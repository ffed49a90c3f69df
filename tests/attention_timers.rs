mod common;

use std::time::Duration;

use autoflattr_lib::browser::{BrowserEvent, IdleState};
use autoflattr_lib::timer::Slot;
use autoflattr_lib::AppOptions;

use common::*;

const PAGE: &str = "https://example.com/article";

#[tokio::test(start_paused = true)]
async fn loaded_page_earns_one_slice_then_stops() {
    let state = start_with(AppOptions {
        settings: settings_with_slice(15),
        ..AppOptions::default()
    })
    .await;
    let router = &state.router;

    // t = 0: created without a url
    router
        .handle(BrowserEvent::TabCreated {
            tab: tab(1, 1, None, false),
        })
        .await;

    tokio::time::advance(Duration::from_secs(5)).await;
    router
        .handle(BrowserEvent::TabActivated {
            tab_id: 1,
            window_id: 1,
        })
        .await;
    assert_eq!(state.timers.selected(), Some(1));
    assert_eq!(state.timers.foreground_count(), 0);

    tokio::time::advance(Duration::from_secs(4)).await;
    router
        .handle(BrowserEvent::TabUpdated {
            tab: tab(1, 1, Some(PAGE), true),
        })
        .await;
    assert_eq!(state.timers.foreground_count(), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    router
        .handle(BrowserEvent::NavigationCompleted {
            tab_id: 1,
            url: PAGE.into(),
            status_code: Some(200),
        })
        .await;
    assert_eq!(state.timers.running_slots(), vec![(Slot::Foreground, 1)]);

    tokio::time::advance(Duration::from_secs(190)).await;
    router.handle(BrowserEvent::TabRemoved { tab_id: 1 }).await;
    state.settle().await;

    assert_eq!(attention_of(&state, PAGE).await, 15.0);
    assert!(state.registry.get(1).is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_navigation_starts_nothing() {
    let state = start().await;
    state
        .router
        .handle(BrowserEvent::TabActivated {
            tab_id: 1,
            window_id: 1,
        })
        .await;
    state
        .router
        .handle(BrowserEvent::NavigationCompleted {
            tab_id: 1,
            url: PAGE.into(),
            status_code: Some(404),
        })
        .await;
    assert_eq!(state.timers.foreground_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn switching_tabs_keeps_a_single_foreground_timer() {
    let state = start().await;
    open_tab(&state, 1, "https://example.com/one").await;
    open_tab(&state, 2, "https://example.org/two").await;

    state
        .router
        .handle(BrowserEvent::TabActivated {
            tab_id: 1,
            window_id: 1,
        })
        .await;
    tokio::time::advance(Duration::from_secs(4)).await;
    state
        .router
        .handle(BrowserEvent::TabActivated {
            tab_id: 2,
            window_id: 1,
        })
        .await;

    assert_eq!(state.timers.foreground_count(), 1);
    assert_eq!(state.timers.running_slots(), vec![(Slot::Foreground, 2)]);

    state.settle().await;
    assert_eq!(attention_of(&state, "https://example.com/one").await, 4.0);
}

#[tokio::test(start_paused = true)]
async fn tab_update_that_moves_the_selection_commits_the_old_tab() {
    let state = start().await;
    open_tab(&state, 1, "https://example.com/one").await;
    open_tab(&state, 2, "https://example.org/two").await;

    state
        .router
        .handle(BrowserEvent::TabActivated {
            tab_id: 1,
            window_id: 1,
        })
        .await;
    tokio::time::advance(Duration::from_secs(4)).await;
    state
        .router
        .handle(BrowserEvent::TabUpdated {
            tab: tab(2, 1, Some("https://example.org/two"), true),
        })
        .await;

    assert_eq!(state.timers.selected(), Some(2));
    assert_eq!(state.timers.foreground_count(), 0);

    tokio::time::advance(Duration::from_secs(5)).await;
    state.settle().await;
    assert_eq!(attention_of(&state, "https://example.com/one").await, 4.0);
}

#[tokio::test(start_paused = true)]
async fn background_tab_events_do_not_start_foreground_timers() {
    let state = start().await;
    open_tab(&state, 1, "https://example.com/one").await;
    open_tab(&state, 2, "https://example.org/two").await;
    state.timers.select(Some(1));

    state
        .router
        .handle(BrowserEvent::UserActivity { tab_id: 2 })
        .await;
    assert_eq!(state.timers.foreground_count(), 0);

    state
        .router
        .handle(BrowserEvent::UserActivity { tab_id: 1 })
        .await;
    assert_eq!(state.timers.running_slots(), vec![(Slot::Foreground, 1)]);
}

#[tokio::test(start_paused = true)]
async fn idle_and_focus_loss_commit_the_running_slice() {
    let state = start().await;
    open_tab(&state, 1, PAGE).await;
    state
        .router
        .handle(BrowserEvent::TabActivated {
            tab_id: 1,
            window_id: 1,
        })
        .await;

    tokio::time::advance(Duration::from_secs(3)).await;
    state
        .router
        .handle(BrowserEvent::IdleStateChanged {
            state: IdleState::Idle,
        })
        .await;
    assert_eq!(state.timers.foreground_count(), 0);

    // Activity while idle does not count.
    state
        .router
        .handle(BrowserEvent::UserActivity { tab_id: 1 })
        .await;
    assert_eq!(state.timers.foreground_count(), 0);

    state
        .router
        .handle(BrowserEvent::IdleStateChanged {
            state: IdleState::Active,
        })
        .await;
    assert_eq!(state.timers.running_slots(), vec![(Slot::Foreground, 1)]);

    tokio::time::advance(Duration::from_secs(2)).await;
    state
        .router
        .handle(BrowserEvent::WindowFocusChanged { window_id: None })
        .await;
    assert_eq!(state.timers.foreground_count(), 0);
    assert_eq!(state.timers.selected(), None);

    state.settle().await;
    assert_eq!(attention_of(&state, PAGE).await, 5.0);
}

#[tokio::test(start_paused = true)]
async fn navigating_away_commits_the_old_page() {
    let state = start().await;
    open_tab(&state, 1, "https://example.com/first").await;
    state
        .router
        .handle(BrowserEvent::TabActivated {
            tab_id: 1,
            window_id: 1,
        })
        .await;

    tokio::time::advance(Duration::from_secs(6)).await;
    state
        .router
        .handle(BrowserEvent::TabUpdated {
            tab: tab(1, 1, Some("https://example.com/second"), true),
        })
        .await;
    assert_eq!(state.timers.foreground_count(), 0);

    state.settle().await;
    assert_eq!(attention_of(&state, "https://example.com/first").await, 6.0);
    assert_eq!(attention_of(&state, "https://example.com/second").await, 0.0);
    assert_eq!(
        state.registry.get(1).map(|session| session.url().to_string()),
        Some("https://example.com/second".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn interrupt_commits_and_keeps_running() {
    let state = start().await;
    open_tab(&state, 1, PAGE).await;
    state.timers.select(Some(1));
    state.timers.start(1, false);

    tokio::time::advance(Duration::from_secs(7)).await;
    state.timers.interrupt(1, false);
    assert_eq!(state.timers.running_slots(), vec![(Slot::Foreground, 1)]);

    state.timers.stop(1, false, false);
    assert_eq!(state.timers.foreground_count(), 0);

    state.settle().await;
    assert_eq!(attention_of(&state, PAGE).await, 7.0);
}

mod common;

use autoflattr_lib::commands::{Request, Response};
use autoflattr_lib::domains::{DomainStatus, PresetTree};
use autoflattr_lib::events::FlattrEvent;

use common::*;

const PAGE: &str = "https://example.com/essay";

#[tokio::test]
async fn tab_summary_reports_progress_towards_the_next_flattr() {
    let state = start().await;
    open_tab(&state, 4, PAGE).await;
    state.ledger.add_attention(4, &page(PAGE), 25.0, false).await.unwrap();

    let Response::TabSummary {
        summary: Some(summary),
    } = state.handle_request(Request::TabSummary { tab_id: 4 }).await
    else {
        panic!("expected a summary");
    };
    assert_eq!(summary.entity, "example.com");
    assert_eq!(summary.attention, 25.0);
    assert_eq!(summary.progress, 0.5);
    assert_eq!(summary.remaining, 25.0);
    assert_eq!(summary.flattrs, 0);
    assert_eq!(summary.status, DomainStatus::Enabled);

    assert_eq!(
        state.handle_request(Request::TabSummary { tab_id: 99 }).await,
        Response::TabSummary { summary: None }
    );
}

#[tokio::test]
async fn fast_forward_request_flattrs_the_tab() {
    let state = start().await;
    open_tab(&state, 4, PAGE).await;

    let response = state.handle_request(Request::FastForward { tab_id: 4 }).await;
    assert_eq!(
        response,
        Response::Attention {
            tab_id: 4,
            attention: Some(50.0),
        }
    );
    let Response::Flattrs { flattrs } = state.handle_request(Request::ListFlattrs).await else {
        panic!("expected flattrs");
    };
    assert_eq!(flattrs.len(), 1);
}

#[tokio::test]
async fn disabling_a_domain_forgets_its_attention_and_flattrs() {
    let state = start().await;
    open_tab(&state, 4, PAGE).await;
    state.handle_request(Request::FastForward { tab_id: 4 }).await;
    let mut events = state.events.subscribe();

    let response = state
        .handle_request(Request::SetDomainStatus {
            entity: "example.com".into(),
            enabled: Some(false),
        })
        .await;
    let Response::DomainStatus { classification, .. } = response else {
        panic!("expected a domain status");
    };
    assert_eq!(classification.combined, DomainStatus::Disabled);
    assert_eq!(classification.user, Some(false));

    assert!(state.ledger.list().await.unwrap().is_empty());
    assert!(state.coordinator.list().await.unwrap().is_empty());
    assert_eq!(state.registry.get(4).unwrap().attention, 0.0);

    let mut seen_removed = false;
    let mut seen_status = false;
    while let Ok(event) = events.try_recv() {
        match event {
            FlattrEvent::FlattrsRemoved { entity } => seen_removed = entity == "example.com",
            FlattrEvent::StatusChanged { status, .. } => {
                seen_status = status == DomainStatus::Disabled
            }
            _ => {}
        }
    }
    assert!(seen_removed && seen_status);

    // Clearing the override falls back to the preset.
    let response = state
        .handle_request(Request::SetDomainStatus {
            entity: "example.com".into(),
            enabled: None,
        })
        .await;
    let Response::DomainStatus { classification, .. } = response else {
        panic!("expected a domain status");
    };
    assert_eq!(classification.combined, DomainStatus::Enabled);
}

#[tokio::test]
async fn blocked_presets_ignore_user_overrides() {
    let state = start().await;
    let response = state
        .handle_request(Request::SetDomainStatus {
            entity: "flattr.com".into(),
            enabled: Some(true),
        })
        .await;
    let Response::DomainStatus { classification, .. } = response else {
        panic!("expected a domain status");
    };
    assert_eq!(classification.combined, DomainStatus::Blocked);
    assert!(!classification.is_enabled());
}

#[tokio::test]
async fn overrides_and_presets_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let state = start_on_disk(dir.path().to_path_buf()).await;
        state
            .handle_request(Request::SetDomainStatus {
                entity: "example.org".into(),
                enabled: Some(false),
            })
            .await;
        let presets = PresetTree::from_json(r#"{"*": 2, "dev": {"blocked": 3}}"#).unwrap();
        assert_eq!(
            state.handle_request(Request::UpdatePresets { presets }).await,
            Response::PresetsUpdated
        );
        state.shutdown().await;
    }

    let state = start_on_disk(dir.path().to_path_buf()).await;
    let status = |domain: &str| state.resolver.classify_domain(domain).combined;
    assert_eq!(status("example.org"), DomainStatus::Disabled);
    assert_eq!(status("www.blocked.dev"), DomainStatus::Blocked);
    assert_eq!(status("example.com"), DomainStatus::Enabled);
}

#[tokio::test]
async fn export_and_reset_cover_every_collection() {
    let state = start().await;
    open_tab(&state, 4, PAGE).await;
    state.handle_request(Request::FastForward { tab_id: 4 }).await;
    state
        .handle_request(Request::SetDomainStatus {
            entity: "example.net".into(),
            enabled: Some(true),
        })
        .await;

    let Response::Export { document } = state.handle_request(Request::Export).await else {
        panic!("expected an export");
    };
    assert_eq!(document.pages.len(), 1);
    assert_eq!(document.flattrs.len(), 1);
    assert_eq!(document.domain_overrides.get("example.net"), Some(&true));

    let json = serde_json::to_value(&document).unwrap();
    assert!(json["domainOverrides"].is_object());
    assert!(json["lastHistoryProcessing"].is_null());

    let response = state.handle_request(Request::ResetAll).await;
    assert_eq!(
        response,
        Response::Reset {
            pages: 1,
            flattrs: 1,
            visits: 0,
        }
    );
    assert!(state.ledger.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn first_history_request_only_sets_the_watermark() {
    let state = start().await;
    let Response::History { run } = state.handle_request(Request::ProcessHistory).await else {
        panic!("expected a history run");
    };
    assert!(matches!(
        run,
        autoflattr_lib::history::HistoryRun::Initialized { .. }
    ));
    assert!(state.db.last_history_processing().await.unwrap().is_some());
}

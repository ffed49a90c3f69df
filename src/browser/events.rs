use serde::{Deserialize, Serialize};

use crate::history::HistoryVisit;

pub type TabId = i64;
pub type WindowId = i64;

/// Tab state as the browser reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audible: Option<bool>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BrowserEvent {
    TabCreated {
        tab: TabInfo,
    },
    TabUpdated {
        tab: TabInfo,
    },
    #[serde(rename_all = "camelCase")]
    TabRemoved {
        tab_id: TabId,
    },
    #[serde(rename_all = "camelCase")]
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
    },
    #[serde(rename_all = "camelCase")]
    TabMoved {
        tab_id: TabId,
        window_id: WindowId,
    },
    #[serde(rename_all = "camelCase")]
    TabAttached {
        tab_id: TabId,
        window_id: WindowId,
    },
    #[serde(rename_all = "camelCase")]
    TabDetached {
        tab_id: TabId,
        window_id: WindowId,
    },
    #[serde(rename_all = "camelCase")]
    ZoomChanged {
        tab_id: TabId,
    },
    /// `None` when no browser window has focus.
    #[serde(rename_all = "camelCase")]
    WindowFocusChanged {
        window_id: Option<WindowId>,
    },
    #[serde(rename_all = "camelCase")]
    NavigationCompleted {
        tab_id: TabId,
        url: String,
        #[serde(default)]
        status_code: Option<u16>,
    },
    IdleStateChanged {
        state: IdleState,
    },
    /// Scroll, click or keypress reported by a content script.
    #[serde(rename_all = "camelCase")]
    UserActivity {
        tab_id: TabId,
    },
    Visited {
        url: String,
        visit: HistoryVisit,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_events() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"navigationCompleted","tabId":3,"url":"https://example.com/","statusCode":200}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            BrowserEvent::NavigationCompleted {
                tab_id: 3,
                url: "https://example.com/".into(),
                status_code: Some(200),
            }
        );

        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"tabUpdated","tab":{"id":1,"windowId":2,"audible":true}}"#,
        )
        .unwrap();
        let BrowserEvent::TabUpdated { tab } = event else {
            panic!("wrong variant");
        };
        assert_eq!(tab.audible, Some(true));
        assert_eq!(tab.url, None);
    }

    #[test]
    fn focus_lost_is_null_window() {
        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"windowFocusChanged","windowId":null}"#).unwrap();
        assert_eq!(event, BrowserEvent::WindowFocusChanged { window_id: None });
    }
}

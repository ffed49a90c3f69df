//! In-memory view of open tabs. No I/O happens here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::browser::TabId;
use crate::page_url::{PageUrl, UrlError};
use crate::utils::lock;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSession {
    pub page: PageUrl,
    pub title: Option<String>,
    /// Cached copy of the ledger total; the ledger stays authoritative.
    pub attention: f64,
    pub audible: bool,
    pub muted: bool,
    pub is_audio: bool,
    pub notification: Option<String>,
}

impl TabSession {
    fn new(page: PageUrl) -> Self {
        Self {
            page,
            title: None,
            attention: 0.0,
            audible: false,
            muted: false,
            is_audio: false,
            notification: None,
        }
    }

    pub fn url(&self) -> &str {
        self.page.as_str()
    }

    pub fn entity(&self) -> &str {
        self.page.entity()
    }

    pub fn is_playing_audio(&self) -> bool {
        self.audible && !self.muted
    }
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TabUpdate {
    pub url: Option<String>,
    pub title: Option<String>,
    pub audible: Option<bool>,
    pub muted: Option<bool>,
    pub is_audio: Option<bool>,
    pub attention: Option<f64>,
    pub notification: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabChange {
    pub url_changed: bool,
    pub entity_changed: bool,
    /// The tab's url could not be tracked and its session was dropped.
    pub removed: bool,
    pub rejected: Option<UrlError>,
    pub previous: Option<TabSession>,
    pub current: Option<TabSession>,
}

#[derive(Clone, Default)]
pub struct TabRegistry {
    sessions: Arc<Mutex<HashMap<TabId, TabSession>>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, tab_id: TabId, update: TabUpdate) -> TabChange {
        let mut sessions = lock(&self.sessions);
        let previous = sessions.get(&tab_id).cloned();
        let mut change = TabChange {
            previous: previous.clone(),
            ..TabChange::default()
        };

        let mut session = match (&update.url, previous) {
            (Some(raw), previous) => match PageUrl::parse(raw) {
                Ok(page) => match previous {
                    Some(existing) if existing.page == page => existing,
                    Some(existing) => {
                        change.url_changed = true;
                        change.entity_changed = existing.entity() != page.entity();
                        let mut fresh = TabSession::new(page);
                        fresh.audible = existing.audible;
                        fresh.muted = existing.muted;
                        if !change.entity_changed {
                            fresh.notification = existing.notification;
                        }
                        fresh
                    }
                    None => {
                        change.url_changed = true;
                        change.entity_changed = true;
                        TabSession::new(page)
                    }
                },
                Err(err) => {
                    change.removed = sessions.remove(&tab_id).is_some();
                    change.url_changed = change.removed;
                    change.entity_changed = change.removed;
                    change.rejected = Some(err);
                    return change;
                }
            },
            (None, Some(existing)) => existing,
            (None, None) => return change,
        };

        if let Some(title) = update.title {
            session.title = Some(title);
        }
        if let Some(audible) = update.audible {
            session.audible = audible;
        }
        if let Some(muted) = update.muted {
            session.muted = muted;
        }
        if let Some(is_audio) = update.is_audio {
            session.is_audio = is_audio;
        }
        if let Some(attention) = update.attention {
            session.attention = attention;
        }
        if let Some(notification) = update.notification {
            session.notification = notification;
        }

        change.current = Some(session.clone());
        sessions.insert(tab_id, session);
        change
    }

    pub fn get(&self, tab_id: TabId) -> Option<TabSession> {
        lock(&self.sessions).get(&tab_id).cloned()
    }

    pub fn delete(&self, tab_id: TabId) -> Option<TabSession> {
        lock(&self.sessions).remove(&tab_id)
    }

    pub fn get_all(&self) -> Vec<(TabId, TabSession)> {
        let mut all: Vec<_> = lock(&self.sessions)
            .iter()
            .map(|(id, session)| (*id, session.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn current_url(&self, tab_id: TabId) -> Option<String> {
        lock(&self.sessions)
            .get(&tab_id)
            .map(|session| session.url().to_string())
    }

    /// Stores `attention` on every tab still showing `url`; returns those tabs.
    /// Tabs that navigated away in the meantime are left alone.
    pub fn apply_attention(&self, url: &str, attention: f64) -> Vec<TabId> {
        let mut sessions = lock(&self.sessions);
        let mut updated: Vec<TabId> = sessions
            .iter_mut()
            .filter(|(_, session)| session.url() == url)
            .map(|(id, session)| {
                session.attention = attention;
                *id
            })
            .collect();
        updated.sort_unstable();
        updated
    }

    /// Copies ledger state onto the tab if it still shows `url`.
    pub fn restore(&self, tab_id: TabId, url: &str, attention: f64, is_audio: bool) -> bool {
        match lock(&self.sessions).get_mut(&tab_id) {
            Some(session) if session.url() == url => {
                session.attention = attention;
                session.is_audio = is_audio;
                true
            }
            _ => false,
        }
    }

    pub fn mark_audio(&self, url: &str) {
        for session in lock(&self.sessions).values_mut() {
            if session.url() == url {
                session.is_audio = true;
            }
        }
    }

    /// Zeroes cached attention for `entity`, or for every tab.
    pub fn reset_attention_for_entity(&self, entity: Option<&str>) {
        for session in lock(&self.sessions).values_mut() {
            if entity.map_or(true, |entity| session.entity() == entity) {
                session.attention = 0.0;
            }
        }
    }

    pub fn clear(&self) {
        lock(&self.sessions).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigate(url: &str) -> TabUpdate {
        TabUpdate {
            url: Some(url.to_string()),
            ..TabUpdate::default()
        }
    }

    #[test]
    fn first_navigation_creates_session() {
        let registry = TabRegistry::new();
        let change = registry.update(1, navigate("https://example.com/a"));
        assert!(change.url_changed);
        assert_eq!(registry.get(1).unwrap().entity(), "example.com");
    }

    #[test]
    fn url_change_replaces_session_but_keeps_tab_state() {
        let registry = TabRegistry::new();
        registry.update(1, navigate("https://example.com/a"));
        registry.update(
            1,
            TabUpdate {
                title: Some("A".into()),
                audible: Some(true),
                is_audio: Some(true),
                attention: Some(42.0),
                notification: Some(Some("n1".into())),
                ..TabUpdate::default()
            },
        );

        let change = registry.update(1, navigate("https://example.com/b"));
        assert!(change.url_changed);
        assert!(!change.entity_changed);

        let session = registry.get(1).unwrap();
        assert_eq!(session.attention, 0.0);
        assert_eq!(session.title, None);
        assert!(!session.is_audio);
        assert!(session.audible);
        assert_eq!(session.notification.as_deref(), Some("n1"));
    }

    #[test]
    fn entity_change_drops_notification() {
        let registry = TabRegistry::new();
        registry.update(1, navigate("https://example.com/a"));
        registry.update(
            1,
            TabUpdate {
                notification: Some(Some("n1".into())),
                ..TabUpdate::default()
            },
        );
        let change = registry.update(1, navigate("https://other.org/"));
        assert!(change.entity_changed);
        assert_eq!(registry.get(1).unwrap().notification, None);
    }

    #[test]
    fn same_url_is_not_a_change() {
        let registry = TabRegistry::new();
        registry.update(1, navigate("https://example.com/a#top"));
        registry.update(
            1,
            TabUpdate {
                attention: Some(10.0),
                ..TabUpdate::default()
            },
        );
        let change = registry.update(1, navigate("https://example.com/a#bottom"));
        assert!(!change.url_changed);
        assert_eq!(registry.get(1).unwrap().attention, 10.0);
    }

    #[test]
    fn untrackable_url_removes_session() {
        let registry = TabRegistry::new();
        registry.update(1, navigate("https://example.com/"));
        let change = registry.update(1, navigate("about:blank"));
        assert!(change.removed);
        assert!(change.rejected.is_some());
        assert!(registry.get(1).is_none());
    }

    #[test]
    fn state_without_url_is_ignored() {
        let registry = TabRegistry::new();
        let change = registry.update(
            7,
            TabUpdate {
                audible: Some(true),
                ..TabUpdate::default()
            },
        );
        assert_eq!(change.current, None);
        assert!(registry.get(7).is_none());
    }

    #[test]
    fn apply_attention_skips_tabs_that_moved_on() {
        let registry = TabRegistry::new();
        registry.update(1, navigate("https://example.com/a"));
        registry.update(2, navigate("https://example.com/a"));
        registry.update(3, navigate("https://example.com/b"));

        assert_eq!(registry.apply_attention("https://example.com/a", 12.0), vec![1, 2]);
        assert_eq!(registry.get(3).unwrap().attention, 0.0);

        registry.reset_attention_for_entity(Some("example.com"));
        assert_eq!(registry.get(1).unwrap().attention, 0.0);
    }
}

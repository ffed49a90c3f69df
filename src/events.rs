//! In-process event bus consumed by icon rendering and popup UI.
//!
//! Components receive a clone of the bus at construction; nothing is global.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::browser::TabId;
use crate::db::models::{FlattrRecord, FlattrType};
use crate::domains::DomainStatus;
use crate::utils::lock;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FlattrEvent {
    #[serde(rename_all = "camelCase")]
    AttentionChanged {
        tab_id: TabId,
        url: String,
        attention: f64,
    },
    #[serde(rename_all = "camelCase")]
    FlattrAdded {
        flattr: FlattrRecord,
        tab_id: Option<TabId>,
        flattr_type: FlattrType,
    },
    FlattrsRemoved {
        entity: String,
    },
    FlattrsReset,
    StatusChanged {
        entity: String,
        status: DomainStatus,
    },
}

/// Broadcast bus with an explicit lifecycle.
///
/// `reset` drops the sender, which closes every outstanding receiver.
#[derive(Clone)]
pub struct EventBus {
    tx: Arc<Mutex<broadcast::Sender<FlattrEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx: Arc::new(Mutex::new(tx)),
            capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlattrEvent> {
        lock(&self.tx).subscribe()
    }

    /// Emit to all current subscribers. Having none is fine.
    pub fn emit(&self, event: FlattrEvent) {
        let _ = lock(&self.tx).send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.tx).receiver_count()
    }

    pub fn reset(&self) {
        let (tx, _) = broadcast::channel(self.capacity);
        *lock(&self.tx) = tx;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_closes_existing_listeners() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(FlattrEvent::FlattrsReset);
        assert!(matches!(rx.recv().await, Ok(FlattrEvent::FlattrsReset)));

        bus.reset();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn serializes_with_kebab_case_tags() {
        let value = serde_json::to_value(FlattrEvent::FlattrsRemoved {
            entity: "example.com".into(),
        })
        .unwrap();
        assert_eq!(value["type"], "flattrs-removed");
        assert_eq!(value["entity"], "example.com");
    }
}

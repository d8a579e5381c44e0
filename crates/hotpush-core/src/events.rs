//! Typed LiveSync events and the process-wide event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffered capacity of the event bus channel.
const EVENT_BUS_CAPACITY: usize = 256;

/// Events emitted on the shared bus, consumed by CLI presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LiveSyncEvent {
    #[serde(rename_all = "camelCase")]
    SyncStarted {
        device_id: String,
        app_identifier: String,
    },

    /// Informational progress during a sync (e.g., archive packaging).
    #[serde(rename_all = "camelCase")]
    SyncNotification { device_id: String, message: String },

    #[serde(rename_all = "camelCase")]
    SyncExecuted {
        device_id: String,
        synced_files: Vec<String>,
        removed_files: Vec<String>,
        is_full_sync: bool,
    },

    #[serde(rename_all = "camelCase")]
    SyncError {
        device_id: String,
        stage: String,
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    SyncStopped { device_id: String },

    #[serde(rename_all = "camelCase")]
    DebuggerAttached {
        device_id: String,
        local_proxy_port: u16,
    },

    #[serde(rename_all = "camelCase")]
    DebuggerDetached { device_id: String },

    #[serde(rename_all = "camelCase")]
    ConnectionError {
        device_id: String,
        message: String,
        code: i32,
    },

    #[serde(rename_all = "camelCase")]
    UserInteractionNeeded {
        device_id: String,
        app_identifier: String,
    },
}

impl LiveSyncEvent {
    /// The device this event concerns.
    pub fn device_id(&self) -> &str {
        match self {
            LiveSyncEvent::SyncStarted { device_id, .. }
            | LiveSyncEvent::SyncNotification { device_id, .. }
            | LiveSyncEvent::SyncExecuted { device_id, .. }
            | LiveSyncEvent::SyncError { device_id, .. }
            | LiveSyncEvent::SyncStopped { device_id }
            | LiveSyncEvent::DebuggerAttached { device_id, .. }
            | LiveSyncEvent::DebuggerDetached { device_id }
            | LiveSyncEvent::ConnectionError { device_id, .. }
            | LiveSyncEvent::UserInteractionNeeded { device_id, .. } => device_id,
        }
    }
}

/// A debug-attach notification observed on the wire. Ephemeral, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub name: String,
    pub project_id: String,
    pub device_identifier: String,
    pub timestamp: DateTime<Utc>,
}

/// Process-wide publish point for [`LiveSyncEvent`]s.
///
/// Backed by a broadcast channel: every subscriber sees every event, and
/// per-device event order matches emission order. Publishing with no
/// subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LiveSyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn emit(&self, event: LiveSyncEvent) {
        tracing::debug!(device = event.device_id(), "bus event: {:?}", event);
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveSyncEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.emit(LiveSyncEvent::SyncStopped {
            device_id: "emulator-5554".to_string(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_sees_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(LiveSyncEvent::SyncStarted {
            device_id: "d1".to_string(),
            app_identifier: "org.example.app".to_string(),
        });
        bus.emit(LiveSyncEvent::SyncExecuted {
            device_id: "d1".to_string(),
            synced_files: vec!["a.js".to_string()],
            removed_files: vec![],
            is_full_sync: false,
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            LiveSyncEvent::SyncStarted { .. }
        ));
        match rx.recv().await.unwrap() {
            LiveSyncEvent::SyncExecuted { synced_files, .. } => {
                assert_eq!(synced_files, vec!["a.js".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = LiveSyncEvent::ConnectionError {
            device_id: "iphone-abc".to_string(),
            message: "connection refused".to_string(),
            code: 61,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connectionError");
        assert_eq!(json["deviceId"], "iphone-abc");
        assert_eq!(json["code"], 61);
    }

    #[test]
    fn test_device_id_accessor() {
        let event = LiveSyncEvent::DebuggerAttached {
            device_id: "iphone-abc".to_string(),
            local_proxy_port: 41000,
        };
        assert_eq!(event.device_id(), "iphone-abc");
    }
}

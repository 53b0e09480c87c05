//! Session event bus.
//!
//! Start/stop events cross the process as JSON text, exactly as they
//! appear on the wire to external publishers; the dispatcher parses them
//! back before acting. The local backend is an unbounded tokio channel;
//! the recording backend captures events for assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event bus is closed")]
    Closed,

    #[error("event could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publish refused: {0}")]
    Refused(String),
}

/// A session lifecycle event as published on the bus.
///
/// Start carries both identifiers because provisioning needs the project
/// definition; stop carries only the user since teardown works purely
/// from user-named resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Start { project_id: String, user_id: String },
    #[serde(rename_all = "camelCase")]
    Stop { user_id: String },
}

impl SessionEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::Start { user_id, .. } | Self::Stop { user_id } => user_id,
        }
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: SessionEvent) -> Result<(), BusError>;
}

/// In-process bus backed by an unbounded channel of JSON messages. The
/// receiving half goes to the dispatcher.
pub struct LocalBus {
    tx: mpsc::UnboundedSender<String>,
}

impl LocalBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, event: SessionEvent) -> Result<(), BusError> {
        let message = serde_json::to_string(&event)?;
        self.tx.send(message).map_err(|_| BusError::Closed)
    }
}

/// Test bus that records published events instead of delivering them.
#[derive(Default)]
pub struct RecordingBus {
    events: Mutex<Vec<SessionEvent>>,
    fail_publishes: AtomicUsize,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` publishes.
    pub fn fail_publishes(&self, n: usize) {
        self.fail_publishes.store(n, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn publish(&self, event: SessionEvent) -> Result<(), BusError> {
        let remaining = self.fail_publishes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_publishes.store(remaining - 1, Ordering::SeqCst);
            return Err(BusError::Refused("scripted publish failure".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_camel_case_identifiers() {
        let start = SessionEvent::Start {
            project_id: "maze-study".to_string(),
            user_id: "4f3a".to_string(),
        };
        let json = serde_json::to_value(&start).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "start", "projectId": "maze-study", "userId": "4f3a"})
        );

        let stop: SessionEvent =
            serde_json::from_str(r#"{"event":"stop","userId":"4f3a"}"#).unwrap();
        assert_eq!(
            stop,
            SessionEvent::Stop {
                user_id: "4f3a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn local_bus_delivers_json_messages() {
        let (bus, mut rx) = LocalBus::new();
        bus.publish(SessionEvent::Stop {
            user_id: "u-1".to_string(),
        })
        .await
        .unwrap();

        let raw = rx.recv().await.unwrap();
        let parsed: SessionEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.user_id(), "u-1");
    }

    #[tokio::test]
    async fn local_bus_reports_closed_channel() {
        let (bus, rx) = LocalBus::new();
        drop(rx);
        let err = bus
            .publish(SessionEvent::Stop {
                user_id: "u-1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Closed));
    }

    #[tokio::test]
    async fn recording_bus_captures_and_refuses() {
        let bus = RecordingBus::new();
        bus.fail_publishes(1);

        let err = bus
            .publish(SessionEvent::Stop {
                user_id: "u-1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Refused(_)));
        assert!(bus.published().is_empty());

        bus.publish(SessionEvent::Start {
            project_id: "p".to_string(),
            user_id: "u-1".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(bus.published().len(), 1);
    }
}

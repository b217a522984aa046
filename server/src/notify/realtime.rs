//! Real-time event hub
//!
//! Every connected socket subscribes to one broadcast channel. Envelopes are
//! addressed either to everyone or to a single user's room, and each socket
//! task drops the envelopes whose room it has not joined.

use std::{collections::HashSet, fmt, sync::Arc};

use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;

/// Buffered events per subscriber before a slow socket starts lagging
pub const DEFAULT_CAPACITY: usize = 256;

/// Names of the events pushed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventName {
    NewStatus,
    NewNotification,
    StatusLikeUpdated,
    StatusViewUpdated,
    StatusDeleted,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::NewStatus => "new_status",
            EventName::NewNotification => "new_notification",
            EventName::StatusLikeUpdated => "status_like_updated",
            EventName::StatusViewUpdated => "status_view_updated",
            EventName::StatusDeleted => "status_deleted",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who an event is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    User(i64),
}

/// An addressed event with its wire frame already serialized
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub name: EventName,
    pub frame: Arc<str>,
}

impl Envelope {
    /// Whether a socket that joined `rooms` should receive this envelope
    pub fn is_for(&self, rooms: &HashSet<i64>) -> bool {
        match self.audience {
            Audience::Everyone => true,
            Audience::User(id) => rooms.contains(&id),
        }
    }
}

#[derive(Clone)]
pub struct RealtimeHub {
    tx: broadcast::Sender<Envelope>,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions (one per connected socket)
    pub fn connected(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit_to_all<T: Serialize>(&self, name: EventName, payload: &T) {
        self.publish(Audience::Everyone, name, payload);
    }

    pub fn emit_to_user<T: Serialize>(&self, user_id: i64, name: EventName, payload: &T) {
        self.publish(Audience::User(user_id), name, payload);
    }

    fn publish<T: Serialize>(&self, audience: Audience, name: EventName, payload: &T) {
        let frame = match serde_json::to_value(payload) {
            Ok(data) => json!({ "event": name.as_str(), "data": data }).to_string(),
            Err(e) => {
                tracing::error!("Failed to serialize {} event: {}", name, e);
                return;
            }
        };

        let envelope = Envelope {
            audience,
            name,
            frame: frame.into(),
        };

        // send only fails when nobody is connected
        if self.tx.send(envelope).is_err() {
            tracing::debug!("No connected clients for {} event", name);
        }
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for RealtimeHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeHub")
            .field("connected", &self.connected())
            .finish()
    }
}

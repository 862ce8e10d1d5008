//! Best-effort real-time fan-out to connected clients.
//!
//! The hub keeps one live channel per identity. Events are hints (a
//! "reload" nudge or a freshly delivered message), and the durable truth
//! stays in the store, so a send that fails just drops the mapping and
//! moves on. Publishing never blocks and never returns an error to the
//! delivery path.
//!
//! The hub is an injected component with explicit lifecycle: built at
//! process start, shared behind an `Arc`, torn down when the process ends.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::message::Message;

/// Event pushed over a live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// Something changed for this identity; re-fetch the message list.
    Reload,
    /// A message delivered to this identity right now, in full.
    Message(Message),
}

impl Serialize for RealtimeEvent {
    /// Wire shape: `{"type": "reload"}`, or the full message payload.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Reload => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", "reload")?;
                map.end()
            }
            Self::Message(message) => message.serialize(serializer),
        }
    }
}

/// Live subscriber registry: identity to channel, last writer wins.
#[derive(Debug, Default)]
pub struct FanoutHub {
    channels: Mutex<HashMap<String, UnboundedSender<RealtimeEvent>>>,
}

impl FanoutHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A hub send is lock-free after this; the mutex only guards the map.
    /// A poisoned lock is recovered rather than propagated; losing a
    /// real-time hint must never fail a request.
    fn channels(&self) -> MutexGuard<'_, HashMap<String, UnboundedSender<RealtimeEvent>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a channel for `identity`, replacing any prior one.
    ///
    /// The previous session's sender is dropped, which closes its receiver:
    /// one live session per identity, last writer wins.
    pub fn connect(&self, identity: &str) -> UnboundedReceiver<RealtimeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.channels().insert(identity.to_string(), tx).is_some() {
            log::debug!("realtime channel replaced for {identity}");
        }
        rx
    }

    /// Removes the mapping for `identity`, if any.
    pub fn disconnect(&self, identity: &str) {
        self.channels().remove(identity);
    }

    /// Pushes `event` to `identity` if a channel is up.
    ///
    /// Best-effort: a disconnected identity is a no-op, and a stale channel
    /// (receiver gone) is silently dropped from the registry. Never blocks,
    /// never errors.
    pub fn publish(&self, identity: &str, event: RealtimeEvent) {
        let mut channels = self.channels();
        let Some(tx) = channels.get(identity) else {
            return;
        };
        if tx.send(event).is_err() {
            channels.remove(identity);
            log::debug!("dropped stale realtime channel for {identity}");
        }
    }

    /// Whether `identity` currently has a registered channel.
    #[must_use]
    pub fn is_connected(&self, identity: &str) -> bool {
        self.channels().contains_key(identity)
    }
}

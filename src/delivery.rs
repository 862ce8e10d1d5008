//! Delivery engine: state changes and their consequences.
//!
//! The engine is the only caller of the state-change transaction. It owns
//! the post-commit consequences: a reload nudge to the recipient and to
//! each sender whose message was just released, and a push hand-off for
//! offline delivery. Both are best-effort; the transaction has already
//! committed by the time they run, and nothing here can fail the request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::notify::NotificationSink;
use crate::presence::MemberState;
use crate::realtime::{FanoutHub, RealtimeEvent};
use crate::store::{StateChange, Store};

/// Turns a reported presence state into deliveries and notifications.
pub struct DeliveryEngine {
    store: Arc<Store>,
    hub: Arc<FanoutHub>,
    sink: Arc<dyn NotificationSink>,
}

impl DeliveryEngine {
    /// Wires the engine to its store and collaborators.
    pub fn new(store: Arc<Store>, hub: Arc<FanoutHub>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, hub, sink }
    }

    /// Applies a member's new presence state and releases whatever was
    /// waiting on it.
    ///
    /// The state write and the pending-to-delivered promotion commit in one
    /// transaction; only after the commit do the real-time nudges and push
    /// hand-offs run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CoreError::NotFound`] for an unknown member,
    /// or a database error; in either case nothing was committed.
    pub fn report_state(&self, member_id: &str, new_state: MemberState) -> Result<StateChange> {
        self.report_state_at(member_id, new_state, chrono::Utc::now().timestamp())
    }

    /// [`report_state`](Self::report_state) with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Same as [`report_state`](Self::report_state).
    pub fn report_state_at(
        &self,
        member_id: &str,
        new_state: MemberState,
        now: i64,
    ) -> Result<StateChange> {
        let change = self.store.change_state(member_id, new_state, now)?;

        if !change.delivered.is_empty() {
            self.fan_out(&change);
            self.hand_off_push(&change);
        }

        Ok(change)
    }

    /// Reload nudges for everyone whose view just changed: the recipient,
    /// and each distinct sender of a released message.
    fn fan_out(&self, change: &StateChange) {
        self.hub
            .publish(&change.member_id, RealtimeEvent::Reload);

        let mut notified: Vec<&str> = change
            .delivered
            .iter()
            .map(|m| m.sender_id.as_str())
            .collect();
        notified.sort_unstable();
        notified.dedup();
        for sender_id in notified {
            if sender_id != change.member_id {
                self.hub.publish(sender_id, RealtimeEvent::Reload);
            }
        }
    }

    /// Hands each released message to the push sink, when the recipient
    /// registered a push address. Lookup failures are logged and skipped:
    /// the delivery itself is already durable.
    fn hand_off_push(&self, change: &StateChange) {
        let recipient = match self.store.get_member(&change.member_id) {
            Ok(member) => member,
            Err(e) => {
                log::warn!("push skipped, recipient lookup failed: {e}");
                return;
            }
        };
        let Some(push_token) = recipient.push_token else {
            return;
        };

        let mut sender_names: HashMap<String, String> = HashMap::new();
        for message in &change.delivered {
            let name = sender_names
                .entry(message.sender_id.clone())
                .or_insert_with(|| {
                    self.store.get_member(&message.sender_id).map_or_else(
                        |e| {
                            log::warn!("sender lookup failed for push: {e}");
                            message.sender_id.clone()
                        },
                        |m| m.name,
                    )
                });
            self.sink.notify(&push_token, name, &message.body);
        }
    }
}

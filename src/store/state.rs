//! The state-change-plus-delivery transaction.
//!
//! Reporting a new presence state and releasing the messages that state
//! unlocks is one atomic step: the presence write, the trigger resolution,
//! and the bulk pending-to-delivered promotion commit together or not at
//! all. The promoted rows come back from the mutating statement itself, so
//! the returned set is exactly what this transaction delivered.

use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::message::deliver_pending_tx;
use super::Store;
use crate::error::{CoreError, Result};
use crate::message::Message;
use crate::presence::MemberState;

/// Outcome of a state change: what the state was, what it is now, and the
/// exact set of messages the transition delivered.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// The member whose state changed.
    pub member_id: String,
    /// State before the change.
    pub previous_state: MemberState,
    /// State after the change.
    pub new_state: MemberState,
    /// Messages promoted to delivered by this transition, oldest first.
    /// Empty when the state resolves to no trigger or nothing was waiting.
    pub delivered: Vec<Message>,
}

impl Store {
    /// Sets a member's presence state and delivers every pending message
    /// waiting on the trigger that state satisfies.
    ///
    /// One immediate transaction covers the whole step, so concurrent
    /// changes for the same member cannot lose updates, and a failure
    /// anywhere rolls the presence write back along with the deliveries.
    /// Resolving the same trigger again finds nothing pending and delivers
    /// nothing: a message is delivered at most once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] (before any mutation) if the member
    /// does not exist, or a database error, in which case no partial state
    /// is committed.
    pub fn change_state(&self, member_id: &str, new_state: MemberState, now: i64) -> Result<StateChange> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous: Option<String> = tx
            .query_row(
                "SELECT state FROM members WHERE id = ?1",
                params![member_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(previous) = previous else {
            return Err(CoreError::NotFound(format!(
                "member not found: {member_id}"
            )));
        };
        let previous_state = MemberState::parse(&previous)
            .ok_or_else(|| CoreError::InvalidData(format!("Invalid member state: {previous}")))?;

        tx.execute(
            "UPDATE members SET state = ?2, updated_at = ?3 WHERE id = ?1",
            params![member_id, new_state.as_str(), now],
        )?;

        let delivered = match new_state.delivery_trigger() {
            Some(trigger) => deliver_pending_tx(&tx, member_id, trigger, now)?,
            None => Vec::new(),
        };

        tx.commit()?;

        if !delivered.is_empty() {
            log::debug!(
                "state change {member_id} -> {} delivered {} message(s)",
                new_state.as_str(),
                delivered.len()
            );
        }

        Ok(StateChange {
            member_id: member_id.to_string(),
            previous_state,
            new_state,
            delivered,
        })
    }
}

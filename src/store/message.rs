//! Message operations: creation, sender edits, cancellation, delivery, and
//! the visibility queries.
//!
//! The status column moves one way only. Edit and cancel guard on
//! `status = 'pending'` inside the update itself, and the delivery
//! transition is a single `UPDATE ... RETURNING` whose result set is the
//! authoritative list of what was delivered; there is no second query to
//! guess at.

use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::Store;
use crate::error::{CoreError, Result};
use crate::message::{Message, MessageStatus};
use crate::presence::DeliveryTrigger;

type RawMessage = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<i64>,
);

fn read_message(row: &Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn parse_message(raw: RawMessage) -> Result<Message> {
    let (id, sender_id, recipient_id, circle_id, body, trigger_str, status_str, sent_at, delivered_at) =
        raw;
    let delivery_trigger = DeliveryTrigger::parse(&trigger_str)
        .ok_or_else(|| CoreError::InvalidData(format!("Invalid delivery trigger: {trigger_str}")))?;
    let status = MessageStatus::parse(&status_str)
        .ok_or_else(|| CoreError::InvalidData(format!("Invalid message status: {status_str}")))?;
    Ok(Message {
        id,
        sender_id,
        recipient_id,
        circle_id,
        body,
        delivery_trigger,
        status,
        sent_at,
        delivered_at,
    })
}

/// Promotes every pending message for `(recipient, trigger)` to delivered
/// and returns exactly the promoted rows.
///
/// Runs inside the caller's transaction so the presence write and the bulk
/// status write commit together. The status guard makes a repeated
/// resolution a no-op: rows already delivered never come back.
pub(super) fn deliver_pending_tx(
    tx: &Transaction<'_>,
    recipient_id: &str,
    trigger: DeliveryTrigger,
    now: i64,
) -> Result<Vec<Message>> {
    let mut stmt = tx.prepare(
        r"
        UPDATE messages
        SET status = ?3, delivered_at = ?4
        WHERE recipient_id = ?1 AND delivery_trigger = ?2 AND status = ?5
        RETURNING id, sender_id, recipient_id, circle_id, body, delivery_trigger,
                  status, sent_at, delivered_at
        ",
    )?;

    let raws = stmt
        .query_map(
            params![
                recipient_id,
                trigger.as_str(),
                MessageStatus::Delivered.as_str(),
                now,
                MessageStatus::Pending.as_str()
            ],
            read_message,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut delivered = raws
        .into_iter()
        .map(parse_message)
        .collect::<Result<Vec<_>>>()?;

    // RETURNING order is unspecified; keep fan-out deterministic.
    delivered.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));

    Ok(delivered)
}

impl Store {
    /// Creates a message.
    ///
    /// The trigger decides the initial lifecycle: "now" messages are
    /// delivered at creation with `delivered_at = sent_at` (no pending phase
    /// is ever observable); deferred triggers start pending with no
    /// delivery timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_message(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
        circle_id: &str,
        body: &str,
        trigger: DeliveryTrigger,
        now: i64,
    ) -> Result<Message> {
        let (status, delivered_at) = if trigger.is_deferred() {
            (MessageStatus::Pending, None)
        } else {
            (MessageStatus::Delivered, Some(now))
        };

        let conn = self.lock()?;
        conn.execute(
            r"
            INSERT INTO messages
                (id, sender_id, recipient_id, circle_id, body, delivery_trigger,
                 status, sent_at, delivered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                id,
                sender_id,
                recipient_id,
                circle_id,
                body,
                trigger.as_str(),
                status.as_str(),
                now,
                delivered_at
            ],
        )?;

        Ok(Message {
            id: id.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            circle_id: circle_id.to_string(),
            body: body.to_string(),
            delivery_trigger: trigger,
            status,
            sent_at: now,
            delivered_at,
        })
    }

    /// Retrieves a message by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such message exists.
    pub fn get_message(&self, id: &str) -> Result<Message> {
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                r"
                SELECT id, sender_id, recipient_id, circle_id, body, delivery_trigger,
                       status, sent_at, delivered_at
                FROM messages
                WHERE id = ?1
                ",
                params![id],
                read_message,
            )
            .optional()?;

        raw.map_or_else(
            || Err(CoreError::NotFound(format!("message not found: {id}"))),
            parse_message,
        )
    }

    /// Replaces the text of a pending message. Only the sender may edit.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: no such message.
    /// - [`CoreError::Forbidden`]: actor is not the sender.
    /// - [`CoreError::InvalidState`]: message is no longer pending.
    pub fn edit_message(&self, id: &str, actor_id: &str, body: &str) -> Result<Message> {
        self.update_pending(id, actor_id, |tx| {
            tx.execute(
                "UPDATE messages SET body = ?2 WHERE id = ?1 AND status = ?3",
                params![id, body, MessageStatus::Pending.as_str()],
            )
        })
    }

    /// Cancels a pending message. Only the sender may cancel. Terminal.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: no such message.
    /// - [`CoreError::Forbidden`]: actor is not the sender.
    /// - [`CoreError::InvalidState`]: message is no longer pending.
    pub fn cancel_message(&self, id: &str, actor_id: &str) -> Result<Message> {
        self.update_pending(id, actor_id, |tx| {
            tx.execute(
                "UPDATE messages SET status = ?2 WHERE id = ?1 AND status = ?3",
                params![
                    id,
                    MessageStatus::Canceled.as_str(),
                    MessageStatus::Pending.as_str()
                ],
            )
        })
    }

    /// Shared precondition checks and status-guarded update for sender
    /// mutations of a pending message.
    fn update_pending(
        &self,
        id: &str,
        actor_id: &str,
        apply: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<usize>,
    ) -> Result<Message> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let raw = tx
            .query_row(
                r"
                SELECT id, sender_id, recipient_id, circle_id, body, delivery_trigger,
                       status, sent_at, delivered_at
                FROM messages
                WHERE id = ?1
                ",
                params![id],
                read_message,
            )
            .optional()?;
        let Some(raw) = raw else {
            return Err(CoreError::NotFound(format!("message not found: {id}")));
        };
        let message = parse_message(raw)?;

        if message.sender_id != actor_id {
            return Err(CoreError::Forbidden(
                "only the sender may modify a message".to_string(),
            ));
        }
        if message.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "message is {}",
                message.status.as_str()
            )));
        }

        // The guard cannot miss here: the row was read as pending inside
        // this write transaction.
        let rows = apply(&tx)?;
        if rows == 0 {
            return Err(CoreError::InvalidState("message is no longer pending".to_string()));
        }

        let raw = tx.query_row(
            r"
            SELECT id, sender_id, recipient_id, circle_id, body, delivery_trigger,
                   status, sent_at, delivered_at
            FROM messages
            WHERE id = ?1
            ",
            params![id],
            read_message,
        )?;
        tx.commit()?;

        parse_message(raw)
    }

    /// Everything `user_id` may see: their own messages in any status,
    /// plus messages addressed to them once delivered. Ordered by send
    /// time, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_visible(&self, user_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r"
            SELECT id, sender_id, recipient_id, circle_id, body, delivery_trigger,
                   status, sent_at, delivered_at
            FROM messages
            WHERE sender_id = ?1
               OR (recipient_id = ?1 AND status = ?2)
            ORDER BY sent_at, id
            ",
        )?;

        let raws = stmt
            .query_map(params![user_id, MessageStatus::Delivered.as_str()], read_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raws.into_iter().map(parse_message).collect()
    }

    /// Only the messages delivered to `user_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_delivered(&self, user_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r"
            SELECT id, sender_id, recipient_id, circle_id, body, delivery_trigger,
                   status, sent_at, delivered_at
            FROM messages
            WHERE recipient_id = ?1 AND status = ?2
            ORDER BY sent_at, id
            ",
        )?;

        let raws = stmt
            .query_map(params![user_id, MessageStatus::Delivered.as_str()], read_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raws.into_iter().map(parse_message).collect()
    }
}

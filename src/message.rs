//! Message types and lifecycle status.
//!
//! A message is created by a sender for one recipient in a shared circle.
//! With the "now" trigger it is delivered at creation; with a deferred
//! trigger it waits in the pending status until the recipient's presence
//! state satisfies the trigger. Status moves one way only: pending to
//! delivered, or pending to canceled. Delivered and canceled are terminal.

use serde::{Deserialize, Serialize};

use crate::presence::DeliveryTrigger;

/// Lifecycle status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting for the recipient's trigger to fire.
    Pending,
    /// Visible to the recipient. Terminal.
    Delivered,
    /// Withdrawn by the sender before delivery. Terminal.
    Canceled,
}

impl MessageStatus {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "delivered" => Some(Self::Delivered),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Whether the status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }
}

/// A message between two members of a circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: String,
    /// Who wrote it.
    pub sender_id: String,
    /// Who it is addressed to.
    pub recipient_id: String,
    /// The circle both parties belong to.
    pub circle_id: String,
    /// Text body.
    pub body: String,
    /// Condition the message waits for before delivery.
    pub delivery_trigger: DeliveryTrigger,
    /// Current lifecycle status.
    pub status: MessageStatus,
    /// When the sender created it (Unix timestamp).
    pub sent_at: i64,
    /// When it became visible to the recipient; `None` while pending or
    /// canceled.
    pub delivered_at: Option<i64>,
}

impl Message {
    /// Whether `user_id` may see this message.
    ///
    /// The sender always sees their own message regardless of status (so
    /// they can track, edit, or cancel it). The recipient sees it only once
    /// it is delivered.
    #[must_use]
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.sender_id == user_id
            || (self.recipient_id == user_id && self.status == MessageStatus::Delivered)
    }
}

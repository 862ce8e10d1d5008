//! Presence types: member state, delivery triggers, and the member record.
//!
//! A member's state is one of a small fixed set of locations in their day
//! (at work, en route, at home). State changes are the only input to the
//! delivery engine: each state maps to at most one delivery trigger, and
//! pending messages waiting on that trigger are released when the state is
//! reached.

use serde::{Deserialize, Serialize};

/// A member's current presence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    /// At the workplace. Initial state for a new member.
    #[default]
    AtWork,
    /// Commuting; satisfies the on-depart trigger.
    EnRoute,
    /// Arrived home; satisfies the on-arrival trigger.
    AtHome,
}

impl MemberState {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AtWork => "at_work",
            Self::EnRoute => "en_route",
            Self::AtHome => "at_home",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "at_work" => Some(Self::AtWork),
            "en_route" => Some(Self::EnRoute),
            "at_home" => Some(Self::AtHome),
            _ => None,
        }
    }

    /// The delivery trigger this state satisfies, if any.
    ///
    /// This is the trigger resolver: a total, stateless lookup. States
    /// without a trigger (currently only at-work) release nothing.
    #[must_use]
    pub const fn delivery_trigger(self) -> Option<DeliveryTrigger> {
        match self {
            Self::AtWork => None,
            Self::EnRoute => Some(DeliveryTrigger::OnDepart),
            Self::AtHome => Some(DeliveryTrigger::OnArrival),
        }
    }
}

/// Condition a message waits for before it is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTrigger {
    /// No waiting: the message is delivered at creation.
    #[default]
    Now,
    /// Released when the recipient leaves work.
    OnDepart,
    /// Released when the recipient arrives home.
    OnArrival,
}

impl DeliveryTrigger {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::OnDepart => "on_depart",
            Self::OnArrival => "on_arrival",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "now" => Some(Self::Now),
            "on_depart" => Some(Self::OnDepart),
            "on_arrival" => Some(Self::OnArrival),
            _ => None,
        }
    }

    /// Whether messages with this trigger wait in the pending status.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        !matches!(self, Self::Now)
    }
}

/// A member of a circle, with their current presence state.
///
/// The id is the opaque identity issued by the authentication collaborator;
/// the core never interprets it. The push token, when present, is the
/// address the notification sink formats offline pushes for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Opaque unique identity.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current presence state.
    pub state: MemberState,
    /// Push-delivery address, if the member registered one.
    pub push_token: Option<String>,
    /// When the member registered (Unix timestamp).
    pub created_at: i64,
    /// When the member record last changed (Unix timestamp).
    pub updated_at: i64,
}

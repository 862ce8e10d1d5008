//! Circle, membership, and invitation types.
//!
//! A circle is a group of members who can exchange messages and see each
//! other's presence. Membership is a join record carrying a role; the
//! circle's creator holds the admin role and is the only one who may issue
//! invitations. An invitation carries a single-use token: redeeming it marks
//! the invitation accepted and creates the membership in one atomic step.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes in an invitation token (hex-encoded to twice this).
const TOKEN_BYTES: usize = 32;

/// Role of a member within a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// May invite new members.
    Admin,
    /// Regular membership.
    #[default]
    Member,
}

impl MemberRole {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// Status of an invitation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    /// Token not yet redeemed.
    Pending,
    /// Token redeemed; membership created. Terminal.
    Accepted,
}

impl InvitationStatus {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// A group of members who share messages and presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circle {
    /// Unique circle id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Member who created the circle (its first admin).
    pub created_by: String,
    /// When the circle was created (Unix timestamp).
    pub created_at: i64,
}

/// A member's membership record in a circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleMembership {
    /// The circle.
    pub circle_id: String,
    /// The member.
    pub member_id: String,
    /// Role within the circle.
    pub role: MemberRole,
    /// When the membership was created (Unix timestamp).
    pub joined_at: i64,
}

/// A single-use invitation into a circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Unique invitation id.
    pub id: String,
    /// Circle the invitation admits into.
    pub circle_id: String,
    /// Admin who issued it.
    pub inviter_id: String,
    /// Single-use redemption token.
    pub token: String,
    /// Pending until redeemed; accepted exactly once.
    pub status: InvitationStatus,
    /// When the invitation was issued (Unix timestamp).
    pub created_at: i64,
    /// When the token was redeemed; `None` while pending.
    pub redeemed_at: Option<i64>,
}

/// Generates a fresh invitation token from OS randomness.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0_u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

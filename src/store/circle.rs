//! Circle, membership, and invitation operations.
//!
//! Circle creation writes the circle row and the creator's admin membership
//! in one transaction. Invitation redemption is a compare-and-set on the
//! token's status plus the membership insert, also in one transaction, so a
//! raced token admits exactly one redeemer.

use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::{is_constraint_violation, Store};
use crate::circle::{Circle, CircleMembership, Invitation, InvitationStatus, MemberRole};
use crate::error::{CoreError, Result};

type RawInvitation = (String, String, String, String, String, i64, Option<i64>);

fn read_invitation(row: &Row<'_>) -> rusqlite::Result<RawInvitation> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn parse_invitation(raw: RawInvitation) -> Result<Invitation> {
    let (id, circle_id, inviter_id, token, status_str, created_at, redeemed_at) = raw;
    let status = InvitationStatus::parse(&status_str)
        .ok_or_else(|| CoreError::InvalidData(format!("Invalid invitation status: {status_str}")))?;
    Ok(Invitation {
        id,
        circle_id,
        inviter_id,
        token,
        status,
        created_at,
        redeemed_at,
    })
}

fn read_circle(row: &Row<'_>) -> rusqlite::Result<Circle> {
    Ok(Circle {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl Store {
    /// Creates a circle and the creator's admin membership atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the creator is not a registered
    /// member, or [`CoreError::Conflict`] on a duplicate circle id.
    pub fn create_circle(&self, id: &str, name: &str, created_by: &str, now: i64) -> Result<Circle> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let creator_exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM members WHERE id = ?1",
                params![created_by],
                |row| row.get(0),
            )
            .optional()?;
        if creator_exists.is_none() {
            return Err(CoreError::NotFound(format!(
                "member not found: {created_by}"
            )));
        }

        let inserted = tx.execute(
            r"
            INSERT INTO circles (id, name, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![id, name, created_by, now],
        );
        if let Err(ref e) = inserted {
            if is_constraint_violation(e) {
                return Err(CoreError::Conflict(format!("circle already exists: {id}")));
            }
        }
        inserted?;

        tx.execute(
            r"
            INSERT INTO circle_members (circle_id, member_id, role, joined_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![id, created_by, MemberRole::Admin.as_str(), now],
        )?;

        tx.commit()?;

        Ok(Circle {
            id: id.to_string(),
            name: name.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
        })
    }

    /// Retrieves a circle by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such circle exists.
    pub fn get_circle(&self, id: &str) -> Result<Circle> {
        let conn = self.lock()?;

        conn.query_row(
            r"
            SELECT id, name, created_by, created_at
            FROM circles
            WHERE id = ?1
            ",
            params![id],
            read_circle,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("circle not found: {id}")))
    }

    /// Lists the circles a member belongs to, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_circles_for(&self, member_id: &str) -> Result<Vec<Circle>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r"
            SELECT c.id, c.name, c.created_by, c.created_at
            FROM circles c
            JOIN circle_members cm ON cm.circle_id = c.id
            WHERE cm.member_id = ?1
            ORDER BY c.created_at DESC, c.id
            ",
        )?;

        let circles = stmt
            .query_map(params![member_id], read_circle)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(circles)
    }

    /// Retrieves a member's membership record in a circle, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn membership(&self, circle_id: &str, member_id: &str) -> Result<Option<CircleMembership>> {
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                r"
                SELECT circle_id, member_id, role, joined_at
                FROM circle_members
                WHERE circle_id = ?1 AND member_id = ?2
                ",
                params![circle_id, member_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            Some((circle_id, member_id, role_str, joined_at)) => {
                let role = MemberRole::parse(&role_str)
                    .ok_or_else(|| CoreError::InvalidData(format!("Invalid role: {role_str}")))?;
                Ok(Some(CircleMembership {
                    circle_id,
                    member_id,
                    role,
                    joined_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Counts the members of a circle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn member_count(&self, circle_id: &str) -> Result<usize> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM circle_members WHERE circle_id = ?1",
            params![circle_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Persists a new invitation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the circle does not exist, or an
    /// error if the database operation fails.
    pub fn create_invitation(
        &self,
        id: &str,
        circle_id: &str,
        inviter_id: &str,
        token: &str,
        now: i64,
    ) -> Result<Invitation> {
        let conn = self.lock()?;

        let circle_exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM circles WHERE id = ?1",
                params![circle_id],
                |row| row.get(0),
            )
            .optional()?;
        if circle_exists.is_none() {
            return Err(CoreError::NotFound(format!(
                "circle not found: {circle_id}"
            )));
        }

        conn.execute(
            r"
            INSERT INTO invitations (id, circle_id, inviter_id, token, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                id,
                circle_id,
                inviter_id,
                token,
                InvitationStatus::Pending.as_str(),
                now
            ],
        )?;

        Ok(Invitation {
            id: id.to_string(),
            circle_id: circle_id.to_string(),
            inviter_id: inviter_id.to_string(),
            token: token.to_string(),
            status: InvitationStatus::Pending,
            created_at: now,
            redeemed_at: None,
        })
    }

    /// Retrieves an invitation by token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_invitation(&self, token: &str) -> Result<Option<Invitation>> {
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                r"
                SELECT id, circle_id, inviter_id, token, status, created_at, redeemed_at
                FROM invitations
                WHERE token = ?1
                ",
                params![token],
                read_invitation,
            )
            .optional()?;

        raw.map(parse_invitation).transpose()
    }

    /// Redeems a single-use invitation token for `member_id`.
    ///
    /// Marks the invitation accepted and inserts the membership in one
    /// transaction. The status guard on the update is the compare-and-set:
    /// of two concurrent redemptions, exactly one sees the pending row.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`]: unknown token or unregistered member.
    /// - [`CoreError::InvalidState`]: token already redeemed.
    /// - [`CoreError::Conflict`]: member already belongs to the circle.
    pub fn redeem_invitation(&self, token: &str, member_id: &str, now: i64) -> Result<CircleMembership> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let member_exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM members WHERE id = ?1",
                params![member_id],
                |row| row.get(0),
            )
            .optional()?;
        if member_exists.is_none() {
            return Err(CoreError::NotFound(format!(
                "member not found: {member_id}"
            )));
        }

        let circle_id: Option<String> = tx
            .query_row(
                r"
                UPDATE invitations
                SET status = ?2, redeemed_at = ?3
                WHERE token = ?1 AND status = ?4
                RETURNING circle_id
                ",
                params![
                    token,
                    InvitationStatus::Accepted.as_str(),
                    now,
                    InvitationStatus::Pending.as_str()
                ],
                |row| row.get(0),
            )
            .optional()?;

        let Some(circle_id) = circle_id else {
            // Distinguish an unknown token from a spent one.
            let known: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM invitations WHERE token = ?1",
                    params![token],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(if known.is_some() {
                CoreError::InvalidState("invitation already redeemed".to_string())
            } else {
                CoreError::NotFound("invitation not found".to_string())
            });
        };

        let inserted = tx.execute(
            r"
            INSERT INTO circle_members (circle_id, member_id, role, joined_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![circle_id, member_id, MemberRole::Member.as_str(), now],
        );
        if let Err(ref e) = inserted {
            if is_constraint_violation(e) {
                return Err(CoreError::Conflict(format!(
                    "already a member of circle: {circle_id}"
                )));
            }
        }
        inserted?;

        tx.commit()?;
        log::debug!("invitation redeemed into circle {circle_id} by {member_id}");

        Ok(CircleMembership {
            circle_id,
            member_id: member_id.to_string(),
            role: MemberRole::Member,
            joined_at: now,
        })
    }
}

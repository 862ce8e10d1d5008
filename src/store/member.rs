//! Member operations: registration, lookup, roster, push token.

use rusqlite::{params, OptionalExtension, Row};

use super::{is_constraint_violation, Store};
use crate::error::{CoreError, Result};
use crate::presence::{Member, MemberState};

type RawMember = (String, String, String, Option<String>, i64, i64);

fn read_member(row: &Row<'_>) -> rusqlite::Result<RawMember> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parse_member(raw: RawMember) -> Result<Member> {
    let (id, name, state_str, push_token, created_at, updated_at) = raw;
    let state = MemberState::parse(&state_str)
        .ok_or_else(|| CoreError::InvalidData(format!("Invalid member state: {state_str}")))?;
    Ok(Member {
        id,
        name,
        state,
        push_token,
        created_at,
        updated_at,
    })
}

impl Store {
    /// Registers a member profile. The initial state is at-work.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the id is already taken, or a
    /// database error.
    pub fn create_member(&self, id: &str, name: &str, now: i64) -> Result<Member> {
        let conn = self.lock()?;

        let inserted = conn.execute(
            r"
            INSERT INTO members (id, name, state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ",
            params![id, name, MemberState::default().as_str(), now],
        );

        match inserted {
            Ok(_) => Ok(Member {
                id: id.to_string(),
                name: name.to_string(),
                state: MemberState::default(),
                push_token: None,
                created_at: now,
                updated_at: now,
            }),
            Err(ref e) if is_constraint_violation(e) => {
                Err(CoreError::Conflict(format!("member already exists: {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Retrieves a member by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such member exists.
    pub fn get_member(&self, id: &str) -> Result<Member> {
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                r"
                SELECT id, name, state, push_token, created_at, updated_at
                FROM members
                WHERE id = ?1
                ",
                params![id],
                read_member,
            )
            .optional()?;

        raw.map_or_else(
            || Err(CoreError::NotFound(format!("member not found: {id}"))),
            parse_member,
        )
    }

    /// Lists the members of a circle with their current states, ordered by
    /// display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_circle_members(&self, circle_id: &str) -> Result<Vec<Member>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r"
            SELECT m.id, m.name, m.state, m.push_token, m.created_at, m.updated_at
            FROM members m
            JOIN circle_members cm ON cm.member_id = m.id
            WHERE cm.circle_id = ?1
            ORDER BY m.name, m.id
            ",
        )?;

        let raws = stmt
            .query_map(params![circle_id], read_member)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raws.into_iter().map(parse_member).collect()
    }

    /// Stores the member's push-delivery address.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if no such member exists.
    pub fn set_push_token(&self, member_id: &str, push_token: &str, now: i64) -> Result<()> {
        let conn = self.lock()?;

        let rows = conn.execute(
            r"
            UPDATE members
            SET push_token = ?2, updated_at = ?3
            WHERE id = ?1
            ",
            params![member_id, push_token, now],
        )?;

        if rows == 0 {
            return Err(CoreError::NotFound(format!(
                "member not found: {member_id}"
            )));
        }

        Ok(())
    }
}

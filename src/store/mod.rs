//! `SQLite` storage for members, circles, invitations, and messages.
//!
//! One [`Store`] owns the database connection and the schema. Every
//! mutation in the crate goes through a parameterized operation defined
//! here (there is no ad hoc SQL anywhere else), so the lifecycle
//! invariants (single-use tokens, one-way message status) are enforced at a
//! single choke point.
//!
//! Multi-row effects (circle creation with its admin membership, invitation
//! redemption, the state-change-plus-delivery transition) run inside
//! immediate transactions: either everything commits or nothing does.

// SQLite operations need to hold the lock for the duration of the operation.
// Dropping the guard earlier would require restructuring all methods.
#![allow(clippy::significant_drop_tightening)]

mod circle;
mod member;
mod message;
mod state;

pub use state::StateChange;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{CoreError, Result};

/// True when the error is a uniqueness/primary-key violation.
fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// `SQLite`-backed store for all durable state.
///
/// Thread-safe: the connection sits behind a mutex, and transactions are
/// taken with immediate behavior so the write lock is held for the whole
/// multi-statement operation.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Creates a store at the given path.
    ///
    /// Creates the database file and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Acquires the connection, mapping a poisoned lock to a storage error.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CoreError::Storage(format!("Failed to acquire database lock: {e}")))
    }

    /// Initializes the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            -- Member profiles with current presence state
            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'at_work',
                push_token TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Circles (groups of members)
            CREATE TABLE IF NOT EXISTS circles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (created_by) REFERENCES members(id)
            );

            -- Membership join table with role
            CREATE TABLE IF NOT EXISTS circle_members (
                circle_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member',
                joined_at INTEGER NOT NULL,
                PRIMARY KEY (circle_id, member_id),
                FOREIGN KEY (circle_id) REFERENCES circles(id),
                FOREIGN KEY (member_id) REFERENCES members(id)
            );

            -- Single-use invitations
            CREATE TABLE IF NOT EXISTS invitations (
                id TEXT PRIMARY KEY,
                circle_id TEXT NOT NULL,
                inviter_id TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                redeemed_at INTEGER,
                FOREIGN KEY (circle_id) REFERENCES circles(id),
                FOREIGN KEY (inviter_id) REFERENCES members(id)
            );

            -- Messages with lifecycle status and delivery trigger
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                circle_id TEXT NOT NULL,
                body TEXT NOT NULL,
                delivery_trigger TEXT NOT NULL,
                status TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                delivered_at INTEGER,
                FOREIGN KEY (sender_id) REFERENCES members(id),
                FOREIGN KEY (recipient_id) REFERENCES members(id),
                FOREIGN KEY (circle_id) REFERENCES circles(id)
            );

            -- The delivery transition scans by recipient, trigger, status
            CREATE INDEX IF NOT EXISTS idx_messages_pending
                ON messages(recipient_id, delivery_trigger, status);
            ",
        )?;

        log::debug!("store schema initialized");
        Ok(())
    }
}

// SQLite persistence layer for draft sessions.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::draft::DraftError;

/// Default time a writer waits for another connection's write lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite-backed store for the five draft relations: drafts, participants,
/// pick_limits, assignments and picks.
///
/// Every state-changing draft action runs inside [`Database::write`], which
/// opens a `BEGIN IMMEDIATE` transaction. SQLite grants the write lock at
/// `BEGIN`, so the whole check-then-act sequence of an action sees no
/// concurrent writer, whether that writer shares this handle or holds its
/// own connection to the same file.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`Database::open`], with an explicit busy timeout.
    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;
        conn.busy_timeout(busy_timeout)
            .context("failed to set busy timeout")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS drafts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                scope_id    INTEGER NOT NULL,
                channel_id  INTEGER,
                status      TEXT NOT NULL CHECK (status IN ('active', 'finished')),
                stage       TEXT NOT NULL CHECK (stage IN ('initial', 'main')),
                created_at  TEXT NOT NULL,
                ended_at    TEXT,
                turn_cursor INTEGER NOT NULL DEFAULT 0 CHECK (turn_cursor >= 0)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_drafts_one_active_per_scope
                ON drafts(scope_id) WHERE status = 'active';

            CREATE TABLE IF NOT EXISTS participants (
                draft_id         INTEGER NOT NULL REFERENCES drafts(id),
                user_id          INTEGER NOT NULL,
                pick_order       INTEGER NOT NULL,
                claimed_resource TEXT,
                group_name       TEXT,
                claimed          INTEGER NOT NULL DEFAULT 0,
                group_chosen     INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (draft_id, user_id),
                UNIQUE (draft_id, pick_order)
            );

            CREATE TRIGGER IF NOT EXISTS participants_pick_order_immutable
                BEFORE UPDATE OF pick_order ON participants
                WHEN NEW.pick_order <> OLD.pick_order
            BEGIN
                SELECT RAISE(ABORT, 'pick_order is immutable');
            END;

            CREATE TABLE IF NOT EXISTS pick_limits (
                draft_id      INTEGER NOT NULL,
                user_id       INTEGER NOT NULL,
                picks_allowed INTEGER NOT NULL CHECK (picks_allowed >= 0),
                PRIMARY KEY (draft_id, user_id),
                FOREIGN KEY (draft_id, user_id) REFERENCES participants(draft_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS assignments (
                draft_id      INTEGER NOT NULL,
                resource_name TEXT NOT NULL,
                user_id       INTEGER NOT NULL,
                pick_number   INTEGER,
                PRIMARY KEY (draft_id, resource_name),
                FOREIGN KEY (draft_id, user_id) REFERENCES participants(draft_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS picks (
                draft_id      INTEGER NOT NULL,
                pick_number   INTEGER NOT NULL CHECK (pick_number >= 1),
                user_id       INTEGER NOT NULL,
                resource_name TEXT NOT NULL,
                picked_at     TEXT NOT NULL,
                PRIMARY KEY (draft_id, pick_number),
                FOREIGN KEY (draft_id, user_id) REFERENCES participants(draft_id, user_id)
            );

            CREATE TRIGGER IF NOT EXISTS picks_gapless
                BEFORE INSERT ON picks
                WHEN NEW.pick_number <> (
                    SELECT COALESCE(MAX(pick_number), 0) + 1 FROM picks WHERE draft_id = NEW.draft_id
                )
            BEGIN
                SELECT RAISE(ABORT, 'pick_number must extend the draft sequence by one');
            END;
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside an immediate (write-locked) transaction. The
    /// transaction commits only if `f` succeeds; any error rolls back every
    /// write `f` made.
    pub fn write<T, F>(&self, f: F) -> Result<T, DraftError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DraftError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` inside a read transaction so multi-query views observe one
    /// consistent snapshot.
    pub fn read<T, F>(&self, f: F) -> Result<T, DraftError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DraftError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&tx)?;
        tx.finish()?;
        Ok(value)
    }
}

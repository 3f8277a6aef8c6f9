//! SQLite-based timer storage.
//!
//! Provides persistent storage for:
//! - Timer records (the authoritative state of every countdown)
//! - The stash used to undo the last deletion
//! - A queue of service commands sent by other processes
//! - Key-value store for application state

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError, Result};
use crate::events::Event;
use crate::service::ServiceCommand;
use crate::timer::{Anchor, NewTimer, Timer, TimerId};
use crate::units::TemperatureUnit;

const TIMER_COLUMNS: &str = "id, name, initial_duration_secs, remaining_secs, is_running, \
     is_completed, temperature_celsius, original_input_unit, last_started_at";

const LAST_DELETED_KEY: &str = "last_deleted";

/// How long another connection may hold the write lock before we give up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of applying a state transition to a stored timer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub timer: Timer,
    /// `None` when the transition was a no-op (e.g. stopping a stopped timer).
    pub event: Option<Event>,
}

/// A deleted record kept around for the undo window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedTimer {
    pub timer: Timer,
    pub deleted_at: DateTime<Utc>,
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Build a Timer from a row selected with `TIMER_COLUMNS`.
fn row_to_timer(row: &rusqlite::Row) -> rusqlite::Result<Timer> {
    let unit = row
        .get::<_, Option<String>>(7)?
        .map(|s| s.parse::<TemperatureUnit>().map_err(|e| conversion_error(7, e)))
        .transpose()?;
    let last_started_at = row
        .get::<_, Option<String>>(8)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| conversion_error(8, e))
        })
        .transpose()?;

    Ok(Timer {
        id: row.get(0)?,
        name: row.get(1)?,
        initial_duration_secs: row.get(2)?,
        remaining_secs: row.get(3)?,
        is_running: row.get(4)?,
        is_completed: row.get(5)?,
        temperature_celsius: row.get(6)?,
        original_input_unit: unit,
        last_started_at,
    })
}

/// SQLite database for timer storage.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File backing this database, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open the database at `<data dir>/cookietimer.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("cookietimer.db");
        Self::open_at(path)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self {
            conn,
            path: Some(path),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Counter that changes whenever another connection commits.
    ///
    /// Writes made through this connection do not move it.
    pub fn data_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// Insert a timer and return its id.
    ///
    /// A record with id 0 gets a fresh id. A non-zero id is kept, replacing
    /// any row with the same id.
    pub fn insert_timer(&self, timer: &Timer) -> Result<TimerId> {
        timer.check_invariants()?;
        let unit = timer.original_input_unit.map(|u| u.as_str());
        let started = timer.last_started_at.map(|t| t.to_rfc3339());
        if timer.id == 0 {
            self.conn.execute(
                "INSERT INTO timers (name, initial_duration_secs, remaining_secs, is_running,
                     is_completed, temperature_celsius, original_input_unit, last_started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    timer.name,
                    timer.initial_duration_secs,
                    timer.remaining_secs,
                    timer.is_running,
                    timer.is_completed,
                    timer.temperature_celsius,
                    unit,
                    started,
                ],
            )?;
            Ok(self.conn.last_insert_rowid())
        } else {
            self.conn.execute(
                "INSERT OR REPLACE INTO timers (id, name, initial_duration_secs, remaining_secs,
                     is_running, is_completed, temperature_celsius, original_input_unit,
                     last_started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    timer.id,
                    timer.name,
                    timer.initial_duration_secs,
                    timer.remaining_secs,
                    timer.is_running,
                    timer.is_completed,
                    timer.temperature_celsius,
                    unit,
                    started,
                ],
            )?;
            Ok(timer.id)
        }
    }

    /// Validate a draft, store it, and return the stored record.
    pub fn add_timer(&self, draft: NewTimer, now: DateTime<Utc>) -> Result<(Timer, Event)> {
        let mut timer = Timer::new(draft);
        timer.id = self.insert_timer(&timer)?;
        let event = Event::TimerAdded {
            id: timer.id,
            name: timer.name.clone(),
            duration_secs: timer.initial_duration_secs,
            at: now,
        };
        Ok((timer, event))
    }

    /// Overwrite every column of an existing row. Returns false if no row matched.
    pub fn update_timer(&self, timer: &Timer) -> Result<bool> {
        timer.check_invariants()?;
        let changed = self.conn.execute(
            "UPDATE timers SET name = ?2, initial_duration_secs = ?3, remaining_secs = ?4,
                 is_running = ?5, is_completed = ?6, temperature_celsius = ?7,
                 original_input_unit = ?8, last_started_at = ?9
             WHERE id = ?1",
            params![
                timer.id,
                timer.name,
                timer.initial_duration_secs,
                timer.remaining_secs,
                timer.is_running,
                timer.is_completed,
                timer.temperature_celsius,
                timer.original_input_unit.map(|u| u.as_str()),
                timer.last_started_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_timer(&self, id: TimerId) -> Result<Option<Timer>> {
        let sql = format!("SELECT {TIMER_COLUMNS} FROM timers WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_timer)
            .optional()?)
    }

    /// All timers, newest first.
    pub fn list_timers(&self) -> Result<Vec<Timer>> {
        let sql = format!("SELECT {TIMER_COLUMNS} FROM timers ORDER BY id DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_timer)?;
        let mut timers = Vec::new();
        for row in rows {
            timers.push(row?);
        }
        Ok(timers)
    }

    pub fn delete_timer(&self, id: TimerId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM timers WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn count_running(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM timers WHERE is_running = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Re-anchor a running timer after a countdown tick.
    ///
    /// Compare-and-set on `expected`: the row is only touched while it still
    /// runs from the anchor the countdown was started from (or last wrote).
    /// A stop, reset or restart from elsewhere makes this return false.
    pub fn record_tick(
        &self,
        id: TimerId,
        expected: Anchor,
        remaining: u32,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE timers SET remaining_secs = MIN(?2, initial_duration_secs), last_started_at = ?3
             WHERE id = ?1 AND is_running = 1 AND last_started_at = ?4 AND remaining_secs = ?5",
            params![
                id,
                remaining,
                at.to_rfc3339(),
                expected.started_at.to_rfc3339(),
                expected.remaining_secs
            ],
        )?;
        Ok(changed > 0)
    }

    /// Mark a timer completed if it still runs from `expected`.
    pub fn mark_completed(&self, id: TimerId, expected: Anchor) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE timers SET remaining_secs = 0, is_running = 0, is_completed = 1,
                 last_started_at = NULL
             WHERE id = ?1 AND is_running = 1 AND last_started_at = ?2 AND remaining_secs = ?3",
            params![id, expected.started_at.to_rfc3339(), expected.remaining_secs],
        )?;
        Ok(changed > 0)
    }

    /// Load a timer, apply `f`, and write the result back in one transaction.
    ///
    /// Returns `Ok(None)` when no timer has that id.
    pub fn transition<F>(&self, id: TimerId, f: F) -> Result<Option<Transition>>
    where
        F: FnOnce(&mut Timer) -> Option<Event>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let Some(mut timer) = self.get_timer(id)? else {
            return Ok(None);
        };
        let event = f(&mut timer);
        if event.is_some() {
            self.update_timer(&timer)?;
        }
        tx.commit()?;
        Ok(Some(Transition { timer, event }))
    }

    pub fn start_timer(&self, id: TimerId, now: DateTime<Utc>) -> Result<Option<Transition>> {
        self.transition(id, |t| Some(t.start(now)))
    }

    pub fn stop_timer(&self, id: TimerId, now: DateTime<Utc>) -> Result<Option<Transition>> {
        self.transition(id, |t| t.stop(now))
    }

    pub fn reset_timer(&self, id: TimerId, now: DateTime<Utc>) -> Result<Option<Transition>> {
        self.transition(id, |t| Some(t.reset(now)))
    }

    // ── Delete / undo ────────────────────────────────────────────────

    /// Stop and delete a timer, keeping a copy that `undo_delete` can restore.
    ///
    /// Only the most recent deletion can be undone.
    pub fn delete_with_undo(
        &self,
        id: TimerId,
        now: DateTime<Utc>,
        undo_window: chrono::Duration,
    ) -> Result<Option<Event>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(mut timer) = self.get_timer(id)? else {
            return Ok(None);
        };
        timer.stop(now);
        self.delete_timer(id)?;
        let stash = DeletedTimer {
            timer,
            deleted_at: now,
        };
        self.kv_set(LAST_DELETED_KEY, &serde_json::to_string(&stash)?)?;
        tx.commit()?;
        Ok(Some(Event::TimerDeleted {
            id,
            undo_until: now + undo_window,
        }))
    }

    /// The last deleted timer, if any is stashed.
    pub fn last_deleted(&self) -> Result<Option<DeletedTimer>> {
        match self.kv_get(LAST_DELETED_KEY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Restore the last deleted timer with its original id.
    ///
    /// # Errors
    /// Returns `CoreError::UndoExpired` (and forgets the stash) when the
    /// deletion is older than `undo_window`.
    pub fn undo_delete(
        &self,
        now: DateTime<Utc>,
        undo_window: chrono::Duration,
    ) -> Result<Option<(Timer, Event)>> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(stash) = self.last_deleted()? else {
            return Ok(None);
        };
        self.kv_delete(LAST_DELETED_KEY)?;
        if now > stash.deleted_at + undo_window {
            tx.commit()?;
            return Err(CoreError::UndoExpired {
                window_secs: undo_window.num_seconds().max(0) as u64,
            });
        }
        let timer = stash.timer;
        self.insert_timer(&timer)?;
        tx.commit()?;
        let event = Event::TimerRestored {
            id: timer.id,
            at: now,
        };
        Ok(Some((timer, event)))
    }

    // ── Service command queue ────────────────────────────────────────

    pub fn enqueue_command(&self, command: ServiceCommand) -> Result<()> {
        self.conn.execute(
            "INSERT INTO service_commands (action, timer_id, queued_at) VALUES (?1, ?2, ?3)",
            params![command.action(), command.timer_id(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove and return every queued command, oldest first.
    ///
    /// Rows with an unknown action are dropped with a warning.
    pub fn drain_commands(&self) -> Result<Vec<ServiceCommand>> {
        let tx = self.conn.unchecked_transaction()?;
        let rows: Vec<(i64, String, Option<TimerId>)> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id, action, timer_id FROM service_commands ORDER BY id")?;
            let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            mapped.collect::<rusqlite::Result<_>>()?
        };
        let Some(last_id) = rows.last().map(|(id, _, _)| *id) else {
            return Ok(Vec::new());
        };
        self.conn
            .execute("DELETE FROM service_commands WHERE id <= ?1", params![last_id])?;
        tx.commit()?;

        Ok(rows
            .into_iter()
            .filter_map(|(_, action, timer_id)| {
                let command = ServiceCommand::from_parts(&action, timer_id);
                if command.is_none() {
                    tracing::warn!(%action, ?timer_id, "dropping unknown service command");
                }
                command
            })
            .collect())
    }

    pub fn pending_commands(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM service_commands", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Key-value store ──────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

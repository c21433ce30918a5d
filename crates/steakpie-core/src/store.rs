//! Persistent webhook deduplication using SQLite.
//!
//! # Table design
//!
//! A single `events` table with a unique index on the identity
//! `(package, tag, version_id, digest)`. Recording an event is one
//! `INSERT ... ON CONFLICT DO NOTHING`: the row count tells us whether this
//! call inserted it. The unique index is the dedup boundary, so two handlers
//! racing on the same identity (through this handle or through separate
//! connections to the same file) see exactly one `true`.
//!
//! The database runs in WAL mode with a busy timeout so concurrent writers
//! queue instead of failing with `SQLITE_BUSY`.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::event::{EventIdentity, RegistryPackageEvent};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        delivery_id TEXT NOT NULL,
        package TEXT NOT NULL,
        tag TEXT NOT NULL,
        version_id INTEGER NOT NULL,
        digest TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        repository TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_events_identity
        ON events(package, tag, version_id, digest);
";

/// An event about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub delivery_id: String,
    pub identity: EventIdentity,
    pub repository: String,
}

impl NewEvent {
    pub fn from_webhook(delivery_id: &str, event: &RegistryPackageEvent) -> Self {
        Self {
            delivery_id: delivery_id.to_string(),
            identity: event.identity(),
            repository: event.label().to_string(),
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub delivery_id: String,
    pub identity: EventIdentity,
    pub recorded_at: DateTime<Utc>,
    pub repository: String,
}

/// Shared handle to the event database.
///
/// Open it once at startup and clone it into every handler; clones share the
/// same connection.
#[derive(Clone)]
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    /// Open (or create) the database at `path`. `":memory:"` opens a private
    /// in-memory database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| CoreError::Store(format!("failed to open database: {e}")))?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CoreError::Store(format!("failed to open database: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "event store opened");
        conn.execute_batch(SCHEMA)
            .map_err(|e| CoreError::Store(format!("failed to initialize schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CoreError::Store(format!("connection lock poisoned: {e}")))
    }

    /// Record `event` unless an event with the same identity already exists.
    ///
    /// Returns `Ok(true)` if this call inserted the row, `Ok(false)` for a
    /// duplicate. Errors are storage failures only.
    pub fn record_event(&self, event: &NewEvent) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO events (delivery_id, package, tag, version_id, digest, recorded_at, repository)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(package, tag, version_id, digest) DO NOTHING",
            params![
                event.delivery_id,
                event.identity.package,
                event.identity.tag,
                event.identity.version_id,
                event.identity.digest,
                Utc::now().to_rfc3339(),
                event.repository,
            ],
        );
        match inserted {
            Ok(n) => Ok(n == 1),
            Err(e) if is_constraint_violation(&e) => Ok(false),
            Err(e) => Err(CoreError::Store(format!("failed to insert event: {e}"))),
        }
    }

    /// [`record_event`](Self::record_event) on tokio's blocking pool.
    pub async fn record_event_async(&self, event: NewEvent) -> Result<bool> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.record_event(&event))
            .await
            .map_err(|e| CoreError::StoreTask(e.to_string()))?
    }

    /// Total number of recorded events.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(total.max(0) as u64)
    }

    /// Look up the stored record for `identity`.
    pub fn get(&self, identity: &EventIdentity) -> Result<Option<EventRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT delivery_id, recorded_at, repository FROM events
                 WHERE package = ?1 AND tag = ?2 AND version_id = ?3 AND digest = ?4",
                params![
                    identity.package,
                    identity.tag,
                    identity.version_id,
                    identity.digest
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((delivery_id, recorded_at, repository)) = row else {
            return Ok(None);
        };
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| CoreError::Store(format!("bad timestamp '{recorded_at}': {e}")))?
            .with_timezone(&Utc);
        Ok(Some(EventRecord {
            delivery_id,
            identity: identity.clone(),
            recorded_at,
            repository,
        }))
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

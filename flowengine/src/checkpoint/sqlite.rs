//! SQLite-backed checkpoint store (feature `sqlite`).
//!
//! Append-only `checkpoints` table keyed by `(session_id, step)`; the current
//! state for a session is the row with the maximum step. State bytes go
//! through a [`Serializer`] (JSON by default), so round-trip equality is all
//! the schema asks of the state.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::state::FlowState;

use super::{Checkpoint, CheckpointError, Checkpointer, JsonSerializer, Serializer};

/// Relational checkpoint store on a SQLite database.
///
/// Keeps the full step history per session (append-only log); `load` reads
/// the latest row, `reset` deletes the session's rows. The connection sits
/// behind a `Mutex`; operations are short single statements.
pub struct SqliteCheckpointer {
    conn: Mutex<Connection>,
    serializer: Box<dyn Serializer>,
}

impl SqliteCheckpointer {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database; useful for tests.
    pub fn open_in_memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::with_connection(conn)
    }

    /// Replaces the default JSON serializer.
    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    fn with_connection(conn: Connection) -> Result<Self, CheckpointError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT NOT NULL,
                step       INTEGER NOT NULL,
                state      BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (session_id, step)
            )",
            [],
        )
        .map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
            serializer: Box::new(JsonSerializer),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CheckpointError> {
        self.conn
            .lock()
            .map_err(|_| CheckpointError::Backend("connection lock poisoned".into()))
    }
}

fn backend(e: rusqlite::Error) -> CheckpointError {
    CheckpointError::Backend(e.to_string())
}

fn unix_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save(
        &self,
        session_id: &str,
        step: u64,
        state: &FlowState,
    ) -> Result<(), CheckpointError> {
        let bytes = self.serializer.serialize(state)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (session_id, step, state, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                step as i64,
                bytes,
                unix_millis(SystemTime::now())
            ],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT step, state, created_at FROM checkpoints
                 WHERE session_id = ?1 ORDER BY step DESC LIMIT 1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(backend)?
        };
        let Some((step, bytes, created_at)) = row else {
            return Ok(None);
        };
        let state = self.serializer.deserialize(&bytes)?;
        Ok(Some(Checkpoint {
            session_id: session_id.to_string(),
            step: step as u64,
            state,
            created_at: UNIX_EPOCH + Duration::from_millis(created_at.max(0) as u64),
        }))
    }

    async fn reset(&self, session_id: &str) -> Result<(), CheckpointError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM checkpoints WHERE session_id = ?1",
            params![session_id],
        )
        .map_err(backend)?;
        Ok(())
    }
}

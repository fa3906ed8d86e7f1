//! Checkpointing: durable state snapshots keyed by session id.
//!
//! One logical checkpoint per session represents the most recent committed
//! state; `step` increases monotonically per session. The engine reads and
//! writes only through the [`Checkpointer`] trait, so backends are
//! interchangeable:
//!
//! | Type                  | Persistence     | Use case                 | Feature  |
//! |-----------------------|-----------------|--------------------------|----------|
//! | [`MemoryCheckpointer`] | In-memory       | Dev, tests               | —        |
//! | [`SqliteCheckpointer`] | SQLite file     | Single-node, production  | `sqlite` |
//! | [`TtlCheckpointer`]    | In-memory + TTL | Auto-expiring sessions   | —        |
//!
//! Concurrent `invoke`/`stream` calls for the *same* session id race on
//! checkpoint writes and are a caller error; distinct sessions are fully
//! independent.

mod memory;
mod serializer;
mod ttl;

#[cfg(feature = "sqlite")]
mod sqlite;

use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;

use crate::state::FlowState;

pub use memory::MemoryCheckpointer;
pub use serializer::{JsonSerializer, Serializer};
pub use ttl::TtlCheckpointer;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointer;

/// One committed snapshot of a session's state.
///
/// **Interaction**: produced by the engine after each completed step via
/// [`Checkpointer::save`]; the latest per session is returned by
/// [`Checkpointer::load`].
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub session_id: String,
    pub step: u64,
    pub state: FlowState,
    pub created_at: SystemTime,
}

impl Checkpoint {
    /// Builds a checkpoint stamped with the current time.
    pub fn new(session_id: impl Into<String>, step: u64, state: FlowState) -> Self {
        Self {
            session_id: session_id.into(),
            step,
            state,
            created_at: SystemTime::now(),
        }
    }
}

/// Checkpoint store failure. Fatal to the invocation that hit it.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The backend itself failed (I/O, connection, poisoned lock).
    #[error("checkpoint backend error: {0}")]
    Backend(String),

    /// State could not be serialized or deserialized.
    #[error("checkpoint serialization error: {0}")]
    Serialization(String),
}

/// Durable snapshot store keyed by session id.
///
/// All implementations guarantee read-after-write visibility on the same
/// instance: a `load` immediately after a `save` for the same session returns
/// the saved value. `reset` deletes the session so the next run starts from
/// schema defaults.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persists `state` as the latest checkpoint for `session_id`.
    async fn save(
        &self,
        session_id: &str,
        step: u64,
        state: &FlowState,
    ) -> Result<(), CheckpointError>;

    /// Loads the most recent checkpoint for `session_id`, or `None`.
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Deletes the session's checkpoints.
    async fn reset(&self, session_id: &str) -> Result<(), CheckpointError>;
}

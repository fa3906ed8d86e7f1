//! Key-value checkpoint store with time-to-live eviction.
//!
//! Sessions expire automatically: every `save` refreshes the entry's
//! deadline, and an entry past its deadline is treated as absent. Eviction is
//! lazy, done on access; no background task runs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::state::FlowState;

use super::{Checkpoint, CheckpointError, Checkpointer};

struct TtlEntry {
    checkpoint: Checkpoint,
    expires_at: Instant,
}

/// In-process key-value checkpoint store with per-session TTL.
///
/// The key-value analogue of a Redis-backed checkpointer: keys are
/// `{prefix}{session_id}`, values the latest checkpoint, and idle sessions
/// vanish after `ttl`. The prefix keeps several engines apart when they share
/// one store instance.
pub struct TtlCheckpointer {
    data: DashMap<String, TtlEntry>,
    ttl: Duration,
    prefix: String,
}

impl TtlCheckpointer {
    /// Creates a store whose sessions expire `ttl` after their last save.
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            ttl,
            prefix: String::new(),
        }
    }

    /// Sets the key prefix (e.g. `"flowengine:"`).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }
}

#[async_trait]
impl Checkpointer for TtlCheckpointer {
    async fn save(
        &self,
        session_id: &str,
        step: u64,
        state: &FlowState,
    ) -> Result<(), CheckpointError> {
        self.data.insert(
            self.key(session_id),
            TtlEntry {
                checkpoint: Checkpoint::new(session_id, step, state.clone()),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let key = self.key(session_id);
        let expired = match self.data.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.checkpoint.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.data.remove(&key);
        }
        Ok(None)
    }

    async fn reset(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.data.remove(&self.key(session_id));
        Ok(())
    }
}

//! In-memory checkpoint store for dev and tests.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::state::FlowState;

use super::{Checkpoint, CheckpointError, Checkpointer};

/// Pure in-memory checkpoint store; data lives for the process lifetime.
///
/// Keeps only the latest checkpoint per session. `save` overwrites; `load`
/// clones out; no serialization involved.
#[derive(Default)]
pub struct MemoryCheckpointer {
    data: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointer {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(
        &self,
        session_id: &str,
        step: u64,
        state: &FlowState,
    ) -> Result<(), CheckpointError> {
        self.data.insert(
            session_id.to_string(),
            Checkpoint::new(session_id, step, state.clone()),
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.data.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn reset(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.data.remove(session_id);
        Ok(())
    }
}

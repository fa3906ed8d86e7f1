//! Runtime error types for flow execution.
//!
//! Build-time errors live in `graph::BuildError`; checkpoint-store errors in
//! `checkpoint::CheckpointError`. Everything here aborts the current
//! `invoke`/`stream` call; nothing is retried internally. Prior checkpoints
//! stay intact, so re-invoking the same session resumes from the last
//! committed step.

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Error returned by a node callable.
///
/// Carries a message and optionally the underlying cause (an LLM client
/// failure, a tool error, ...). The engine wraps it into
/// [`FlowError::NodeExecution`] together with the node name.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct NodeError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl NodeError {
    /// Creates an error with a message and no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Error raised while executing a compiled flow.
///
/// Every variant is fatal to the current invocation. The step that raised is
/// not checkpointed; the last good checkpoint remains loadable.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A node callable failed; carries the node name and the original cause.
    #[error("node '{node}' failed: {source}")]
    NodeExecution { node: String, source: NodeError },

    /// A conditional router returned a value outside its declared candidates.
    #[error("router for node '{node}' returned '{returned}', which is not a declared candidate")]
    Routing { node: String, returned: String },

    /// A streaming node broke the chunk-then-result contract.
    #[error("node '{node}' violated the stream protocol: {reason}")]
    NodeProtocol { node: String, reason: String },

    /// A node completed but has no outgoing edge to follow.
    #[error("no outgoing edge from node '{node}'")]
    NoTransition { node: String },

    /// The checkpoint store failed; not swallowed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The per-invocation step bound was exceeded, signaling a likely
    /// unterminated cycle.
    #[error("step limit of {limit} exceeded; likely an unterminated cycle")]
    StepLimit { limit: usize },
}

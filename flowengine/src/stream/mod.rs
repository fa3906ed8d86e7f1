//! Streaming envelopes for flow runs.
//!
//! `CompiledFlow::stream` wraps every node activation into a uniform event
//! sequence: zero or more [`FlowEvent::StreamChunk`]s, one
//! [`FlowEvent::NodeResult`] once the node's update has been merged and
//! checkpointed, and a single terminal [`FlowEvent::WorkflowComplete`].
//! [`ToolEvent`] is the conventional chunk payload for nodes that drive
//! nested tool execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::FlowState;

/// One envelope emitted while streaming a flow run.
///
/// Ordering per node activation: chunks in production order, then the node's
/// result; the result precedes the next node's first event; activations never
/// interleave.
#[derive(Clone, Debug)]
pub enum FlowEvent {
    /// Incremental content from a streaming node (token delta, progress, a
    /// serialized [`ToolEvent`], ...). Opaque to the engine; never merged
    /// into state.
    StreamChunk(Value),
    /// A node completed; its partial update has been merged and the resulting
    /// state checkpointed.
    NodeResult { node: String, update: FlowState },
    /// The terminal sentinel was reached; carries the final state. Last event
    /// of the sequence.
    WorkflowComplete(FlowState),
}

/// Sub-event vocabulary for nodes that run tools while streaming.
///
/// A node-defined protocol layered inside [`FlowEvent::StreamChunk`] payloads,
/// not a third top-level envelope: the node serializes an `Executing` event
/// when a tool starts and a `Result` event when it finishes, and consumers
/// that care can parse chunks back with [`ToolEvent::from_value`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ToolEvent {
    /// A tool invocation is starting.
    Executing { name: String, arguments: Value },
    /// A tool invocation finished with `output`.
    Result { name: String, output: Value },
}

impl ToolEvent {
    /// Serializes the event into a chunk payload.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parses a chunk payload back into a tool event, if it is one.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

//! # Flow Engine
//!
//! A stateful workflow graph engine: build a directed graph of nodes over a
//! declared state schema, run it with durable per-step checkpointing keyed by
//! session id, and optionally consume execution as a stream of envelopes.
//!
//! ## Design Principles
//!
//! - **One state map per graph**: an ordered field map declared once via
//!   [`StateSchema`]; nodes return *partial* updates that merge field-wise
//!   (replace by default, or through a registered reducer).
//! - **Explicit wiring**: nodes and edges are added through builder calls on
//!   [`FlowEngine`]; no registries, no decorators. `build()` validates the
//!   structure and returns an immutable [`CompiledFlow`].
//! - **Checkpoint every step**: after each node activation the merged state
//!   is saved under the session id, so a failed or interrupted run resumes
//!   from the last good step. Backends: in-memory, SQLite, TTL key-value.
//! - **Two-tier streaming**: a streaming node yields chunks then one terminal
//!   result ([`NodeEvent`]); the engine wraps every activation into uniform
//!   [`FlowEvent`] envelopes ending in `WorkflowComplete`.
//!
//! ## Main Modules
//!
//! - [`graph`]: [`FlowEngine`], [`CompiledFlow`], [`FlowNode`], `START`/`END`.
//! - [`state`]: [`StateSchema`], [`FlowState`], reducers.
//! - [`checkpoint`]: [`Checkpointer`] trait and the three backends.
//! - [`stream`]: [`FlowEvent`] envelopes and the [`ToolEvent`] sub-protocol.
//!
//! ## Features
//!
//! - `sqlite` (default): persistent checkpointer backed by SQLite.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowengine::{append, node_fn, FlowEngine, StateSchema, END, START};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = StateSchema::new()
//!     .reduced_field("messages", append)
//!     .field("status");
//!
//! let mut flow = FlowEngine::new(schema);
//! flow.add_node(
//!     "greet",
//!     node_fn(|_state| async move {
//!         let mut update = flowengine::FlowState::new();
//!         update.insert("messages".into(), json!(["hello"]));
//!         update.insert("status".into(), json!("done"));
//!         Ok(update)
//!     }),
//! )?;
//! flow.add_edge(START, "greet");
//! flow.add_edge("greet", END);
//!
//! let compiled = flow.build()?;
//! let state = compiled.invoke(None, "session-1").await?;
//! assert_eq!(state["status"], json!("done"));
//! # Ok(())
//! # }
//! ```
//!
//! Routers close the loop for agent-style graphs: a conditional edge
//! re-evaluates its router every time the source node completes, so the same
//! node can route to a tools node one pass and to `END` the next.

pub mod checkpoint;
pub mod error;
pub mod graph;
pub mod state;
pub mod stream;

pub use checkpoint::{
    Checkpoint, CheckpointError, Checkpointer, JsonSerializer, MemoryCheckpointer, Serializer,
    TtlCheckpointer,
};
#[cfg(feature = "sqlite")]
pub use checkpoint::SqliteCheckpointer;
pub use error::{FlowError, NodeError};
pub use graph::{
    node_fn, stream_node_fn, BuildError, CompiledFlow, FlowEngine, FlowNode, NodeEvent,
    NodeEventStream, Router, DEFAULT_STEP_LIMIT, END, START,
};
pub use state::{append, FlowState, Reducer, StateSchema};
pub use stream::{FlowEvent, ToolEvent};

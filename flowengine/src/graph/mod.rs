//! Flow graph: builder, compiled executor, node protocol.
//!
//! Build with [`FlowEngine`] (`add_node` / `add_edge` /
//! `add_conditional_edge`), then [`FlowEngine::build`] produces a
//! [`CompiledFlow`] that runs sessions via `invoke` or `stream`.

mod build_error;
mod compiled;
mod flow_engine;
mod node;

pub use build_error::BuildError;
pub use compiled::CompiledFlow;
pub use flow_engine::{FlowEngine, Router, DEFAULT_STEP_LIMIT, END, START};
pub use node::{node_fn, stream_node_fn, FlowNode, NodeEvent, NodeEventStream};

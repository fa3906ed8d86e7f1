//! Node trait and closure adapters.
//!
//! A node receives the whole state map and produces a *partial* update: only
//! the fields it wants changed, merged by the schema's reducers. Streaming
//! nodes speak the chunk-then-result protocol instead of returning directly.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;
use futures::StreamExt;
use serde_json::Value;

use crate::error::NodeError;
use crate::state::FlowState;

/// One item produced by a streaming node.
///
/// Zero or more `Chunk`s followed by exactly one terminal `Result`; anything
/// after the `Result` is a protocol violation the engine rejects.
#[derive(Debug)]
pub enum NodeEvent {
    /// Incremental payload (token delta, tool sub-event, ...); forwarded to
    /// stream consumers, never merged into state.
    Chunk(Value),
    /// The node's partial state update; merged and checkpointed.
    Result(FlowState),
}

/// Event sequence produced by one streaming node activation.
pub type NodeEventStream = Pin<Box<dyn Stream<Item = Result<NodeEvent, NodeError>> + Send>>;

/// A named unit of work in the graph.
///
/// Implement `run` for ordinary nodes. Streaming nodes return `true` from
/// `is_streaming` and implement `run_stream`; the engine then drives the
/// chunk-then-result protocol and never calls their `run` (the default `run`
/// below drains `run_stream`, discarding chunks, for direct callers).
///
/// **Interaction**: registered as `Arc<dyn FlowNode>` via
/// `FlowEngine::add_node`; executed by `CompiledFlow`.
#[async_trait]
pub trait FlowNode: Send + Sync {
    /// Executes one step: state in, partial update out.
    async fn run(&self, state: FlowState) -> Result<FlowState, NodeError>;

    /// Whether this node speaks the streaming protocol.
    fn is_streaming(&self) -> bool {
        false
    }

    /// Incremental execution: chunks, then one terminal result.
    ///
    /// Only called when `is_streaming()` is true.
    fn run_stream(&self, state: FlowState) -> NodeEventStream {
        let _ = state;
        Box::pin(futures::stream::empty())
    }
}

struct FnNode<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> FlowNode for FnNode<F>
where
    F: Fn(FlowState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FlowState, NodeError>> + Send,
{
    async fn run(&self, state: FlowState) -> Result<FlowState, NodeError> {
        (self.f)(state).await
    }
}

/// Wraps an async closure as a non-streaming node.
///
/// ```rust
/// use flowengine::{node_fn, FlowState};
/// use serde_json::json;
///
/// let node = node_fn(|state: FlowState| async move {
///     let counter = state.get("counter").and_then(|v| v.as_i64()).unwrap_or(0);
///     let mut update = FlowState::new();
///     update.insert("counter".into(), json!(counter + 1));
///     Ok(update)
/// });
/// ```
pub fn node_fn<F, Fut>(f: F) -> std::sync::Arc<dyn FlowNode>
where
    F: Fn(FlowState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FlowState, NodeError>> + Send + 'static,
{
    std::sync::Arc::new(FnNode { f })
}

struct StreamFnNode<F> {
    f: F,
}

#[async_trait]
impl<F> FlowNode for StreamFnNode<F>
where
    F: Fn(FlowState) -> NodeEventStream + Send + Sync,
{
    async fn run(&self, state: FlowState) -> Result<FlowState, NodeError> {
        // Direct (non-streaming) callers: drain, keep the terminal result.
        let mut events = (self.f)(state);
        while let Some(event) = events.next().await {
            if let NodeEvent::Result(update) = event? {
                return Ok(update);
            }
        }
        Err(NodeError::new("stream ended without a result"))
    }

    fn is_streaming(&self) -> bool {
        true
    }

    fn run_stream(&self, state: FlowState) -> NodeEventStream {
        (self.f)(state)
    }
}

/// Wraps a stream-producing closure as a streaming node.
///
/// The closure must yield zero or more [`NodeEvent::Chunk`]s followed by
/// exactly one [`NodeEvent::Result`].
pub fn stream_node_fn<F>(f: F) -> std::sync::Arc<dyn FlowNode>
where
    F: Fn(FlowState) -> NodeEventStream + Send + Sync + 'static,
{
    std::sync::Arc::new(StreamFnNode { f })
}

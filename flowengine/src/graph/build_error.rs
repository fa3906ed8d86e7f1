//! Graph definition errors.
//!
//! Raised synchronously by `FlowEngine::add_node` and `FlowEngine::build`;
//! fatal to graph setup, never retried.

use thiserror::Error;

/// Error while defining or building a flow graph.
///
/// `build()` validates that every edge endpoint resolves, that START has
/// exactly one outgoing transition, that every node is reachable from START
/// (conditional candidates count), and that no node mixes edge kinds.
#[derive(Debug, Error)]
pub enum BuildError {
    /// `add_node` was called twice with the same name.
    #[error("node '{0}' is already registered")]
    DuplicateNode(String),

    /// An edge endpoint names a node that was never added (and is not START/END).
    #[error("unknown node '{0}' referenced by an edge")]
    UnknownNode(String),

    /// START has no outgoing edge or conditional edge.
    #[error("graph has no entry point: add an edge or conditional edge from START")]
    NoEntryPoint,

    /// A registered node cannot be reached from START via any static path.
    #[error("node '{0}' is unreachable from START")]
    UnreachableNode(String),

    /// A node is the source of more than one transition (two edges, or an
    /// edge plus a conditional edge).
    #[error("node '{0}' has conflicting outgoing edges")]
    ConflictingEdges(String),
}

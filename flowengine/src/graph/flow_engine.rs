//! Flow graph builder: nodes, edges, conditional edges.
//!
//! Accumulate nodes with `add_node`, wire them with `add_edge(from, to)` and
//! `add_conditional_edge(from, candidates, router)` using `START` and `END`
//! for entry/exit, then `build()` into an immutable [`CompiledFlow`]. Edge
//! endpoints may name nodes added later; resolution is deferred to `build()`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::checkpoint::{Checkpointer, MemoryCheckpointer};
use crate::graph::build_error::BuildError;
use crate::graph::compiled::CompiledFlow;
use crate::graph::node::FlowNode;
use crate::state::{FlowState, StateSchema};

/// Sentinel for graph entry: use as `from` in `add_edge(START, first_node)`.
/// Never executed as a node.
pub const START: &str = "__start__";

/// Sentinel for graph exit: a transition to `END` terminates execution.
pub const END: &str = "__end__";

/// Default bound on node activations per invocation; large but finite, the
/// backstop against unbounded cycles.
pub const DEFAULT_STEP_LIMIT: usize = 1000;

/// Router for a conditional edge: pure function of state to a destination
/// name, which must belong to the edge's declared candidate set.
pub type Router = Arc<dyn Fn(&FlowState) -> String + Send + Sync>;

/// Outgoing transition of a node (or of START).
#[derive(Clone)]
pub(crate) enum Transition {
    Direct(String),
    Conditional {
        candidates: HashSet<String>,
        router: Router,
    },
}

/// Builder for a stateful workflow graph.
///
/// Owns the state schema and the node registry. `build()` validates the
/// structure and hands back an executable [`CompiledFlow`]; the builder can
/// keep building (build is idempotent and performs no execution).
pub struct FlowEngine {
    schema: StateSchema,
    nodes: HashMap<String, Arc<dyn FlowNode>>,
    edges: Vec<(String, String)>,
    conditional_edges: Vec<(String, HashSet<String>, Router)>,
    checkpointer: Arc<dyn Checkpointer>,
    step_limit: usize,
}

impl FlowEngine {
    /// Creates an engine for the given state schema, with an in-memory
    /// checkpointer and the default step limit.
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: Vec::new(),
            checkpointer: Arc::new(MemoryCheckpointer::new()),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Replaces the checkpoint store (SQLite, TTL, custom backend).
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    /// Overrides the per-invocation step bound.
    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Adds a node; names are unique within a graph.
    ///
    /// Fails with [`BuildError::DuplicateNode`] if the name is taken. Returns
    /// `&mut Self` so calls chain with `?`.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        node: Arc<dyn FlowNode>,
    ) -> Result<&mut Self, BuildError> {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(BuildError::DuplicateNode(name));
        }
        self.nodes.insert(name, node);
        Ok(self)
    }

    /// Adds an unconditional edge from `from` to `to` (`START`/`END` allowed).
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Adds a conditional edge: after `from` completes, `router` picks the
    /// destination from `candidates` (which may include `END`).
    pub fn add_conditional_edge<I, S>(
        &mut self,
        from: impl Into<String>,
        candidates: I,
        router: impl Fn(&FlowState) -> String + Send + Sync + 'static,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let candidates = candidates.into_iter().map(Into::into).collect();
        self.conditional_edges
            .push((from.into(), candidates, Arc::new(router)));
        self
    }

    /// Validates the graph and produces the immutable executable form.
    ///
    /// Checks, in order: every endpoint except `END` names a registered node
    /// or `START`; no node is the source of two transitions; `START` has
    /// exactly one outgoing transition; every registered node is reachable
    /// from `START` (conditional branches count through any candidate).
    pub fn build(&self) -> Result<CompiledFlow, BuildError> {
        for (from, to) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(BuildError::UnknownNode(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(BuildError::UnknownNode(to.clone()));
            }
        }
        for (from, candidates, _) in &self.conditional_edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(BuildError::UnknownNode(from.clone()));
            }
            for candidate in candidates {
                if candidate != END && !self.nodes.contains_key(candidate) {
                    return Err(BuildError::UnknownNode(candidate.clone()));
                }
            }
        }

        let mut transitions: HashMap<String, Transition> = HashMap::new();
        for (from, to) in &self.edges {
            if transitions
                .insert(from.clone(), Transition::Direct(to.clone()))
                .is_some()
            {
                return Err(BuildError::ConflictingEdges(from.clone()));
            }
        }
        for (from, candidates, router) in &self.conditional_edges {
            if transitions
                .insert(
                    from.clone(),
                    Transition::Conditional {
                        candidates: candidates.clone(),
                        router: router.clone(),
                    },
                )
                .is_some()
            {
                return Err(BuildError::ConflictingEdges(from.clone()));
            }
        }

        if !transitions.contains_key(START) {
            return Err(BuildError::NoEntryPoint);
        }

        let mut reachable = HashSet::new();
        let mut queue = VecDeque::from([START.to_string()]);
        while let Some(current) = queue.pop_front() {
            let Some(transition) = transitions.get(&current) else {
                continue;
            };
            let targets: Vec<&String> = match transition {
                Transition::Direct(to) => vec![to],
                Transition::Conditional { candidates, .. } => candidates.iter().collect(),
            };
            for target in targets {
                if target != END && reachable.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }
        for name in self.nodes.keys() {
            if !reachable.contains(name) {
                return Err(BuildError::UnreachableNode(name.clone()));
            }
        }

        Ok(CompiledFlow::new(
            self.schema.clone(),
            self.nodes.clone(),
            transitions,
            self.checkpointer.clone(),
            self.step_limit,
        ))
    }
}

//! Compiled flow: immutable graph, supports invoke and stream.
//!
//! Built by `FlowEngine::build`. Each invocation loads the session's latest
//! checkpoint (or seeds from schema defaults), merges the caller's update,
//! then walks the graph: run node, merge its partial update, checkpoint,
//! route. A checkpoint is committed after every completed step, so a failed
//! or abandoned run resumes from the last good state.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::checkpoint::Checkpointer;
use crate::error::FlowError;
use crate::state::{FlowState, StateSchema};
use crate::stream::FlowEvent;

use super::flow_engine::{Transition, END, START};
use super::node::{FlowNode, NodeEvent};

type EventSender = mpsc::Sender<Result<FlowEvent, FlowError>>;

/// Immutable, executable flow graph.
///
/// Created by `FlowEngine::build()`; cheap to clone (nodes and checkpointer
/// are shared). One `CompiledFlow` serves any number of sessions; callers
/// must not run two invocations for the *same* session id concurrently.
#[derive(Clone)]
pub struct CompiledFlow {
    schema: StateSchema,
    nodes: HashMap<String, Arc<dyn FlowNode>>,
    transitions: HashMap<String, Transition>,
    checkpointer: Arc<dyn Checkpointer>,
    step_limit: usize,
}

impl CompiledFlow {
    pub(crate) fn new(
        schema: StateSchema,
        nodes: HashMap<String, Arc<dyn FlowNode>>,
        transitions: HashMap<String, Transition>,
        checkpointer: Arc<dyn Checkpointer>,
        step_limit: usize,
    ) -> Self {
        Self {
            schema,
            nodes,
            transitions,
            checkpointer,
            step_limit,
        }
    }

    /// Runs the flow to completion and returns the final state.
    ///
    /// Loads the latest checkpoint for `session_id` (schema defaults if
    /// none), merges `update` if provided (pass `None` to simply resume),
    /// then executes from START until END, checkpointing after each step.
    pub async fn invoke(
        &self,
        update: Option<FlowState>,
        session_id: &str,
    ) -> Result<FlowState, FlowError> {
        let (step, mut state) = self.load_or_seed(session_id).await?;
        if let Some(update) = update {
            self.schema.apply(&mut state, update);
        }
        self.run_loop(session_id, &mut state, step, None).await?;
        Ok(state)
    }

    /// Runs the flow, emitting envelopes as a single-pass stream.
    ///
    /// Per node activation: each chunk from a streaming node arrives as
    /// [`FlowEvent::StreamChunk`], then [`FlowEvent::NodeResult`] once the
    /// update is merged and checkpointed. The sequence ends with
    /// [`FlowEvent::WorkflowComplete`], or with one `Err` item on failure.
    /// Dropping the stream stops execution at the next envelope; checkpoints
    /// already committed remain.
    pub fn stream(
        &self,
        update: Option<FlowState>,
        session_id: &str,
    ) -> ReceiverStream<Result<FlowEvent, FlowError>> {
        let (tx, rx) = mpsc::channel(128);
        let flow = self.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            if let Err(err) = flow.stream_inner(update, &session_id, &tx).await {
                error!(session_id = %session_id, error = %err, "flow stream failed");
                let _ = tx.send(Err(err)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Returns the session's latest committed state, or `None` if the session
    /// has no checkpoint.
    pub async fn get_state(&self, session_id: &str) -> Result<Option<FlowState>, FlowError> {
        let checkpoint = self.checkpointer.load(session_id).await?;
        Ok(checkpoint.map(|c| c.state))
    }

    /// Deletes the session's checkpoint; the next `invoke`/`stream` starts
    /// from schema defaults.
    pub async fn reset_session(&self, session_id: &str) -> Result<(), FlowError> {
        self.checkpointer.reset(session_id).await?;
        Ok(())
    }

    async fn stream_inner(
        &self,
        update: Option<FlowState>,
        session_id: &str,
        tx: &EventSender,
    ) -> Result<(), FlowError> {
        let (step, mut state) = self.load_or_seed(session_id).await?;
        if let Some(update) = update {
            self.schema.apply(&mut state, update);
        }
        let completed = self
            .run_loop(session_id, &mut state, step, Some(tx))
            .await?;
        if completed {
            let _ = tx.send(Ok(FlowEvent::WorkflowComplete(state))).await;
        }
        Ok(())
    }

    async fn load_or_seed(&self, session_id: &str) -> Result<(u64, FlowState), FlowError> {
        match self.checkpointer.load(session_id).await? {
            Some(checkpoint) => {
                debug!(
                    session_id,
                    step = checkpoint.step,
                    "resuming from checkpoint"
                );
                Ok((checkpoint.step, checkpoint.state))
            }
            None => Ok((0, self.schema.defaults())),
        }
    }

    /// Shared step loop for invoke() and stream(). `step` is the session's
    /// persistent counter; the per-run counter enforces the step bound.
    /// Returns false if the stream consumer hung up before completion.
    async fn run_loop(
        &self,
        session_id: &str,
        state: &mut FlowState,
        mut step: u64,
        tx: Option<&EventSender>,
    ) -> Result<bool, FlowError> {
        let mut current = self.next_destination(START, state)?;
        let mut steps_this_run = 0usize;

        while current != END {
            if steps_this_run >= self.step_limit {
                return Err(FlowError::StepLimit {
                    limit: self.step_limit,
                });
            }
            debug!(session_id, node = %current, "executing node");

            let update = match self.run_node(&current, state.clone(), tx).await? {
                Some(update) => update,
                None => return Ok(false),
            };

            let emitted = update.clone();
            self.schema.apply(state, update);
            step += 1;
            steps_this_run += 1;
            self.checkpointer.save(session_id, step, state).await?;
            debug!(session_id, step, node = %current, "checkpoint saved");

            if let Some(tx) = tx {
                let event = FlowEvent::NodeResult {
                    node: current.clone(),
                    update: emitted,
                };
                if tx.send(Ok(event)).await.is_err() {
                    return Ok(false);
                }
            }

            current = self.next_destination(&current, state)?;
        }
        Ok(true)
    }

    /// Executes one node activation, forwarding chunks to `tx` if streaming.
    /// Returns `Ok(None)` when the consumer went away mid-node.
    async fn run_node(
        &self,
        name: &str,
        state: FlowState,
        tx: Option<&EventSender>,
    ) -> Result<Option<FlowState>, FlowError> {
        let node = self
            .nodes
            .get(name)
            .expect("compiled graph has all nodes")
            .clone();

        if !node.is_streaming() {
            let update = node
                .run(state)
                .await
                .map_err(|source| FlowError::NodeExecution {
                    node: name.to_string(),
                    source,
                })?;
            return Ok(Some(update));
        }

        let mut events = node.run_stream(state);
        let mut result: Option<FlowState> = None;
        while let Some(event) = events.next().await {
            let event = event.map_err(|source| FlowError::NodeExecution {
                node: name.to_string(),
                source,
            })?;
            match event {
                NodeEvent::Chunk(_) if result.is_some() => {
                    return Err(FlowError::NodeProtocol {
                        node: name.to_string(),
                        reason: "chunk yielded after the terminal result".into(),
                    });
                }
                NodeEvent::Chunk(content) => {
                    if let Some(tx) = tx {
                        if tx.send(Ok(FlowEvent::StreamChunk(content))).await.is_err() {
                            return Ok(None);
                        }
                    }
                }
                NodeEvent::Result(_) if result.is_some() => {
                    return Err(FlowError::NodeProtocol {
                        node: name.to_string(),
                        reason: "more than one result yielded".into(),
                    });
                }
                NodeEvent::Result(update) => {
                    result = Some(update);
                }
            }
        }
        match result {
            Some(update) => Ok(Some(update)),
            None => Err(FlowError::NodeProtocol {
                node: name.to_string(),
                reason: "stream ended without a result".into(),
            }),
        }
    }

    /// Resolves the transition out of `from` against the current state.
    fn next_destination(&self, from: &str, state: &FlowState) -> Result<String, FlowError> {
        match self.transitions.get(from) {
            Some(Transition::Direct(to)) => Ok(to.clone()),
            Some(Transition::Conditional { candidates, router }) => {
                let destination = router(state);
                if !candidates.contains(&destination) {
                    return Err(FlowError::Routing {
                        node: from.to_string(),
                        returned: destination,
                    });
                }
                Ok(destination)
            }
            None => Err(FlowError::NoTransition {
                node: from.to_string(),
            }),
        }
    }
}

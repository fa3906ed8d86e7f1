//! Streaming envelopes: chunk/result ordering, protocol violations,
//! cancellation, the tool sub-protocol.

use std::time::Duration;

use async_stream::stream;
use flowengine::{
    stream_node_fn, FlowEngine, FlowError, FlowEvent, FlowState, NodeEvent, NodeEventStream,
    ToolEvent, END, START,
};
use serde_json::{json, Value};
use tokio_stream::StreamExt;

use crate::common::{counter_of, increment_node, schema, update};

/// Streaming node yielding the given chunks then a `{"text": ...}` result.
fn chunker(chunks: &'static [&'static str], text: &'static str) -> std::sync::Arc<dyn flowengine::FlowNode> {
    stream_node_fn(move |_state| {
        Box::pin(stream! {
            for chunk in chunks {
                yield Ok(NodeEvent::Chunk(json!(chunk)));
            }
            yield Ok(NodeEvent::Result(update(&[("status", json!(text))])));
        }) as NodeEventStream
    })
}

fn text_schema() -> flowengine::StateSchema {
    flowengine::StateSchema::new().field("text").field("status")
}

#[tokio::test]
async fn envelopes_in_chunk_result_complete_order() {
    let mut flow = FlowEngine::new(text_schema());
    flow.add_node(
        "talk",
        stream_node_fn(|_state| {
            Box::pin(stream! {
                yield Ok(NodeEvent::Chunk(json!("a")));
                yield Ok(NodeEvent::Chunk(json!("b")));
                yield Ok(NodeEvent::Result(update(&[("text", json!("ab"))])));
            }) as NodeEventStream
        }),
    )
    .unwrap();
    flow.add_edge(START, "talk");
    flow.add_edge("talk", END);
    let compiled = flow.build().unwrap();

    let events: Vec<_> = compiled.stream(None, "envelopes").collect().await;
    assert_eq!(events.len(), 4);
    match &events[0] {
        Ok(FlowEvent::StreamChunk(c)) => assert_eq!(c, &json!("a")),
        other => panic!("events[0] should be StreamChunk(a), got {:?}", other),
    }
    match &events[1] {
        Ok(FlowEvent::StreamChunk(c)) => assert_eq!(c, &json!("b")),
        other => panic!("events[1] should be StreamChunk(b), got {:?}", other),
    }
    match &events[2] {
        Ok(FlowEvent::NodeResult { node, update }) => {
            assert_eq!(node, "talk");
            assert_eq!(update["text"], json!("ab"));
        }
        other => panic!("events[2] should be NodeResult, got {:?}", other),
    }
    match &events[3] {
        Ok(FlowEvent::WorkflowComplete(state)) => assert_eq!(state["text"], json!("ab")),
        other => panic!("events[3] should be WorkflowComplete, got {:?}", other),
    }
}

#[tokio::test]
async fn non_streaming_node_synthesizes_single_result() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("inc", increment_node()).unwrap();
    flow.add_edge(START, "inc");
    flow.add_edge("inc", END);
    let compiled = flow.build().unwrap();

    let events: Vec<_> = compiled.stream(None, "plain").collect().await;
    assert_eq!(events.len(), 2, "one NodeResult + WorkflowComplete, no chunks");
    assert!(matches!(&events[0], Ok(FlowEvent::NodeResult { node, .. }) if node == "inc"));
    assert!(matches!(&events[1], Ok(FlowEvent::WorkflowComplete(_))));
}

#[tokio::test]
async fn activations_do_not_interleave() {
    let mut flow = FlowEngine::new(text_schema());
    flow.add_node("first", chunker(&["f1", "f2"], "first-done"))
        .unwrap();
    flow.add_node("second", chunker(&["s1"], "second-done"))
        .unwrap();
    flow.add_edge(START, "first");
    flow.add_edge("first", "second");
    flow.add_edge("second", END);
    let compiled = flow.build().unwrap();

    let events: Vec<_> = compiled.stream(None, "interleave").collect().await;
    let shape: Vec<String> = events
        .iter()
        .map(|e| match e {
            Ok(FlowEvent::StreamChunk(c)) => format!("chunk:{}", c.as_str().unwrap_or("?")),
            Ok(FlowEvent::NodeResult { node, .. }) => format!("result:{}", node),
            Ok(FlowEvent::WorkflowComplete(_)) => "complete".to_string(),
            Err(e) => format!("err:{}", e),
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            "chunk:f1",
            "chunk:f2",
            "result:first",
            "chunk:s1",
            "result:second",
            "complete"
        ]
    );
}

#[tokio::test]
async fn invoke_drains_streaming_node_chunks() {
    let mut flow = FlowEngine::new(text_schema());
    flow.add_node("talk", chunker(&["x", "y"], "done")).unwrap();
    flow.add_edge(START, "talk");
    flow.add_edge("talk", END);
    let compiled = flow.build().unwrap();

    let state = compiled.invoke(None, "drained").await.unwrap();
    assert_eq!(state["status"], json!("done"));
    assert!(!state.contains_key("text"), "chunks are never merged into state");
}

#[tokio::test]
async fn chunk_after_result_is_protocol_error() {
    let mut flow = FlowEngine::new(text_schema());
    flow.add_node(
        "bad",
        stream_node_fn(|_state| {
            Box::pin(stream! {
                yield Ok(NodeEvent::Result(update(&[("text", json!("t"))])));
                yield Ok(NodeEvent::Chunk(json!("late")));
            }) as NodeEventStream
        }),
    )
    .unwrap();
    flow.add_edge(START, "bad");
    flow.add_edge("bad", END);
    let compiled = flow.build().unwrap();

    let events: Vec<_> = compiled.stream(None, "late-chunk").collect().await;
    match events.last() {
        Some(Err(FlowError::NodeProtocol { node, .. })) => assert_eq!(node, "bad"),
        other => panic!("expected NodeProtocol error, got {:?}", other),
    }
    // The violating step was never checkpointed.
    assert!(compiled.get_state("late-chunk").await.unwrap().is_none());
}

#[tokio::test]
async fn stream_ending_without_result_is_protocol_error() {
    let mut flow = FlowEngine::new(text_schema());
    flow.add_node(
        "silent",
        stream_node_fn(|_state| {
            Box::pin(stream! {
                yield Ok(NodeEvent::Chunk(json!("only a chunk")));
            }) as NodeEventStream
        }),
    )
    .unwrap();
    flow.add_edge(START, "silent");
    flow.add_edge("silent", END);
    let compiled = flow.build().unwrap();

    let events: Vec<_> = compiled.stream(None, "no-result").collect().await;
    match events.last() {
        Some(Err(FlowError::NodeProtocol { reason, .. })) => {
            assert!(reason.contains("without a result"), "{}", reason)
        }
        other => panic!("expected NodeProtocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn node_error_mid_stream_aborts_without_checkpoint() {
    let mut flow = FlowEngine::new(text_schema());
    flow.add_node(
        "broken",
        stream_node_fn(|_state| {
            Box::pin(stream! {
                yield Ok(NodeEvent::Chunk(json!("before the failure")));
                yield Err(flowengine::NodeError::new("provider disconnected"));
            }) as NodeEventStream
        }),
    )
    .unwrap();
    flow.add_edge(START, "broken");
    flow.add_edge("broken", END);
    let compiled = flow.build().unwrap();

    let events: Vec<_> = compiled.stream(None, "mid-err").collect().await;
    assert!(matches!(events.first(), Some(Ok(FlowEvent::StreamChunk(_)))));
    match events.last() {
        Some(Err(FlowError::NodeExecution { node, .. })) => assert_eq!(node, "broken"),
        other => panic!("expected NodeExecution, got {:?}", other),
    }
    assert!(compiled.get_state("mid-err").await.unwrap().is_none());
}

#[tokio::test]
async fn dropped_consumer_keeps_last_committed_checkpoint() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("inc", increment_node()).unwrap();
    flow.add_node(
        "firehose",
        stream_node_fn(|_state| {
            Box::pin(stream! {
                loop {
                    yield Ok(NodeEvent::Chunk(json!("tick")));
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }) as NodeEventStream
        }),
    )
    .unwrap();
    flow.add_edge(START, "inc");
    flow.add_edge("inc", "firehose");
    flow.add_edge("firehose", END);
    let compiled = flow.build().unwrap();

    let mut events = compiled.stream(None, "cancel");
    // Consume up to the first committed result, then hang up.
    loop {
        match events.next().await {
            Some(Ok(FlowEvent::NodeResult { node, .. })) => {
                assert_eq!(node, "inc");
                break;
            }
            Some(Ok(_)) => continue,
            other => panic!("expected NodeResult before chunks, got {:?}", other),
        }
    }
    drop(events);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = compiled.get_state("cancel").await.unwrap().unwrap();
    assert_eq!(counter_of(&state), 1, "only the committed step persists");
}

#[tokio::test]
async fn tool_sub_events_travel_inside_chunks() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node(
        "tools",
        stream_node_fn(|_state| {
            Box::pin(stream! {
                let executing = ToolEvent::Executing {
                    name: "get_current_weather".into(),
                    arguments: json!({"location": "Jakarta"}),
                };
                yield Ok(NodeEvent::Chunk(executing.to_value()));
                let done = ToolEvent::Result {
                    name: "get_current_weather".into(),
                    output: json!("22 degrees celsius"),
                };
                yield Ok(NodeEvent::Chunk(done.to_value()));
                yield Ok(NodeEvent::Result(update(&[(
                    "messages",
                    json!(["tool: 22 degrees celsius"]),
                )])));
            }) as NodeEventStream
        }),
    )
    .unwrap();
    flow.add_edge(START, "tools");
    flow.add_edge("tools", END);
    let compiled = flow.build().unwrap();

    let events: Vec<_> = compiled.stream(None, "tools").collect().await;
    let phases: Vec<ToolEvent> = events
        .iter()
        .filter_map(|e| match e {
            Ok(FlowEvent::StreamChunk(c)) => ToolEvent::from_value(c),
            _ => None,
        })
        .collect();
    assert_eq!(phases.len(), 2);
    assert!(matches!(&phases[0], ToolEvent::Executing { name, .. } if name == "get_current_weather"));
    assert!(matches!(&phases[1], ToolEvent::Result { output, .. } if output == &json!("22 degrees celsius")));
}

/// Errors and chunks both flow through the same `Result` item type; make sure
/// a plain string chunk is still just a value.
#[tokio::test]
async fn chunk_payloads_are_opaque_values() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node(
        "mixed",
        stream_node_fn(|_state| {
            Box::pin(stream! {
                yield Ok(NodeEvent::Chunk(json!("delta ")));
                yield Ok(NodeEvent::Chunk(json!({"progress": 0.5})));
                yield Ok(NodeEvent::Result(FlowState::new()));
            }) as NodeEventStream
        }),
    )
    .unwrap();
    flow.add_edge(START, "mixed");
    flow.add_edge("mixed", END);
    let compiled = flow.build().unwrap();

    let chunks: Vec<Value> = compiled
        .stream(None, "opaque")
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .filter_map(|e| match e {
            Ok(FlowEvent::StreamChunk(c)) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![json!("delta "), json!({"progress": 0.5})]);
}

//! Build validation: duplicate nodes, unknown endpoints, entry point,
//! reachability, conflicting edges.

use flowengine::{BuildError, FlowEngine, END, START};

use crate::common::{constant_node, schema, update};

fn noop() -> std::sync::Arc<dyn flowengine::FlowNode> {
    constant_node(update(&[]))
}

#[test]
fn duplicate_node_rejected_at_add() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", noop()).unwrap();
    match flow.add_node("a", noop()) {
        Err(BuildError::DuplicateNode(name)) => assert_eq!(name, "a"),
        other => panic!("expected DuplicateNode, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn edge_to_unknown_node_fails_at_build() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", noop()).unwrap();
    flow.add_edge(START, "a");
    flow.add_edge("a", "missing");
    match flow.build() {
        Err(BuildError::UnknownNode(name)) => assert_eq!(name, "missing"),
        other => panic!("expected UnknownNode, got {:?}", other.err()),
    }
}

#[test]
fn conditional_candidate_unknown_fails_at_build() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", noop()).unwrap();
    flow.add_edge(START, "a");
    flow.add_conditional_edge("a", ["ghost", END], |_state| END.to_string());
    match flow.build() {
        Err(BuildError::UnknownNode(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected UnknownNode, got {:?}", other.err()),
    }
}

#[test]
fn edges_may_reference_nodes_added_later() {
    let mut flow = FlowEngine::new(schema());
    flow.add_edge(START, "late");
    flow.add_edge("late", END);
    flow.add_node("late", noop()).unwrap();
    assert!(flow.build().is_ok());
}

#[test]
fn missing_start_edge_is_no_entry_point() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", noop()).unwrap();
    flow.add_edge("a", END);
    match flow.build() {
        Err(BuildError::NoEntryPoint) => {}
        other => panic!("expected NoEntryPoint, got {:?}", other.err()),
    }
}

#[test]
fn node_not_reachable_from_start_fails() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", noop()).unwrap();
    flow.add_node("island", noop()).unwrap();
    flow.add_edge(START, "a");
    flow.add_edge("a", END);
    flow.add_edge("island", END);
    match flow.build() {
        Err(BuildError::UnreachableNode(name)) => assert_eq!(name, "island"),
        other => panic!("expected UnreachableNode, got {:?}", other.err()),
    }
}

#[test]
fn conditional_candidates_count_as_reachable() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("main", noop()).unwrap();
    flow.add_node("tools", noop()).unwrap();
    flow.add_edge(START, "main");
    flow.add_conditional_edge("main", ["tools", END], |_state| END.to_string());
    flow.add_edge("tools", "main");
    assert!(flow.build().is_ok());
}

#[test]
fn two_unconditional_edges_from_one_node_conflict() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", noop()).unwrap();
    flow.add_node("b", noop()).unwrap();
    flow.add_edge(START, "a");
    flow.add_edge("a", "b");
    flow.add_edge("a", END);
    flow.add_edge("b", END);
    match flow.build() {
        Err(BuildError::ConflictingEdges(name)) => assert_eq!(name, "a"),
        other => panic!("expected ConflictingEdges, got {:?}", other.err()),
    }
}

#[test]
fn edge_plus_conditional_edge_from_one_node_conflict() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", noop()).unwrap();
    flow.add_node("b", noop()).unwrap();
    flow.add_edge(START, "a");
    flow.add_edge("a", "b");
    flow.add_conditional_edge("a", ["b", END], |_state| END.to_string());
    flow.add_edge("b", END);
    match flow.build() {
        Err(BuildError::ConflictingEdges(name)) => assert_eq!(name, "a"),
        other => panic!("expected ConflictingEdges, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn build_is_idempotent() {
    let mut flow = FlowEngine::new(schema());
    flow.add_node("a", increment()).unwrap();
    flow.add_edge(START, "a");
    flow.add_edge("a", END);

    let first = flow.build().expect("first build");
    let second = flow.build().expect("second build");

    let s1 = first.invoke(None, "idem-1").await.unwrap();
    let s2 = second.invoke(None, "idem-2").await.unwrap();
    assert_eq!(s1["counter"], s2["counter"]);
}

fn increment() -> std::sync::Arc<dyn flowengine::FlowNode> {
    crate::common::increment_node()
}

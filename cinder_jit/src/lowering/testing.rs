//! Graph fixtures shared by the lowering unit tests.

use std::sync::Arc;

use crate::config::LoweringConfig;
use crate::diagnostics::RecordingDiagnostics;
use crate::heap::{HeapSnapshot, ObjectRef};
use crate::ir::{Graph, NodeId, NodeSnapshot, Operator};

use super::{CreateLowering, Reducer, Reduction};

/// Add a JS operator node with the given value inputs, a dummy context, a
/// dummy frame state when the operator takes one, and `Start` as effect and
/// control.
pub(crate) fn js_node(graph: &mut Graph, op: Operator, values: &[NodeId]) -> NodeId {
    let frame_state = op
        .layout()
        .frame_state
        .then(|| graph.add_node(Operator::StateValues(0), &[]));
    js_node_with_frame_state(graph, op, values, frame_state)
}

pub(crate) fn js_node_with_frame_state(
    graph: &mut Graph,
    op: Operator,
    values: &[NodeId],
    frame_state: Option<NodeId>,
) -> NodeId {
    let context = graph.heap_constant(ObjectRef::new(0));
    let mut inputs = values.to_vec();
    inputs.push(context);
    inputs.extend(frame_state);
    inputs.push(graph.start);
    inputs.push(graph.start);
    graph.add_node(op, &inputs)
}

/// Run the creation lowering on `node` once, asserting it reports nothing.
pub(crate) fn lower_with(
    heap: &HeapSnapshot,
    config: &LoweringConfig,
    graph: &mut Graph,
    node: NodeId,
) -> Reduction {
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let mut lowering = CreateLowering::new(heap, config, diagnostics.clone());
    let reduction = lowering.reduce(graph, node);
    assert!(diagnostics.is_clean(), "{:?}", diagnostics.violations());
    reduction
}

pub(crate) fn lower(heap: &HeapSnapshot, graph: &mut Graph, node: NodeId) -> Reduction {
    lower_with(heap, &LoweringConfig::default(), graph, node)
}

fn snapshot_all(graph: &Graph) -> Vec<NodeSnapshot> {
    graph.iter().map(|(id, _)| graph.snapshot(id)).collect()
}

/// Run the creation lowering on `node` and check that it declined without
/// touching a single node or use edge.
pub(crate) fn assert_declined_with(heap: &HeapSnapshot, config: &LoweringConfig, graph: &mut Graph, node: NodeId) {
    let before = snapshot_all(graph);
    let uses = graph.uses(node).to_vec();

    assert_eq!(lower_with(heap, config, graph, node), Reduction::NoChange);
    assert_eq!(snapshot_all(graph), before);
    assert_eq!(graph.uses(node), uses.as_slice());
}

pub(crate) fn assert_declined(heap: &HeapSnapshot, graph: &mut Graph, node: NodeId) {
    assert_declined_with(heap, &LoweringConfig::default(), graph, node)
}

/// Stores of the region closed by `finish`, in chain order.
pub(crate) fn stores(graph: &Graph, finish: NodeId) -> Vec<Operator> {
    let mut chain = Vec::new();
    let mut effect = graph.effect_input(finish);
    while !matches!(graph.op(effect), Operator::Allocate(_)) {
        chain.push(graph.op(effect));
        effect = graph.effect_input(effect);
    }
    chain.reverse();
    chain
}

/// Field offsets of the stores of the region closed by `finish`.
pub(crate) fn field_offsets(graph: &Graph, finish: NodeId) -> Vec<u32> {
    stores(graph, finish)
        .into_iter()
        .filter_map(|op| match op {
            Operator::StoreField(access) => Some(access.offset),
            _ => None,
        })
        .collect()
}

/// Constant byte size of the allocation behind `finish`.
pub(crate) fn allocation_size(graph: &Graph, finish: NodeId) -> Option<i32> {
    let allocation = graph.value_input(finish, 0);
    graph.node(graph.value_input(allocation, 0)).as_int32()
}

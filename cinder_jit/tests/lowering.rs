//! End-to-end creation lowering: JS creation nodes in, allocations and
//! calls out, then scheduled and rendered by the listing generator.

use std::sync::Arc;

use cinder_jit::calls::{CallFlags, Linkage};
use cinder_jit::codegen::{self, CodeFlags, ListingGenerator};
use cinder_jit::diagnostics::RecordingDiagnostics;
use cinder_jit::heap::{
    AllocationSiteData, ElementsKind, FieldDescriptor, FieldRepresentation,
    FunctionData, FunctionKind, HeapBroker, HeapSnapshot, HeapValue, JSObjectData, MapData,
    ObjectRef, SharedInfoData,
};
use cinder_jit::ir::operators::{ControlOp, CreateLiteralParameters, FeedbackSlot, PretenureFlag};
use cinder_jit::ir::{Graph, NodeId, Operator};
use cinder_jit::{lower_creations, LoweringConfig};

/// Straight-line function body: every JS node is chained on one effect and
/// control path.
struct Body {
    graph: Graph,
    context: NodeId,
    frame_state: NodeId,
    effect: NodeId,
    control: NodeId,
}

impl Body {
    fn new() -> Self {
        let mut graph = Graph::new();
        let start = graph.start;
        let context = graph.add_node(Operator::Parameter(2), &[start]);
        let frame_state = graph.add_node(Operator::StateValues(0), &[]);
        Body {
            graph,
            context,
            frame_state,
            effect: start,
            control: start,
        }
    }

    fn parameter(&mut self, index: u32) -> NodeId {
        let start = self.graph.start;
        self.graph.add_node(Operator::Parameter(index), &[start])
    }

    fn js(&mut self, op: Operator, values: &[NodeId]) -> NodeId {
        let mut inputs = values.to_vec();
        inputs.push(self.context);
        if op.layout().frame_state {
            inputs.push(self.frame_state);
        }
        inputs.push(self.effect);
        inputs.push(self.control);
        let node = self.graph.add_node(op, &inputs);
        self.effect = node;
        self.control = node;
        node
    }

    fn finish(mut self, value: NodeId) -> Graph {
        let pop = self.graph.int32_constant(0);
        let ret = self.graph.add_node(
            Operator::Control(ControlOp::Return(1)),
            &[pop, value, self.effect, self.control],
        );
        self.graph.merge_control_to_end(ret);
        self.graph
    }
}

fn count(graph: &Graph, matches: impl Fn(Operator) -> bool) -> usize {
    graph.live_ids().filter(|&id| matches(graph.op(id))).count()
}

/// Closure whose feedback slot 0 holds an allocation site for a two-field
/// object literal.
fn literal_closure(heap: &mut HeapSnapshot) -> ObjectRef {
    let map = MapData::object_with_in_object_properties(2)
        .with_field(FieldDescriptor::field("a", FieldRepresentation::Smi, 0))
        .with_field(FieldDescriptor::field("b", FieldRepresentation::Tagged, 1));
    let map = heap.add_map(map);
    let name = heap.add_string("b");
    let elements = heap.roots().empty_fixed_array;
    let boilerplate = heap.add_js_object(JSObjectData {
        map,
        elements,
        out_of_object_properties: 0,
        fields: vec![HeapValue::Smi(7), HeapValue::Object(name)],
        length: None,
    });
    let site = heap.add_allocation_site(AllocationSiteData {
        boilerplate: Some(boilerplate),
        elements_kind: ElementsKind::Packed,
        pretenure: PretenureFlag::NotTenured,
        can_inline_call: true,
    });
    let vector = heap.add_feedback_vector(vec![Some(site)]);
    let shared = heap.add_shared_info(SharedInfoData {
        kind: FunctionKind::Normal,
        formal_parameter_count: 0,
        has_duplicate_parameters: false,
        register_count: 0,
    });
    heap.add_function(FunctionData {
        shared,
        initial_map: None,
        feedback_vector: Some(vector),
        is_constructor: false,
    })
}

fn object_literal(closure: NodeId) -> (Operator, [NodeId; 1]) {
    let params = CreateLiteralParameters {
        constant: ObjectRef::new(0),
        slot: FeedbackSlot(0),
        length: 0,
        flags: 0,
    };
    (Operator::JSCreateLiteralObject(params), [closure])
}

#[test]
fn test_mixed_creations_lower_and_compile() {
    let mut heap = HeapSnapshot::new();
    let closure = literal_closure(&mut heap);
    let linkage = Linkage::shared();
    let diagnostics = RecordingDiagnostics::new();

    let mut body = Body::new();
    let unknown = body.parameter(0);
    let value = body.graph.number_constant(1.5);
    let done = body.graph.heap_constant(heap.roots().false_value);
    let closure = body.graph.heap_constant(closure);

    body.js(Operator::JSCreateIterResultObject, &[value, done]);
    let (op, values) = object_literal(closure);
    body.js(op, &values);
    body.js(Operator::JSCreateEmptyLiteralObject, &[]);
    let created = body.js(Operator::JSCreate, &[unknown, unknown]);
    let mut graph = body.finish(created);

    let stats = lower_creations(
        &mut graph,
        &heap,
        &linkage,
        &LoweringConfig::default(),
        Arc::new(diagnostics.clone()),
    );

    assert!(diagnostics.is_clean(), "{:?}", diagnostics.violations());
    assert_eq!(count(&graph, |op| op.is_js_create()), 0);
    assert_eq!(stats.reductions(), 4);
    assert!(stats.nodes_added() > 0);
    assert_eq!(count(&graph, |op| matches!(op, Operator::Call(_))), 1);
    assert!(count(&graph, |op| matches!(op, Operator::Allocate(_))) >= 3);
    graph.verify().unwrap();

    let descriptor = linkage.descriptor(linkage.js_call_descriptor(1, CallFlags::empty()));
    let listing = codegen::compile(
        &graph,
        &descriptor,
        &mut ListingGenerator::new(),
        "mixed",
        CodeFlags::empty(),
    )
    .unwrap();
    assert!(listing.contains("Allocate"));
    assert!(listing.contains("StoreField"));
    assert!(listing.contains("Call"));
    assert!(listing.contains("return"));
}

#[test]
fn test_unlowered_creation_is_rejected_by_codegen() {
    let linkage = Linkage::shared();
    let mut body = Body::new();
    let unknown = body.parameter(0);
    let created = body.js(Operator::JSCreate, &[unknown, unknown]);
    let graph = body.finish(created);

    let descriptor = linkage.descriptor(linkage.js_call_descriptor(1, CallFlags::empty()));
    let result = codegen::compile(
        &graph,
        &descriptor,
        &mut ListingGenerator::new(),
        "raw",
        CodeFlags::empty(),
    );
    assert!(result.is_err());
}

#[test]
fn test_declined_fast_path_falls_back_to_call() {
    let mut heap = HeapSnapshot::new();
    let closure = literal_closure(&mut heap);
    let linkage = Linkage::shared();
    let diagnostics = RecordingDiagnostics::new();

    let mut body = Body::new();
    let closure = body.graph.heap_constant(closure);
    let (op, values) = object_literal(closure);
    let literal = body.js(op, &values);
    let mut graph = body.finish(literal);

    let config = LoweringConfig::no_inline_allocation();
    lower_creations(
        &mut graph,
        &heap,
        &linkage,
        &config,
        Arc::new(diagnostics.clone()),
    );

    assert!(diagnostics.is_clean());
    assert_eq!(count(&graph, |op| op.is_js_create()), 0);
    assert_eq!(count(&graph, |op| matches!(op, Operator::Allocate(_))), 0);
    assert_eq!(count(&graph, |op| matches!(op, Operator::Call(_))), 1);
    graph.verify().unwrap();
}

//! Array construction and backing stores.

use smallvec::SmallVec;

use crate::heap::layout::{self, HOLE_NAN_BITS};
use crate::heap::{ElementsKind, ObjectRef};
use crate::ir::operators::{CreateArrayParameters, FeedbackSlot, PretenureFlag};
use crate::ir::{Graph, NodeId, Operator, Type, TypeBits};

use super::access::AccessBuilder;
use super::create::CreateLowering;
use super::Reduction;

/// Capacity preallocated by `new Array()`.
const PREALLOCATED_ELEMENTS: u32 = 4;

/// Byte size of a backing store of `capacity` elements of `kind`.
fn elements_size(kind: ElementsKind, capacity: u32) -> u32 {
    if kind.is_double() {
        layout::fixed_double_array_size(capacity)
    } else {
        layout::fixed_array_size(capacity)
    }
}

impl CreateLowering<'_> {
    // =========================================================================
    // Backing Stores
    // =========================================================================

    /// Allocate a backing store of `capacity` holes. Returns the finished
    /// region, which is both the store and the new effect.
    pub(super) fn allocate_elements(
        &self,
        graph: &mut Graph,
        effect: NodeId,
        control: NodeId,
        kind: ElementsKind,
        capacity: u32,
        pretenure: PretenureFlag,
    ) -> NodeId {
        let roots = self.broker.roots();
        if kind.is_double() {
            let hole = graph.float64_constant(f64::from_bits(HOLE_NAN_BITS));
            let mut builder = self.builder(graph, effect, control);
            builder.allocate_double_array(capacity, roots.fixed_double_array_map, pretenure);
            for index in 0..capacity {
                builder.store_element(AccessBuilder::for_fixed_double_array_element(), index, hole);
            }
            builder.finish()
        } else {
            let hole = graph.heap_constant(roots.the_hole);
            let access = AccessBuilder::for_fixed_array_element(kind);
            let mut builder = self.builder(graph, effect, control);
            builder.allocate_fixed_array(capacity, roots.fixed_array_map, pretenure);
            for index in 0..capacity {
                builder.store_element(access, index, hole);
            }
            builder.finish()
        }
    }

    /// Allocate a backing store holding `values`.
    pub(super) fn allocate_elements_with_values(
        &self,
        graph: &mut Graph,
        effect: NodeId,
        control: NodeId,
        kind: ElementsKind,
        values: &[NodeId],
        pretenure: PretenureFlag,
    ) -> NodeId {
        let roots = self.broker.roots();
        let length = values.len() as u32;
        let mut builder = self.builder(graph, effect, control);
        let access = if kind.is_double() {
            builder.allocate_double_array(length, roots.fixed_double_array_map, pretenure);
            AccessBuilder::for_fixed_double_array_element()
        } else {
            builder.allocate_fixed_array(length, roots.fixed_array_map, pretenure);
            AccessBuilder::for_fixed_array_element(kind)
        };
        for (index, &value) in values.iter().enumerate() {
            builder.store_element(access, index as u32, value);
        }
        builder.finish()
    }

    // =========================================================================
    // JSCreateArray
    // =========================================================================

    /// `new Array(...)` called directly (no subclassing) with allocation
    /// site feedback that allows inlining.
    pub(super) fn reduce_create_array(
        &self,
        graph: &mut Graph,
        node: NodeId,
        params: CreateArrayParameters,
    ) -> Reduction {
        let target = graph.value_input(node, 0);
        let new_target = graph.value_input(node, 1);
        if target != new_target {
            return Reduction::NoChange;
        }
        let Some(site) = params.site.and_then(|site| self.broker.allocation_site(site)) else {
            return Reduction::NoChange;
        };
        let kind = site.elements_kind;
        if !site.can_inline_call || !kind.is_fast() {
            return Reduction::NoChange;
        }
        let pretenure = self.pretenure_of(site);

        match params.arity {
            0 => self.reduce_new_array(
                graph,
                node,
                ArrayLength::Zero,
                kind,
                PREALLOCATED_ELEMENTS,
                pretenure,
            ),
            1 => {
                let length = graph.value_input(node, 2);
                let length_type = self.type_of(graph, length);
                if !length_type.maybe(Type::number()) {
                    // A single non-number argument becomes the only element.
                    return self.reduce_new_array_with_values(
                        graph,
                        node,
                        &[length],
                        kind.to_object(),
                        pretenure,
                    );
                }
                match constant_length(length_type) {
                    Some(capacity) if capacity <= self.config.element_loop_unroll_limit => {
                        let length = ArrayLength::Node(length);
                        self.reduce_new_array(graph, node, length, kind, capacity, pretenure)
                    }
                    _ => Reduction::NoChange,
                }
            }
            arity if arity <= self.config.max_inline_array_values => {
                let values: SmallVec<[NodeId; 8]> =
                    SmallVec::from_slice(&graph.value_inputs(node)[2..]);
                self.reduce_new_array_with_values(graph, node, &values, kind, pretenure)
            }
            _ => Reduction::NoChange,
        }
    }

    /// Empty array literal `[]` with allocation site feedback.
    pub(super) fn reduce_create_empty_literal_array(
        &self,
        graph: &mut Graph,
        node: NodeId,
        slot: FeedbackSlot,
    ) -> Reduction {
        let Some(site) = self
            .literal_feedback(graph, node, slot.0)
            .and_then(|feedback| self.broker.allocation_site(feedback))
        else {
            return Reduction::NoChange;
        };
        if !site.elements_kind.is_fast() {
            return Reduction::NoChange;
        }
        let pretenure = self.pretenure_of(site);
        self.reduce_new_array(graph, node, ArrayLength::Zero, site.elements_kind, 0, pretenure)
    }

    /// Array of `length` with a hole-filled backing store of `capacity`.
    fn reduce_new_array(
        &self,
        graph: &mut Graph,
        node: NodeId,
        length: ArrayLength,
        kind: ElementsKind,
        capacity: u32,
        pretenure: PretenureFlag,
    ) -> Reduction {
        let kind = match length {
            ArrayLength::Node(length) if self.type_of(graph, length).max() > 0.0 => kind.to_holey(),
            _ => kind,
        };
        let Some(map) = self.broker.native_context().js_array_map(kind) else {
            return Reduction::NoChange;
        };
        if !self.fits(elements_size(kind, capacity)) {
            return Reduction::NoChange;
        }

        let effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let (elements, effect) = if capacity == 0 {
            (graph.heap_constant(self.broker.roots().empty_fixed_array), effect)
        } else {
            let elements = self.allocate_elements(graph, effect, control, kind, capacity, pretenure);
            (elements, elements)
        };
        let length = match length {
            ArrayLength::Zero => graph.number_constant(0.0),
            ArrayLength::Node(length) => length,
        };
        self.finish_js_array(graph, node, JSArrayParts { map, kind, elements, length }, effect, pretenure)
    }

    /// Array holding `values`, each checked against the elements kind.
    fn reduce_new_array_with_values(
        &self,
        graph: &mut Graph,
        node: NodeId,
        values: &[NodeId],
        kind: ElementsKind,
        pretenure: PretenureFlag,
    ) -> Reduction {
        let Some(map) = self.broker.native_context().js_array_map(kind) else {
            return Reduction::NoChange;
        };
        if !self.fits(elements_size(kind, values.len() as u32)) {
            return Reduction::NoChange;
        }

        let mut effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let mut checked: SmallVec<[NodeId; 8]> = SmallVec::with_capacity(values.len());
        for &value in values {
            let ty = self.type_of(graph, value);
            let value = if kind.is_smi() {
                if ty.is(Type::signed_small()) {
                    value
                } else {
                    effect = graph.add_node_with_type(
                        Operator::CheckSmi,
                        &[value, effect, control],
                        Type::signed_small(),
                    );
                    effect
                }
            } else if kind.is_double() {
                let number = if ty.is(Type::number()) {
                    value
                } else {
                    effect = graph.add_node_with_type(
                        Operator::CheckNumber,
                        &[value, effect, control],
                        Type::number(),
                    );
                    effect
                };
                graph.add_node_with_type(Operator::NumberSilenceNaN, &[number], Type::number())
            } else {
                value
            };
            checked.push(value);
        }

        let elements =
            self.allocate_elements_with_values(graph, effect, control, kind, &checked, pretenure);
        let length = graph.number_constant(values.len() as f64);
        self.finish_js_array(graph, node, JSArrayParts { map, kind, elements, length }, elements, pretenure)
    }

    /// Allocate the `JSArray` itself and turn `node` into its region.
    fn finish_js_array(
        &self,
        graph: &mut Graph,
        node: NodeId,
        parts: JSArrayParts,
        effect: NodeId,
        pretenure: PretenureFlag,
    ) -> Reduction {
        let control = graph.control_input(node);
        let mut builder = self.builder(graph, effect, control);
        builder.allocate(layout::JS_ARRAY_SIZE, pretenure, Type::from_bits(TypeBits::ARRAY));
        self.store_object_header(&mut builder, parts.map, parts.elements);
        builder.store_field(AccessBuilder::for_js_array_length(parts.kind), parts.length);
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }
}

/// Length of an array built by `reduce_new_array`.
#[derive(Clone, Copy)]
enum ArrayLength {
    Zero,
    Node(NodeId),
}

struct JSArrayParts {
    map: ObjectRef,
    kind: ElementsKind,
    elements: NodeId,
    length: NodeId,
}

/// The value of a length known to be one non-negative small integer.
fn constant_length(ty: Type) -> Option<u32> {
    if !ty.is(Type::signed_small()) {
        return None;
    }
    let (min, max) = (ty.min(), ty.max());
    (min == max && min >= 0.0).then_some(min as u32)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::LoweringConfig;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::heap::{FunctionData, FunctionKind, HeapBroker, HeapSnapshot, SharedInfoData};
    use crate::ir::{ElementAccess, WriteBarrierKind};
    use crate::lowering::testing::{
        allocation_size, assert_declined, assert_declined_with, js_node, lower, lower_with, stores,
    };
    use crate::lowering::Reducer;

    fn create_array(graph: &mut Graph, site: ObjectRef, values: &[NodeId]) -> NodeId {
        let array_function = graph.heap_constant(ObjectRef::new(1_000));
        let mut inputs = vec![array_function, array_function];
        inputs.extend_from_slice(values);
        js_node(
            graph,
            Operator::JSCreateArray(CreateArrayParameters {
                arity: values.len() as u32,
                site: Some(site),
            }),
            &inputs,
        )
    }

    fn count(graph: &Graph, op: Operator) -> usize {
        graph.live_ids().filter(|&id| graph.op(id) == op).count()
    }

    /// The map stored into the array behind `finish`.
    fn array_map(graph: &Graph, finish: NodeId) -> Option<ObjectRef> {
        let allocation = graph.value_input(finish, 0);
        graph
            .uses(allocation)
            .iter()
            .copied()
            .find(|&user| matches!(graph.op(user), Operator::StoreField(access) if access.offset == 0))
            .and_then(|store| graph.node(graph.value_input(store, 1)).as_heap_constant())
    }

    #[test]
    fn test_array_without_arguments_preallocates() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let node = create_array(&mut graph, site, &[]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        assert_eq!(allocation_size(&graph, node), Some(layout::JS_ARRAY_SIZE as i32));
        assert_eq!(
            array_map(&graph, node),
            heap.native_context().js_array_map(ElementsKind::PackedSmi)
        );
        let elements = graph.effect_input(graph.effect_input(graph.value_input(node, 0)));
        assert_eq!(allocation_size(&graph, elements), Some(layout::fixed_array_size(4) as i32));
        // Map, length and four holes.
        assert_eq!(stores(&graph, elements).len(), 6);
    }

    #[test]
    fn test_array_length_at_unroll_limit() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let length = graph.number_constant(16.0);
        let node = create_array(&mut graph, site, &[length]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        // A positive length always makes the array holey.
        assert_eq!(
            array_map(&graph, node),
            heap.native_context().js_array_map(ElementsKind::HoleySmi)
        );
    }

    #[test]
    fn test_array_length_above_unroll_limit_declines() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let length = graph.number_constant(17.0);
        let node = create_array(&mut graph, site, &[length]);

        assert_declined(&heap, &mut graph, node);
        assert!(matches!(graph.op(node), Operator::JSCreateArray(_)));
    }

    #[test]
    fn test_array_with_unknown_length_declines() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let length = graph.add_node_with_type(Operator::Parameter(1), &[graph.start], Type::number());
        let node = create_array(&mut graph, site, &[length]);

        assert_declined(&heap, &mut graph, node);
    }

    #[test]
    fn test_single_non_number_argument() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let string = heap.add_string("x");
        let mut graph = Graph::new();
        let value = graph.heap_constant(string);
        let node = create_array(&mut graph, site, &[value]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        assert_eq!(
            array_map(&graph, node),
            heap.native_context().js_array_map(ElementsKind::Packed)
        );
        assert_eq!(count(&graph, Operator::CheckSmi), 0);
    }

    #[test]
    fn test_smi_values_are_checked() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let a = graph.add_node(Operator::Parameter(1), &[graph.start]);
        let b = graph.number_constant(3.0);
        let c = graph.add_node(Operator::Parameter(2), &[graph.start]);
        let node = create_array(&mut graph, site, &[a, b, c]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        assert_eq!(count(&graph, Operator::CheckSmi), 2);
    }

    #[test]
    fn test_double_values_are_silenced() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedDouble, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let a = graph.number_constant(1.5);
        let b = graph.add_node(Operator::Parameter(1), &[graph.start]);
        let node = create_array(&mut graph, site, &[a, b]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        assert_eq!(count(&graph, Operator::CheckNumber), 1);
        assert_eq!(count(&graph, Operator::NumberSilenceNaN), 2);
    }

    #[test]
    fn test_inline_values_limit() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::Packed, PretenureFlag::NotTenured);
        let config = LoweringConfig {
            max_inline_array_values: 3,
            ..Default::default()
        };
        let mut graph = Graph::new();
        let value = graph.heap_constant(heap.roots().undefined);
        let at_limit = create_array(&mut graph, site, &[value; 3]);
        let above = create_array(&mut graph, site, &[value; 4]);

        assert_eq!(lower_with(&heap, &config, &mut graph, at_limit), Reduction::Changed(at_limit));
        assert_declined_with(&heap, &config, &mut graph, above);
    }

    #[test]
    fn test_subclass_construction_declines() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let target = graph.heap_constant(ObjectRef::new(1_000));
        let new_target = graph.heap_constant(ObjectRef::new(1_001));
        let node = js_node(
            &mut graph,
            Operator::JSCreateArray(CreateArrayParameters { arity: 0, site: Some(site) }),
            &[target, new_target],
        );

        assert_declined(&heap, &mut graph, node);
    }

    fn element_barrier(graph: &Graph, elements: NodeId) -> WriteBarrierKind {
        stores(graph, elements)
            .into_iter()
            .find_map(|op| match op {
                Operator::StoreElement(ElementAccess { write_barrier, .. }) => Some(write_barrier),
                _ => None,
            })
            .unwrap_or(WriteBarrierKind::None)
    }

    #[test]
    fn test_pretenured_site_keeps_barriers() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::Packed, PretenureFlag::Tenured);
        let object = heap.add_string("x");
        let mut graph = Graph::new();
        let value = graph.heap_constant(object);
        let node = create_array(&mut graph, site, &[value, value]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        let allocation = graph.value_input(node, 0);
        assert_eq!(graph.op(allocation), Operator::Allocate(PretenureFlag::Tenured));
        let elements = graph.effect_input(graph.effect_input(allocation));
        assert_eq!(element_barrier(&graph, elements), WriteBarrierKind::Full);
    }

    #[test]
    fn test_pretenuring_can_be_disabled() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::Packed, PretenureFlag::Tenured);
        let object = heap.add_string("x");
        let config = LoweringConfig {
            allocation_site_pretenuring: false,
            ..Default::default()
        };
        let mut graph = Graph::new();
        let value = graph.heap_constant(object);
        let node = create_array(&mut graph, site, &[value, value]);

        assert_eq!(lower_with(&heap, &config, &mut graph, node), Reduction::Changed(node));
        let allocation = graph.value_input(node, 0);
        assert_eq!(graph.op(allocation), Operator::Allocate(PretenureFlag::NotTenured));
        let elements = graph.effect_input(graph.effect_input(allocation));
        assert_eq!(element_barrier(&graph, elements), WriteBarrierKind::None);
    }

    #[test]
    fn test_double_holes_use_hole_nan() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedDouble, PretenureFlag::NotTenured);
        let mut graph = Graph::new();
        let node = create_array(&mut graph, site, &[]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        let hole = graph.float64_constant(f64::from_bits(HOLE_NAN_BITS));
        let elements = graph.effect_input(graph.effect_input(graph.value_input(node, 0)));
        let last_store = graph.effect_input(elements);
        assert_eq!(graph.value_input(last_store, 2), hole);
    }

    #[test]
    fn test_empty_literal_array_uses_feedback() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::HoleySmi, PretenureFlag::NotTenured);
        let vector = heap.add_feedback_vector(vec![None, Some(site)]);
        let shared = heap.add_shared_info(SharedInfoData {
            kind: FunctionKind::Normal,
            formal_parameter_count: 0,
            has_duplicate_parameters: false,
            register_count: 0,
        });
        let closure = heap.add_function(FunctionData {
            shared,
            initial_map: None,
            feedback_vector: Some(vector),
            is_constructor: false,
        });
        let mut graph = Graph::new();
        let closure = graph.heap_constant(closure);
        let node = js_node(&mut graph, Operator::JSCreateEmptyLiteralArray(FeedbackSlot(1)), &[closure]);
        let missing = js_node(&mut graph, Operator::JSCreateEmptyLiteralArray(FeedbackSlot(0)), &[closure]);

        assert_eq!(lower(&heap, &mut graph, node), Reduction::Changed(node));
        assert_eq!(
            array_map(&graph, node),
            heap.native_context().js_array_map(ElementsKind::HoleySmi)
        );
        // Capacity zero: the elements are the empty fixed array.
        let elements = stores(&graph, node)[2];
        assert!(matches!(elements, Operator::StoreField(access) if access.offset == 16));
        assert_eq!(lower(&heap, &mut graph, missing), Reduction::NoChange);
    }

    #[test]
    fn test_empty_literal_array_with_configured_vector() {
        let mut heap = HeapSnapshot::new();
        let site = heap.add_array_site(ElementsKind::PackedSmi, PretenureFlag::NotTenured);
        let vector = heap.add_feedback_vector(vec![Some(site)]);
        let config = LoweringConfig::default();
        let mut graph = Graph::new();
        let closure = graph.add_node(Operator::Parameter(0), &[graph.start]);
        let node = js_node(&mut graph, Operator::JSCreateEmptyLiteralArray(FeedbackSlot(0)), &[closure]);

        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let mut lowering = CreateLowering::new(&heap, &config, diagnostics).with_feedback_vector(vector);
        assert_eq!(lowering.reduce(&mut graph, node), Reduction::Changed(node));
    }
}

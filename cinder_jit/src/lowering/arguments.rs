//! Arguments objects and rest parameters.
//!
//! In the outermost frame the actual arguments are only known at run time,
//! so the backing store is copied out of the caller's frame by
//! `NewUnmappedArgumentsElements`. In an inlined frame the frame state
//! records every argument value and the backing store is built from them
//! directly.

use smallvec::SmallVec;

use crate::heap::layout::{self, context};
use crate::heap::{ElementsKind, SharedInfoData};
use crate::ir::operators::{frame_state, CreateArgumentsType, FrameStateInfo, FrameStateKind, PretenureFlag};
use crate::ir::{Graph, NodeId, Operator, Type, TypeBits};

use super::access::AccessBuilder;
use super::create::CreateLowering;
use super::Reduction;

/// Argument values of an inlined call, receiver excluded.
type ArgumentValues = SmallVec<[NodeId; 8]>;

impl CreateLowering<'_> {
    pub(super) fn reduce_create_arguments(
        &self,
        graph: &mut Graph,
        node: NodeId,
        kind: CreateArgumentsType,
    ) -> Reduction {
        let Some(state) = graph.frame_state_input(node) else {
            return Reduction::NoChange;
        };
        let Operator::FrameState(info) = graph.op(state) else {
            return Reduction::NoChange;
        };
        let Some(shared) = info.shared_info.and_then(|shared| self.broker.shared_info(shared)) else {
            return Reduction::NoChange;
        };
        let outer = graph.value_input(state, frame_state::OUTER_STATE);
        if matches!(graph.op(outer), Operator::FrameState(_)) {
            self.reduce_inlined_arguments(graph, node, kind, state, shared)
        } else {
            self.reduce_outermost_arguments(graph, node, kind, shared)
        }
    }

    // =========================================================================
    // Outermost Frame
    // =========================================================================

    fn reduce_outermost_arguments(
        &self,
        graph: &mut Graph,
        node: NodeId,
        kind: CreateArgumentsType,
        shared: &SharedInfoData,
    ) -> Reduction {
        let native_context = self.broker.native_context();
        let formal_count = shared.formal_parameter_count;
        let (map, size, skipped, is_rest) = match kind {
            // Aliased parameters need the runtime's parameter map.
            CreateArgumentsType::Mapped if shared.has_duplicate_parameters || formal_count > 0 => {
                return Reduction::NoChange;
            }
            CreateArgumentsType::Mapped => {
                (native_context.sloppy_arguments_map, layout::SLOPPY_ARGUMENTS_SIZE, 0, false)
            }
            CreateArgumentsType::Unmapped => (
                native_context.strict_arguments_map,
                layout::STRICT_ARGUMENTS_SIZE,
                formal_count,
                false,
            ),
            CreateArgumentsType::Rest => {
                let Some(map) = native_context.js_array_map(ElementsKind::Packed) else {
                    return Reduction::NoChange;
                };
                (map, layout::JS_ARRAY_SIZE, formal_count, true)
            }
        };

        let callee = graph.value_input(node, 0);
        let effect = graph.effect_input(node);
        let control = graph.start;
        let frame = graph.add_node_with_type(Operator::ArgumentsFrame, &[], Type::machine());
        let length = graph.add_node_with_type(
            Operator::ArgumentsLength {
                formal_parameter_count: skipped,
                is_rest_length: is_rest,
            },
            &[frame],
            Type::signed_small(),
        );
        let elements = graph.add_node_with_type(
            Operator::NewUnmappedArgumentsElements,
            &[frame, length, effect],
            Type::from_bits(TypeBits::OTHER_INTERNAL),
        );

        let mut builder = self.builder(graph, elements, control);
        let ty = if is_rest {
            Type::from_bits(TypeBits::ARRAY)
        } else {
            Type::from_bits(TypeBits::OTHER_OBJECT)
        };
        builder.allocate(size, PretenureFlag::NotTenured, ty);
        self.store_object_header(&mut builder, map, elements);
        if is_rest {
            builder.store_field(AccessBuilder::for_js_array_length(ElementsKind::Packed), length);
        } else {
            builder.store_field(AccessBuilder::for_arguments_length(), length);
        }
        if kind == CreateArgumentsType::Mapped {
            builder.store_field(AccessBuilder::for_arguments_callee(), callee);
        }
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    // =========================================================================
    // Inlined Frames
    // =========================================================================

    fn reduce_inlined_arguments(
        &self,
        graph: &mut Graph,
        node: NodeId,
        kind: CreateArgumentsType,
        state: NodeId,
        shared: &SharedInfoData,
    ) -> Reduction {
        if kind == CreateArgumentsType::Mapped && shared.has_duplicate_parameters {
            return Reduction::NoChange;
        }
        let Some(arguments) = arguments_of(graph, arguments_state(graph, state)) else {
            return Reduction::NoChange;
        };
        let native_context = self.broker.native_context();
        let formal_count = shared.formal_parameter_count;
        let argument_count = arguments.len() as u32;
        // Mapped elements: parameter map of mapped_count + 2 slots plus the
        // unmapped store of every argument.
        let largest_store = layout::fixed_array_size(argument_count.max(formal_count.min(argument_count) + 2));
        if !self.fits(largest_store) {
            return Reduction::NoChange;
        }

        let callee = graph.value_input(node, 0);
        let context = graph.context_input(node);
        let effect = graph.effect_input(node);
        let control = graph.start;

        let (map, size, length, elements, effect) = match kind {
            CreateArgumentsType::Mapped => {
                let Some(context) = context else {
                    return Reduction::NoChange;
                };
                let (elements, aliased) =
                    self.allocate_aliased_arguments(graph, effect, control, &arguments, context, formal_count);
                let map = if aliased {
                    native_context.fast_aliased_arguments_map
                } else {
                    native_context.sloppy_arguments_map
                };
                let effect = if elements.allocated { elements.node } else { effect };
                (map, layout::SLOPPY_ARGUMENTS_SIZE, argument_count, elements.node, effect)
            }
            CreateArgumentsType::Unmapped => {
                let elements = self.allocate_arguments(graph, effect, control, &arguments);
                let effect = if elements.allocated { elements.node } else { effect };
                (
                    native_context.strict_arguments_map,
                    layout::STRICT_ARGUMENTS_SIZE,
                    argument_count,
                    elements.node,
                    effect,
                )
            }
            CreateArgumentsType::Rest => {
                let Some(map) = native_context.js_array_map(ElementsKind::Packed) else {
                    return Reduction::NoChange;
                };
                let skipped = (formal_count as usize).min(arguments.len());
                let rest = &arguments[skipped..];
                let elements = self.allocate_arguments(graph, effect, control, rest);
                let effect = if elements.allocated { elements.node } else { effect };
                (map, layout::JS_ARRAY_SIZE, rest.len() as u32, elements.node, effect)
            }
        };

        let length = graph.number_constant(length as f64);
        let mut builder = self.builder(graph, effect, control);
        let ty = if kind == CreateArgumentsType::Rest {
            Type::from_bits(TypeBits::ARRAY)
        } else {
            Type::from_bits(TypeBits::OTHER_OBJECT)
        };
        builder.allocate(size, PretenureFlag::NotTenured, ty);
        self.store_object_header(&mut builder, map, elements);
        match kind {
            CreateArgumentsType::Mapped => {
                builder.store_field(AccessBuilder::for_arguments_length(), length);
                builder.store_field(AccessBuilder::for_arguments_callee(), callee);
            }
            CreateArgumentsType::Unmapped => {
                builder.store_field(AccessBuilder::for_arguments_length(), length);
            }
            CreateArgumentsType::Rest => {
                builder.store_field(AccessBuilder::for_js_array_length(ElementsKind::Packed), length);
            }
        }
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    /// Unmapped backing store holding `values`.
    fn allocate_arguments(
        &self,
        graph: &mut Graph,
        effect: NodeId,
        control: NodeId,
        values: &[NodeId],
    ) -> Elements {
        let roots = self.broker.roots();
        if values.is_empty() {
            return Elements::constant(graph.heap_constant(roots.empty_fixed_array));
        }
        let mut builder = self.builder(graph, effect, control);
        builder.allocate_fixed_array(values.len() as u32, roots.fixed_array_map, PretenureFlag::NotTenured);
        for (index, &value) in values.iter().enumerate() {
            builder.store_field(AccessBuilder::for_fixed_array_slot(index as u32), value);
        }
        Elements::allocated(builder.finish())
    }

    /// Sloppy arguments backing store whose first `formal_count` entries
    /// alias the function's context slots.
    ///
    /// Returns the store and whether any entry is aliased.
    fn allocate_aliased_arguments(
        &self,
        graph: &mut Graph,
        effect: NodeId,
        control: NodeId,
        arguments: &[NodeId],
        context: NodeId,
        formal_count: u32,
    ) -> (Elements, bool) {
        let argument_count = arguments.len() as u32;
        if argument_count == 0 || formal_count == 0 {
            return (self.allocate_arguments(graph, effect, control, arguments), false);
        }
        let roots = self.broker.roots();
        let mapped_count = argument_count.min(formal_count);

        // Mapped values live in the context; their unmapped slots hold holes.
        let hole = graph.heap_constant(roots.the_hole);
        let mut unmapped = self.builder(graph, effect, control);
        unmapped.allocate_fixed_array(argument_count, roots.fixed_array_map, PretenureFlag::NotTenured);
        for (index, &value) in arguments.iter().enumerate() {
            let index = index as u32;
            let value = if index < mapped_count { hole } else { value };
            unmapped.store_field(AccessBuilder::for_fixed_array_slot(index), value);
        }
        let unmapped = unmapped.finish();

        let slots: SmallVec<[NodeId; 8]> = (0..mapped_count)
            .map(|index| {
                let slot = context::MIN_CONTEXT_SLOTS + formal_count - 1 - index;
                graph.number_constant(slot as f64)
            })
            .collect();
        let mut builder = self.builder(graph, unmapped, control);
        builder.allocate_fixed_array(
            mapped_count + 2,
            roots.sloppy_arguments_elements_map,
            PretenureFlag::NotTenured,
        );
        builder.store_field(AccessBuilder::for_fixed_array_slot(0), context);
        builder.store_field(AccessBuilder::for_fixed_array_slot(1), unmapped);
        for (index, &slot) in slots.iter().enumerate() {
            builder.store_field(AccessBuilder::for_fixed_array_slot(index as u32 + 2), slot);
        }
        (Elements::allocated(builder.finish()), true)
    }
}

/// A backing store: a fresh region or a constant.
struct Elements {
    node: NodeId,
    allocated: bool,
}

impl Elements {
    fn allocated(node: NodeId) -> Self {
        Elements { node, allocated: true }
    }

    fn constant(node: NodeId) -> Self {
        Elements { node, allocated: false }
    }
}

/// The frame state whose parameters are the actual arguments: the
/// arguments adaptor frame above `state` if there is one.
fn arguments_state(graph: &Graph, state: NodeId) -> NodeId {
    let outer = graph.value_input(state, frame_state::OUTER_STATE);
    match graph.op(outer) {
        Operator::FrameState(FrameStateInfo {
            kind: FrameStateKind::ArgumentsAdaptor,
            ..
        }) => outer,
        _ => state,
    }
}

/// Argument values recorded in `state`, receiver excluded.
fn arguments_of(graph: &Graph, state: NodeId) -> Option<ArgumentValues> {
    let Operator::FrameState(info) = graph.op(state) else {
        return None;
    };
    let parameters = graph.value_input(state, frame_state::PARAMETERS);
    let Operator::StateValues(count) = graph.op(parameters) else {
        return None;
    };
    if count == 0 || count != info.parameter_count {
        return None;
    }
    Some(SmallVec::from_slice(&graph.value_inputs(parameters)[1..]))
}

//! Inline lowering of creation operators.
//!
//! `CreateLowering` rewrites a creation node into an inline allocation when
//! everything the allocation depends on is known at compile time: the map,
//! the instance size, the backing store capacity and the initial field
//! values. Anything it cannot prove is left alone for
//! [`GenericLowering`](super::GenericLowering) to turn into a call.
//!
//! A decline never touches the graph. Every check that can fail runs before
//! the first node is added.
//!
//! The per-operator reductions live in sibling modules:
//!
//! | Operator                              | Module        |
//! |---------------------------------------|---------------|
//! | `JSCreate`, iterator results, key/value pairs, generators | `create` |
//! | `JSCreateArguments`                   | `arguments`   |
//! | `JSCreateArray`, empty array literals | `arrays`      |
//! | array/object/regexp literals          | `literals`    |
//! | function, with, catch, block contexts | `contexts`    |

use std::sync::Arc;

use crate::config::LoweringConfig;
use crate::diagnostics::Diagnostics;
use crate::heap::{layout, AllocationSiteData, ElementsKind, HeapBroker, InstanceType, ObjectRef};
use crate::ir::operators::PretenureFlag;
use crate::ir::{Graph, NodeId, Operator, Type, TypeBits};

use super::access::AccessBuilder;
use super::allocation::AllocationBuilder;
use super::{Reducer, Reduction};

/// Reducer for the inline fast paths of every creation operator.
pub struct CreateLowering<'a> {
    pub(super) broker: &'a dyn HeapBroker,
    pub(super) config: &'a LoweringConfig,
    diagnostics: Arc<dyn Diagnostics>,
    /// Feedback vector of the function being compiled, used when a literal's
    /// closure is not a known constant.
    pub(super) feedback_vector: Option<ObjectRef>,
}

impl<'a> CreateLowering<'a> {
    pub fn new(
        broker: &'a dyn HeapBroker,
        config: &'a LoweringConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        CreateLowering {
            broker,
            config,
            diagnostics,
            feedback_vector: None,
        }
    }

    /// Specialize literal creation to `vector` when the closure is unknown.
    pub fn with_feedback_vector(mut self, vector: ObjectRef) -> Self {
        self.feedback_vector = Some(vector);
        self
    }

    // =========================================================================
    // Shared Helpers
    // =========================================================================

    /// Allocation builder with the configured size limit.
    pub(super) fn builder<'g>(
        &'g self,
        graph: &'g mut Graph,
        effect: NodeId,
        control: NodeId,
    ) -> AllocationBuilder<'g> {
        AllocationBuilder::new(graph, effect, control)
            .with_size_limit(&*self.diagnostics, self.config.max_regular_heap_object_size)
    }

    /// Whether an allocation of `size` bytes may be emitted inline.
    #[inline]
    pub(super) fn fits(&self, size: u32) -> bool {
        size <= self.config.max_regular_heap_object_size
    }

    /// Type of `node`, sharpened to a heap constant type for constants.
    pub(super) fn type_of(&self, graph: &Graph, node: NodeId) -> Type {
        match graph.node(node).as_heap_constant() {
            Some(object) => Type::heap_constant(object, self.broker.type_bits(object)),
            None => graph.ty(node),
        }
    }

    /// Generation an allocation guided by `site` should target.
    pub(super) fn pretenure_of(&self, site: &AllocationSiteData) -> PretenureFlag {
        if self.config.allocation_site_pretenuring {
            site.pretenure
        } else {
            PretenureFlag::NotTenured
        }
    }

    /// Semantic type of an instance of `instance_type`.
    pub(super) fn instance_type_of(instance_type: InstanceType) -> Type {
        Type::from_bits(instance_type.type_bits())
    }

    /// Feedback vector to specialize the literal created by `node` to.
    ///
    /// The closure's own vector wins over the configured one.
    pub(super) fn literal_feedback_vector(&self, graph: &Graph, node: NodeId) -> Option<ObjectRef> {
        let closure = graph.value_input(node, 0);
        graph
            .node(closure)
            .as_heap_constant()
            .and_then(|closure| self.broker.function(closure))
            .and_then(|function| function.feedback_vector)
            .or(self.feedback_vector)
    }

    /// Contents of feedback slot `slot` of the literal created by `node`.
    pub(super) fn literal_feedback(&self, graph: &Graph, node: NodeId, slot: u32) -> Option<ObjectRef> {
        let vector = self.literal_feedback_vector(graph, node)?;
        self.broker
            .feedback_vector(vector)?
            .slots
            .get(slot as usize)
            .copied()
            .flatten()
    }

    /// Store the three-word object header shared by every `JSObject`.
    pub(super) fn store_object_header(
        &self,
        builder: &mut AllocationBuilder<'_>,
        map: ObjectRef,
        elements: NodeId,
    ) {
        let empty_fixed_array = self.broker.roots().empty_fixed_array;
        builder.store_constant(AccessBuilder::for_map(), map);
        builder.store_constant(AccessBuilder::for_js_object_properties_or_hash(), empty_fixed_array);
        builder.store_field(AccessBuilder::for_js_object_elements(), elements);
    }

    // =========================================================================
    // JSCreate
    // =========================================================================

    /// `new target(...)` with a known constructor: allocate an instance of
    /// the constructor's initial map with every in-object property
    /// undefined.
    fn reduce_create(&self, graph: &mut Graph, node: NodeId) -> Reduction {
        let target = graph.value_input(node, 0);
        let new_target = graph.value_input(node, 1);
        let (Some(target), Some(new_target)) = (
            self.type_of(graph, target).as_heap_constant(),
            self.type_of(graph, new_target).as_heap_constant(),
        ) else {
            return Reduction::NoChange;
        };
        let Some(initial_map) = self.inlineable_initial_map(target, new_target) else {
            return Reduction::NoChange;
        };
        let Some(map) = self.broker.map(initial_map) else {
            return Reduction::NoChange;
        };
        if !self.fits(map.instance_size) {
            return Reduction::NoChange;
        }

        let effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let undefined = self.broker.roots().undefined;
        let empty_fixed_array = graph.heap_constant(self.broker.roots().empty_fixed_array);
        let mut builder = self.builder(graph, effect, control);
        builder.allocate(
            map.instance_size,
            PretenureFlag::NotTenured,
            Self::instance_type_of(map.instance_type),
        );
        self.store_object_header(&mut builder, initial_map, empty_fixed_array);
        for index in 0..map.in_object_properties {
            builder.store_constant(AccessBuilder::for_js_object_in_object_property(map, index), undefined);
        }
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    /// Initial map of `new_target` if an instance of it can be allocated
    /// inline on behalf of `target`.
    pub(super) fn inlineable_initial_map(&self, target: ObjectRef, new_target: ObjectRef) -> Option<ObjectRef> {
        let function = self.broker.function(new_target)?;
        if !function.is_constructor {
            return None;
        }
        let initial_map = function.initial_map?;
        let map = self.broker.map(initial_map)?;
        (!map.is_dictionary_map && map.constructor == Some(target)).then_some(initial_map)
    }

    // =========================================================================
    // Iterator Results and Key/Value Pairs
    // =========================================================================

    /// `{ value, done }` with the native context's iterator result map.
    fn reduce_create_iter_result_object(&self, graph: &mut Graph, node: NodeId) -> Reduction {
        let value = graph.value_input(node, 0);
        let done = graph.value_input(node, 1);
        let effect = graph.effect_input(node);
        let control = graph.start;
        let map = self.broker.native_context().iterator_result_map;
        let empty_fixed_array = graph.heap_constant(self.broker.roots().empty_fixed_array);

        let mut builder = self.builder(graph, effect, control);
        builder.allocate(
            layout::ITER_RESULT_SIZE,
            PretenureFlag::NotTenured,
            Type::from_bits(TypeBits::OTHER_OBJECT),
        );
        self.store_object_header(&mut builder, map, empty_fixed_array);
        builder.store_field(AccessBuilder::for_iter_result_value(), value);
        builder.store_field(AccessBuilder::for_iter_result_done(), done);
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    /// `[key, value]` as a packed two-element array.
    fn reduce_create_key_value_array(&self, graph: &mut Graph, node: NodeId) -> Reduction {
        let kind = ElementsKind::Packed;
        let Some(array_map) = self.broker.native_context().js_array_map(kind) else {
            return Reduction::NoChange;
        };
        let key = graph.value_input(node, 0);
        let value = graph.value_input(node, 1);
        let effect = graph.effect_input(node);
        let control = graph.start;
        let fixed_array_map = self.broker.roots().fixed_array_map;

        let mut elements = self.builder(graph, effect, control);
        elements.allocate_fixed_array(2, fixed_array_map, PretenureFlag::NotTenured);
        elements.store_element(AccessBuilder::for_fixed_array_element(kind), 0, key);
        elements.store_element(AccessBuilder::for_fixed_array_element(kind), 1, value);
        let elements = elements.finish();

        let mut builder = self.builder(graph, elements, control);
        builder.allocate(layout::JS_ARRAY_SIZE, PretenureFlag::NotTenured, Type::from_bits(TypeBits::ARRAY));
        self.store_object_header(&mut builder, array_map, elements);
        builder.store_smi(AccessBuilder::for_js_array_length(kind), 2);
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    // =========================================================================
    // Generators
    // =========================================================================

    /// Generator object for a known closure, with a hole-filled register
    /// file sized by the function's register count.
    fn reduce_create_generator_object(&self, graph: &mut Graph, node: NodeId) -> Reduction {
        let closure = graph.value_input(node, 0);
        let receiver = graph.value_input(node, 1);
        let Some(function_ref) = self.type_of(graph, closure).as_heap_constant() else {
            return Reduction::NoChange;
        };
        let Some(function) = self.broker.function(function_ref) else {
            return Reduction::NoChange;
        };
        let (Some(initial_map), Some(shared)) = (
            function.initial_map,
            self.broker.shared_info(function.shared),
        ) else {
            return Reduction::NoChange;
        };
        let Some(map) = self.broker.map(initial_map) else {
            return Reduction::NoChange;
        };
        let is_async = match map.instance_type {
            InstanceType::JSGeneratorObject => false,
            InstanceType::JSAsyncGeneratorObject => true,
            _ => return Reduction::NoChange,
        };
        let register_count = shared.register_count;
        if !self.fits(map.instance_size) || !self.fits(layout::fixed_array_size(register_count)) {
            return Reduction::NoChange;
        }
        let Some(context) = graph.context_input(node) else {
            return Reduction::NoChange;
        };

        let mut effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let register_file = if register_count == 0 {
            graph.heap_constant(self.broker.roots().empty_fixed_array)
        } else {
            let registers = self.allocate_elements(
                graph,
                effect,
                control,
                ElementsKind::Holey,
                register_count,
                PretenureFlag::NotTenured,
            );
            effect = registers;
            registers
        };

        let undefined = self.broker.roots().undefined;
        let empty_fixed_array = graph.heap_constant(self.broker.roots().empty_fixed_array);
        let mut builder = self.builder(graph, effect, control);
        builder.allocate(
            map.instance_size,
            PretenureFlag::NotTenured,
            Self::instance_type_of(map.instance_type),
        );
        self.store_object_header(&mut builder, initial_map, empty_fixed_array);
        builder.store_field(AccessBuilder::for_generator_context(), context);
        builder.store_field(AccessBuilder::for_generator_function(), closure);
        builder.store_field(AccessBuilder::for_generator_receiver(), receiver);
        builder.store_constant(AccessBuilder::for_generator_input_or_debug_pos(), undefined);
        builder.store_smi(AccessBuilder::for_generator_resume_mode(), layout::GENERATOR_RESUME_NEXT);
        builder.store_smi(AccessBuilder::for_generator_continuation(), layout::GENERATOR_EXECUTING);
        builder.store_field(AccessBuilder::for_generator_register_file(), register_file);
        if is_async {
            builder.store_constant(AccessBuilder::for_async_generator_queue(), undefined);
            builder.store_constant(AccessBuilder::for_async_generator_awaited_promise(), undefined);
        }
        for index in 0..map.in_object_properties {
            builder.store_constant(AccessBuilder::for_js_object_in_object_property(map, index), undefined);
        }
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }
}

impl Reducer for CreateLowering<'_> {
    fn name(&self) -> &'static str {
        "create-lowering"
    }

    fn reduce(&mut self, graph: &mut Graph, node: NodeId) -> Reduction {
        match graph.op(node) {
            Operator::JSCreate => self.reduce_create(graph, node),
            Operator::JSCreateArguments(kind) => self.reduce_create_arguments(graph, node, kind),
            Operator::JSCreateArray(params) => self.reduce_create_array(graph, node, params),
            Operator::JSCreateIterResultObject => self.reduce_create_iter_result_object(graph, node),
            Operator::JSCreateKeyValueArray => self.reduce_create_key_value_array(graph, node),
            Operator::JSCreateLiteralArray(params) | Operator::JSCreateLiteralObject(params) => {
                self.reduce_create_literal_array_or_object(graph, node, params)
            }
            Operator::JSCreateLiteralRegExp(params) => {
                self.reduce_create_literal_regexp(graph, node, params)
            }
            Operator::JSCreateEmptyLiteralArray(slot) => {
                self.reduce_create_empty_literal_array(graph, node, slot)
            }
            Operator::JSCreateEmptyLiteralObject => self.reduce_create_empty_literal_object(graph, node),
            Operator::JSCreateFunctionContext(params) => {
                self.reduce_create_function_context(graph, node, params)
            }
            Operator::JSCreateWithContext(scope_info) => {
                self.reduce_create_with_context(graph, node, scope_info)
            }
            Operator::JSCreateCatchContext(params) => self.reduce_create_catch_context(graph, node, params),
            Operator::JSCreateBlockContext(scope_info) => {
                self.reduce_create_block_context(graph, node, scope_info)
            }
            Operator::JSCreateGeneratorObject => self.reduce_create_generator_object(graph, node),
            _ => Reduction::NoChange,
        }
    }
}

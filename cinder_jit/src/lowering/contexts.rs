//! Function, eval, with, catch and block contexts.

use crate::heap::layout::{self, context};
use crate::heap::ObjectRef;
use crate::ir::operators::{CreateCatchContextParameters, CreateFunctionContextParameters, PretenureFlag, ScopeType};
use crate::ir::{Graph, NodeId, Type, TypeBits};

use super::access::AccessBuilder;
use super::allocation::AllocationBuilder;
use super::create::CreateLowering;
use super::Reduction;

/// The four slots every context starts with.
struct ContextHeader {
    closure: NodeId,
    previous: NodeId,
    extension: NodeId,
}

impl CreateLowering<'_> {
    /// Open a context of `length` slots with `map` and store its header.
    fn allocate_context(&self, builder: &mut AllocationBuilder<'_>, length: u32, map: ObjectRef, header: ContextHeader) {
        let native_context = self.broker.native_context().object;
        builder.allocate_fixed_array(length, map, PretenureFlag::NotTenured);
        builder.store_field(AccessBuilder::for_context_slot(context::CLOSURE_INDEX), header.closure);
        builder.store_field(AccessBuilder::for_context_slot(context::PREVIOUS_INDEX), header.previous);
        builder.store_field(AccessBuilder::for_context_slot(context::EXTENSION_INDEX), header.extension);
        builder.store_constant(AccessBuilder::for_context_slot(context::NATIVE_CONTEXT_INDEX), native_context);
    }

    /// Fill slots `from..length` with undefined.
    fn store_undefined_slots(&self, builder: &mut AllocationBuilder<'_>, from: u32, length: u32) {
        let undefined = self.broker.roots().undefined;
        for index in from..length {
            builder.store_constant(AccessBuilder::for_context_slot(index), undefined);
        }
    }

    /// Context extension holding `scope_info` and `extension`. Returns the
    /// finished region.
    fn allocate_context_extension(
        &self,
        graph: &mut Graph,
        effect: NodeId,
        control: NodeId,
        scope_info: ObjectRef,
        extension: NodeId,
    ) -> NodeId {
        let mut builder = self.builder(graph, effect, control);
        builder.allocate(
            layout::CONTEXT_EXTENSION_SIZE,
            PretenureFlag::NotTenured,
            Type::from_bits(TypeBits::OTHER_INTERNAL),
        );
        builder.store_constant(AccessBuilder::for_map(), self.broker.roots().context_extension_map);
        builder.store_constant(AccessBuilder::for_context_extension_scope_info(), scope_info);
        builder.store_field(AccessBuilder::for_context_extension_extension(), extension);
        builder.finish()
    }

    pub(super) fn reduce_create_function_context(
        &self,
        graph: &mut Graph,
        node: NodeId,
        params: CreateFunctionContextParameters,
    ) -> Reduction {
        if params.slot_count >= self.config.function_context_allocation_limit {
            return Reduction::NoChange;
        }
        let roots = self.broker.roots();
        let map = match params.scope_type {
            ScopeType::Function => roots.function_context_map,
            ScopeType::Eval => roots.eval_context_map,
            // Only function and eval scopes get a function context.
            _ => return Reduction::NoChange,
        };
        let length = params.slot_count + context::MIN_CONTEXT_SLOTS;
        if !self.fits(layout::context_size(length)) {
            return Reduction::NoChange;
        }
        let Some(previous) = graph.context_input(node) else {
            return Reduction::NoChange;
        };

        let closure = graph.value_input(node, 0);
        let effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let extension = graph.heap_constant(roots.the_hole);
        let mut builder = self.builder(graph, effect, control);
        self.allocate_context(
            &mut builder,
            length,
            map,
            ContextHeader {
                closure,
                previous,
                extension,
            },
        );
        self.store_undefined_slots(&mut builder, context::MIN_CONTEXT_SLOTS, length);
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    /// `with (object)`: the object goes into a context extension.
    pub(super) fn reduce_create_with_context(&self, graph: &mut Graph, node: NodeId, scope_info: ObjectRef) -> Reduction {
        let Some(previous) = graph.context_input(node) else {
            return Reduction::NoChange;
        };
        let object = graph.value_input(node, 0);
        let closure = graph.value_input(node, 1);
        let effect = graph.effect_input(node);
        let control = graph.control_input(node);

        let extension = self.allocate_context_extension(graph, effect, control, scope_info, object);
        let map = self.broker.roots().with_context_map;
        let mut builder = self.builder(graph, extension, control);
        self.allocate_context(
            &mut builder,
            context::MIN_CONTEXT_SLOTS,
            map,
            ContextHeader {
                closure,
                previous,
                extension,
            },
        );
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    /// `catch (name)`: the exception lives in the first user slot.
    pub(super) fn reduce_create_catch_context(
        &self,
        graph: &mut Graph,
        node: NodeId,
        params: CreateCatchContextParameters,
    ) -> Reduction {
        let Some(previous) = graph.context_input(node) else {
            return Reduction::NoChange;
        };
        let exception = graph.value_input(node, 0);
        let closure = graph.value_input(node, 1);
        let effect = graph.effect_input(node);
        let control = graph.control_input(node);

        let name = graph.heap_constant(params.catch_name);
        let extension = self.allocate_context_extension(graph, effect, control, params.scope_info, name);
        let map = self.broker.roots().catch_context_map;
        let mut builder = self.builder(graph, extension, control);
        self.allocate_context(
            &mut builder,
            context::MIN_CONTEXT_SLOTS + 1,
            map,
            ContextHeader {
                closure,
                previous,
                extension,
            },
        );
        builder.store_field(AccessBuilder::for_context_slot(context::THROWN_OBJECT_INDEX), exception);
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }

    /// Block scope with a known scope info shorter than the block context
    /// limit. The scope info itself is the extension.
    pub(super) fn reduce_create_block_context(&self, graph: &mut Graph, node: NodeId, scope_info: ObjectRef) -> Reduction {
        let Some(info) = self.broker.scope_info(scope_info) else {
            return Reduction::NoChange;
        };
        let length = info.context_length;
        if length >= self.config.block_context_allocation_limit || length < context::MIN_CONTEXT_SLOTS {
            return Reduction::NoChange;
        }
        let Some(previous) = graph.context_input(node) else {
            return Reduction::NoChange;
        };

        let closure = graph.value_input(node, 0);
        let effect = graph.effect_input(node);
        let control = graph.control_input(node);
        let extension = graph.heap_constant(scope_info);
        let map = self.broker.roots().block_context_map;
        let mut builder = self.builder(graph, effect, control);
        self.allocate_context(
            &mut builder,
            length,
            map,
            ContextHeader {
                closure,
                previous,
                extension,
            },
        );
        self.store_undefined_slots(&mut builder, context::MIN_CONTEXT_SLOTS, length);
        builder.graph().relax_controls(node);
        builder.finish_and_change(node);
        Reduction::Changed(node)
    }
}

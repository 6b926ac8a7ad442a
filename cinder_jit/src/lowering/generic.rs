//! Runtime and stub calls for creation nodes without an inline fast path.
//!
//! `GenericLowering` runs after [`CreateLowering`](super::CreateLowering) and
//! rewrites each remaining creation node in place into a `Call`. The node
//! keeps its id, so its value and effect uses see the call's result. Call
//! inputs are laid out as
//!
//! ```text
//! [target, arguments..., context?] [frame_state?] [effect] [control]
//! ```
//!
//! Runtime routines are entered through the C-entry stub with the arguments
//! `[args..., external_reference(F), argc]`.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::calls::{Builtin, CallFlags, DescriptorId, Linkage, RuntimeFunctionId};
use crate::diagnostics::{Diagnostics, Violation};
use crate::heap::{ElementsKind, HeapBroker};
use crate::ir::operators::{
    CallOp, CreateArgumentsType, CreateArrayParameters, CreateCatchContextParameters,
    CreateFunctionContextParameters, CreateLiteralParameters, ExternalReference, FeedbackSlot,
};
use crate::ir::{Graph, NodeId, Operator};

use super::{Reducer, Reduction};

/// Largest context the function context stub allocates.
const MAXIMUM_FUNCTION_CONTEXT_SLOTS: u32 = 0x8000;

type CallValues = SmallVec<[NodeId; 8]>;

/// Reducer turning creation nodes into calls.
pub struct GenericLowering<'a> {
    broker: &'a dyn HeapBroker,
    linkage: &'a Linkage,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<'a> GenericLowering<'a> {
    pub fn new(broker: &'a dyn HeapBroker, linkage: &'a Linkage, diagnostics: Arc<dyn Diagnostics>) -> Self {
        GenericLowering {
            broker,
            linkage,
            diagnostics,
        }
    }

    // =========================================================================
    // Call Rewriting
    // =========================================================================

    /// Rewrite `node` into a call of `descriptor` with value inputs
    /// `values`, keeping its context, frame state, effect and control.
    fn rewrite_as_call(&self, graph: &mut Graph, node: NodeId, descriptor: DescriptorId, values: &[NodeId]) {
        let desc = self.linkage.descriptor(descriptor);
        let context = graph.context_input(node).filter(|_| desc.needs_context());
        let frame_state = graph
            .frame_state_input(node)
            .filter(|_| desc.needs_frame_state());
        let effect = graph.effect_input(node);
        let control = graph.control_input(node);

        let value_inputs = values.len() + context.is_some() as usize;
        if self.diagnostics.enabled() && value_inputs != desc.input_count() {
            self.diagnostics.report(Violation::ArityMismatch {
                callee: desc.debug_name.clone(),
                expected: desc.input_count(),
                actual: value_inputs,
            });
        }

        graph.trim_input_count(node, 0);
        for &value in values.iter().chain(context.iter()).chain(frame_state.iter()) {
            graph.append_input(node, value);
        }
        graph.append_input(node, effect);
        graph.append_input(node, control);
        graph.change_op(
            node,
            Operator::Call(CallOp {
                descriptor,
                value_inputs: value_inputs as u32,
                returns: desc.return_count() as u32,
                frame_state: frame_state.is_some(),
                properties: desc.properties,
            }),
        );
    }

    /// Rewrite `node` into a call of runtime routine `function`.
    fn replace_with_runtime_call(
        &self,
        graph: &mut Graph,
        node: NodeId,
        function: RuntimeFunctionId,
        args: &[NodeId],
    ) -> Reduction {
        let entry = self.linkage.runtime().lookup(function);
        if self.diagnostics.enabled() {
            if let Some(nargs) = entry.nargs {
                if nargs as usize != args.len() {
                    self.diagnostics.report(Violation::ArityMismatch {
                        callee: function.to_string(),
                        expected: nargs as usize,
                        actual: args.len(),
                    });
                }
            }
        }
        let flags = if graph.frame_state_input(node).is_some() {
            CallFlags::NEEDS_FRAME_STATE
        } else {
            CallFlags::empty()
        };
        let properties = graph.op(node).properties();
        let descriptor = self
            .linkage
            .runtime_call_descriptor(function, args.len() as u32, properties, flags);

        let centry = graph.code_constant(Builtin::CEntry {
            result_size: entry.result_size,
        });
        let reference = graph.external_constant(ExternalReference::RuntimeFunction(function));
        let argc = graph.int32_constant(args.len() as i32);
        let mut values: CallValues = SmallVec::with_capacity(args.len() + 3);
        values.push(centry);
        values.extend_from_slice(args);
        values.push(reference);
        values.push(argc);
        log::trace!("{} becomes a call to {}", node, function);
        self.rewrite_as_call(graph, node, descriptor, &values);
        Reduction::Changed(node)
    }

    /// Rewrite `node` into a call of `builtin` with `args` after the target.
    fn replace_with_builtin_call(&self, graph: &mut Graph, node: NodeId, builtin: Builtin, args: &[NodeId]) -> Reduction {
        let descriptor = self.linkage.builtin_call_descriptor(builtin, CallFlags::empty());
        let code = graph.code_constant(builtin);
        let mut values: CallValues = SmallVec::with_capacity(args.len() + 1);
        values.push(code);
        values.extend_from_slice(args);
        self.rewrite_as_call(graph, node, descriptor, &values);
        Reduction::Changed(node)
    }

    // =========================================================================
    // Per-Operator Lowerings
    // =========================================================================

    fn lower_create_arguments(&self, graph: &mut Graph, node: NodeId, kind: CreateArgumentsType) -> Reduction {
        let builtin = match kind {
            CreateArgumentsType::Mapped => Builtin::FastNewSloppyArguments,
            CreateArgumentsType::Unmapped => Builtin::FastNewStrictArguments,
            CreateArgumentsType::Rest => Builtin::FastNewRestParameter,
        };
        let callee = graph.value_input(node, 0);
        self.replace_with_builtin_call(graph, node, builtin, &[callee])
    }

    /// Array constructor stub picked by arity. The stubs behave like JS
    /// functions and expect a receiver, which is undefined here.
    fn lower_create_array(&self, graph: &mut Graph, node: NodeId, params: CreateArrayParameters) -> Reduction {
        let kind = params
            .site
            .and_then(|site| self.broker.allocation_site(site))
            .map_or(ElementsKind::PackedSmi, |site| site.elements_kind);
        let builtin = match params.arity {
            0 => Builtin::ArrayNoArgumentConstructor(kind),
            1 => Builtin::ArraySingleArgumentConstructor(kind.to_holey()),
            _ => Builtin::ArrayNArgumentsConstructor,
        };
        let properties = graph.op(node).properties();
        let descriptor = self.linkage.stub_call_descriptor(
            &builtin.interface(),
            params.arity + 1,
            CallFlags::NEEDS_FRAME_STATE,
            properties,
            1,
        );

        let undefined = self.broker.roots().undefined;
        let target = graph.value_input(node, 0);
        let args: CallValues = SmallVec::from_slice(&graph.value_inputs(node)[2..]);
        let code = graph.code_constant(builtin);
        let site = graph.heap_constant(params.site.unwrap_or(undefined));
        let arity = graph.int32_constant(params.arity as i32);
        let receiver = graph.heap_constant(undefined);
        let mut values: CallValues = SmallVec::with_capacity(args.len() + 5);
        values.extend_from_slice(&[code, target, site, arity, receiver]);
        values.extend_from_slice(&args);
        self.rewrite_as_call(graph, node, descriptor, &values);
        Reduction::Changed(node)
    }

    fn lower_create_literal(
        &self,
        graph: &mut Graph,
        node: NodeId,
        function: RuntimeFunctionId,
        params: CreateLiteralParameters,
    ) -> Reduction {
        let closure = graph.value_input(node, 0);
        let slot = graph.number_constant(params.slot.0 as f64);
        let constant = graph.heap_constant(params.constant);
        let flags = graph.number_constant(params.flags as f64);
        self.replace_with_runtime_call(graph, node, function, &[closure, slot, constant, flags])
    }

    fn lower_create_empty_literal_array(&self, graph: &mut Graph, node: NodeId, slot: FeedbackSlot) -> Reduction {
        let closure = graph.value_input(node, 0);
        let slot = graph.number_constant(slot.0 as f64);
        self.replace_with_runtime_call(graph, node, RuntimeFunctionId::CreateEmptyArrayLiteral, &[closure, slot])
    }

    /// Function contexts come from the stub unless they are too large for it.
    fn lower_create_function_context(
        &self,
        graph: &mut Graph,
        node: NodeId,
        params: CreateFunctionContextParameters,
    ) -> Reduction {
        let closure = graph.value_input(node, 0);
        if params.slot_count <= MAXIMUM_FUNCTION_CONTEXT_SLOTS {
            let slots = graph.int32_constant(params.slot_count as i32);
            let builtin = Builtin::FastNewFunctionContext(params.scope_type);
            self.replace_with_builtin_call(graph, node, builtin, &[closure, slots])
        } else {
            let scope_type = graph.number_constant(params.scope_type as u8 as f64);
            self.replace_with_runtime_call(graph, node, RuntimeFunctionId::NewFunctionContext, &[closure, scope_type])
        }
    }

    fn lower_create_catch_context(
        &self,
        graph: &mut Graph,
        node: NodeId,
        params: CreateCatchContextParameters,
    ) -> Reduction {
        let exception = graph.value_input(node, 0);
        let closure = graph.value_input(node, 1);
        let name = graph.heap_constant(params.catch_name);
        let scope_info = graph.heap_constant(params.scope_info);
        self.replace_with_runtime_call(
            graph,
            node,
            RuntimeFunctionId::PushCatchContext,
            &[name, exception, scope_info, closure],
        )
    }
}

impl Reducer for GenericLowering<'_> {
    fn name(&self) -> &'static str {
        "generic-lowering"
    }

    fn reduce(&mut self, graph: &mut Graph, node: NodeId) -> Reduction {
        let op = graph.op(node);
        if !op.is_js_create() {
            return Reduction::NoChange;
        }
        let values: CallValues = SmallVec::from_slice(graph.value_inputs(node));
        match op {
            Operator::JSCreate => {
                self.replace_with_runtime_call(graph, node, RuntimeFunctionId::NewObject, &values)
            }
            Operator::JSCreateArguments(kind) => self.lower_create_arguments(graph, node, kind),
            Operator::JSCreateArray(params) => self.lower_create_array(graph, node, params),
            Operator::JSCreateIterResultObject => {
                self.replace_with_runtime_call(graph, node, RuntimeFunctionId::CreateIterResultObject, &values)
            }
            Operator::JSCreateKeyValueArray => {
                self.replace_with_runtime_call(graph, node, RuntimeFunctionId::CreateKeyValueArray, &values)
            }
            Operator::JSCreateLiteralArray(params) => {
                self.lower_create_literal(graph, node, RuntimeFunctionId::CreateArrayLiteral, params)
            }
            Operator::JSCreateLiteralObject(params) => {
                self.lower_create_literal(graph, node, RuntimeFunctionId::CreateObjectLiteral, params)
            }
            Operator::JSCreateLiteralRegExp(params) => {
                self.lower_create_literal(graph, node, RuntimeFunctionId::CreateRegExpLiteral, params)
            }
            Operator::JSCreateEmptyLiteralArray(slot) => self.lower_create_empty_literal_array(graph, node, slot),
            Operator::JSCreateEmptyLiteralObject => {
                self.replace_with_runtime_call(graph, node, RuntimeFunctionId::CreateEmptyObjectLiteral, &[])
            }
            Operator::JSCreateFunctionContext(params) => self.lower_create_function_context(graph, node, params),
            Operator::JSCreateWithContext(scope_info) => {
                let scope_info = graph.heap_constant(scope_info);
                let args = [values[0], scope_info, values[1]];
                self.replace_with_runtime_call(graph, node, RuntimeFunctionId::PushWithContext, &args)
            }
            Operator::JSCreateCatchContext(params) => self.lower_create_catch_context(graph, node, params),
            Operator::JSCreateBlockContext(scope_info) => {
                let scope_info = graph.heap_constant(scope_info);
                let args = [scope_info, values[0]];
                self.replace_with_runtime_call(graph, node, RuntimeFunctionId::PushBlockContext, &args)
            }
            Operator::JSCreateGeneratorObject => {
                self.replace_with_runtime_call(graph, node, RuntimeFunctionId::CreateJSGeneratorObject, &values)
            }
            other => unreachable!("{other} has no generic lowering"),
        }
    }
}

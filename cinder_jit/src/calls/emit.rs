//! Call emission on top of the structured assembler.
//!
//! A call node takes `[target, arguments…, context?]` as value inputs, then
//! the current effect and control. Non-tail calls advance both to the call
//! itself; tail calls end the block.

use smallvec::SmallVec;

use super::{Builtin, CallFlags, DescriptorId, RuntimeFunctionId};
use crate::assembler::{CodeAssembler, MachineAssembler};
use crate::diagnostics::Violation;
use crate::ir::operators::{CallOp, ExternalReference, OpProperties, Operator};
use crate::ir::types::MachineType;
use crate::ir::NodeId;

type CallInputs = SmallVec<[NodeId; 8]>;

/// Builder trait for stub, runtime and C calls.
pub trait CallAssembler {
    /// Call `target` with the convention of `descriptor`.
    fn call_stub(
        &mut self,
        descriptor: DescriptorId,
        target: NodeId,
        context: Option<NodeId>,
        args: &[NodeId],
    ) -> NodeId;

    /// Call returning several values, one projection each.
    fn call_stub_n(
        &mut self,
        descriptor: DescriptorId,
        target: NodeId,
        context: Option<NodeId>,
        args: &[NodeId],
    ) -> SmallVec<[NodeId; 2]>;

    /// Call a builtin stub by name, with its default descriptor.
    fn call_builtin(&mut self, builtin: Builtin, context: Option<NodeId>, args: &[NodeId])
        -> NodeId;

    fn tail_call_stub(
        &mut self,
        descriptor: DescriptorId,
        target: NodeId,
        context: Option<NodeId>,
        args: &[NodeId],
    );

    /// Call a runtime routine through the C-entry trampoline.
    fn call_runtime(&mut self, function: RuntimeFunctionId, context: NodeId, args: &[NodeId])
        -> NodeId;

    fn tail_call_runtime(&mut self, function: RuntimeFunctionId, context: NodeId, args: &[NodeId]);

    /// Call a native function; `args` pairs each value with its machine type.
    fn call_c_function(
        &mut self,
        function: ExternalReference,
        return_type: Option<MachineType>,
        args: &[(MachineType, NodeId)],
    ) -> NodeId;

    /// Call `Runtime::Abort` with `reason` and close the block.
    fn abort(&mut self, context: NodeId, reason: i32);
}

impl CodeAssembler {
    fn emit_call(
        &mut self,
        descriptor: DescriptorId,
        target: NodeId,
        context: Option<NodeId>,
        args: &[NodeId],
        tail: bool,
    ) -> NodeId {
        let desc = self.linkage().descriptor(descriptor);
        if self.checks_enabled() {
            let actual = args.len() + context.is_some() as usize;
            if actual != desc.parameter_count() {
                self.report(Violation::ArityMismatch {
                    callee: desc.debug_name.clone(),
                    expected: desc.parameter_count(),
                    actual,
                });
            }
            if tail && !desc.supports_tail_calls() {
                self.report(Violation::TailCallUnsupported {
                    callee: desc.debug_name.clone(),
                });
            }
        }

        let mut inputs: CallInputs = SmallVec::with_capacity(args.len() + 2);
        inputs.push(target);
        inputs.extend_from_slice(args);
        inputs.extend(context);
        let call = CallOp {
            descriptor,
            value_inputs: inputs.len() as u32,
            returns: desc.return_count() as u32,
            frame_state: false,
            properties: desc.properties,
        };

        if tail {
            log::trace!("tail call to {}", desc.debug_name);
            return self.add_terminator(Operator::TailCall(call), &inputs, "tail_call");
        }
        self.call_prologue();
        let node = self.add_effect_node(Operator::Call(call), &inputs, "call");
        self.call_epilogue();
        node
    }

    /// Arguments of a runtime call: `[args…, entry, argc]`; the context
    /// follows as the call's context input.
    fn runtime_arguments(&mut self, function: RuntimeFunctionId, args: &[NodeId]) -> CallInputs {
        if self.checks_enabled() {
            let entry = self.linkage().runtime().lookup(function);
            if let Some(nargs) = entry.nargs {
                if nargs as usize != args.len() {
                    self.report(Violation::ArityMismatch {
                        callee: function.to_string(),
                        expected: nargs as usize,
                        actual: args.len(),
                    });
                }
            }
        }
        let mut inputs: CallInputs = args.iter().copied().collect();
        inputs.push(self.external_constant(ExternalReference::RuntimeFunction(function)));
        inputs.push(self.int32_constant(args.len() as i32));
        inputs
    }

    fn emit_runtime_call(
        &mut self,
        function: RuntimeFunctionId,
        context: NodeId,
        args: &[NodeId],
        tail: bool,
    ) -> NodeId {
        let result_size = self.linkage().runtime().lookup(function).result_size;
        let flags = if tail {
            CallFlags::SUPPORTS_TAIL_CALLS
        } else {
            CallFlags::empty()
        };
        let descriptor = self.linkage().runtime_call_descriptor(
            function,
            args.len() as u32,
            OpProperties::empty(),
            flags,
        );
        let centry = self.graph.code_constant(Builtin::CEntry { result_size });
        let arguments = self.runtime_arguments(function, args);
        self.emit_call(descriptor, centry, Some(context), &arguments, tail)
    }
}

impl CallAssembler for CodeAssembler {
    fn call_stub(
        &mut self,
        descriptor: DescriptorId,
        target: NodeId,
        context: Option<NodeId>,
        args: &[NodeId],
    ) -> NodeId {
        self.emit_call(descriptor, target, context, args, false)
    }

    fn call_stub_n(
        &mut self,
        descriptor: DescriptorId,
        target: NodeId,
        context: Option<NodeId>,
        args: &[NodeId],
    ) -> SmallVec<[NodeId; 2]> {
        let call = self.emit_call(descriptor, target, context, args, false);
        let returns = self.linkage().descriptor(descriptor).return_count() as u32;
        (0..returns).map(|index| self.projection(index, call)).collect()
    }

    fn call_builtin(
        &mut self,
        builtin: Builtin,
        context: Option<NodeId>,
        args: &[NodeId],
    ) -> NodeId {
        let descriptor = self
            .linkage()
            .builtin_call_descriptor(builtin, CallFlags::empty());
        let target = self.graph.code_constant(builtin);
        self.emit_call(descriptor, target, context, args, false)
    }

    fn tail_call_stub(
        &mut self,
        descriptor: DescriptorId,
        target: NodeId,
        context: Option<NodeId>,
        args: &[NodeId],
    ) {
        self.emit_call(descriptor, target, context, args, true);
    }

    fn call_runtime(
        &mut self,
        function: RuntimeFunctionId,
        context: NodeId,
        args: &[NodeId],
    ) -> NodeId {
        self.emit_runtime_call(function, context, args, false)
    }

    fn tail_call_runtime(&mut self, function: RuntimeFunctionId, context: NodeId, args: &[NodeId]) {
        self.emit_runtime_call(function, context, args, true);
    }

    fn call_c_function(
        &mut self,
        function: ExternalReference,
        return_type: Option<MachineType>,
        args: &[(MachineType, NodeId)],
    ) -> NodeId {
        let types: SmallVec<[MachineType; 6]> = args.iter().map(|&(ty, _)| ty).collect();
        let values: CallInputs = args.iter().map(|&(_, value)| value).collect();
        let descriptor = self.linkage().c_call_descriptor(return_type, &types);
        let target = self.external_constant(function);
        self.emit_call(descriptor, target, None, &values, false)
    }

    fn abort(&mut self, context: NodeId, reason: i32) {
        let reason = self.smi_constant(reason);
        self.call_runtime(RuntimeFunctionId::Abort, context, &[reason]);
        self.unreachable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::Linkage;
    use crate::config::AssemblerConfig;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::heap::HeapSnapshot;
    use crate::heap::HeapBroker;
    use crate::ir::operators::ControlOp;
    use std::sync::Arc;

    fn assembler(diagnostics: &RecordingDiagnostics) -> CodeAssembler {
        let linkage = Linkage::shared();
        let heap = HeapSnapshot::new();
        let descriptor = linkage.js_call_descriptor(1, CallFlags::empty());
        CodeAssembler::new(
            linkage,
            descriptor,
            *heap.roots(),
            AssemblerConfig::default(),
            Arc::new(diagnostics.clone()),
        )
    }

    #[test]
    fn test_runtime_call_input_order() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let context = asm.context_parameter().unwrap();
        let receiver = asm.parameter(0).unwrap();
        let call = asm.call_runtime(
            RuntimeFunctionId::CreateIterResultObject,
            context,
            &[receiver, receiver],
        );
        asm.return_value(call);

        let graph = asm.graph();
        let inputs = &graph.node(call).inputs;
        assert_eq!(
            graph.op(inputs[0]),
            Operator::CodeConstant(Builtin::CEntry { result_size: 1 })
        );
        assert_eq!(inputs[1], receiver);
        assert_eq!(inputs[2], receiver);
        assert_eq!(
            graph.op(inputs[3]),
            Operator::ExternalConstant(ExternalReference::RuntimeFunction(
                RuntimeFunctionId::CreateIterResultObject
            ))
        );
        assert_eq!(graph.op(inputs[4]), Operator::Int32Constant(2));
        assert_eq!(inputs[5], context);
        assert!(diagnostics.is_clean());
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_runtime_arity_mismatch_is_reported() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let context = asm.context_parameter().unwrap();
        asm.call_runtime(RuntimeFunctionId::NewObject, context, &[context]);

        assert!(diagnostics.violations().iter().any(|v| matches!(
            v,
            Violation::ArityMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        )));
    }

    #[test]
    fn test_variadic_runtime_call_accepts_any_arity() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let context = asm.context_parameter().unwrap();
        let a = asm.smi_constant(1);
        asm.call_runtime(RuntimeFunctionId::NewArray, context, &[a, a, a]);
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn test_tail_call_closes_block() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let context = asm.context_parameter().unwrap();
        asm.tail_call_runtime(RuntimeFunctionId::StackGuard, context, &[]);

        assert!(!asm.is_reachable());
        assert!(diagnostics.is_clean());
        let end = asm.graph().end;
        let terminator = asm.graph().control_input(end);
        assert!(matches!(asm.graph().op(terminator), Operator::TailCall(_)));
    }

    #[test]
    fn test_tail_call_requires_support() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let interface = Builtin::FastNewStrictArguments.interface();
        let descriptor = asm.linkage().stub_call_descriptor(
            &interface,
            0,
            CallFlags::empty(),
            OpProperties::empty(),
            1,
        );
        let target = asm.graph.code_constant(Builtin::FastNewStrictArguments);
        let context = asm.context_parameter().unwrap();
        let function = asm.parameter(0).unwrap();
        asm.tail_call_stub(descriptor, target, Some(context), &[function]);

        assert_eq!(
            diagnostics.violations(),
            vec![Violation::TailCallUnsupported {
                callee: "FastNewStrictArguments".into()
            }]
        );
    }

    #[test]
    fn test_call_stub_n_projects_each_return() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let interface = Builtin::FastNewRestParameter.interface();
        let descriptor = asm.linkage().stub_call_descriptor(
            &interface,
            0,
            CallFlags::empty(),
            OpProperties::empty(),
            2,
        );
        let target = asm.graph.code_constant(Builtin::FastNewRestParameter);
        let context = asm.context_parameter().unwrap();
        let function = asm.parameter(0).unwrap();
        let results = asm.call_stub_n(descriptor, target, Some(context), &[function]);

        assert_eq!(results.len(), 2);
        assert_eq!(asm.graph().op(results[1]), Operator::Projection(1));
        asm.return_values(&results);
        assert!(asm.graph().verify().is_ok());
    }

    #[test]
    fn test_c_call_uses_address_descriptor() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let x = asm.int32_constant(7);
        let call = asm.call_c_function(
            ExternalReference::CFunction(0xdead),
            Some(MachineType::int32()),
            &[(MachineType::int32(), x)],
        );
        let Operator::Call(op) = asm.graph().op(call) else {
            panic!("expected a call");
        };
        let descriptor = asm.linkage().descriptor(op.descriptor);
        assert_eq!(descriptor.kind, crate::calls::CallDescriptorKind::Address);
        assert_eq!(op.value_inputs, 2);
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn test_abort_ends_in_throw() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        let context = asm.context_parameter().unwrap();
        asm.abort(context, 3);

        assert!(!asm.is_reachable());
        let end = asm.graph().end;
        let terminator = asm.graph().control_input(end);
        assert_eq!(
            asm.graph().op(terminator),
            Operator::Control(ControlOp::Throw)
        );
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn test_callbacks_wrap_calls() {
        let diagnostics = RecordingDiagnostics::new();
        let mut asm = assembler(&diagnostics);
        asm.register_call_generation_callbacks(
            Box::new(|asm: &mut CodeAssembler| asm.debug_break()),
            Box::new(|asm: &mut CodeAssembler| asm.debug_break()),
        );
        let context = asm.context_parameter().unwrap();
        let call = asm.call_runtime(RuntimeFunctionId::StackGuard, context, &[]);

        let graph = asm.graph();
        let before = graph.effect_input(call);
        assert_eq!(graph.op(before), Operator::DebugBreak);
        let after = asm.current.unwrap().effect;
        assert_eq!(graph.op(after), Operator::DebugBreak);
        assert_eq!(graph.effect_input(after), call);
        let breaks = graph
            .live_ids()
            .filter(|&id| graph.op(id) == Operator::DebugBreak)
            .count();
        assert_eq!(breaks, 2);
    }
}

//! Unit tests for the structured code assembler.
//!
//! Tests are organized by builder trait:
//! - CodeAssembler: parameters, constants, memory, terminators, hooks
//! - ControlAssembler: labels, merges, loops, switches, exception edges
//! - MachineAssembler: constant folding and small-integer tagging

use super::*;
use crate::calls::{CallAssembler, CallFlags, RuntimeFunctionId};
use crate::codegen::ListingGenerator;
use crate::diagnostics::{RecordingDiagnostics, ValidatingDiagnostics};
use crate::heap::{HeapBroker, HeapSnapshot};

fn assembler_with(config: AssemblerConfig, diagnostics: Arc<dyn Diagnostics>) -> CodeAssembler {
    let linkage = Linkage::shared();
    let heap = HeapSnapshot::new();
    let descriptor = linkage.js_call_descriptor(2, CallFlags::empty());
    CodeAssembler::new(linkage, descriptor, *heap.roots(), config, diagnostics)
}

fn assembler(diagnostics: &RecordingDiagnostics) -> CodeAssembler {
    assembler_with(AssemblerConfig::default(), Arc::new(diagnostics.clone()))
}

fn count_ops(graph: &Graph, matches: impl Fn(Operator) -> bool) -> usize {
    graph
        .live_ids()
        .filter(|&id| matches(graph.op(id)))
        .count()
}

// =============================================================================
// CodeAssembler Tests
// =============================================================================

#[test]
fn test_parameters_follow_descriptor() {
    let diagnostics = RecordingDiagnostics::new();
    let asm = assembler(&diagnostics);

    // Two JS parameters, then new target, argument count and context.
    assert_eq!(asm.parameter_count(), 5);
    assert_eq!(asm.context_parameter(), asm.parameter(4));
    assert!(asm.parameter(5).is_none());
    let p0 = asm.parameter(0).unwrap();
    assert_eq!(asm.graph().op(p0), Operator::Parameter(0));
    assert!(asm.is_reachable());
}

#[test]
fn test_load_root_folds_immortal_roots() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);

    let undefined = asm.load_root(RootIndex::Undefined);
    assert_eq!(
        asm.graph().op(undefined),
        Operator::HeapConstant(asm.roots().undefined)
    );

    let table = asm.load_root(RootIndex::StringTable);
    assert!(matches!(asm.graph().op(table), Operator::Load(_)));
    assert_eq!(asm.current.unwrap().effect, table);
}

#[test]
fn test_effect_nodes_thread_the_chain() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p0 = asm.parameter(0).unwrap();
    let offset = asm.intptr_constant(8);

    let store = asm.store(p0, offset, p0);
    let load = asm.load(MachineType::any_tagged(), p0, offset);

    let graph = asm.graph();
    assert_eq!(graph.effect_input(store), graph.start);
    assert_eq!(graph.effect_input(load), store);
    assert_eq!(
        graph.op(store),
        Operator::Store(StoreRepresentation {
            representation: MachineRepresentation::Tagged,
            write_barrier: WriteBarrierKind::Full,
        })
    );
}

#[test]
fn test_return_closes_block() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let value = asm.undefined_constant();
    asm.return_value(value);

    assert!(!asm.is_reachable());
    let graph = asm.graph();
    let ret = graph.control_input(graph.end);
    assert_eq!(graph.op(ret), Operator::Control(ControlOp::Return(1)));
    assert_eq!(graph.node(ret).input(1), value);
    assert!(graph.verify().is_ok());
    assert!(diagnostics.is_clean());
}

#[test]
fn test_emitting_without_block_is_reported() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let value = asm.undefined_constant();
    asm.return_value(value);
    asm.retain(value);

    assert_eq!(
        diagnostics.violations(),
        vec![Violation::NoCurrentBlock {
            operation: "retain"
        }]
    );
}

#[test]
fn test_comments_follow_config() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    asm.comment("dropped");
    assert_eq!(count_ops(asm.graph(), |op| matches!(op, Operator::Comment(_))), 0);

    let config = AssemblerConfig {
        code_comments: true,
        ..AssemblerConfig::default()
    };
    let mut asm = assembler_with(config, Arc::new(diagnostics.clone()));
    asm.comment("kept");
    assert_eq!(count_ops(asm.graph(), |op| matches!(op, Operator::Comment(_))), 1);
}

#[test]
fn test_break_on_existing_node() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p1 = asm.parameter(1).unwrap();
    asm.break_on_node(p1);
    assert!(asm.graph().node(p1).flags.contains(NodeFlags::BREAK));
}

#[test]
fn test_callbacks_registered_twice_is_reported() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    asm.register_call_generation_callbacks(Box::new(|_| {}), Box::new(|_| {}));
    asm.register_call_generation_callbacks(Box::new(|_| {}), Box::new(|_| {}));
    assert_eq!(
        diagnostics.violations(),
        vec![Violation::CallbacksAlreadyRegistered]
    );

    diagnostics.take();
    asm.unregister_call_generation_callbacks();
    asm.register_call_generation_callbacks(Box::new(|_| {}), Box::new(|_| {}));
    assert!(diagnostics.is_clean());
}

#[test]
fn test_generate_code_runs_once() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p0 = asm.parameter(0).unwrap();
    asm.return_value(p0);

    let mut generator = ListingGenerator::new();
    let listing = asm
        .generate_code(&mut generator, "identity", CodeFlags::STUB)
        .unwrap();
    assert_eq!(listing.name, "identity");
    assert!(listing.contains("return"));
    assert!(diagnostics.is_clean());

    let _ = asm.generate_code(&mut generator, "identity", CodeFlags::STUB);
    assert_eq!(diagnostics.violations(), vec![Violation::CodeAlreadyGenerated]);
}

// =============================================================================
// ControlAssembler Tests
// =============================================================================

#[test]
fn test_single_path_label_has_no_merge() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let before = asm.current.unwrap();

    let label = asm.new_label();
    asm.goto(label);
    assert!(!asm.is_reachable());
    asm.bind(label);

    assert_eq!(asm.current, Some(before));
    assert_eq!(asm.merge_count(label), 1);
    assert!(asm.is_label_bound(label));
    assert_eq!(count_ops(asm.graph(), |op| op.is_merge()), 0);
}

#[test]
fn test_branch_merges_distinct_values_with_phi() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let x = asm.new_variable(MachineRepresentation::Word32);
    let done = asm.new_label_with(&[x]);
    let other = asm.new_label();
    let one = asm.int32_constant(1);
    let two = asm.int32_constant(2);
    let p0 = asm.parameter(0).unwrap();
    let cond = asm.word_equal(p0, p0);

    asm.bind_variable(x, one);
    asm.branch(cond, done, other);
    asm.bind(other);
    asm.bind_variable(x, two);
    asm.goto(done);
    asm.bind(done);

    let value = asm.variable_value(x);
    let graph = asm.graph();
    assert_eq!(
        graph.op(value),
        Operator::Phi(MachineRepresentation::Word32, 2)
    );
    assert_eq!(&graph.node(value).inputs[..2], &[one, two]);
    // Both paths leave the effect chain untouched.
    assert_eq!(count_ops(graph, |op| matches!(op, Operator::EffectPhi(_))), 0);

    asm.return_value(value);
    assert!(asm.graph().verify().is_ok());
    assert!(diagnostics.is_clean());
}

#[test]
fn test_equal_values_do_not_create_phi() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let x = asm.new_variable(MachineRepresentation::Tagged);
    let done = asm.new_label_with(&[x]);
    let p0 = asm.parameter(0).unwrap();
    let cond = asm.word_equal(p0, p0);

    asm.bind_variable(x, p0);
    asm.branch(cond, done, done);
    asm.bind(done);

    assert_eq!(asm.variable_value(x), p0);
    assert_eq!(asm.merge_count(done), 2);
    assert_eq!(count_ops(asm.graph(), |op| op.is_phi()), 0);
    assert_eq!(
        count_ops(asm.graph(), |op| op == Operator::Control(ControlOp::Merge(2))),
        1
    );
}

#[test]
fn test_distinct_effects_create_effect_phi() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let done = asm.new_label();
    let side = asm.new_label();
    let p0 = asm.parameter(0).unwrap();
    let cond = asm.word_equal(p0, p0);

    asm.branch(cond, side, done);
    asm.bind(side);
    let retain = asm.retain(p0);
    asm.goto(done);
    asm.bind(done);

    let effect = asm.current.unwrap().effect;
    let graph = asm.graph();
    assert_eq!(graph.op(effect), Operator::EffectPhi(2));
    assert!(graph.node(effect).inputs.contains(&retain));
    assert!(graph.node(effect).inputs.contains(&graph.start));

    asm.return_value(p0);
    assert!(asm.graph().verify().is_ok());
}

#[test]
fn test_loop_phis_grow_with_back_edges() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let zero = asm.int32_constant(0);
    let i = asm.new_variable_with_value(MachineRepresentation::Word32, zero);
    let header = asm.new_loop_label(&[i]);
    let exit = asm.new_label();

    asm.goto(header);
    asm.bind(header);
    let phi = asm.variable_value(i);
    let one = asm.int32_constant(1);
    let next = asm.int32_add(phi, one);
    asm.bind_variable(i, next);
    let ten = asm.int32_constant(10);
    let cond = asm.int32_less_than(next, ten);
    asm.branch(cond, header, exit);
    asm.bind(exit);

    assert_eq!(asm.merge_count(header), 2);
    assert_eq!(asm.variable_value(i), next);

    let graph = asm.graph();
    assert_eq!(graph.op(phi), Operator::Phi(MachineRepresentation::Word32, 2));
    let inputs = &graph.node(phi).inputs;
    assert_eq!(&inputs[..2], &[zero, next]);
    assert_eq!(graph.op(inputs[2]), Operator::Control(ControlOp::Loop(2)));
    assert_eq!(count_ops(graph, |op| op == Operator::EffectPhi(2)), 1);

    asm.return_value(next);
    assert!(asm.graph().verify().is_ok());
    assert!(diagnostics.is_clean());
}

#[test]
fn test_binding_label_twice_is_reported() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let label = asm.new_label();
    asm.bind(label);
    asm.bind(label);

    assert!(matches!(
        diagnostics.violations().as_slice(),
        [Violation::LabelBoundTwice { .. }]
    ));
}

#[test]
#[should_panic(expected = "fatal")]
fn test_validating_diagnostics_abort() {
    let mut asm = assembler_with(AssemblerConfig::default(), Arc::new(ValidatingDiagnostics));
    let label = asm.new_label();
    asm.bind(label);
    asm.bind(label);
}

#[test]
fn test_jump_to_bound_label_is_reported() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let label = asm.new_label();
    asm.bind(label);
    asm.goto(label);

    assert!(matches!(
        diagnostics.violations().as_slice(),
        [Violation::BoundLabelReentered { .. }]
    ));
}

#[test]
fn test_missing_declared_variable_is_reported() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let x = asm.new_named_variable("x", MachineRepresentation::Tagged);
    let done = asm.new_label_with(&[x]);
    let left = asm.new_label();
    let right = asm.new_label();
    let p0 = asm.parameter(0).unwrap();
    let cond = asm.word_equal(p0, p0);

    asm.branch(cond, left, right);
    asm.bind(left);
    asm.bind_variable(x, p0);
    asm.goto(done);
    asm.bind(right);
    asm.goto(done);
    asm.bind(done);

    assert_eq!(
        diagnostics.violations(),
        vec![Violation::IncompleteMerge {
            label: asm.labels[done.0].name.clone(),
            variable: "x".into(),
            expected: 2,
            found: 1,
        }]
    );
    assert!(!asm.is_variable_bound(x));
}

#[test]
fn test_distinct_undeclared_variable_missing_on_one_path_is_reported() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let x = asm.new_named_variable("x", MachineRepresentation::Tagged);
    let p0 = asm.parameter(0).unwrap();
    let p1 = asm.parameter(1).unwrap();
    let index = asm.truncate_intptr_to_int32(p0);
    let done = asm.new_label();
    let unset = asm.new_label();
    let first = asm.new_label();
    let second = asm.new_label();

    asm.switch(index, second, &[(0, unset), (1, first)]);
    asm.bind(unset);
    asm.goto(done);
    asm.bind(first);
    asm.bind_variable(x, p0);
    asm.goto(done);
    asm.bind(second);
    asm.bind_variable(x, p1);
    asm.goto(done);
    asm.bind(done);

    assert_eq!(asm.merge_count(done), 3);
    assert_eq!(
        diagnostics.violations(),
        vec![Violation::IncompleteMerge {
            label: asm.labels[done.0].name.clone(),
            variable: "x".into(),
            expected: 3,
            found: 2,
        }]
    );
    assert!(!asm.is_variable_bound(x));
}

#[test]
fn test_equal_undeclared_variable_missing_on_one_path_is_dropped() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let x = asm.new_named_variable("x", MachineRepresentation::Tagged);
    let p0 = asm.parameter(0).unwrap();
    let cond = asm.word_equal(p0, p0);
    let done = asm.new_label();
    let left = asm.new_label();
    let right = asm.new_label();

    asm.branch(cond, left, right);
    asm.bind(left);
    asm.bind_variable(x, p0);
    asm.goto(done);
    asm.bind(right);
    asm.goto(done);
    asm.bind(done);

    assert!(diagnostics.is_clean(), "{:?}", diagnostics.violations());
    assert!(!asm.is_variable_bound(x));
}

#[test]
fn test_reading_unbound_variable_is_reported() {
    let diagnostics = RecordingDiagnostics::new();
    let asm_variable = {
        let mut asm = assembler(&diagnostics);
        let x = asm.new_named_variable("x", MachineRepresentation::Word64);
        (asm.variable_value(x), asm.variable_name(x).to_owned())
    };

    assert_eq!(asm_variable, (NodeId::INVALID, "x".to_owned()));
    assert_eq!(
        diagnostics.violations(),
        vec![Violation::UnboundVariable {
            variable: "x".into()
        }]
    );
}

#[test]
fn test_released_variable_skips_merges() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p0 = asm.parameter(0).unwrap();
    let x = asm.new_variable_with_value(MachineRepresentation::Tagged, p0);
    asm.release_variable(x);

    let label = asm.new_label_with(&[]);
    asm.goto(label);
    asm.bind(label);
    assert!(!asm.is_variable_bound(x));
    assert!(diagnostics.is_clean());
}

#[test]
fn test_unreached_label_leaves_code_unreachable() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p0 = asm.parameter(0).unwrap();
    let x = asm.new_variable_with_value(MachineRepresentation::Tagged, p0);
    asm.return_value(p0);

    let dead = asm.new_label();
    asm.bind(dead);
    assert!(!asm.is_reachable());
    assert!(!asm.is_variable_bound(x));
    assert_eq!(asm.merge_count(dead), 0);
}

#[test]
fn test_switch_routes_each_case() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p0 = asm.parameter(0).unwrap();
    let index = asm.truncate_intptr_to_int32(p0);
    let a = asm.new_label();
    let b = asm.new_label();
    let default = asm.new_deferred_label();

    asm.switch(index, default, &[(1, a), (2, b)]);
    for (label, result) in [(a, 10), (b, 20), (default, 30)] {
        asm.bind(label);
        let value = asm.int32_constant(result);
        asm.return_value(value);
    }

    let graph = asm.graph();
    assert_eq!(
        count_ops(graph, |op| op == Operator::Control(ControlOp::Switch(3))),
        1
    );
    assert_eq!(
        count_ops(graph, |op| matches!(op, Operator::Control(ControlOp::IfValue(_)))),
        2
    );
    assert_eq!(graph.op(graph.end), Operator::Control(ControlOp::End(3)));
    assert!(graph.verify().is_ok());
    assert!(diagnostics.is_clean());
}

#[test]
fn test_exception_edge_binds_handler_variable() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let context = asm.context_parameter().unwrap();
    let exception = asm.new_named_variable("exception", MachineRepresentation::Tagged);
    let handler = asm.new_label();

    let call = asm.call_runtime(RuntimeFunctionId::StackGuard, context, &[]);
    asm.goto_if_exception(call, handler, Some(exception));
    assert!(!asm.is_variable_bound(exception));
    let success = asm.current.unwrap().control;
    assert_eq!(
        asm.graph().op(success),
        Operator::Control(ControlOp::IfSuccess)
    );
    asm.return_value(call);

    asm.bind(handler);
    let thrown = asm.variable_value(exception);
    assert_eq!(
        asm.graph().op(thrown),
        Operator::Control(ControlOp::IfException)
    );
    asm.return_value(thrown);

    assert!(asm.graph().verify().is_ok());
    assert!(diagnostics.is_clean());
}

#[test]
fn test_return_if_keeps_block_open() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p0 = asm.parameter(0).unwrap();
    let p1 = asm.parameter(1).unwrap();
    let cond = asm.word_equal(p0, p1);

    asm.return_if(cond, p0);
    assert!(asm.is_reachable());
    asm.return_value(p1);

    let graph = asm.graph();
    assert_eq!(graph.op(graph.end), Operator::Control(ControlOp::End(2)));
    assert!(graph.verify().is_ok());
}

#[test]
fn test_unreachable_ends_in_throw() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    asm.unreachable();

    assert!(!asm.is_reachable());
    let graph = asm.graph();
    let throw = graph.control_input(graph.end);
    assert_eq!(graph.op(throw), Operator::Control(ControlOp::Throw));
    assert_eq!(graph.op(graph.effect_input(throw)), Operator::Unreachable);
}

// =============================================================================
// MachineAssembler Tests
// =============================================================================

#[test]
fn test_integer_arithmetic_folds_constants() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let three = asm.intptr_constant(3);
    let four = asm.intptr_constant(4);
    let zero = asm.intptr_constant(0);
    let p0 = asm.parameter(0).unwrap();

    let sum = asm.intptr_add(three, four);
    assert_eq!(asm.to_intptr_constant(sum), Some(7));
    let diff = asm.intptr_sub(three, four);
    assert_eq!(asm.to_intptr_constant(diff), Some(-1));
    assert_eq!(asm.intptr_add(p0, zero), p0);
    assert_eq!(asm.intptr_add(zero, p0), p0);

    let a = asm.int32_constant(i32::MAX);
    let b = asm.int32_constant(1);
    let wrapped = asm.int32_add(a, b);
    assert_eq!(asm.to_int32_constant(wrapped), Some(i32::MIN));

    let added = asm.intptr_add(p0, three);
    assert_eq!(
        asm.graph().op(added),
        Operator::Machine(MachineOp::Int64Add)
    );
}

#[test]
fn test_smi_tagging() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);

    let smi = asm.smi_constant(-5);
    assert_eq!(asm.to_smi_constant(smi), Some(-5));

    let word = asm.intptr_constant(12);
    let tagged = asm.smi_tag(word);
    assert_eq!(asm.to_smi_constant(tagged), Some(12));

    let number = asm.number_constant(3.0);
    assert_eq!(asm.to_smi_constant(number), Some(3));
    let fraction = asm.number_constant(0.5);
    assert_eq!(asm.to_smi_constant(fraction), None);
    let negative_zero = asm.number_constant(-0.0);
    assert_eq!(asm.to_smi_constant(negative_zero), None);
}

#[test]
fn test_shifts_fold_and_skip_zero() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics);
    let p0 = asm.parameter(0).unwrap();
    let zero = asm.int32_constant(0);
    let two = asm.int32_constant(2);
    let five = asm.intptr_constant(5);

    assert_eq!(asm.word_shl(p0, zero), p0);
    let shifted = asm.word_shl(five, two);
    assert_eq!(asm.to_intptr_constant(shifted), Some(20));
    let minus = asm.intptr_constant(-20);
    let sar = asm.word_sar(minus, two);
    assert_eq!(asm.to_intptr_constant(sar), Some(-5));
}

//! Stubs built with the code assembler and rendered as listings.

use std::sync::Arc;

use cinder_jit::assembler::{CodeAssembler, ControlAssembler, MachineAssembler};
use cinder_jit::calls::{CallAssembler, CallFlags, Linkage, RuntimeFunctionId};
use cinder_jit::codegen::{CodeFlags, CodeListing, ListingGenerator};
use cinder_jit::diagnostics::{RecordingDiagnostics, Violation};
use cinder_jit::heap::{HeapBroker, HeapSnapshot};
use cinder_jit::ir::MachineRepresentation;
use cinder_jit::{AssemblerConfig, CompileError};

fn assembler(diagnostics: &RecordingDiagnostics, config: AssemblerConfig) -> CodeAssembler {
    let linkage = Linkage::shared();
    let heap = HeapSnapshot::new();
    let descriptor = linkage.js_call_descriptor(1, CallFlags::empty());
    CodeAssembler::new(
        linkage,
        descriptor,
        *heap.roots(),
        config,
        Arc::new(diagnostics.clone()),
    )
}

fn generate(asm: &mut CodeAssembler, name: &str, flags: CodeFlags) -> CodeListing {
    asm.generate_code(&mut ListingGenerator::new(), name, flags).unwrap()
}

/// `sum = 0; for (i = n; i != 0; i--) sum += i; return sum`
fn build_sum_loop(asm: &mut CodeAssembler) {
    let n = asm.parameter(0).unwrap();
    let n = asm.smi_untag(n);
    let n = asm.truncate_intptr_to_int32(n);
    let zero = asm.int32_constant(0);
    let one = asm.int32_constant(1);

    let i = asm.new_named_variable("i", MachineRepresentation::Word32);
    let sum = asm.new_named_variable("sum", MachineRepresentation::Word32);
    asm.bind_variable(i, n);
    asm.bind_variable(sum, zero);

    let header = asm.new_loop_label(&[i, sum]);
    let body = asm.new_label();
    let exit = asm.new_label_with(&[sum]);
    asm.goto(header);

    asm.bind(header);
    let current = asm.variable_value(i);
    let done = asm.word32_equal(current, zero);
    asm.branch(done, exit, body);

    asm.bind(body);
    let total = asm.variable_value(sum);
    let total = asm.int32_add(total, current);
    asm.bind_variable(sum, total);
    let next = asm.int32_sub(current, one);
    asm.bind_variable(i, next);
    asm.goto(header);

    asm.bind(exit);
    let result = asm.variable_value(sum);
    let result = asm.change_int32_to_intptr(result);
    let result = asm.smi_tag(result);
    asm.return_value(result);
}

#[test]
fn test_loop_stub_listing() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics, AssemblerConfig::default());
    build_sum_loop(&mut asm);

    let listing = generate(&mut asm, "SumLoop", CodeFlags::STUB);
    assert!(diagnostics.is_clean(), "{:?}", diagnostics.violations());
    assert_eq!(listing.name, "SumLoop");
    assert_eq!(listing.blocks.len(), 4);
    assert_eq!(listing.blocks.iter().filter(|b| b.loop_header).count(), 1);
    assert!(listing.contains("Phi["));
    assert!(listing.contains("branch"));
    assert!(listing.contains("return"));
    assert!(listing.instruction_count > 0);

    let header = listing.blocks.iter().find(|b| b.loop_header).unwrap();
    assert_eq!(header.predecessors.len(), 2);
}

#[test]
fn test_call_with_handler_listing() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics, AssemblerConfig::default());
    let context = asm.context_parameter().unwrap();
    let exception = asm.new_named_variable("exception", MachineRepresentation::Tagged);
    let handler = asm.new_deferred_label();

    let call = asm.call_runtime(RuntimeFunctionId::StackGuard, context, &[]);
    asm.goto_if_exception(call, handler, Some(exception));
    let undefined = asm.undefined_constant();
    asm.return_value(undefined);

    asm.bind(handler);
    let thrown = asm.variable_value(exception);
    asm.tail_call_runtime(RuntimeFunctionId::Abort, context, &[thrown]);

    let listing = generate(&mut asm, "GuardedCall", CodeFlags::STUB);
    assert!(diagnostics.is_clean(), "{:?}", diagnostics.violations());
    assert!(listing.contains("exception"));
    assert!(listing.contains("IfException"));
    assert!(listing.contains("TailCall"));
}

#[test]
fn test_comments_reach_listing_when_enabled() {
    let diagnostics = RecordingDiagnostics::new();
    let config = AssemblerConfig {
        code_comments: true,
        ..AssemblerConfig::default()
    };
    let mut asm = assembler(&diagnostics, config);
    asm.comment("entry");
    let p0 = asm.parameter(0).unwrap();
    asm.return_value(p0);

    let listing = generate(&mut asm, "Commented", CodeFlags::STUB | CodeFlags::COMMENTS);
    assert!(listing.contains("; entry"));

    let mut asm = assembler(&diagnostics, AssemblerConfig::default());
    asm.comment("entry");
    let p0 = asm.parameter(0).unwrap();
    asm.return_value(p0);
    let listing = generate(&mut asm, "Plain", CodeFlags::STUB | CodeFlags::COMMENTS);
    assert!(!listing.contains("; entry"));
}

#[test]
fn test_instruction_limit_fails_compile() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics, AssemblerConfig::default());
    build_sum_loop(&mut asm);

    let result = asm.generate_code(&mut ListingGenerator::with_limit(2), "Tiny", CodeFlags::STUB);
    assert!(matches!(result, Err(CompileError::Codegen(_))));
}

#[test]
fn test_open_block_fails_verification() {
    let diagnostics = RecordingDiagnostics::new();
    let mut asm = assembler(&diagnostics, AssemblerConfig::default());
    let p0 = asm.parameter(0).unwrap();
    let cond = asm.word_equal(p0, p0);
    let left = asm.new_label();
    let right = asm.new_label();
    asm.branch(cond, left, right);
    asm.bind(left);
    asm.return_value(p0);
    // `right` is never bound, so its branch projection leads nowhere.

    let result = asm.generate_code(&mut ListingGenerator::new(), "Open", CodeFlags::STUB);
    assert!(matches!(result, Err(CompileError::Verify(_))));
    assert!(!diagnostics
        .violations()
        .contains(&Violation::CodeAlreadyGenerated));
}

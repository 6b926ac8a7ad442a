//! Structured code assembler.
//!
//! `CodeAssembler` builds a graph for one stub in straight-line style: it
//! tracks the current effect and control, threads every effectful node
//! onto them, and provides labels and variables so that callers can write
//! branches and loops without wiring merges and phis by hand.
//!
//! Functionality is split across builder traits:
//! - **Control** (`label.rs`): labels, gotos, branches, switches, loops
//! - **Machine** (`machine.rs`): word and float arithmetic with folding
//! - **Calls** (`crate::calls::emit`): stub, runtime and C calls
//!
//! Variables live in `variable.rs`.
//!
//! # Example
//!
//! ```
//! use cinder_jit::assembler::{CodeAssembler, ControlAssembler, MachineAssembler};
//! use cinder_jit::calls::{CallFlags, Linkage};
//! use cinder_jit::heap::{HeapBroker, HeapSnapshot};
//! use cinder_jit::ir::MachineRepresentation;
//!
//! let linkage = Linkage::shared();
//! let heap = HeapSnapshot::new();
//! let descriptor = linkage.js_call_descriptor(2, CallFlags::empty());
//! let mut asm = CodeAssembler::with_defaults(linkage, descriptor, *heap.roots());
//!
//! let x = asm.new_variable(MachineRepresentation::Word32);
//! let done = asm.new_label_with(&[x]);
//! let is_zero = asm.new_label();
//! let one = asm.int32_constant(1);
//! let zero = asm.int32_constant(0);
//! let cond = asm.word32_equal(one, zero);
//! asm.bind_variable(x, one);
//! asm.branch(cond, is_zero, done);
//! asm.bind(is_zero);
//! asm.bind_variable(x, zero);
//! asm.goto(done);
//! asm.bind(done);
//! let value = asm.variable_value(x);
//! asm.return_value(value);
//! assert!(asm.graph().verify().is_ok());
//! ```

pub mod label;
pub mod machine;
pub mod variable;

#[cfg(test)]
mod tests;

pub use label::{ControlAssembler, Label, LabelKind};
pub use machine::MachineAssembler;
pub use variable::Variable;

use std::sync::Arc;

use crate::calls::{CallDescriptor, DescriptorId, Linkage};
use crate::codegen::{self, CodeFlags, CodeGenerator};
use crate::config::AssemblerConfig;
use crate::diagnostics::{self, Diagnostics, Violation};
use crate::error::CompileResult;
use crate::heap::{ObjectRef, RootIndex, Roots};
use crate::ir::arena::Arena;
use crate::ir::operators::{
    ControlOp, ExternalReference, MachineOp, Operator, StoreRepresentation, WriteBarrierKind,
};
use crate::ir::types::{MachineRepresentation, MachineType, Type};
use crate::ir::{Graph, NodeFlags, NodeId};

use label::LabelData;
use variable::VariableData;

/// Hook run around every non-tail call the assembler emits.
pub type CallCallback = Box<dyn FnMut(&mut CodeAssembler)>;

/// Effect and control of the block being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) effect: NodeId,
    pub(crate) control: NodeId,
}

// =============================================================================
// Code Assembler
// =============================================================================

/// Builder for the graph of one stub.
pub struct CodeAssembler {
    pub(crate) graph: Graph,
    linkage: Arc<Linkage>,
    descriptor: DescriptorId,
    roots: Roots,
    config: AssemblerConfig,
    diagnostics: Arc<dyn Diagnostics>,

    /// One `Parameter` node per descriptor parameter.
    parameters: Vec<NodeId>,

    /// `None` after a terminator or an unconditional jump.
    pub(crate) current: Option<Position>,

    pub(crate) variables: Arena<VariableData>,
    pub(crate) labels: Arena<LabelData>,

    call_prologue: Option<CallCallback>,
    call_epilogue: Option<CallCallback>,
    break_on: Option<NodeId>,
    code_generated: bool,
}

impl CodeAssembler {
    /// Create an assembler for code with the calling convention `descriptor`.
    pub fn new(
        linkage: Arc<Linkage>,
        descriptor: DescriptorId,
        roots: Roots,
        config: AssemblerConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        let mut graph = Graph::with_capacity(config.initial_node_capacity);
        let start = graph.start;
        let parameter_count = linkage.descriptor(descriptor).parameter_count();
        let parameters = (0..parameter_count)
            .map(|i| graph.add_node(Operator::Parameter(i as u32), &[start]))
            .collect();

        CodeAssembler {
            graph,
            linkage,
            descriptor,
            roots,
            config,
            diagnostics,
            parameters,
            current: Some(Position {
                effect: start,
                control: start,
            }),
            variables: Arena::new(),
            labels: Arena::new(),
            call_prologue: None,
            call_epilogue: None,
            break_on: None,
            code_generated: false,
        }
    }

    /// Default configuration and build-dependent diagnostics.
    pub fn with_defaults(linkage: Arc<Linkage>, descriptor: DescriptorId, roots: Roots) -> Self {
        Self::new(
            linkage,
            descriptor,
            roots,
            AssemblerConfig::default(),
            diagnostics::default_for_build(),
        )
    }

    /// Take the finished graph.
    pub fn finish(self) -> Graph {
        self.graph
    }

    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[inline]
    pub fn linkage(&self) -> &Arc<Linkage> {
        &self.linkage
    }

    #[inline]
    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    #[inline]
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Descriptor of the code being assembled.
    pub fn call_descriptor(&self) -> Arc<CallDescriptor> {
        self.linkage.descriptor(self.descriptor)
    }

    pub fn parameter(&self, index: usize) -> Option<NodeId> {
        self.parameters.get(index).copied()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// The context parameter, for descriptors that take one.
    pub fn context_parameter(&self) -> Option<NodeId> {
        self.call_descriptor()
            .context_parameter_index()
            .and_then(|index| self.parameter(index))
    }

    /// Check whether there is a current block to emit into.
    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.current.is_some()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    #[inline]
    pub(crate) fn checks_enabled(&self) -> bool {
        self.diagnostics.enabled()
    }

    #[inline]
    pub(crate) fn report(&self, violation: Violation) {
        self.diagnostics.report(violation);
    }

    // =========================================================================
    // Node Emission
    // =========================================================================

    /// Add a node without touching effect or control.
    pub(crate) fn add_node(&mut self, op: Operator, inputs: &[NodeId]) -> NodeId {
        let id = self.graph.add_node(op, inputs);
        self.note_node(id);
        id
    }

    fn note_node(&mut self, id: NodeId) {
        if self.break_on == Some(id) {
            log::debug!("break on node {} ({})", id, self.graph.op(id));
            self.graph.flags_mut(id).insert(NodeFlags::BREAK);
        }
    }

    /// Position to emit at, reporting if the current block is closed.
    pub(crate) fn position(&mut self, operation: &'static str) -> Position {
        match self.current {
            Some(position) => position,
            None => {
                self.report(Violation::NoCurrentBlock { operation });
                let start = self.graph.start;
                Position {
                    effect: start,
                    control: start,
                }
            }
        }
    }

    /// Add a node that takes the current effect and control as its trailing
    /// inputs, and advance them past it.
    pub(crate) fn add_effect_node(
        &mut self,
        op: Operator,
        values: &[NodeId],
        operation: &'static str,
    ) -> NodeId {
        let position = self.position(operation);
        let layout = op.layout();
        let mut inputs: smallvec::SmallVec<[NodeId; 8]> = values.iter().copied().collect();
        if layout.effects > 0 {
            inputs.push(position.effect);
        }
        if layout.controls > 0 {
            inputs.push(position.control);
        }
        let node = self.add_node(op, &inputs);

        let outputs = op.outputs();
        if let Some(current) = self.current.as_mut() {
            if outputs.effects > 0 {
                current.effect = node;
            }
            if outputs.controls > 0 {
                current.control = node;
            }
        }
        node
    }

    /// Add a terminator and close the current block.
    pub(crate) fn add_terminator(
        &mut self,
        op: Operator,
        values: &[NodeId],
        operation: &'static str,
    ) -> NodeId {
        let node = self.add_effect_node(op, values, operation);
        self.graph.merge_control_to_end(node);
        self.current = None;
        node
    }

    // =========================================================================
    // Constants
    // =========================================================================

    pub fn int64_constant(&mut self, value: i64) -> NodeId {
        self.graph.int64_constant(value)
    }

    /// Pointer-sized integer constant.
    pub fn intptr_constant(&mut self, value: i64) -> NodeId {
        self.graph.int64_constant(value)
    }

    pub fn float64_constant(&mut self, value: f64) -> NodeId {
        self.graph.float64_constant(value)
    }

    pub fn number_constant(&mut self, value: f64) -> NodeId {
        self.graph.number_constant(value)
    }

    /// Tagged small integer: the payload sits in the upper half of the word.
    pub fn smi_constant(&mut self, value: i32) -> NodeId {
        let word = self.graph.int64_constant((value as i64) << 32);
        let node = self.add_node(Operator::Machine(MachineOp::BitcastWordToTagged), &[word]);
        self.graph.set_type(node, Type::constant(value as f64));
        node
    }

    pub fn heap_constant(&mut self, object: ObjectRef) -> NodeId {
        self.graph.heap_constant(object)
    }

    pub fn external_constant(&mut self, reference: ExternalReference) -> NodeId {
        self.graph.external_constant(reference)
    }

    pub fn boolean_constant(&mut self, value: bool) -> NodeId {
        let object = if value {
            self.roots.true_value
        } else {
            self.roots.false_value
        };
        self.heap_constant(object)
    }

    pub fn undefined_constant(&mut self) -> NodeId {
        self.heap_constant(self.roots.undefined)
    }

    pub fn null_constant(&mut self) -> NodeId {
        self.heap_constant(self.roots.null)
    }

    pub fn the_hole_constant(&mut self) -> NodeId {
        self.heap_constant(self.roots.the_hole)
    }

    pub fn empty_fixed_array_constant(&mut self) -> NodeId {
        self.heap_constant(self.roots.empty_fixed_array)
    }

    // =========================================================================
    // Memory
    // =========================================================================

    pub fn load(&mut self, ty: MachineType, base: NodeId, offset: NodeId) -> NodeId {
        self.add_effect_node(Operator::Load(ty), &[base, offset], "load")
    }

    pub fn atomic_load(&mut self, ty: MachineType, base: NodeId, offset: NodeId) -> NodeId {
        self.add_effect_node(Operator::AtomicLoad(ty), &[base, offset], "atomic_load")
    }

    /// Load a root. Immortal roots fold to constants; the rest are read
    /// from the root list.
    pub fn load_root(&mut self, index: RootIndex) -> NodeId {
        if let Some(object) = self.roots.constant(index) {
            return self.heap_constant(object);
        }
        let roots = self.external_constant(ExternalReference::RootsArrayStart);
        let offset = self.intptr_constant(index.offset());
        self.load(MachineType::any_tagged(), roots, offset)
    }

    /// Tagged store with the full write barrier.
    pub fn store(&mut self, base: NodeId, offset: NodeId, value: NodeId) -> NodeId {
        self.emit_store(
            MachineRepresentation::Tagged,
            WriteBarrierKind::Full,
            base,
            offset,
            value,
        )
    }

    /// Store of a map word.
    pub fn store_with_map_write_barrier(
        &mut self,
        base: NodeId,
        offset: NodeId,
        value: NodeId,
    ) -> NodeId {
        self.emit_store(
            MachineRepresentation::Tagged,
            WriteBarrierKind::Map,
            base,
            offset,
            value,
        )
    }

    pub fn store_no_write_barrier(
        &mut self,
        representation: MachineRepresentation,
        base: NodeId,
        offset: NodeId,
        value: NodeId,
    ) -> NodeId {
        self.emit_store(representation, WriteBarrierKind::None, base, offset, value)
    }

    pub fn atomic_store(
        &mut self,
        representation: MachineRepresentation,
        base: NodeId,
        offset: NodeId,
        value: NodeId,
    ) -> NodeId {
        self.add_effect_node(
            Operator::AtomicStore(representation),
            &[base, offset, value],
            "atomic_store",
        )
    }

    pub fn store_root(&mut self, index: RootIndex, value: NodeId) -> NodeId {
        let roots = self.external_constant(ExternalReference::RootsArrayStart);
        let offset = self.intptr_constant(index.offset());
        self.store_no_write_barrier(MachineRepresentation::Tagged, roots, offset, value)
    }

    fn emit_store(
        &mut self,
        representation: MachineRepresentation,
        write_barrier: WriteBarrierKind,
        base: NodeId,
        offset: NodeId,
        value: NodeId,
    ) -> NodeId {
        let op = Operator::Store(StoreRepresentation {
            representation,
            write_barrier,
        });
        self.add_effect_node(op, &[base, offset, value], "store")
    }

    /// Keep `value` alive up to this point of the effect chain.
    pub fn retain(&mut self, value: NodeId) -> NodeId {
        self.add_effect_node(Operator::Retain, &[value], "retain")
    }

    /// Output `index` of a multi-output node.
    pub fn projection(&mut self, index: u32, node: NodeId) -> NodeId {
        self.add_node(Operator::Projection(index), &[node])
    }

    // =========================================================================
    // Returns and Terminators
    // =========================================================================

    pub fn return_value(&mut self, value: NodeId) {
        self.emit_return(None, &[value]);
    }

    /// Return up to three values.
    pub fn return_values(&mut self, values: &[NodeId]) {
        debug_assert!(
            (1..=3).contains(&values.len()),
            "return_values takes one to three values"
        );
        self.emit_return(None, values);
    }

    /// Return `value` and pop `pop` extra stack slots.
    pub fn pop_and_return(&mut self, pop: NodeId, value: NodeId) {
        self.emit_return(Some(pop), &[value]);
    }

    fn emit_return(&mut self, pop: Option<NodeId>, values: &[NodeId]) {
        let pop = match pop {
            Some(pop) => pop,
            None => self.graph.int32_constant(0),
        };
        let mut inputs: smallvec::SmallVec<[NodeId; 4]> = smallvec::smallvec![pop];
        inputs.extend_from_slice(values);
        self.add_terminator(
            Operator::Control(ControlOp::Return(values.len() as u32)),
            &inputs,
            "return",
        );
    }

    pub fn debug_break(&mut self) {
        self.add_effect_node(Operator::DebugBreak, &[], "debug_break");
    }

    /// Mark the current point as unreachable and close the block.
    pub fn unreachable(&mut self) {
        self.debug_break();
        self.add_effect_node(Operator::Unreachable, &[], "unreachable");
        self.add_terminator(Operator::Control(ControlOp::Throw), &[], "unreachable");
    }

    /// Attach a comment; a no-op unless `code_comments` is enabled.
    pub fn comment(&mut self, text: impl Into<String>) {
        if !self.config.code_comments {
            return;
        }
        let id = self.graph.add_comment(text);
        self.add_effect_node(Operator::Comment(id), &[], "comment");
    }

    // =========================================================================
    // Debugging
    // =========================================================================

    /// Flag node `id` as a breakpoint, now or when it is created.
    pub fn break_on_node(&mut self, id: NodeId) {
        self.break_on = Some(id);
        if self.graph.get(id).is_some() {
            self.note_node(id);
        }
    }

    // =========================================================================
    // Call Hooks
    // =========================================================================

    /// Install hooks run before and after each non-tail call.
    pub fn register_call_generation_callbacks(
        &mut self,
        prologue: CallCallback,
        epilogue: CallCallback,
    ) {
        if self.call_prologue.is_some() || self.call_epilogue.is_some() {
            self.report(Violation::CallbacksAlreadyRegistered);
        }
        self.call_prologue = Some(prologue);
        self.call_epilogue = Some(epilogue);
    }

    pub fn unregister_call_generation_callbacks(&mut self) {
        self.call_prologue = None;
        self.call_epilogue = None;
    }

    pub(crate) fn call_prologue(&mut self) {
        if let Some(mut callback) = self.call_prologue.take() {
            callback(self);
            self.call_prologue.get_or_insert(callback);
        }
    }

    pub(crate) fn call_epilogue(&mut self) {
        if let Some(mut callback) = self.call_epilogue.take() {
            callback(self);
            self.call_epilogue.get_or_insert(callback);
        }
    }

    // =========================================================================
    // Code Generation
    // =========================================================================

    /// Verify, schedule and hand the graph to `generator`. Runs once per
    /// assembler.
    pub fn generate_code<G: CodeGenerator>(
        &mut self,
        generator: &mut G,
        name: &str,
        flags: CodeFlags,
    ) -> CompileResult<G::Artifact> {
        if self.code_generated {
            self.report(Violation::CodeAlreadyGenerated);
        }
        self.code_generated = true;
        let descriptor = self.call_descriptor();
        log::debug!("generating code for {} ({} nodes)", name, self.graph.len());
        codegen::compile(&self.graph, &descriptor, generator, name, flags)
    }
}

impl std::fmt::Debug for CodeAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeAssembler")
            .field("descriptor", &self.descriptor)
            .field("nodes", &self.graph.len())
            .field("reachable", &self.is_reachable())
            .finish_non_exhaustive()
    }
}

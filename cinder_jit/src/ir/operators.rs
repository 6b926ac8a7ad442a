//! Operator catalog.
//!
//! Operators are organized by level:
//! - **Common**: control flow, phis, constants, regions, frame states, calls
//! - **Machine**: word/float arithmetic and raw memory access
//! - **Simplified**: tagged field/element access, allocation, checks
//! - **JS creation**: high-level "create X" operations consumed by lowering
//!
//! Every operator is a small `Copy` value. Its static shape is described by
//! an [`InputLayout`] (value, context, frame state, effect and control input
//! counts, in that order), an [`OutputCounts`], and [`OpProperties`].
//! Variable-arity operators carry their arity as a parameter so the layout
//! is a pure function of the operator.

use std::fmt;

use super::types::{MachineRepresentation, MachineType, TypeBits};
use crate::calls::{Builtin, DescriptorId};
use crate::heap::ObjectRef;

// =============================================================================
// Properties and Shape
// =============================================================================

bitflags::bitflags! {
    /// Static operator properties.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpProperties: u8 {
        const COMMUTATIVE = 1 << 0;
        const ASSOCIATIVE = 1 << 1;
        const IDEMPOTENT = 1 << 2;
        const NO_READ = 1 << 3;
        const NO_WRITE = 1 << 4;
        const NO_THROW = 1 << 5;
        const NO_DEOPT = 1 << 6;

        const FOLDABLE = Self::NO_READ.bits() | Self::NO_WRITE.bits();
        const ELIMINATABLE = Self::NO_DEOPT.bits() | Self::NO_WRITE.bits() | Self::NO_THROW.bits();
        const PURE = Self::NO_READ.bits()
            | Self::NO_WRITE.bits()
            | Self::NO_THROW.bits()
            | Self::NO_DEOPT.bits()
            | Self::IDEMPOTENT.bits();
    }
}

/// Input counts of an operator, in input-list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputLayout {
    pub values: u32,
    pub context: bool,
    pub frame_state: bool,
    pub effects: u32,
    pub controls: u32,
}

impl InputLayout {
    pub const fn new(values: u32, effects: u32, controls: u32) -> Self {
        InputLayout {
            values,
            context: false,
            frame_state: false,
            effects,
            controls,
        }
    }

    const fn js(values: u32, frame_state: bool) -> Self {
        InputLayout {
            values,
            context: true,
            frame_state,
            effects: 1,
            controls: 1,
        }
    }

    #[inline]
    pub const fn context_index(&self) -> usize {
        self.values as usize
    }

    #[inline]
    pub const fn frame_state_index(&self) -> usize {
        self.values as usize + self.context as usize
    }

    #[inline]
    pub const fn first_effect_index(&self) -> usize {
        self.frame_state_index() + self.frame_state as usize
    }

    #[inline]
    pub const fn first_control_index(&self) -> usize {
        self.first_effect_index() + self.effects as usize
    }

    #[inline]
    pub const fn total(&self) -> usize {
        self.first_control_index() + self.controls as usize
    }
}

/// Output counts of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputCounts {
    pub values: u32,
    pub effects: u32,
    pub controls: u32,
}

impl OutputCounts {
    const fn new(values: u32, effects: u32, controls: u32) -> Self {
        OutputCounts {
            values,
            effects,
            controls,
        }
    }
}

// =============================================================================
// Control Operators
// =============================================================================

/// Control-flow operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Graph entry; produces the initial effect and control.
    Start,
    /// Synthetic exit merging every terminator.
    End(u32),
    /// Control merge of `n` predecessors.
    Merge(u32),
    /// Loop header; input 0 is the entry, the rest are back edges.
    Loop(u32),
    /// Two-way split on a bit value.
    Branch,
    IfTrue,
    IfFalse,
    /// N-way split; the count includes the default successor.
    Switch(u32),
    IfValue(i32),
    IfDefault,
    /// Normal continuation of a potentially throwing call.
    IfSuccess,
    /// Exceptional continuation; also yields the exception value.
    IfException,
    /// Return with a pop count followed by `n` return values.
    Return(u32),
    Throw,
}

// =============================================================================
// Machine Operators
// =============================================================================

/// Pure machine-level arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineOp {
    Word32And,
    Word32Or,
    Word32Xor,
    Word32Shl,
    Word32Shr,
    Word32Sar,
    Word32Equal,
    Int32Add,
    Int32Sub,
    Int32Mul,
    Int32LessThan,
    Int32LessThanOrEqual,
    Uint32LessThan,
    Uint32LessThanOrEqual,
    Word64And,
    Word64Or,
    Word64Xor,
    Word64Shl,
    Word64Shr,
    Word64Sar,
    Word64Equal,
    Int64Add,
    Int64Sub,
    Int64Mul,
    Int64LessThan,
    Int64LessThanOrEqual,
    Uint64LessThan,
    Float64Add,
    Float64Sub,
    Float64Mul,
    Float64Div,
    Float64Equal,
    Float64LessThan,
    Float64LessThanOrEqual,
    Float64SilenceNaN,
    ChangeInt32ToFloat64,
    ChangeInt32ToInt64,
    ChangeUint32ToUint64,
    ChangeFloat64ToInt32,
    TruncateInt64ToInt32,
    BitcastTaggedToWord,
    BitcastWordToTagged,
    LoadFramePointer,
    LoadParentFramePointer,
    LoadStackPointer,
}

impl MachineOp {
    pub const fn value_input_count(self) -> u32 {
        use MachineOp::*;
        match self {
            LoadFramePointer | LoadParentFramePointer | LoadStackPointer => 0,
            Float64SilenceNaN | ChangeInt32ToFloat64 | ChangeInt32ToInt64
            | ChangeUint32ToUint64 | ChangeFloat64ToInt32 | TruncateInt64ToInt32
            | BitcastTaggedToWord | BitcastWordToTagged => 1,
            _ => 2,
        }
    }

    /// Representation of the result.
    pub const fn output_representation(self) -> MachineRepresentation {
        use MachineOp::*;
        match self {
            Word32Equal | Int32LessThan | Int32LessThanOrEqual | Uint32LessThan
            | Uint32LessThanOrEqual | Word64Equal | Int64LessThan | Int64LessThanOrEqual
            | Uint64LessThan | Float64Equal | Float64LessThan | Float64LessThanOrEqual => {
                MachineRepresentation::Bit
            }
            Word32And | Word32Or | Word32Xor | Word32Shl | Word32Shr | Word32Sar | Int32Add
            | Int32Sub | Int32Mul | ChangeFloat64ToInt32 | TruncateInt64ToInt32 => {
                MachineRepresentation::Word32
            }
            Float64Add | Float64Sub | Float64Mul | Float64Div | Float64SilenceNaN
            | ChangeInt32ToFloat64 => MachineRepresentation::Float64,
            BitcastWordToTagged => MachineRepresentation::Tagged,
            _ => MachineRepresentation::Word64,
        }
    }

    pub const fn is_commutative(self) -> bool {
        use MachineOp::*;
        matches!(
            self,
            Word32And
                | Word32Or
                | Word32Xor
                | Word32Equal
                | Int32Add
                | Int32Mul
                | Word64And
                | Word64Or
                | Word64Xor
                | Word64Equal
                | Int64Add
                | Int64Mul
                | Float64Add
                | Float64Mul
                | Float64Equal
        )
    }
}

/// Write barrier mode attached to a tagged store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WriteBarrierKind {
    /// Store skips the barrier entirely.
    None,
    /// Map-word store; maintains the structural (map) invariants only.
    Map,
    /// Value is known to be a heap pointer.
    Pointer,
    /// Value may be anything tagged.
    Full,
}

/// Raw machine store shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreRepresentation {
    pub representation: MachineRepresentation,
    pub write_barrier: WriteBarrierKind,
}

// =============================================================================
// Simplified Operators
// =============================================================================

/// Generation an allocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PretenureFlag {
    /// Young generation.
    #[default]
    NotTenured,
    /// Old generation.
    Tenured,
}

/// Whether an access base is a tagged heap object or a raw pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseTaggedness {
    Untagged,
    Tagged,
}

/// Description of a fixed-offset object field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldAccess {
    pub base: BaseTaggedness,
    /// Byte offset from the start of the object.
    pub offset: u32,
    /// Semantic type of the stored value.
    pub field_type: TypeBits,
    pub machine_type: MachineType,
    pub write_barrier: WriteBarrierKind,
    pub name: &'static str,
}

/// Description of an indexed element in a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementAccess {
    pub base: BaseTaggedness,
    /// Byte offset of element 0.
    pub header_size: u32,
    pub element_type: TypeBits,
    pub machine_type: MachineType,
    pub write_barrier: WriteBarrierKind,
}

// =============================================================================
// Common Parameters
// =============================================================================

/// Frame state flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameStateKind {
    /// Interpreted function frame.
    Interpreted,
    /// Adaptor frame inserted when actual and formal counts differ.
    ArgumentsAdaptor,
    ConstructStub,
}

/// Parameters of a `FrameState` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameStateInfo {
    pub kind: FrameStateKind,
    pub bailout_id: u32,
    /// Parameter count including the receiver.
    pub parameter_count: u32,
    pub local_count: u32,
    pub shared_info: Option<ObjectRef>,
}

/// Input positions of a `FrameState` node.
pub mod frame_state {
    pub const PARAMETERS: usize = 0;
    pub const LOCALS: usize = 1;
    pub const STACK: usize = 2;
    pub const CONTEXT: usize = 3;
    pub const FUNCTION: usize = 4;
    pub const OUTER_STATE: usize = 5;
    pub const INPUT_COUNT: u32 = 6;
}

/// Parameters of `Call` and `TailCall`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallOp {
    pub descriptor: DescriptorId,
    /// Target plus every argument (context included when passed).
    pub value_inputs: u32,
    pub returns: u32,
    pub frame_state: bool,
    pub properties: OpProperties,
}

/// Comment text handle, resolved through `Graph::comment_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommentId(pub u32);

// =============================================================================
// JS Creation Parameters
// =============================================================================

/// Flavor of an arguments object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateArgumentsType {
    /// Sloppy-mode arguments aliasing the formal parameters.
    Mapped,
    /// Strict-mode arguments.
    Unmapped,
    /// Rest parameter array.
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreateArrayParameters {
    /// Number of explicit constructor arguments.
    pub arity: u32,
    /// Allocation site feedback, if any.
    pub site: Option<ObjectRef>,
}

/// Slot index into a feedback vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedbackSlot(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreateLiteralParameters {
    /// Boilerplate description (constant elements, properties or pattern).
    pub constant: ObjectRef,
    pub slot: FeedbackSlot,
    /// Element or property count of the literal.
    pub length: u32,
    pub flags: u32,
}

/// Scope kinds a function context can be created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeType {
    Function,
    Eval,
    Script,
    Module,
    Block,
    With,
    Catch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreateFunctionContextParameters {
    pub slot_count: u32,
    pub scope_type: ScopeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreateCatchContextParameters {
    pub catch_name: ObjectRef,
    pub scope_info: ObjectRef,
}

// =============================================================================
// Operator (Unified)
// =============================================================================

/// Every operation a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Control
    Control(ControlOp),

    // SSA
    /// Value merge: `n` values then the merge/loop control.
    Phi(MachineRepresentation, u32),
    /// Effect merge: `n` effects then the merge/loop control.
    EffectPhi(u32),
    /// Projection of a multi-output node.
    Projection(u32),
    /// Incoming parameter; hangs off `Start`.
    Parameter(u32),

    // Constants
    Int32Constant(i32),
    Int64Constant(i64),
    /// Float64 stored as bits for `Eq`/`Hash`.
    Float64Constant(u64),
    /// Tagged number stored as bits.
    NumberConstant(u64),
    HeapConstant(ObjectRef),
    /// Address of a native routine or global cell.
    ExternalConstant(ExternalReference),
    /// Code object of a builtin stub.
    CodeConstant(Builtin),

    // Regions and misc effects
    BeginRegion,
    FinishRegion,
    Retain,
    Comment(CommentId),
    DebugBreak,
    Unreachable,

    // Deoptimization
    StateValues(u32),
    FrameState(FrameStateInfo),

    // Calls
    Call(CallOp),
    TailCall(CallOp),

    // Machine
    Machine(MachineOp),
    Load(MachineType),
    Store(StoreRepresentation),
    AtomicLoad(MachineType),
    AtomicStore(MachineRepresentation),

    // Simplified
    Allocate(PretenureFlag),
    LoadField(FieldAccess),
    StoreField(FieldAccess),
    LoadElement(ElementAccess),
    StoreElement(ElementAccess),
    ArgumentsFrame,
    ArgumentsLength {
        formal_parameter_count: u32,
        is_rest_length: bool,
    },
    NewUnmappedArgumentsElements,
    CheckSmi,
    CheckNumber,
    NumberSilenceNaN,

    // JS creation
    JSCreate,
    JSCreateArguments(CreateArgumentsType),
    JSCreateArray(CreateArrayParameters),
    JSCreateIterResultObject,
    JSCreateKeyValueArray,
    JSCreateLiteralArray(CreateLiteralParameters),
    JSCreateLiteralObject(CreateLiteralParameters),
    JSCreateLiteralRegExp(CreateLiteralParameters),
    JSCreateEmptyLiteralArray(FeedbackSlot),
    JSCreateEmptyLiteralObject,
    JSCreateFunctionContext(CreateFunctionContextParameters),
    JSCreateWithContext(ObjectRef),
    JSCreateCatchContext(CreateCatchContextParameters),
    JSCreateBlockContext(ObjectRef),
    JSCreateGeneratorObject,
}

/// Native addresses the graph may embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalReference {
    /// Entry point of a runtime routine.
    RuntimeFunction(crate::calls::RuntimeFunctionId),
    /// Root list base, indexed by `RootIndex`.
    RootsArrayStart,
    /// Arbitrary C function.
    CFunction(u64),
}

impl Operator {
    /// Input layout of this operator.
    pub const fn layout(&self) -> InputLayout {
        use Operator::*;
        match *self {
            Control(op) => match op {
                ControlOp::Start => InputLayout::new(0, 0, 0),
                ControlOp::End(n) | ControlOp::Merge(n) | ControlOp::Loop(n) => {
                    InputLayout::new(0, 0, n)
                }
                ControlOp::Branch | ControlOp::Switch(_) => InputLayout::new(1, 0, 1),
                ControlOp::IfTrue
                | ControlOp::IfFalse
                | ControlOp::IfValue(_)
                | ControlOp::IfDefault
                | ControlOp::IfSuccess => InputLayout::new(0, 0, 1),
                ControlOp::IfException => InputLayout::new(0, 1, 1),
                ControlOp::Return(n) => InputLayout::new(n + 1, 1, 1),
                ControlOp::Throw => InputLayout::new(0, 1, 1),
            },
            Phi(_, n) => InputLayout::new(n, 0, 1),
            EffectPhi(n) => InputLayout::new(0, n, 1),
            Projection(_) => InputLayout::new(1, 0, 0),
            Parameter(_) => InputLayout::new(0, 0, 1),
            Int32Constant(_) | Int64Constant(_) | Float64Constant(_) | NumberConstant(_)
            | HeapConstant(_) | ExternalConstant(_) | CodeConstant(_) => InputLayout::new(0, 0, 0),
            BeginRegion => InputLayout::new(0, 1, 0),
            FinishRegion | Retain => InputLayout::new(1, 1, 0),
            Comment(_) | DebugBreak | Unreachable => InputLayout::new(0, 1, 1),
            StateValues(n) => InputLayout::new(n, 0, 0),
            FrameState(_) => InputLayout::new(frame_state::INPUT_COUNT, 0, 0),
            Call(call) | TailCall(call) => InputLayout {
                values: call.value_inputs,
                context: false,
                frame_state: call.frame_state,
                effects: 1,
                controls: 1,
            },
            Machine(op) => InputLayout::new(op.value_input_count(), 0, 0),
            Load(_) | AtomicLoad(_) => InputLayout::new(2, 1, 1),
            Store(_) | AtomicStore(_) => InputLayout::new(3, 1, 1),
            Allocate(_) => InputLayout::new(1, 1, 1),
            LoadField(_) => InputLayout::new(1, 1, 1),
            StoreField(_) => InputLayout::new(2, 1, 1),
            LoadElement(_) => InputLayout::new(2, 1, 1),
            StoreElement(_) => InputLayout::new(3, 1, 1),
            ArgumentsFrame => InputLayout::new(0, 0, 0),
            ArgumentsLength { .. } => InputLayout::new(1, 0, 0),
            NewUnmappedArgumentsElements => InputLayout::new(2, 1, 0),
            CheckSmi | CheckNumber => InputLayout::new(1, 1, 1),
            NumberSilenceNaN => InputLayout::new(1, 0, 0),
            JSCreate => InputLayout::js(2, true),
            JSCreateArguments(_) => InputLayout::js(1, true),
            JSCreateArray(p) => InputLayout::js(2 + p.arity, true),
            JSCreateIterResultObject | JSCreateKeyValueArray => InputLayout::js(2, false),
            JSCreateLiteralArray(_) | JSCreateLiteralObject(_) | JSCreateLiteralRegExp(_) => {
                InputLayout::js(1, true)
            }
            JSCreateEmptyLiteralArray(_) => InputLayout::js(1, false),
            JSCreateEmptyLiteralObject => InputLayout::js(0, false),
            JSCreateFunctionContext(_) | JSCreateBlockContext(_) => InputLayout::js(1, false),
            JSCreateWithContext(_) | JSCreateCatchContext(_) => InputLayout::js(2, false),
            JSCreateGeneratorObject => InputLayout::js(2, false),
        }
    }

    /// Output counts of this operator.
    pub const fn outputs(&self) -> OutputCounts {
        use Operator::*;
        match *self {
            Control(op) => match op {
                ControlOp::Start => OutputCounts::new(1, 1, 1),
                ControlOp::End(_) => OutputCounts::new(0, 0, 0),
                ControlOp::IfException => OutputCounts::new(1, 1, 1),
                _ => OutputCounts::new(0, 0, 1),
            },
            Phi(..) | Projection(_) | Parameter(_) | StateValues(_) | FrameState(_) => {
                OutputCounts::new(1, 0, 0)
            }
            EffectPhi(_) | BeginRegion | Comment(_) | DebugBreak | Unreachable => {
                OutputCounts::new(0, 1, 0)
            }
            Int32Constant(_) | Int64Constant(_) | Float64Constant(_) | NumberConstant(_)
            | HeapConstant(_) | ExternalConstant(_) | CodeConstant(_) => OutputCounts::new(1, 0, 0),
            FinishRegion => OutputCounts::new(1, 1, 0),
            Retain => OutputCounts::new(0, 1, 0),
            Call(call) => OutputCounts::new(call.returns, 1, 1),
            TailCall(_) => OutputCounts::new(0, 0, 1),
            Machine(_) | ArgumentsFrame | ArgumentsLength { .. } | NumberSilenceNaN => {
                OutputCounts::new(1, 0, 0)
            }
            Load(_) | AtomicLoad(_) | LoadField(_) | LoadElement(_) => OutputCounts::new(1, 1, 0),
            Store(_) | AtomicStore(_) | StoreField(_) | StoreElement(_) => {
                OutputCounts::new(0, 1, 0)
            }
            Allocate(_) | NewUnmappedArgumentsElements | CheckSmi | CheckNumber => {
                OutputCounts::new(1, 1, 0)
            }
            JSCreate
            | JSCreateArguments(_)
            | JSCreateArray(_)
            | JSCreateIterResultObject
            | JSCreateKeyValueArray
            | JSCreateLiteralArray(_)
            | JSCreateLiteralObject(_)
            | JSCreateLiteralRegExp(_)
            | JSCreateEmptyLiteralArray(_)
            | JSCreateEmptyLiteralObject
            | JSCreateFunctionContext(_)
            | JSCreateWithContext(_)
            | JSCreateCatchContext(_)
            | JSCreateBlockContext(_)
            | JSCreateGeneratorObject => OutputCounts::new(1, 1, 1),
        }
    }

    /// Static properties of this operator.
    pub const fn properties(&self) -> OpProperties {
        use Operator::*;
        match *self {
            Int32Constant(_) | Int64Constant(_) | Float64Constant(_) | NumberConstant(_)
            | HeapConstant(_) | ExternalConstant(_) | CodeConstant(_) | Parameter(_)
            | Projection(_) | Phi(..) | StateValues(_) | FrameState(_) | ArgumentsFrame
            | ArgumentsLength { .. } | NumberSilenceNaN => OpProperties::PURE,
            Machine(op) => {
                if op.is_commutative() {
                    OpProperties::PURE.union(OpProperties::COMMUTATIVE)
                } else {
                    OpProperties::PURE
                }
            }
            Control(_) | EffectPhi(_) => OpProperties::FOLDABLE,
            BeginRegion | FinishRegion | Retain | Comment(_) | DebugBreak => {
                OpProperties::NO_THROW.union(OpProperties::NO_DEOPT)
            }
            Load(_) | LoadField(_) | LoadElement(_) | AtomicLoad(_) => OpProperties::ELIMINATABLE,
            Store(_) | StoreField(_) | StoreElement(_) | AtomicStore(_) => {
                OpProperties::NO_READ.union(OpProperties::NO_THROW).union(OpProperties::NO_DEOPT)
            }
            Allocate(_) | NewUnmappedArgumentsElements => OpProperties::ELIMINATABLE,
            CheckSmi | CheckNumber => OpProperties::FOLDABLE.union(OpProperties::NO_THROW),
            Call(call) | TailCall(call) => call.properties,
            Unreachable => OpProperties::empty(),
            JSCreateIterResultObject | JSCreateKeyValueArray => OpProperties::ELIMINATABLE,
            JSCreate
            | JSCreateArguments(_)
            | JSCreateArray(_)
            | JSCreateLiteralArray(_)
            | JSCreateLiteralObject(_)
            | JSCreateLiteralRegExp(_)
            | JSCreateEmptyLiteralArray(_)
            | JSCreateEmptyLiteralObject
            | JSCreateFunctionContext(_)
            | JSCreateWithContext(_)
            | JSCreateCatchContext(_)
            | JSCreateBlockContext(_)
            | JSCreateGeneratorObject => OpProperties::empty(),
        }
    }

    #[inline]
    pub const fn is_pure(&self) -> bool {
        self.properties().contains(OpProperties::PURE)
    }

    /// Check whether this operator produces control.
    #[inline]
    pub const fn is_control(&self) -> bool {
        self.outputs().controls > 0
    }

    #[inline]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Operator::Phi(..) | Operator::EffectPhi(_))
    }

    /// Check whether this operator ends a control path.
    #[inline]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Operator::Control(ControlOp::Return(_) | ControlOp::Throw) | Operator::TailCall(_)
        )
    }

    /// Check whether this is a merge point (`Merge` or `Loop`).
    #[inline]
    pub const fn is_merge(&self) -> bool {
        matches!(
            self,
            Operator::Control(ControlOp::Merge(_) | ControlOp::Loop(_))
        )
    }

    #[inline]
    pub const fn is_constant(&self) -> bool {
        matches!(
            self,
            Operator::Int32Constant(_)
                | Operator::Int64Constant(_)
                | Operator::Float64Constant(_)
                | Operator::NumberConstant(_)
                | Operator::HeapConstant(_)
                | Operator::ExternalConstant(_)
                | Operator::CodeConstant(_)
        )
    }

    /// Check whether this is a high-level creation operator.
    #[inline]
    pub const fn is_js_create(&self) -> bool {
        use Operator::*;
        matches!(
            self,
            JSCreate
                | JSCreateArguments(_)
                | JSCreateArray(_)
                | JSCreateIterResultObject
                | JSCreateKeyValueArray
                | JSCreateLiteralArray(_)
                | JSCreateLiteralObject(_)
                | JSCreateLiteralRegExp(_)
                | JSCreateEmptyLiteralArray(_)
                | JSCreateEmptyLiteralObject
                | JSCreateFunctionContext(_)
                | JSCreateWithContext(_)
                | JSCreateCatchContext(_)
                | JSCreateBlockContext(_)
                | JSCreateGeneratorObject
        )
    }

    /// Variable-arity operators rebuilt with a new input count.
    ///
    /// Returns `None` for operators whose arity is fixed.
    pub const fn with_arity(&self, n: u32) -> Option<Operator> {
        use Operator::*;
        Some(match *self {
            Control(ControlOp::End(_)) => Control(ControlOp::End(n)),
            Control(ControlOp::Merge(_)) => Control(ControlOp::Merge(n)),
            Control(ControlOp::Loop(_)) => Control(ControlOp::Loop(n)),
            Phi(rep, _) => Phi(rep, n),
            EffectPhi(_) => EffectPhi(n),
            StateValues(_) => StateValues(n),
            _ => return None,
        })
    }

    /// Short name used in listings and debug output.
    pub const fn mnemonic(&self) -> &'static str {
        use Operator::*;
        match self {
            Control(op) => match op {
                ControlOp::Start => "Start",
                ControlOp::End(_) => "End",
                ControlOp::Merge(_) => "Merge",
                ControlOp::Loop(_) => "Loop",
                ControlOp::Branch => "Branch",
                ControlOp::IfTrue => "IfTrue",
                ControlOp::IfFalse => "IfFalse",
                ControlOp::Switch(_) => "Switch",
                ControlOp::IfValue(_) => "IfValue",
                ControlOp::IfDefault => "IfDefault",
                ControlOp::IfSuccess => "IfSuccess",
                ControlOp::IfException => "IfException",
                ControlOp::Return(_) => "Return",
                ControlOp::Throw => "Throw",
            },
            Phi(..) => "Phi",
            EffectPhi(_) => "EffectPhi",
            Projection(_) => "Projection",
            Parameter(_) => "Parameter",
            Int32Constant(_) => "Int32Constant",
            Int64Constant(_) => "Int64Constant",
            Float64Constant(_) => "Float64Constant",
            NumberConstant(_) => "NumberConstant",
            HeapConstant(_) => "HeapConstant",
            ExternalConstant(_) => "ExternalConstant",
            CodeConstant(_) => "CodeConstant",
            BeginRegion => "BeginRegion",
            FinishRegion => "FinishRegion",
            Retain => "Retain",
            Comment(_) => "Comment",
            DebugBreak => "DebugBreak",
            Unreachable => "Unreachable",
            StateValues(_) => "StateValues",
            FrameState(_) => "FrameState",
            Call(_) => "Call",
            TailCall(_) => "TailCall",
            Machine(_) => "Machine",
            Load(_) => "Load",
            Store(_) => "Store",
            AtomicLoad(_) => "AtomicLoad",
            AtomicStore(_) => "AtomicStore",
            Allocate(_) => "Allocate",
            LoadField(_) => "LoadField",
            StoreField(_) => "StoreField",
            LoadElement(_) => "LoadElement",
            StoreElement(_) => "StoreElement",
            ArgumentsFrame => "ArgumentsFrame",
            ArgumentsLength { .. } => "ArgumentsLength",
            NewUnmappedArgumentsElements => "NewUnmappedArgumentsElements",
            CheckSmi => "CheckSmi",
            CheckNumber => "CheckNumber",
            NumberSilenceNaN => "NumberSilenceNaN",
            JSCreate => "JSCreate",
            JSCreateArguments(_) => "JSCreateArguments",
            JSCreateArray(_) => "JSCreateArray",
            JSCreateIterResultObject => "JSCreateIterResultObject",
            JSCreateKeyValueArray => "JSCreateKeyValueArray",
            JSCreateLiteralArray(_) => "JSCreateLiteralArray",
            JSCreateLiteralObject(_) => "JSCreateLiteralObject",
            JSCreateLiteralRegExp(_) => "JSCreateLiteralRegExp",
            JSCreateEmptyLiteralArray(_) => "JSCreateEmptyLiteralArray",
            JSCreateEmptyLiteralObject => "JSCreateEmptyLiteralObject",
            JSCreateFunctionContext(_) => "JSCreateFunctionContext",
            JSCreateWithContext(_) => "JSCreateWithContext",
            JSCreateCatchContext(_) => "JSCreateCatchContext",
            JSCreateBlockContext(_) => "JSCreateBlockContext",
            JSCreateGeneratorObject => "JSCreateGeneratorObject",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operator::Machine(op) => write!(f, "{:?}", op),
            Operator::Phi(rep, _) => write!(f, "Phi[{}]", rep),
            Operator::Projection(i) | Operator::Parameter(i) => {
                write!(f, "{}[{}]", self.mnemonic(), i)
            }
            Operator::Control(ControlOp::IfValue(v)) => write!(f, "IfValue[{}]", v),
            Operator::Int32Constant(v) => write!(f, "Int32Constant[{}]", v),
            Operator::Int64Constant(v) => write!(f, "Int64Constant[{}]", v),
            Operator::Float64Constant(bits) | Operator::NumberConstant(bits) => {
                write!(f, "{}[{}]", self.mnemonic(), f64::from_bits(bits))
            }
            Operator::HeapConstant(object) => write!(f, "HeapConstant[{:?}]", object),
            Operator::ExternalConstant(ext) => write!(f, "ExternalConstant[{:?}]", ext),
            Operator::CodeConstant(builtin) => write!(f, "CodeConstant[{:?}]", builtin),
            Operator::Call(call) | Operator::TailCall(call) => {
                write!(f, "{}[{:?}]", self.mnemonic(), call.descriptor)
            }
            Operator::Load(ty) | Operator::AtomicLoad(ty) => {
                write!(f, "{}[{}]", self.mnemonic(), ty.representation)
            }
            Operator::Store(store) => write!(
                f,
                "Store[{}, {:?}]",
                store.representation, store.write_barrier
            ),
            Operator::Allocate(pretenure) => write!(f, "Allocate[{:?}]", pretenure),
            Operator::LoadField(access) | Operator::StoreField(access) => write!(
                f,
                "{}[{}+{}, {:?}]",
                self.mnemonic(),
                access.name,
                access.offset,
                access.write_barrier
            ),
            Operator::StoreElement(access) | Operator::LoadElement(access) => write!(
                f,
                "{}[+{}, {:?}]",
                self.mnemonic(),
                access.header_size,
                access.write_barrier
            ),
            _ => f.write_str(self.mnemonic()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

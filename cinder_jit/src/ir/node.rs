//! Graph nodes.
//!
//! A node is one operation instance: an operator, an ordered input list and
//! a semantic type. Inputs follow the operator's `InputLayout`:
//!
//! ```text
//! [ values... | context? | frame_state? | effects... | controls... ]
//! ```
//!
//! Nodes never own each other. They are stored in the graph's arena and
//! reference their inputs by `NodeId`.

use smallvec::SmallVec;

use super::arena::Id;
use super::operators::Operator;
use super::types::Type;
use crate::heap::ObjectRef;

/// Unique identifier for a node in the graph.
pub type NodeId = Id<Node>;

/// Input storage; most nodes have four inputs or fewer.
pub type Inputs = SmallVec<[NodeId; 4]>;

// =============================================================================
// Node
// =============================================================================

/// One operation in the graph.
#[derive(Clone)]
pub struct Node {
    /// The operation this node performs.
    pub op: Operator,

    /// Input edges, laid out per `op.layout()`.
    pub inputs: Inputs,

    /// Semantic type.
    pub ty: Type,

    pub flags: NodeFlags,
}

impl Node {
    pub fn new(op: Operator, inputs: &[NodeId]) -> Self {
        Node {
            op,
            inputs: SmallVec::from_slice(inputs),
            ty: Type::any(),
            flags: NodeFlags::empty(),
        }
    }

    #[inline]
    pub fn input(&self, index: usize) -> NodeId {
        self.inputs[index]
    }

    #[inline]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }

    pub fn mark_dead(&mut self) {
        self.flags.insert(NodeFlags::DEAD);
    }

    pub fn as_int32(&self) -> Option<i32> {
        match self.op {
            Operator::Int32Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Integer value of a word-sized or 32-bit constant.
    pub fn as_int64(&self) -> Option<i64> {
        match self.op {
            Operator::Int32Constant(v) => Some(v as i64),
            Operator::Int64Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.op {
            Operator::NumberConstant(bits) | Operator::Float64Constant(bits) => {
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    /// Heap object this node is known to be, from its operator or its type.
    pub fn as_heap_constant(&self) -> Option<ObjectRef> {
        match self.op {
            Operator::HeapConstant(object) => Some(object),
            _ => self.ty.as_heap_constant(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.inputs.is_empty() {
            write!(f, " {:?}", self.inputs.as_slice())?;
        }
        if self.ty != Type::any() {
            write!(f, " : {:?}", self.ty)?;
        }
        if self.is_dead() {
            f.write_str(" (dead)")?;
        }
        Ok(())
    }
}

// =============================================================================
// Node Flags
// =============================================================================

bitflags::bitflags! {
    /// Per-node bookkeeping bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Node was killed; it has no inputs and must not be used.
        const DEAD = 0b0000_0001;
        /// Reducers already reached a fixpoint on this node.
        const REDUCED = 0b0000_0010;
        /// Stop the generated code at this node (debugging aid).
        const BREAK = 0b0000_0100;
    }
}

// =============================================================================
// Tests
// =============================================================================

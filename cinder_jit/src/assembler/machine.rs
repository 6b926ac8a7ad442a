//! Machine-level arithmetic with constant folding.

use super::CodeAssembler;
use crate::ir::operators::{MachineOp, Operator};
use crate::ir::NodeId;

/// Small integers are stored shifted into the upper half of the word.
pub const SMI_SHIFT: i64 = 32;

macro_rules! binary_ops {
    ($($(#[$meta:meta])* $name:ident => $op:ident;)*) => {
        $(
            $(#[$meta])*
            fn $name(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
                self.machine_node(MachineOp::$op, &[lhs, rhs])
            }
        )*
    };
}

/// Builder trait for word and float arithmetic.
///
/// Implementors provide node emission and constant queries; the arithmetic
/// helpers are provided on top, folding where both operands are constant.
pub trait MachineAssembler {
    fn machine_node(&mut self, op: MachineOp, inputs: &[NodeId]) -> NodeId;
    fn int32_constant(&mut self, value: i32) -> NodeId;
    fn word_constant(&mut self, value: i64) -> NodeId;
    /// Value of `node` if it is a 32-bit integer constant.
    fn to_int32_constant(&self, node: NodeId) -> Option<i32>;
    /// Value of `node` if it is any integer constant.
    fn to_int64_constant(&self, node: NodeId) -> Option<i64>;

    /// Pointer-sized integer value of `node`, if constant.
    fn to_intptr_constant(&self, node: NodeId) -> Option<i64> {
        self.to_int64_constant(node)
    }

    binary_ops! {
        word32_and => Word32And;
        word32_or => Word32Or;
        word32_xor => Word32Xor;
        word32_shl => Word32Shl;
        word32_shr => Word32Shr;
        word32_sar => Word32Sar;
        word32_equal => Word32Equal;
        int32_sub => Int32Sub;
        int32_mul => Int32Mul;
        int32_less_than => Int32LessThan;
        int32_less_than_or_equal => Int32LessThanOrEqual;
        uint32_less_than => Uint32LessThan;
        uint32_less_than_or_equal => Uint32LessThanOrEqual;
        word_and => Word64And;
        word_or => Word64Or;
        word_xor => Word64Xor;
        word_shr => Word64Shr;
        word_equal => Word64Equal;
        intptr_mul => Int64Mul;
        intptr_less_than => Int64LessThan;
        intptr_less_than_or_equal => Int64LessThanOrEqual;
        uintptr_less_than => Uint64LessThan;
        float64_add => Float64Add;
        float64_sub => Float64Sub;
        float64_mul => Float64Mul;
        float64_div => Float64Div;
        float64_equal => Float64Equal;
        float64_less_than => Float64LessThan;
        float64_less_than_or_equal => Float64LessThanOrEqual;
    }

    fn int32_add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        match (self.to_int32_constant(lhs), self.to_int32_constant(rhs)) {
            (Some(a), Some(b)) => self.int32_constant(a.wrapping_add(b)),
            (_, Some(0)) => lhs,
            (Some(0), _) => rhs,
            _ => self.machine_node(MachineOp::Int32Add, &[lhs, rhs]),
        }
    }

    fn intptr_add(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        match (self.to_intptr_constant(lhs), self.to_intptr_constant(rhs)) {
            (Some(a), Some(b)) => self.word_constant(a.wrapping_add(b)),
            (_, Some(0)) => lhs,
            (Some(0), _) => rhs,
            _ => self.machine_node(MachineOp::Int64Add, &[lhs, rhs]),
        }
    }

    fn intptr_sub(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        match (self.to_intptr_constant(lhs), self.to_intptr_constant(rhs)) {
            (Some(a), Some(b)) => self.word_constant(a.wrapping_sub(b)),
            (_, Some(0)) => lhs,
            _ => self.machine_node(MachineOp::Int64Sub, &[lhs, rhs]),
        }
    }

    fn word_shl(&mut self, value: NodeId, shift: NodeId) -> NodeId {
        match (self.to_intptr_constant(value), self.to_int32_constant(shift)) {
            (Some(a), Some(s)) => self.word_constant(a.wrapping_shl(s as u32)),
            (_, Some(0)) => value,
            _ => self.machine_node(MachineOp::Word64Shl, &[value, shift]),
        }
    }

    fn word_sar(&mut self, value: NodeId, shift: NodeId) -> NodeId {
        match (self.to_intptr_constant(value), self.to_int32_constant(shift)) {
            (Some(a), Some(s)) => self.word_constant(a.wrapping_shr(s as u32)),
            (_, Some(0)) => value,
            _ => self.machine_node(MachineOp::Word64Sar, &[value, shift]),
        }
    }

    fn change_int32_to_intptr(&mut self, value: NodeId) -> NodeId {
        match self.to_int32_constant(value) {
            Some(v) => self.word_constant(v as i64),
            None => self.machine_node(MachineOp::ChangeInt32ToInt64, &[value]),
        }
    }

    fn truncate_intptr_to_int32(&mut self, value: NodeId) -> NodeId {
        match self.to_int64_constant(value) {
            Some(v) => self.int32_constant(v as i32),
            None => self.machine_node(MachineOp::TruncateInt64ToInt32, &[value]),
        }
    }

    fn change_int32_to_float64(&mut self, value: NodeId) -> NodeId {
        self.machine_node(MachineOp::ChangeInt32ToFloat64, &[value])
    }

    fn float64_silence_nan(&mut self, value: NodeId) -> NodeId {
        self.machine_node(MachineOp::Float64SilenceNaN, &[value])
    }

    fn bitcast_tagged_to_word(&mut self, value: NodeId) -> NodeId {
        self.machine_node(MachineOp::BitcastTaggedToWord, &[value])
    }

    fn bitcast_word_to_tagged(&mut self, value: NodeId) -> NodeId {
        self.machine_node(MachineOp::BitcastWordToTagged, &[value])
    }

    /// Tag a pointer-sized integer as a small integer.
    fn smi_tag(&mut self, value: NodeId) -> NodeId {
        let shift = self.int32_constant(SMI_SHIFT as i32);
        let word = self.word_shl(value, shift);
        self.bitcast_word_to_tagged(word)
    }

    /// Untag a small integer into a pointer-sized integer.
    fn smi_untag(&mut self, value: NodeId) -> NodeId {
        let word = self.bitcast_tagged_to_word(value);
        let shift = self.int32_constant(SMI_SHIFT as i32);
        self.word_sar(word, shift)
    }

    fn load_frame_pointer(&mut self) -> NodeId {
        self.machine_node(MachineOp::LoadFramePointer, &[])
    }

    fn load_parent_frame_pointer(&mut self) -> NodeId {
        self.machine_node(MachineOp::LoadParentFramePointer, &[])
    }

    fn load_stack_pointer(&mut self) -> NodeId {
        self.machine_node(MachineOp::LoadStackPointer, &[])
    }
}

impl MachineAssembler for CodeAssembler {
    fn machine_node(&mut self, op: MachineOp, inputs: &[NodeId]) -> NodeId {
        debug_assert_eq!(op.value_input_count() as usize, inputs.len());
        self.add_node(Operator::Machine(op), inputs)
    }

    fn int32_constant(&mut self, value: i32) -> NodeId {
        self.graph.int32_constant(value)
    }

    fn word_constant(&mut self, value: i64) -> NodeId {
        self.graph.int64_constant(value)
    }

    fn to_int32_constant(&self, node: NodeId) -> Option<i32> {
        self.graph.get(node).and_then(|node| node.as_int32())
    }

    fn to_int64_constant(&self, node: NodeId) -> Option<i64> {
        self.graph.get(node).and_then(|node| node.as_int64())
    }
}

impl CodeAssembler {
    /// Tagged small-integer value of `node`, if it is a constant.
    pub fn to_smi_constant(&self, node: NodeId) -> Option<i32> {
        let node = self.graph.get(node)?;
        match node.op {
            Operator::Machine(MachineOp::BitcastWordToTagged) => self
                .graph
                .get(node.input(0))
                .and_then(|word| word.as_int64())
                .map(|word| (word >> SMI_SHIFT) as i32),
            Operator::NumberConstant(bits) => {
                let value = f64::from_bits(bits);
                let truncated = value as i32;
                (truncated as f64 == value && !(value == 0.0 && value.is_sign_negative()))
                    .then_some(truncated)
            }
            _ => None,
        }
    }
}

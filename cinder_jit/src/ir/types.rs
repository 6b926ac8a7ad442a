//! Representation and semantic types for graph values.
//!
//! Two independent descriptions are attached to values:
//! - **Machine representation** (`MachineRepresentation`, `MachineType`):
//!   how a value is laid out in a register or memory slot. Phis, loads,
//!   stores and call signatures are keyed on it.
//! - **Semantic type** (`Type`): what the value can be at run time, as a
//!   bitset lattice refined with an optional integer range and an optional
//!   heap constant. The lowering reducers consult it to prove fast paths.
//!
//! ```text
//!                         Any
//!             /      |        |        \
//!        Number   Receiver  Internal  Oddball ...
//!        /    \
//!   Signed32  OtherNumber
//!      |
//!  SignedSmall (+ Range)
//!          \    |    /
//!             None
//! ```

use std::fmt;

use crate::heap::ObjectRef;

// =============================================================================
// Machine Representation
// =============================================================================

/// Storage layout of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MachineRepresentation {
    /// No value (effect or control only).
    None = 0,
    /// Single bit (comparison results).
    Bit = 1,
    Word8 = 2,
    Word16 = 3,
    Word32 = 4,
    Word64 = 5,
    /// Tagged small integer.
    TaggedSigned = 6,
    /// Tagged heap pointer.
    TaggedPointer = 7,
    /// Either a small integer or a heap pointer.
    Tagged = 8,
    Float32 = 9,
    Float64 = 10,
}

impl MachineRepresentation {
    /// Representation of a native pointer on the (64-bit) target.
    pub const POINTER: Self = MachineRepresentation::Word64;

    /// Check whether values of this representation are tagged.
    #[inline]
    pub const fn is_tagged(self) -> bool {
        matches!(
            self,
            MachineRepresentation::TaggedSigned
                | MachineRepresentation::TaggedPointer
                | MachineRepresentation::Tagged
        )
    }

    /// Check whether a slot of this representation may hold a heap pointer
    /// (and therefore needs a write barrier when written).
    #[inline]
    pub const fn can_be_tagged_pointer(self) -> bool {
        matches!(
            self,
            MachineRepresentation::TaggedPointer | MachineRepresentation::Tagged
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            MachineRepresentation::Float32 | MachineRepresentation::Float64
        )
    }

    /// Width of a memory slot in bytes.
    pub const fn size_in_bytes(self) -> u32 {
        match self {
            MachineRepresentation::None => 0,
            MachineRepresentation::Bit | MachineRepresentation::Word8 => 1,
            MachineRepresentation::Word16 => 2,
            MachineRepresentation::Word32 | MachineRepresentation::Float32 => 4,
            MachineRepresentation::Word64
            | MachineRepresentation::TaggedSigned
            | MachineRepresentation::TaggedPointer
            | MachineRepresentation::Tagged
            | MachineRepresentation::Float64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MachineRepresentation::None => "none",
            MachineRepresentation::Bit => "bit",
            MachineRepresentation::Word8 => "word8",
            MachineRepresentation::Word16 => "word16",
            MachineRepresentation::Word32 => "word32",
            MachineRepresentation::Word64 => "word64",
            MachineRepresentation::TaggedSigned => "tagged-signed",
            MachineRepresentation::TaggedPointer => "tagged-pointer",
            MachineRepresentation::Tagged => "tagged",
            MachineRepresentation::Float32 => "float32",
            MachineRepresentation::Float64 => "float64",
        }
    }
}

impl fmt::Display for MachineRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the bits of a machine value are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MachineSemantic {
    None,
    Bool,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Number,
    Any,
}

/// Representation plus interpretation; used for loads, parameters and
/// call signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MachineType {
    pub representation: MachineRepresentation,
    pub semantic: MachineSemantic,
}

impl MachineType {
    #[inline]
    pub const fn new(representation: MachineRepresentation, semantic: MachineSemantic) -> Self {
        MachineType {
            representation,
            semantic,
        }
    }

    pub const fn none() -> Self {
        Self::new(MachineRepresentation::None, MachineSemantic::None)
    }

    pub const fn bool() -> Self {
        Self::new(MachineRepresentation::Bit, MachineSemantic::Bool)
    }

    pub const fn uint8() -> Self {
        Self::new(MachineRepresentation::Word8, MachineSemantic::Uint32)
    }

    pub const fn int32() -> Self {
        Self::new(MachineRepresentation::Word32, MachineSemantic::Int32)
    }

    pub const fn uint32() -> Self {
        Self::new(MachineRepresentation::Word32, MachineSemantic::Uint32)
    }

    pub const fn int64() -> Self {
        Self::new(MachineRepresentation::Word64, MachineSemantic::Int64)
    }

    /// Untagged native pointer.
    pub const fn pointer() -> Self {
        Self::new(MachineRepresentation::POINTER, MachineSemantic::None)
    }

    /// Pointer-sized integer.
    pub const fn intptr() -> Self {
        Self::new(MachineRepresentation::POINTER, MachineSemantic::Int64)
    }

    pub const fn float64() -> Self {
        Self::new(MachineRepresentation::Float64, MachineSemantic::Number)
    }

    pub const fn any_tagged() -> Self {
        Self::new(MachineRepresentation::Tagged, MachineSemantic::Any)
    }

    pub const fn tagged_signed() -> Self {
        Self::new(MachineRepresentation::TaggedSigned, MachineSemantic::Int32)
    }

    pub const fn tagged_pointer() -> Self {
        Self::new(MachineRepresentation::TaggedPointer, MachineSemantic::Any)
    }

    #[inline]
    pub const fn representation(self) -> MachineRepresentation {
        self.representation
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{:?}", self.representation, self.semantic)
    }
}

// =============================================================================
// Semantic Types
// =============================================================================

/// Smallest value representable as a tagged small integer (31-bit payload).
pub const SMI_MIN: f64 = -1_073_741_824.0;
/// Largest value representable as a tagged small integer.
pub const SMI_MAX: f64 = 1_073_741_823.0;

bitflags::bitflags! {
    /// Primitive lattice points. Unions are plain bit unions.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TypeBits: u32 {
        const NULL = 1 << 0;
        const UNDEFINED = 1 << 1;
        const BOOLEAN = 1 << 2;
        /// Integers in small-integer range.
        const SIGNED_SMALL = 1 << 3;
        /// Signed 32-bit integers outside small-integer range.
        const OTHER_SIGNED32 = 1 << 4;
        /// Unsigned 32-bit integers above `i32::MAX`.
        const OTHER_UNSIGNED32 = 1 << 5;
        /// Any other number except -0 and NaN.
        const OTHER_NUMBER = 1 << 6;
        const MINUS_ZERO = 1 << 7;
        const NAN = 1 << 8;
        const STRING = 1 << 9;
        const SYMBOL = 1 << 10;
        const OTHER_OBJECT = 1 << 11;
        const ARRAY = 1 << 12;
        const FUNCTION = 1 << 13;
        const PROXY = 1 << 14;
        /// The hole sentinel.
        const HOLE = 1 << 15;
        /// Engine-internal heap objects (maps, fixed arrays, contexts).
        const OTHER_INTERNAL = 1 << 16;
        /// Untagged machine values and raw pointers.
        const MACHINE = 1 << 17;

        const SIGNED32 = Self::SIGNED_SMALL.bits() | Self::OTHER_SIGNED32.bits();
        const INTEGRAL32 = Self::SIGNED32.bits() | Self::OTHER_UNSIGNED32.bits();
        const ORDERED_NUMBER = Self::INTEGRAL32.bits() | Self::OTHER_NUMBER.bits();
        const PLAIN_NUMBER = Self::ORDERED_NUMBER.bits();
        const NUMBER = Self::PLAIN_NUMBER.bits() | Self::MINUS_ZERO.bits() | Self::NAN.bits();
        const ODDBALL = Self::NULL.bits() | Self::UNDEFINED.bits() | Self::BOOLEAN.bits();
        const RECEIVER = Self::OTHER_OBJECT.bits()
            | Self::ARRAY.bits()
            | Self::FUNCTION.bits()
            | Self::PROXY.bits();
        const PRIMITIVE = Self::NUMBER.bits()
            | Self::ODDBALL.bits()
            | Self::STRING.bits()
            | Self::SYMBOL.bits();
        const INTERNAL = Self::HOLE.bits() | Self::OTHER_INTERNAL.bits();
        const ANY = Self::PRIMITIVE.bits()
            | Self::RECEIVER.bits()
            | Self::INTERNAL.bits()
            | Self::MACHINE.bits();
    }
}

/// Closed integer interval refining the numeric part of a type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

/// Semantic type of a value.
///
/// The default type is `Any`; nodes created by the assemblers keep it unless
/// a caller narrows it with `Graph::set_type`.
#[derive(Clone, Copy, PartialEq)]
pub struct Type {
    bits: TypeBits,
    range: Option<Range>,
    constant: Option<ObjectRef>,
}

impl Type {
    #[inline]
    pub const fn from_bits(bits: TypeBits) -> Self {
        Type {
            bits,
            range: None,
            constant: None,
        }
    }

    pub const fn none() -> Self {
        Self::from_bits(TypeBits::empty())
    }

    pub const fn any() -> Self {
        Self::from_bits(TypeBits::ANY)
    }

    pub const fn number() -> Self {
        Self::from_bits(TypeBits::NUMBER)
    }

    pub const fn signed_small() -> Self {
        Self::from_bits(TypeBits::SIGNED_SMALL)
    }

    pub const fn signed32() -> Self {
        Self::from_bits(TypeBits::SIGNED32)
    }

    pub const fn boolean() -> Self {
        Self::from_bits(TypeBits::BOOLEAN)
    }

    pub const fn undefined() -> Self {
        Self::from_bits(TypeBits::UNDEFINED)
    }

    pub const fn string() -> Self {
        Self::from_bits(TypeBits::STRING)
    }

    pub const fn receiver() -> Self {
        Self::from_bits(TypeBits::RECEIVER)
    }

    pub const fn proxy() -> Self {
        Self::from_bits(TypeBits::PROXY)
    }

    pub const fn internal() -> Self {
        Self::from_bits(TypeBits::INTERNAL)
    }

    pub const fn machine() -> Self {
        Self::from_bits(TypeBits::MACHINE)
    }

    /// Integer interval `[min, max]`.
    pub fn range(min: f64, max: f64) -> Self {
        debug_assert!(min <= max, "empty range {min}..{max}");
        Type {
            bits: bits_for_range(min, max),
            range: Some(Range { min, max }),
            constant: None,
        }
    }

    /// The singleton type of a number constant.
    pub fn constant(value: f64) -> Self {
        if value.is_nan() {
            Self::from_bits(TypeBits::NAN)
        } else if value == 0.0 && value.is_sign_negative() {
            Self::from_bits(TypeBits::MINUS_ZERO)
        } else if value.fract() == 0.0 && value.is_finite() {
            Self::range(value, value)
        } else {
            Self::from_bits(TypeBits::OTHER_NUMBER)
        }
    }

    /// The singleton type of a heap object. `bits` classifies the object.
    pub const fn heap_constant(object: ObjectRef, bits: TypeBits) -> Self {
        Type {
            bits,
            range: None,
            constant: Some(object),
        }
    }

    #[inline]
    pub const fn bits(&self) -> TypeBits {
        self.bits
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        self.bits.is_empty()
    }

    #[inline]
    pub const fn as_heap_constant(&self) -> Option<ObjectRef> {
        self.constant
    }

    #[inline]
    pub const fn as_range(&self) -> Option<Range> {
        self.range
    }

    /// Subtype check.
    pub fn is(&self, other: Type) -> bool {
        if !other.bits.contains(self.bits) {
            return false;
        }
        if let Some(expected) = other.constant {
            if self.constant != Some(expected) {
                return false;
            }
        }
        match (self.range, other.range) {
            (_, None) => true,
            (Some(mine), Some(theirs)) => mine.min >= theirs.min && mine.max <= theirs.max,
            (None, Some(_)) => self.is_none(),
        }
    }

    /// Check whether the two types have a value in common.
    pub fn maybe(&self, other: Type) -> bool {
        if !self.bits.intersects(other.bits) {
            return false;
        }
        match (self.constant, other.constant) {
            (Some(a), Some(b)) if a != b => return false,
            _ => {}
        }
        match (self.range, other.range) {
            (Some(a), Some(b)) => {
                (a.max >= b.min && b.max >= a.min)
                    || self.bits.intersects(other.bits - TypeBits::INTEGRAL32)
            }
            _ => true,
        }
    }

    /// Least upper bound.
    pub fn union(&self, other: Type) -> Type {
        let range = match (self.range, other.range) {
            (Some(a), Some(b)) => Some(Range {
                min: a.min.min(b.min),
                max: a.max.max(b.max),
            }),
            (Some(r), None) if !other.bits.intersects(TypeBits::NUMBER) => Some(r),
            (None, Some(r)) if !self.bits.intersects(TypeBits::NUMBER) => Some(r),
            _ => None,
        };
        let constant = match (self.constant, other.constant) {
            (Some(a), Some(b)) if a == b => Some(a),
            _ => None,
        };
        Type {
            bits: self.bits | other.bits,
            range,
            constant,
        }
    }

    /// Lower bound of the numeric part.
    pub fn min(&self) -> f64 {
        if let Some(range) = self.range {
            return range.min;
        }
        if TypeBits::SIGNED_SMALL.contains(self.bits & TypeBits::NUMBER) {
            SMI_MIN
        } else if TypeBits::SIGNED32.contains(self.bits & TypeBits::NUMBER) {
            i32::MIN as f64
        } else if TypeBits::OTHER_UNSIGNED32.contains(self.bits & TypeBits::NUMBER) {
            i32::MAX as f64 + 1.0
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Upper bound of the numeric part.
    pub fn max(&self) -> f64 {
        if let Some(range) = self.range {
            return range.max;
        }
        if TypeBits::SIGNED_SMALL.contains(self.bits & TypeBits::NUMBER) {
            SMI_MAX
        } else if TypeBits::SIGNED32.contains(self.bits & TypeBits::NUMBER) {
            i32::MAX as f64
        } else if TypeBits::INTEGRAL32.contains(self.bits & TypeBits::NUMBER) {
            u32::MAX as f64
        } else {
            f64::INFINITY
        }
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::any()
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits == TypeBits::ANY {
            return f.write_str("Any");
        }
        if self.is_none() {
            return f.write_str("None");
        }
        if let Some(object) = self.constant {
            return write!(f, "HeapConstant({:?})", object);
        }
        if let Some(range) = self.range {
            return write!(f, "Range({}, {})", range.min, range.max);
        }
        write!(f, "{:?}", self.bits)
    }
}

fn bits_for_range(min: f64, max: f64) -> TypeBits {
    if min >= SMI_MIN && max <= SMI_MAX {
        TypeBits::SIGNED_SMALL
    } else if min >= i32::MIN as f64 && max <= i32::MAX as f64 {
        TypeBits::SIGNED32
    } else if min >= 0.0 && max <= u32::MAX as f64 {
        TypeBits::INTEGRAL32 & !TypeBits::OTHER_SIGNED32
    } else {
        TypeBits::PLAIN_NUMBER
    }
}

// =============================================================================
// Tests
// =============================================================================

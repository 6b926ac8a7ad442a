//! Object layout constants.
//!
//! Byte offsets and sizes of every object kind the lowering allocates
//! inline. Pointers and tagged slots are 8 bytes; headers are laid out as
//! map, then properties/hash, then elements, then the kind-specific fields.

/// Size of a tagged slot.
pub const POINTER_SIZE: u32 = 8;

// =============================================================================
// Heap Objects
// =============================================================================

pub const MAP_OFFSET: u32 = 0;

/// Boxed double: map then the raw float64 payload.
pub const HEAP_NUMBER_VALUE_OFFSET: u32 = 8;
pub const HEAP_NUMBER_SIZE: u32 = 16;

/// Trailing allocation memento used for allocation-site tracking.
pub const ALLOCATION_MEMENTO_SIZE: u32 = 16;

// =============================================================================
// Fixed Arrays
// =============================================================================

pub const FIXED_ARRAY_LENGTH_OFFSET: u32 = 8;
pub const FIXED_ARRAY_HEADER_SIZE: u32 = 16;

/// Byte size of a fixed array of `length` tagged slots.
#[inline]
pub const fn fixed_array_size(length: u32) -> u32 {
    FIXED_ARRAY_HEADER_SIZE + length * POINTER_SIZE
}

/// Byte size of a fixed array of `length` unboxed doubles.
#[inline]
pub const fn fixed_double_array_size(length: u32) -> u32 {
    FIXED_ARRAY_HEADER_SIZE + length * 8
}

/// NaN payload marking a hole in a double backing store.
pub const HOLE_NAN_BITS: u64 = 0xFFF7_FFFF_FFF7_FFFF;

// =============================================================================
// JS Objects
// =============================================================================

pub const JS_OBJECT_PROPERTIES_OFFSET: u32 = 8;
pub const JS_OBJECT_ELEMENTS_OFFSET: u32 = 16;
pub const JS_OBJECT_HEADER_SIZE: u32 = 24;

pub const JS_ARRAY_LENGTH_OFFSET: u32 = 24;
pub const JS_ARRAY_SIZE: u32 = 32;

/// Strict and sloppy arguments share the length slot; sloppy adds the callee.
pub const ARGUMENTS_LENGTH_OFFSET: u32 = 24;
pub const ARGUMENTS_CALLEE_OFFSET: u32 = 32;
pub const STRICT_ARGUMENTS_SIZE: u32 = 32;
pub const SLOPPY_ARGUMENTS_SIZE: u32 = 40;

pub const ITER_RESULT_VALUE_OFFSET: u32 = 24;
pub const ITER_RESULT_DONE_OFFSET: u32 = 32;
pub const ITER_RESULT_SIZE: u32 = 40;

pub const REGEXP_DATA_OFFSET: u32 = 24;
pub const REGEXP_SOURCE_OFFSET: u32 = 32;
pub const REGEXP_FLAGS_OFFSET: u32 = 40;
pub const REGEXP_SIZE: u32 = 48;
/// `lastIndex` is the single in-object property following the header.
pub const REGEXP_LAST_INDEX_OFFSET: u32 = REGEXP_SIZE;
pub const REGEXP_SIZE_WITH_IN_OBJECT_PROPERTIES: u32 = REGEXP_SIZE + POINTER_SIZE;

pub const GENERATOR_FUNCTION_OFFSET: u32 = 24;
pub const GENERATOR_CONTEXT_OFFSET: u32 = 32;
pub const GENERATOR_RECEIVER_OFFSET: u32 = 40;
pub const GENERATOR_INPUT_OR_DEBUG_POS_OFFSET: u32 = 48;
pub const GENERATOR_RESUME_MODE_OFFSET: u32 = 56;
pub const GENERATOR_CONTINUATION_OFFSET: u32 = 64;
pub const GENERATOR_REGISTER_FILE_OFFSET: u32 = 72;
pub const GENERATOR_SIZE: u32 = 80;
pub const ASYNC_GENERATOR_QUEUE_OFFSET: u32 = 80;
pub const ASYNC_GENERATOR_AWAITED_PROMISE_OFFSET: u32 = 88;
pub const ASYNC_GENERATOR_SIZE: u32 = 96;

/// Resume mode of a freshly created generator.
pub const GENERATOR_RESUME_NEXT: i32 = 0;
/// Continuation marker of a generator that has not started.
pub const GENERATOR_EXECUTING: i32 = -2;

/// Holder of the scope info and extension object of a with/catch scope.
pub const CONTEXT_EXTENSION_SCOPE_INFO_OFFSET: u32 = 8;
pub const CONTEXT_EXTENSION_EXTENSION_OFFSET: u32 = 16;
pub const CONTEXT_EXTENSION_SIZE: u32 = 24;

/// Offset of in-object property `index` of a map with the given shape.
///
/// In-object properties occupy the tail of the instance.
#[inline]
pub const fn in_object_property_offset(instance_size: u32, in_object_count: u32, index: u32) -> u32 {
    instance_size - (in_object_count - index) * POINTER_SIZE
}

// =============================================================================
// Contexts
// =============================================================================

/// Fixed context slots. Contexts are fixed arrays with this prefix.
pub mod context {
    pub const CLOSURE_INDEX: u32 = 0;
    pub const PREVIOUS_INDEX: u32 = 1;
    pub const EXTENSION_INDEX: u32 = 2;
    pub const NATIVE_CONTEXT_INDEX: u32 = 3;
    pub const MIN_CONTEXT_SLOTS: u32 = 4;
    /// Catch contexts store the exception in the first user slot.
    pub const THROWN_OBJECT_INDEX: u32 = MIN_CONTEXT_SLOTS;
}

/// Byte offset of context slot `index`.
#[inline]
pub const fn context_slot_offset(index: u32) -> u32 {
    FIXED_ARRAY_HEADER_SIZE + index * POINTER_SIZE
}

/// Byte size of a context with `length` slots.
#[inline]
pub const fn context_size(length: u32) -> u32 {
    fixed_array_size(length)
}

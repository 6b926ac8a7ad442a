//! Field and element descriptors for the objects lowering allocates.
//!
//! Every descriptor names a fixed offset from [`crate::heap::layout`]. Stores
//! of tagged pointers default to the full write barrier; the
//! [`AllocationBuilder`](super::AllocationBuilder) relaxes it for young
//! allocations. The map field always carries the map barrier.

use crate::heap::layout::{self, context};
use crate::heap::{ElementsKind, MapData};
use crate::ir::operators::BaseTaggedness;
use crate::ir::{ElementAccess, FieldAccess, MachineType, TypeBits, WriteBarrierKind};

/// Namespace for the access descriptors.
pub struct AccessBuilder;

const fn tagged_field(offset: u32, field_type: TypeBits, name: &'static str) -> FieldAccess {
    FieldAccess {
        base: BaseTaggedness::Tagged,
        offset,
        field_type,
        machine_type: MachineType::any_tagged(),
        write_barrier: WriteBarrierKind::Full,
        name,
    }
}

const fn pointer_field(offset: u32, field_type: TypeBits, name: &'static str) -> FieldAccess {
    FieldAccess {
        base: BaseTaggedness::Tagged,
        offset,
        field_type,
        machine_type: MachineType::tagged_pointer(),
        write_barrier: WriteBarrierKind::Pointer,
        name,
    }
}

const fn smi_field(offset: u32, name: &'static str) -> FieldAccess {
    FieldAccess {
        base: BaseTaggedness::Tagged,
        offset,
        field_type: TypeBits::SIGNED_SMALL,
        machine_type: MachineType::tagged_signed(),
        write_barrier: WriteBarrierKind::None,
        name,
    }
}

impl AccessBuilder {
    // =========================================================================
    // Heap Objects
    // =========================================================================

    pub const fn for_map() -> FieldAccess {
        FieldAccess {
            base: BaseTaggedness::Tagged,
            offset: layout::MAP_OFFSET,
            field_type: TypeBits::OTHER_INTERNAL,
            machine_type: MachineType::tagged_pointer(),
            write_barrier: WriteBarrierKind::Map,
            name: "map",
        }
    }

    pub const fn for_heap_number_value() -> FieldAccess {
        FieldAccess {
            base: BaseTaggedness::Tagged,
            offset: layout::HEAP_NUMBER_VALUE_OFFSET,
            field_type: TypeBits::NUMBER,
            machine_type: MachineType::float64(),
            write_barrier: WriteBarrierKind::None,
            name: "value",
        }
    }

    // =========================================================================
    // JS Objects
    // =========================================================================

    pub const fn for_js_object_properties_or_hash() -> FieldAccess {
        tagged_field(layout::JS_OBJECT_PROPERTIES_OFFSET, TypeBits::ANY, "properties")
    }

    pub const fn for_js_object_elements() -> FieldAccess {
        pointer_field(layout::JS_OBJECT_ELEMENTS_OFFSET, TypeBits::OTHER_INTERNAL, "elements")
    }

    /// In-object property `index` of an object with map `map`.
    pub fn for_js_object_in_object_property(map: &MapData, index: u32) -> FieldAccess {
        tagged_field(map.in_object_property_offset(index), TypeBits::ANY, "in-object")
    }

    /// Array length; a small integer for every fast elements kind.
    pub fn for_js_array_length(kind: ElementsKind) -> FieldAccess {
        if kind.is_fast() {
            smi_field(layout::JS_ARRAY_LENGTH_OFFSET, "length")
        } else {
            tagged_field(layout::JS_ARRAY_LENGTH_OFFSET, TypeBits::NUMBER, "length")
        }
    }

    pub const fn for_arguments_length() -> FieldAccess {
        tagged_field(layout::ARGUMENTS_LENGTH_OFFSET, TypeBits::NUMBER, "length")
    }

    pub const fn for_arguments_callee() -> FieldAccess {
        pointer_field(layout::ARGUMENTS_CALLEE_OFFSET, TypeBits::FUNCTION, "callee")
    }

    pub const fn for_iter_result_value() -> FieldAccess {
        tagged_field(layout::ITER_RESULT_VALUE_OFFSET, TypeBits::ANY, "value")
    }

    pub const fn for_iter_result_done() -> FieldAccess {
        tagged_field(layout::ITER_RESULT_DONE_OFFSET, TypeBits::ANY, "done")
    }

    pub const fn for_regexp_data() -> FieldAccess {
        tagged_field(layout::REGEXP_DATA_OFFSET, TypeBits::OTHER_INTERNAL, "data")
    }

    pub const fn for_regexp_source() -> FieldAccess {
        tagged_field(layout::REGEXP_SOURCE_OFFSET, TypeBits::STRING, "source")
    }

    pub const fn for_regexp_flags() -> FieldAccess {
        tagged_field(layout::REGEXP_FLAGS_OFFSET, TypeBits::SIGNED_SMALL, "flags")
    }

    pub const fn for_regexp_last_index() -> FieldAccess {
        tagged_field(layout::REGEXP_LAST_INDEX_OFFSET, TypeBits::NUMBER, "lastIndex")
    }

    // =========================================================================
    // Generators
    // =========================================================================

    pub const fn for_generator_function() -> FieldAccess {
        pointer_field(layout::GENERATOR_FUNCTION_OFFSET, TypeBits::FUNCTION, "function")
    }

    pub const fn for_generator_context() -> FieldAccess {
        pointer_field(layout::GENERATOR_CONTEXT_OFFSET, TypeBits::OTHER_INTERNAL, "context")
    }

    pub const fn for_generator_receiver() -> FieldAccess {
        tagged_field(layout::GENERATOR_RECEIVER_OFFSET, TypeBits::ANY, "receiver")
    }

    pub const fn for_generator_input_or_debug_pos() -> FieldAccess {
        tagged_field(layout::GENERATOR_INPUT_OR_DEBUG_POS_OFFSET, TypeBits::ANY, "input")
    }

    pub const fn for_generator_resume_mode() -> FieldAccess {
        smi_field(layout::GENERATOR_RESUME_MODE_OFFSET, "resume_mode")
    }

    pub const fn for_generator_continuation() -> FieldAccess {
        smi_field(layout::GENERATOR_CONTINUATION_OFFSET, "continuation")
    }

    pub const fn for_generator_register_file() -> FieldAccess {
        pointer_field(layout::GENERATOR_REGISTER_FILE_OFFSET, TypeBits::OTHER_INTERNAL, "registers")
    }

    pub const fn for_async_generator_queue() -> FieldAccess {
        tagged_field(layout::ASYNC_GENERATOR_QUEUE_OFFSET, TypeBits::ANY, "queue")
    }

    pub const fn for_async_generator_awaited_promise() -> FieldAccess {
        tagged_field(layout::ASYNC_GENERATOR_AWAITED_PROMISE_OFFSET, TypeBits::ANY, "awaited")
    }

    // =========================================================================
    // Fixed Arrays and Contexts
    // =========================================================================

    pub const fn for_fixed_array_length() -> FieldAccess {
        smi_field(layout::FIXED_ARRAY_LENGTH_OFFSET, "length")
    }

    /// Tagged slot `index` of a fixed array.
    pub const fn for_fixed_array_slot(index: u32) -> FieldAccess {
        tagged_field(
            layout::FIXED_ARRAY_HEADER_SIZE + index * layout::POINTER_SIZE,
            TypeBits::ANY,
            "slot",
        )
    }

    pub const fn for_context_slot(index: u32) -> FieldAccess {
        tagged_field(layout::context_slot_offset(index), TypeBits::ANY, context_slot_name(index))
    }

    pub const fn for_context_extension_scope_info() -> FieldAccess {
        pointer_field(
            layout::CONTEXT_EXTENSION_SCOPE_INFO_OFFSET,
            TypeBits::OTHER_INTERNAL,
            "scope_info",
        )
    }

    pub const fn for_context_extension_extension() -> FieldAccess {
        tagged_field(layout::CONTEXT_EXTENSION_EXTENSION_OFFSET, TypeBits::ANY, "extension")
    }

    /// Element access for a tagged backing store of `kind`.
    pub fn for_fixed_array_element(kind: ElementsKind) -> ElementAccess {
        let mut access = ElementAccess {
            base: BaseTaggedness::Tagged,
            header_size: layout::FIXED_ARRAY_HEADER_SIZE,
            element_type: TypeBits::ANY,
            machine_type: MachineType::any_tagged(),
            write_barrier: WriteBarrierKind::Full,
        };
        if kind.is_smi() {
            access.element_type = if kind.is_holey() {
                TypeBits::SIGNED_SMALL.union(TypeBits::HOLE)
            } else {
                TypeBits::SIGNED_SMALL
            };
            access.machine_type = MachineType::tagged_signed();
            access.write_barrier = WriteBarrierKind::None;
        }
        access
    }

    pub const fn for_fixed_double_array_element() -> ElementAccess {
        ElementAccess {
            base: BaseTaggedness::Tagged,
            header_size: layout::FIXED_ARRAY_HEADER_SIZE,
            element_type: TypeBits::NUMBER,
            machine_type: MachineType::float64(),
            write_barrier: WriteBarrierKind::None,
        }
    }
}

const fn context_slot_name(index: u32) -> &'static str {
    match index {
        context::CLOSURE_INDEX => "closure",
        context::PREVIOUS_INDEX => "previous",
        context::EXTENSION_INDEX => "extension",
        context::NATIVE_CONTEXT_INDEX => "native_context",
        _ => "slot",
    }
}

//! In-memory heap broker.
//!
//! A `HeapSnapshot` is populated once, before compilation starts, and is
//! read-only afterwards. `new()` installs the root list and a native context
//! with its initial maps; embedders and tests then add the functions,
//! feedback and boilerplates a compilation inspects.

use super::{
    layout, AllocationSiteData, ElementsKind, FeedbackVectorData, FixedArrayData,
    FixedDoubleArrayData, FunctionData, HeapBroker, HeapValue, InstanceType, JSObjectData,
    MapData, NativeContextData, ObjectData, ObjectRef, OddballKind, Roots, ScopeInfoData,
    SharedInfoData,
};
use crate::ir::operators::{PretenureFlag, ScopeType};

/// Vector-backed heap description.
#[derive(Debug, Clone)]
pub struct HeapSnapshot {
    objects: Vec<ObjectData>,
    roots: Roots,
    native_context: NativeContextData,
}

impl HeapSnapshot {
    /// Create a snapshot holding the roots and native-context maps.
    pub fn new() -> Self {
        let mut objects = Vec::with_capacity(64);
        let mut add = |data: ObjectData| {
            objects.push(data);
            ObjectRef::new(objects.len() as u32 - 1)
        };

        let undefined = add(ObjectData::Oddball(OddballKind::Undefined));
        let null = add(ObjectData::Oddball(OddballKind::Null));
        let the_hole = add(ObjectData::Oddball(OddballKind::TheHole));
        let true_value = add(ObjectData::Oddball(OddballKind::True));
        let false_value = add(ObjectData::Oddball(OddballKind::False));
        let uninitialized = add(ObjectData::Oddball(OddballKind::Uninitialized));

        let fixed_array_map = add(ObjectData::Map(MapData::new(InstanceType::FixedArray, 0)));
        let fixed_cow_array_map = add(ObjectData::Map(MapData::new(InstanceType::FixedArray, 0)));
        let fixed_double_array_map =
            add(ObjectData::Map(MapData::new(InstanceType::FixedDoubleArray, 0)));
        let sloppy_arguments_elements_map =
            add(ObjectData::Map(MapData::new(InstanceType::FixedArray, 0)));
        let heap_number_map = add(ObjectData::Map(MapData::new(
            InstanceType::HeapNumber,
            layout::HEAP_NUMBER_SIZE,
        )));
        let mutable_heap_number_map = add(ObjectData::Map(MapData::new(
            InstanceType::HeapNumber,
            layout::HEAP_NUMBER_SIZE,
        )));
        let one_pointer_filler_map = add(ObjectData::Map(MapData::new(
            InstanceType::Filler,
            layout::POINTER_SIZE,
        )));
        let context_extension_map = add(ObjectData::Map(MapData::new(
            InstanceType::ContextExtension,
            layout::CONTEXT_EXTENSION_SIZE,
        )));
        let mut context_map = || add(ObjectData::Map(MapData::new(InstanceType::Context, 0)));
        let function_context_map = context_map();
        let eval_context_map = context_map();
        let with_context_map = context_map();
        let catch_context_map = context_map();
        let block_context_map = context_map();
        let empty_fixed_array = add(ObjectData::FixedArray(FixedArrayData {
            map: fixed_array_map,
            values: Vec::new(),
        }));

        let native_context_object = add(ObjectData::Opaque(InstanceType::NativeContext));
        let sloppy_arguments_map = add(ObjectData::Map(MapData::new(
            InstanceType::JSObject,
            layout::SLOPPY_ARGUMENTS_SIZE,
        )));
        let fast_aliased_arguments_map = add(ObjectData::Map(
            MapData::new(InstanceType::JSObject, layout::SLOPPY_ARGUMENTS_SIZE)
                .with_elements_kind(ElementsKind::Dictionary),
        ));
        let strict_arguments_map = add(ObjectData::Map(MapData::new(
            InstanceType::JSObject,
            layout::STRICT_ARGUMENTS_SIZE,
        )));
        let iterator_result_map = add(ObjectData::Map(MapData::new(
            InstanceType::JSObject,
            layout::ITER_RESULT_SIZE,
        )));
        let object_literal_map = add(ObjectData::Map(MapData::object_with_in_object_properties(4)));
        let mut js_array_maps = [ObjectRef::new(0); 6];
        for (slot, kind) in js_array_maps.iter_mut().zip(ElementsKind::FAST) {
            *slot = add(ObjectData::Map(
                MapData::new(InstanceType::JSArray, layout::JS_ARRAY_SIZE).with_elements_kind(kind),
            ));
        }

        HeapSnapshot {
            objects,
            roots: Roots {
                undefined,
                null,
                the_hole,
                true_value,
                false_value,
                uninitialized,
                empty_fixed_array,
                fixed_array_map,
                fixed_cow_array_map,
                fixed_double_array_map,
                sloppy_arguments_elements_map,
                heap_number_map,
                mutable_heap_number_map,
                one_pointer_filler_map,
                context_extension_map,
                function_context_map,
                eval_context_map,
                with_context_map,
                catch_context_map,
                block_context_map,
            },
            native_context: NativeContextData {
                object: native_context_object,
                sloppy_arguments_map,
                fast_aliased_arguments_map,
                strict_arguments_map,
                iterator_result_map,
                object_literal_map,
                js_array_maps,
            },
        }
    }

    /// Number of objects, roots included.
    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // =========================================================================
    // Population
    // =========================================================================

    pub fn add(&mut self, data: ObjectData) -> ObjectRef {
        self.objects.push(data);
        ObjectRef::new(self.objects.len() as u32 - 1)
    }

    /// Overwrite an object description, for cycles such as a constructor
    /// and its initial map.
    pub fn set(&mut self, object: ObjectRef, data: ObjectData) {
        if let Some(slot) = self.objects.get_mut(object.index() as usize) {
            *slot = data;
        }
    }

    pub fn add_map(&mut self, map: MapData) -> ObjectRef {
        self.add(ObjectData::Map(map))
    }

    pub fn add_string(&mut self, value: &str) -> ObjectRef {
        self.add(ObjectData::String(value.to_owned()))
    }

    pub fn add_heap_number(&mut self, value: f64) -> ObjectRef {
        self.add(ObjectData::HeapNumber(value))
    }

    /// Tagged backing store with the plain fixed array map.
    pub fn add_fixed_array(&mut self, values: Vec<Option<HeapValue>>) -> ObjectRef {
        let map = self.roots.fixed_array_map;
        self.add(ObjectData::FixedArray(FixedArrayData { map, values }))
    }

    /// Copy-on-write backing store shared by every copy of a literal.
    pub fn add_cow_array(&mut self, values: Vec<Option<HeapValue>>) -> ObjectRef {
        let map = self.roots.fixed_cow_array_map;
        self.add(ObjectData::FixedArray(FixedArrayData { map, values }))
    }

    pub fn add_double_array(&mut self, values: Vec<Option<f64>>) -> ObjectRef {
        self.add(ObjectData::FixedDoubleArray(FixedDoubleArrayData { values }))
    }

    pub fn add_scope_info(&mut self, scope_type: ScopeType, context_length: u32) -> ObjectRef {
        self.add(ObjectData::ScopeInfo(ScopeInfoData {
            scope_type,
            context_length,
        }))
    }

    pub fn add_shared_info(&mut self, shared: SharedInfoData) -> ObjectRef {
        self.add(ObjectData::SharedFunctionInfo(shared))
    }

    pub fn add_function(&mut self, function: FunctionData) -> ObjectRef {
        self.add(ObjectData::Function(function))
    }

    pub fn add_feedback_vector(&mut self, slots: Vec<Option<ObjectRef>>) -> ObjectRef {
        self.add(ObjectData::FeedbackVector(FeedbackVectorData { slots }))
    }

    pub fn add_allocation_site(&mut self, site: AllocationSiteData) -> ObjectRef {
        self.add(ObjectData::AllocationSite(site))
    }

    /// Allocation site for array construction feedback.
    pub fn add_array_site(&mut self, kind: ElementsKind, pretenure: PretenureFlag) -> ObjectRef {
        self.add_allocation_site(AllocationSiteData {
            boilerplate: None,
            elements_kind: kind,
            pretenure,
            can_inline_call: true,
        })
    }

    pub fn add_js_object(&mut self, object: JSObjectData) -> ObjectRef {
        self.add(ObjectData::JSObject(object))
    }
}

impl Default for HeapSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapBroker for HeapSnapshot {
    #[inline]
    fn get(&self, object: ObjectRef) -> Option<&ObjectData> {
        self.objects.get(object.index() as usize)
    }

    #[inline]
    fn roots(&self) -> &Roots {
        &self.roots
    }

    #[inline]
    fn native_context(&self) -> &NativeContextData {
        &self.native_context
    }
}

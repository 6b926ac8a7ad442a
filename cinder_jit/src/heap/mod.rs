//! Read-only view of the managed heap.
//!
//! Lowering never touches real heap memory. It inspects objects through a
//! [`HeapBroker`], which hands out [`ObjectData`] descriptions keyed by
//! [`ObjectRef`] handles, plus the root list and the native-context maps the
//! inline allocations embed as constants.
//!
//! - **Layout** (`layout.rs`): byte offsets and sizes
//! - **Snapshot** (`snapshot.rs`): in-memory broker used by embedders and tests

pub mod layout;
pub mod snapshot;

pub use snapshot::HeapSnapshot;

use std::fmt;

use crate::ir::operators::{PretenureFlag, ScopeType};
use crate::ir::types::TypeBits;

// =============================================================================
// Object Handles
// =============================================================================

/// Handle to a heap object known at compile time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(u32);

impl ObjectRef {
    #[inline]
    pub const fn new(index: u32) -> Self {
        ObjectRef(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Contents of a tagged slot: a small integer or a heap pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapValue {
    Smi(i32),
    Object(ObjectRef),
}

impl HeapValue {
    #[inline]
    pub const fn as_object(self) -> Option<ObjectRef> {
        match self {
            HeapValue::Object(object) => Some(object),
            HeapValue::Smi(_) => None,
        }
    }
}

// =============================================================================
// Elements Kinds
// =============================================================================

/// Backing store flavor of an array-like object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementsKind {
    PackedSmi,
    HoleySmi,
    Packed,
    Holey,
    PackedDouble,
    HoleyDouble,
    Dictionary,
}

impl ElementsKind {
    /// Every kind with a fast (fixed array) backing store.
    pub const FAST: [ElementsKind; 6] = [
        ElementsKind::PackedSmi,
        ElementsKind::HoleySmi,
        ElementsKind::Packed,
        ElementsKind::Holey,
        ElementsKind::PackedDouble,
        ElementsKind::HoleyDouble,
    ];

    #[inline]
    pub const fn is_smi(self) -> bool {
        matches!(self, ElementsKind::PackedSmi | ElementsKind::HoleySmi)
    }

    #[inline]
    pub const fn is_double(self) -> bool {
        matches!(self, ElementsKind::PackedDouble | ElementsKind::HoleyDouble)
    }

    #[inline]
    pub const fn is_holey(self) -> bool {
        matches!(
            self,
            ElementsKind::HoleySmi | ElementsKind::Holey | ElementsKind::HoleyDouble
        )
    }

    #[inline]
    pub const fn is_fast(self) -> bool {
        !matches!(self, ElementsKind::Dictionary)
    }

    /// The holey variant of a packed kind.
    pub const fn to_holey(self) -> Self {
        match self {
            ElementsKind::PackedSmi => ElementsKind::HoleySmi,
            ElementsKind::Packed => ElementsKind::Holey,
            ElementsKind::PackedDouble => ElementsKind::HoleyDouble,
            other => other,
        }
    }

    /// Kind that can hold arbitrary tagged values, keeping holeyness.
    pub const fn to_object(self) -> Self {
        if self.is_holey() {
            ElementsKind::Holey
        } else {
            ElementsKind::Packed
        }
    }

    /// Position in [`ElementsKind::FAST`].
    pub const fn fast_index(self) -> Option<usize> {
        match self {
            ElementsKind::PackedSmi => Some(0),
            ElementsKind::HoleySmi => Some(1),
            ElementsKind::Packed => Some(2),
            ElementsKind::Holey => Some(3),
            ElementsKind::PackedDouble => Some(4),
            ElementsKind::HoleyDouble => Some(5),
            ElementsKind::Dictionary => None,
        }
    }
}

// =============================================================================
// Object Descriptions
// =============================================================================

/// Instance type recorded in a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceType {
    Map,
    Oddball,
    HeapNumber,
    String,
    Symbol,
    FixedArray,
    FixedDoubleArray,
    JSObject,
    JSArray,
    JSFunction,
    JSRegExp,
    JSGeneratorObject,
    JSAsyncGeneratorObject,
    JSProxy,
    SharedFunctionInfo,
    ScopeInfo,
    FeedbackVector,
    AllocationSite,
    Context,
    NativeContext,
    ContextExtension,
    Filler,
    Code,
}

impl InstanceType {
    /// Semantic type of a constant of this instance type.
    pub const fn type_bits(self) -> TypeBits {
        match self {
            InstanceType::String => TypeBits::STRING,
            InstanceType::Symbol => TypeBits::SYMBOL,
            InstanceType::HeapNumber => TypeBits::NUMBER,
            InstanceType::Oddball => TypeBits::ODDBALL,
            InstanceType::JSObject
            | InstanceType::JSRegExp
            | InstanceType::JSGeneratorObject
            | InstanceType::JSAsyncGeneratorObject => TypeBits::OTHER_OBJECT,
            InstanceType::JSArray => TypeBits::ARRAY,
            InstanceType::JSFunction => TypeBits::FUNCTION,
            InstanceType::JSProxy => TypeBits::PROXY,
            _ => TypeBits::OTHER_INTERNAL,
        }
    }
}

/// Representation a field was last written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRepresentation {
    None,
    Smi,
    /// Boxed double; each copy needs a fresh mutable box.
    Double,
    HeapObject,
    Tagged,
}

/// Where a property's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyLocation {
    /// A field of the instance.
    Field,
    /// A constant stored in the descriptor array.
    Descriptor,
}

/// One own property of a map.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub location: PropertyLocation,
    pub representation: FieldRepresentation,
    /// In-object property index for `Field` locations.
    pub index: u32,
}

impl FieldDescriptor {
    /// In-object data field.
    pub fn field(name: impl Into<String>, representation: FieldRepresentation, index: u32) -> Self {
        FieldDescriptor {
            name: name.into(),
            location: PropertyLocation::Field,
            representation,
            index,
        }
    }

    /// Descriptor-held constant; occupies no instance slot.
    pub fn constant(name: impl Into<String>) -> Self {
        FieldDescriptor {
            name: name.into(),
            location: PropertyLocation::Descriptor,
            representation: FieldRepresentation::Tagged,
            index: 0,
        }
    }
}

/// Hidden class of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct MapData {
    pub instance_type: InstanceType,
    pub instance_size: u32,
    pub in_object_properties: u32,
    pub elements_kind: ElementsKind,
    pub is_dictionary_map: bool,
    pub is_deprecated: bool,
    /// Constructor function, or the back pointer for transitioned maps.
    pub constructor: Option<ObjectRef>,
    pub descriptors: Vec<FieldDescriptor>,
}

impl MapData {
    pub fn new(instance_type: InstanceType, instance_size: u32) -> Self {
        MapData {
            instance_type,
            instance_size,
            in_object_properties: 0,
            elements_kind: ElementsKind::Holey,
            is_dictionary_map: false,
            is_deprecated: false,
            constructor: None,
            descriptors: Vec::new(),
        }
    }

    /// Plain object map with `count` in-object slots after the header.
    pub fn object_with_in_object_properties(count: u32) -> Self {
        MapData::new(
            InstanceType::JSObject,
            layout::JS_OBJECT_HEADER_SIZE + count * layout::POINTER_SIZE,
        )
        .with_in_object_properties(count)
    }

    pub fn with_in_object_properties(mut self, count: u32) -> Self {
        self.in_object_properties = count;
        self
    }

    pub fn with_elements_kind(mut self, kind: ElementsKind) -> Self {
        self.elements_kind = kind;
        self
    }

    pub fn with_constructor(mut self, constructor: ObjectRef) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn with_field(mut self, descriptor: FieldDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn dictionary(mut self) -> Self {
        self.is_dictionary_map = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.is_deprecated = true;
        self
    }

    #[inline]
    pub fn is_js_array_map(&self) -> bool {
        self.instance_type == InstanceType::JSArray
    }

    /// Byte offset of in-object property `index`.
    #[inline]
    pub fn in_object_property_offset(&self, index: u32) -> u32 {
        layout::in_object_property_offset(self.instance_size, self.in_object_properties, index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionData {
    pub shared: ObjectRef,
    pub initial_map: Option<ObjectRef>,
    pub feedback_vector: Option<ObjectRef>,
    pub is_constructor: bool,
}

/// Kind of function a shared info describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Generator,
    AsyncGenerator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SharedInfoData {
    pub kind: FunctionKind,
    /// Formal parameter count, excluding the receiver.
    pub formal_parameter_count: u32,
    pub has_duplicate_parameters: bool,
    /// Interpreter register count; sizes a generator's register file.
    pub register_count: u32,
}

/// Allocation feedback for a literal or constructor call site.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationSiteData {
    pub boilerplate: Option<ObjectRef>,
    pub elements_kind: ElementsKind,
    pub pretenure: PretenureFlag,
    /// Whether array construction may be inlined without risking a
    /// deoptimization loop.
    pub can_inline_call: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackVectorData {
    /// Slot contents; `None` for uninitialized slots.
    pub slots: Vec<Option<ObjectRef>>,
}

/// A `JSObject` or `JSArray`, usually a literal boilerplate.
#[derive(Debug, Clone, PartialEq)]
pub struct JSObjectData {
    pub map: ObjectRef,
    pub elements: ObjectRef,
    /// Length of the out-of-object property array.
    pub out_of_object_properties: u32,
    /// In-object field values by in-object index.
    pub fields: Vec<HeapValue>,
    /// Array length, for `JSArray` instances.
    pub length: Option<HeapValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JSRegExpData {
    pub map: ObjectRef,
    pub properties: ObjectRef,
    pub elements: ObjectRef,
    pub data: ObjectRef,
    pub source: ObjectRef,
    pub flags: HeapValue,
    pub last_index: HeapValue,
}

/// Tagged backing store. `None` entries are holes.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedArrayData {
    pub map: ObjectRef,
    pub values: Vec<Option<HeapValue>>,
}

/// Unboxed double backing store. `None` entries are holes.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedDoubleArrayData {
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopeInfoData {
    pub scope_type: ScopeType,
    /// Slot count of contexts created for this scope.
    pub context_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OddballKind {
    Undefined,
    Null,
    TheHole,
    True,
    False,
    Uninitialized,
}

/// Description of one heap object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectData {
    Map(MapData),
    Function(FunctionData),
    SharedFunctionInfo(SharedInfoData),
    AllocationSite(AllocationSiteData),
    FeedbackVector(FeedbackVectorData),
    JSObject(JSObjectData),
    JSRegExp(JSRegExpData),
    FixedArray(FixedArrayData),
    FixedDoubleArray(FixedDoubleArrayData),
    HeapNumber(f64),
    ScopeInfo(ScopeInfoData),
    Oddball(OddballKind),
    String(String),
    /// Objects the compiler only embeds by reference (code, contexts).
    Opaque(InstanceType),
}

impl ObjectData {
    pub fn instance_type(&self) -> InstanceType {
        match self {
            ObjectData::Map(_) => InstanceType::Map,
            ObjectData::Function(_) => InstanceType::JSFunction,
            ObjectData::SharedFunctionInfo(_) => InstanceType::SharedFunctionInfo,
            ObjectData::AllocationSite(_) => InstanceType::AllocationSite,
            ObjectData::FeedbackVector(_) => InstanceType::FeedbackVector,
            ObjectData::JSObject(_) => InstanceType::JSObject,
            ObjectData::JSRegExp(_) => InstanceType::JSRegExp,
            ObjectData::FixedArray(_) => InstanceType::FixedArray,
            ObjectData::FixedDoubleArray(_) => InstanceType::FixedDoubleArray,
            ObjectData::HeapNumber(_) => InstanceType::HeapNumber,
            ObjectData::ScopeInfo(_) => InstanceType::ScopeInfo,
            ObjectData::Oddball(_) => InstanceType::Oddball,
            ObjectData::String(_) => InstanceType::String,
            ObjectData::Opaque(instance_type) => *instance_type,
        }
    }
}

// =============================================================================
// Roots
// =============================================================================

/// Immortal objects every compilation may embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roots {
    pub undefined: ObjectRef,
    pub null: ObjectRef,
    pub the_hole: ObjectRef,
    pub true_value: ObjectRef,
    pub false_value: ObjectRef,
    pub uninitialized: ObjectRef,
    pub empty_fixed_array: ObjectRef,
    pub fixed_array_map: ObjectRef,
    pub fixed_cow_array_map: ObjectRef,
    pub fixed_double_array_map: ObjectRef,
    pub sloppy_arguments_elements_map: ObjectRef,
    pub heap_number_map: ObjectRef,
    pub mutable_heap_number_map: ObjectRef,
    pub one_pointer_filler_map: ObjectRef,
    pub context_extension_map: ObjectRef,
    pub function_context_map: ObjectRef,
    pub eval_context_map: ObjectRef,
    pub with_context_map: ObjectRef,
    pub catch_context_map: ObjectRef,
    pub block_context_map: ObjectRef,
}

/// Position of an entry in the root list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RootIndex {
    Undefined,
    Null,
    TheHole,
    True,
    False,
    Uninitialized,
    EmptyFixedArray,
    FixedArrayMap,
    FixedCowArrayMap,
    FixedDoubleArrayMap,
    HeapNumberMap,
    MutableHeapNumberMap,
    /// Mutable: reassigned when the array protector cell is invalidated.
    ArrayProtector,
    /// Mutable: grows as strings are internalized.
    StringTable,
}

impl RootIndex {
    /// Byte offset of the entry from the root list start.
    #[inline]
    pub const fn offset(self) -> i64 {
        self as i64 * layout::POINTER_SIZE as i64
    }
}

impl Roots {
    /// The object behind an immortal, immovable root; `None` for roots whose
    /// value changes at runtime and must be loaded.
    pub fn constant(&self, index: RootIndex) -> Option<ObjectRef> {
        Some(match index {
            RootIndex::Undefined => self.undefined,
            RootIndex::Null => self.null,
            RootIndex::TheHole => self.the_hole,
            RootIndex::True => self.true_value,
            RootIndex::False => self.false_value,
            RootIndex::Uninitialized => self.uninitialized,
            RootIndex::EmptyFixedArray => self.empty_fixed_array,
            RootIndex::FixedArrayMap => self.fixed_array_map,
            RootIndex::FixedCowArrayMap => self.fixed_cow_array_map,
            RootIndex::FixedDoubleArrayMap => self.fixed_double_array_map,
            RootIndex::HeapNumberMap => self.heap_number_map,
            RootIndex::MutableHeapNumberMap => self.mutable_heap_number_map,
            RootIndex::ArrayProtector | RootIndex::StringTable => return None,
        })
    }
}

/// Maps owned by the native context of the compiled function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeContextData {
    /// The native context object itself.
    pub object: ObjectRef,
    pub sloppy_arguments_map: ObjectRef,
    pub fast_aliased_arguments_map: ObjectRef,
    pub strict_arguments_map: ObjectRef,
    pub iterator_result_map: ObjectRef,
    /// Map used by empty object literals.
    pub object_literal_map: ObjectRef,
    /// Initial `JSArray` maps indexed by [`ElementsKind::fast_index`].
    pub js_array_maps: [ObjectRef; 6],
}

impl NativeContextData {
    /// Initial array map for a fast elements kind.
    pub fn js_array_map(&self, kind: ElementsKind) -> Option<ObjectRef> {
        kind.fast_index().map(|index| self.js_array_maps[index])
    }
}

// =============================================================================
// Broker
// =============================================================================

/// Read-only access to compile-time heap knowledge.
///
/// Implementations must be immutable for the duration of a compilation; the
/// same broker may back concurrent compilations.
pub trait HeapBroker: Send + Sync {
    /// Description of `object`, if the broker knows it.
    fn get(&self, object: ObjectRef) -> Option<&ObjectData>;

    fn roots(&self) -> &Roots;

    fn native_context(&self) -> &NativeContextData;

    fn map(&self, object: ObjectRef) -> Option<&MapData> {
        match self.get(object)? {
            ObjectData::Map(map) => Some(map),
            _ => None,
        }
    }

    fn function(&self, object: ObjectRef) -> Option<&FunctionData> {
        match self.get(object)? {
            ObjectData::Function(function) => Some(function),
            _ => None,
        }
    }

    fn shared_info(&self, object: ObjectRef) -> Option<&SharedInfoData> {
        match self.get(object)? {
            ObjectData::SharedFunctionInfo(shared) => Some(shared),
            _ => None,
        }
    }

    fn allocation_site(&self, object: ObjectRef) -> Option<&AllocationSiteData> {
        match self.get(object)? {
            ObjectData::AllocationSite(site) => Some(site),
            _ => None,
        }
    }

    fn feedback_vector(&self, object: ObjectRef) -> Option<&FeedbackVectorData> {
        match self.get(object)? {
            ObjectData::FeedbackVector(vector) => Some(vector),
            _ => None,
        }
    }

    fn js_object(&self, object: ObjectRef) -> Option<&JSObjectData> {
        match self.get(object)? {
            ObjectData::JSObject(data) => Some(data),
            _ => None,
        }
    }

    fn regexp(&self, object: ObjectRef) -> Option<&JSRegExpData> {
        match self.get(object)? {
            ObjectData::JSRegExp(data) => Some(data),
            _ => None,
        }
    }

    fn scope_info(&self, object: ObjectRef) -> Option<&ScopeInfoData> {
        match self.get(object)? {
            ObjectData::ScopeInfo(data) => Some(data),
            _ => None,
        }
    }

    fn heap_number(&self, object: ObjectRef) -> Option<f64> {
        match self.get(object)? {
            ObjectData::HeapNumber(value) => Some(*value),
            _ => None,
        }
    }

    /// Semantic type bits of a constant.
    fn type_bits(&self, object: ObjectRef) -> TypeBits {
        let roots = self.roots();
        if object == roots.the_hole {
            return TypeBits::HOLE;
        }
        if object == roots.undefined {
            return TypeBits::UNDEFINED;
        }
        if object == roots.null {
            return TypeBits::NULL;
        }
        if object == roots.true_value || object == roots.false_value {
            return TypeBits::BOOLEAN;
        }
        match self.get(object) {
            Some(ObjectData::JSObject(data)) => match self.map(data.map) {
                Some(map) => map.instance_type.type_bits(),
                None => TypeBits::OTHER_OBJECT,
            },
            Some(data) => data.instance_type().type_bits(),
            None => TypeBits::ANY,
        }
    }
}

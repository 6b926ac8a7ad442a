//! Call descriptors and the linkage registry.
//!
//! A [`CallDescriptor`] fixes everything a call site needs to know about
//! its callee: the calling convention, parameter and return machine types,
//! where each parameter is passed, and whether the callee needs a frame
//! state, supports tail calls or expects a context. Descriptors are
//! interned in a [`Linkage`] so that identical signatures share one
//! [`DescriptorId`]; interning is append-only, so an id handed out once
//! stays valid for the life of the registry.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::runtime::{RuntimeFunctionId, RuntimeTable};
use super::{Builtin, DescriptorId};
use crate::ir::operators::OpProperties;
use crate::ir::types::MachineType;

/// Number of parameters a C call passes in registers.
const C_REGISTER_PARAMETERS: u32 = 6;

// =============================================================================
// Descriptor
// =============================================================================

/// Calling convention of a call target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallDescriptorKind {
    /// Target is a code object (stubs, C-entry).
    CodeObject,
    /// Target is a raw native address.
    Address,
    /// Target is a JS function object.
    JsFunction,
}

bitflags::bitflags! {
    /// Call-site requirements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct CallFlags: u8 {
        /// The call can deoptimize and carries a frame state.
        const NEEDS_FRAME_STATE = 1 << 0;
        /// The callee may be entered with a tail call.
        const SUPPORTS_TAIL_CALLS = 1 << 1;
        /// The last parameter is the current context.
        const NEEDS_CONTEXT = 1 << 2;
    }
}

/// Where a parameter or return value is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkageLocation {
    Register(u8),
    /// Slot index, counting up from the stack pointer at the call.
    StackSlot(u32),
}

/// Complete signature of a call target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallDescriptor {
    pub kind: CallDescriptorKind,
    pub return_types: SmallVec<[MachineType; 2]>,
    /// Parameters excluding the call target, context last when present.
    pub parameter_types: Vec<MachineType>,
    /// Leading parameters passed in registers; the rest go on the stack.
    pub register_parameter_count: u32,
    /// JS parameters including the receiver, for `JsFunction` targets.
    pub js_parameter_count: u32,
    pub properties: OpProperties,
    pub flags: CallFlags,
    pub debug_name: String,
}

impl CallDescriptor {
    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    #[inline]
    pub fn return_count(&self) -> usize {
        self.return_types.len()
    }

    #[inline]
    pub fn stack_parameter_count(&self) -> usize {
        self.parameter_count()
            .saturating_sub(self.register_parameter_count as usize)
    }

    /// Value inputs of a call node: the target plus every parameter.
    #[inline]
    pub fn input_count(&self) -> usize {
        1 + self.parameter_count()
    }

    #[inline]
    pub fn needs_frame_state(&self) -> bool {
        self.flags.contains(CallFlags::NEEDS_FRAME_STATE)
    }

    #[inline]
    pub fn supports_tail_calls(&self) -> bool {
        self.flags.contains(CallFlags::SUPPORTS_TAIL_CALLS)
    }

    #[inline]
    pub fn needs_context(&self) -> bool {
        self.flags.contains(CallFlags::NEEDS_CONTEXT)
    }

    /// Index of the context parameter, if the callee takes one.
    pub fn context_parameter_index(&self) -> Option<usize> {
        (self.needs_context() && self.parameter_count() > 0).then(|| self.parameter_count() - 1)
    }

    /// Location of parameter `index`: registers first, then stack slots.
    pub fn parameter_location(&self, index: usize) -> LinkageLocation {
        let registers = self.register_parameter_count as usize;
        if index < registers {
            LinkageLocation::Register(index as u8)
        } else {
            LinkageLocation::StackSlot((index - registers) as u32)
        }
    }

    /// Location of return value `index`; returns are always in registers.
    pub fn return_location(&self, index: usize) -> LinkageLocation {
        LinkageLocation::Register(index as u8)
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:?}:r{}s{}i{}",
            self.debug_name,
            self.kind,
            self.return_count(),
            self.stack_parameter_count(),
            self.input_count()
        )
    }
}

// =============================================================================
// Stub Interfaces
// =============================================================================

/// Register convention of a stub: its named register parameters and whether
/// the context is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StubInterface {
    pub name: &'static str,
    pub register_parameter_count: u32,
    pub has_context: bool,
}

impl StubInterface {
    pub const fn new(name: &'static str, register_parameter_count: u32, has_context: bool) -> Self {
        StubInterface {
            name,
            register_parameter_count,
            has_context,
        }
    }
}

// =============================================================================
// Linkage Registry
// =============================================================================

#[derive(Default)]
struct Interner {
    descriptors: Vec<Arc<CallDescriptor>>,
    index: FxHashMap<Arc<CallDescriptor>, DescriptorId>,
}

/// Process-wide registry of call descriptors and the runtime table.
///
/// Shared across compilations behind an `Arc`; lookups take a read lock
/// and interning a new signature takes the write lock once.
pub struct Linkage {
    interner: RwLock<Interner>,
    runtime: RuntimeTable,
}

impl Linkage {
    pub fn new(runtime: RuntimeTable) -> Self {
        Linkage {
            interner: RwLock::new(Interner::default()),
            runtime,
        }
    }

    /// Shared registry with the default runtime table.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new(RuntimeTable::default()))
    }

    #[inline]
    pub fn runtime(&self) -> &RuntimeTable {
        &self.runtime
    }

    /// Intern a descriptor, returning the id of an identical one if present.
    pub fn intern(&self, descriptor: CallDescriptor) -> DescriptorId {
        if let Some(&id) = self.interner.read().index.get(&descriptor) {
            return id;
        }
        let mut interner = self.interner.write();
        if let Some(&id) = interner.index.get(&descriptor) {
            return id;
        }
        let id = DescriptorId::new(interner.descriptors.len() as u32);
        let descriptor = Arc::new(descriptor);
        log::trace!("interned call descriptor {} as {:?}", descriptor, id);
        interner.descriptors.push(Arc::clone(&descriptor));
        interner.index.insert(descriptor, id);
        id
    }

    /// Descriptor behind an id handed out by this registry.
    ///
    /// # Panics
    ///
    /// Panics if `id` came from a different registry.
    pub fn descriptor(&self, id: DescriptorId) -> Arc<CallDescriptor> {
        Arc::clone(&self.interner.read().descriptors[id.index() as usize])
    }

    pub fn len(&self) -> usize {
        self.interner.read().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Call into runtime routine `function` through the C-entry stub.
    ///
    /// The arguments are passed on the stack, followed by the routine's
    /// external reference, the argument count and the context.
    pub fn runtime_call_descriptor(
        &self,
        function: RuntimeFunctionId,
        argument_count: u32,
        properties: OpProperties,
        flags: CallFlags,
    ) -> DescriptorId {
        let entry = self.runtime.lookup(function);
        let mut parameter_types = vec![MachineType::any_tagged(); argument_count as usize];
        parameter_types.push(MachineType::pointer());
        parameter_types.push(MachineType::int32());
        parameter_types.push(MachineType::any_tagged());

        self.intern(CallDescriptor {
            kind: CallDescriptorKind::CodeObject,
            return_types: (0..entry.result_size).map(|_| MachineType::any_tagged()).collect(),
            parameter_types,
            register_parameter_count: 0,
            js_parameter_count: argument_count,
            properties,
            flags: flags | CallFlags::NEEDS_CONTEXT,
            debug_name: entry.name.to_owned(),
        })
    }

    /// Call a stub with `stack_parameter_count` extra stack arguments after
    /// its register parameters.
    pub fn stub_call_descriptor(
        &self,
        interface: &StubInterface,
        stack_parameter_count: u32,
        flags: CallFlags,
        properties: OpProperties,
        return_count: usize,
    ) -> DescriptorId {
        let register_count = interface.register_parameter_count;
        let total = register_count + stack_parameter_count + interface.has_context as u32;
        let mut flags = flags;
        flags.set(CallFlags::NEEDS_CONTEXT, interface.has_context);

        self.intern(CallDescriptor {
            kind: CallDescriptorKind::CodeObject,
            return_types: (0..return_count).map(|_| MachineType::any_tagged()).collect(),
            parameter_types: vec![MachineType::any_tagged(); total as usize],
            register_parameter_count: register_count,
            js_parameter_count: stack_parameter_count,
            properties,
            flags,
            debug_name: interface.name.to_owned(),
        })
    }

    /// Stub descriptor for a builtin with no extra stack arguments.
    pub fn builtin_call_descriptor(&self, builtin: Builtin, flags: CallFlags) -> DescriptorId {
        self.stub_call_descriptor(&builtin.interface(), 0, flags, OpProperties::empty(), 1)
    }

    /// Call a native C function with the given signature.
    pub fn c_call_descriptor(
        &self,
        return_type: Option<MachineType>,
        parameter_types: &[MachineType],
    ) -> DescriptorId {
        self.intern(CallDescriptor {
            kind: CallDescriptorKind::Address,
            return_types: return_type.into_iter().collect(),
            parameter_types: parameter_types.to_vec(),
            register_parameter_count: (parameter_types.len() as u32).min(C_REGISTER_PARAMETERS),
            js_parameter_count: 0,
            properties: OpProperties::empty(),
            flags: CallFlags::empty(),
            debug_name: "c-call".to_owned(),
        })
    }

    /// Call a JS function with `js_parameter_count` arguments, receiver
    /// included. Arguments go on the stack; new target, argument count and
    /// context follow in registers.
    pub fn js_call_descriptor(&self, js_parameter_count: u32, flags: CallFlags) -> DescriptorId {
        let mut parameter_types = vec![MachineType::any_tagged(); js_parameter_count as usize];
        parameter_types.push(MachineType::any_tagged());
        parameter_types.push(MachineType::int32());
        parameter_types.push(MachineType::any_tagged());

        self.intern(CallDescriptor {
            kind: CallDescriptorKind::JsFunction,
            return_types: SmallVec::from_slice(&[MachineType::any_tagged()]),
            parameter_types,
            register_parameter_count: 0,
            js_parameter_count,
            properties: OpProperties::empty(),
            flags: flags | CallFlags::NEEDS_CONTEXT | CallFlags::SUPPORTS_TAIL_CALLS,
            debug_name: "js-call".to_owned(),
        })
    }
}

impl Default for Linkage {
    fn default() -> Self {
        Self::new(RuntimeTable::default())
    }
}

impl fmt::Debug for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linkage")
            .field("descriptors", &self.len())
            .finish_non_exhaustive()
    }
}

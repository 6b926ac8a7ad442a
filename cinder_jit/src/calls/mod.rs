//! Call-stub and runtime invocation layer.
//!
//! Generated code calls three kinds of targets:
//!
//! - **Stubs**: independently compiled code objects, named by [`Builtin`]
//! - **Runtime routines**: generic slow paths, named by [`RuntimeFunctionId`]
//!   and always entered through the C-entry trampoline
//! - **C functions**: raw native addresses
//!
//! Every call site is described by an interned [`CallDescriptor`] owned by
//! the process-wide [`Linkage`] registry.

pub mod emit;
pub mod linkage;
pub mod runtime;

pub use emit::CallAssembler;
pub use linkage::{
    CallDescriptor, CallDescriptorKind, CallFlags, Linkage, LinkageLocation, StubInterface,
};
pub use runtime::{RuntimeFunction, RuntimeFunctionId, RuntimeTable};

use crate::heap::ElementsKind;
use crate::ir::operators::ScopeType;

/// Handle to an interned call descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(u32);

impl DescriptorId {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        DescriptorId(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Stub code objects generated code may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Trampoline into a runtime routine returning `result_size` values.
    CEntry { result_size: u8 },
    ArrayNoArgumentConstructor(ElementsKind),
    ArraySingleArgumentConstructor(ElementsKind),
    ArrayNArgumentsConstructor,
    FastNewSloppyArguments,
    FastNewStrictArguments,
    FastNewRestParameter,
    FastNewFunctionContext(ScopeType),
}

impl Builtin {
    /// Calling convention of this stub.
    pub fn interface(self) -> StubInterface {
        match self {
            Builtin::CEntry { .. } => StubInterface::new("CEntry", 0, false),
            Builtin::ArrayNoArgumentConstructor(_)
            | Builtin::ArraySingleArgumentConstructor(_)
            | Builtin::ArrayNArgumentsConstructor => {
                // function, allocation site, argument count
                StubInterface::new("ArrayConstructor", 3, true)
            }
            Builtin::FastNewSloppyArguments => StubInterface::new("FastNewSloppyArguments", 1, true),
            Builtin::FastNewStrictArguments => StubInterface::new("FastNewStrictArguments", 1, true),
            Builtin::FastNewRestParameter => StubInterface::new("FastNewRestParameter", 1, true),
            Builtin::FastNewFunctionContext(_) => {
                // closure, slot count
                StubInterface::new("FastNewFunctionContext", 2, true)
            }
        }
    }
}

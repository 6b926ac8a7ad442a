//! Runtime function table.
//!
//! Runtime routines are the generic slow paths of the VM. The compiler
//! only needs each routine's identity, argument count and result size; the
//! entry address is embedded through an external reference and resolved by
//! the C-entry trampoline.

use std::fmt;

/// Runtime routines generated code can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum RuntimeFunctionId {
    Abort,
    StackGuard,
    NewObject,
    NewArray,
    CreateIterResultObject,
    CreateKeyValueArray,
    CreateArrayLiteral,
    CreateObjectLiteral,
    CreateRegExpLiteral,
    CreateEmptyArrayLiteral,
    CreateEmptyObjectLiteral,
    NewFunctionContext,
    PushWithContext,
    PushCatchContext,
    PushBlockContext,
    CreateJSGeneratorObject,
}

impl RuntimeFunctionId {
    pub const ALL: [RuntimeFunctionId; 16] = [
        RuntimeFunctionId::Abort,
        RuntimeFunctionId::StackGuard,
        RuntimeFunctionId::NewObject,
        RuntimeFunctionId::NewArray,
        RuntimeFunctionId::CreateIterResultObject,
        RuntimeFunctionId::CreateKeyValueArray,
        RuntimeFunctionId::CreateArrayLiteral,
        RuntimeFunctionId::CreateObjectLiteral,
        RuntimeFunctionId::CreateRegExpLiteral,
        RuntimeFunctionId::CreateEmptyArrayLiteral,
        RuntimeFunctionId::CreateEmptyObjectLiteral,
        RuntimeFunctionId::NewFunctionContext,
        RuntimeFunctionId::PushWithContext,
        RuntimeFunctionId::PushCatchContext,
        RuntimeFunctionId::PushBlockContext,
        RuntimeFunctionId::CreateJSGeneratorObject,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RuntimeFunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime::{:?}", self)
    }
}

/// Static description of a runtime routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFunction {
    pub id: RuntimeFunctionId,
    pub name: &'static str,
    /// Declared argument count; `None` for variadic routines.
    pub nargs: Option<u32>,
    /// Number of values returned in registers.
    pub result_size: u8,
    /// Entry address handed to the C-entry trampoline.
    pub entry: u64,
}

/// `(name, nargs, result_size)` in `RuntimeFunctionId` order.
const DESCRIPTIONS: [(&str, Option<u32>, u8); 16] = [
    ("Abort", Some(1), 1),
    ("StackGuard", Some(0), 1),
    ("NewObject", Some(2), 1),
    ("NewArray", None, 1),
    ("CreateIterResultObject", Some(2), 1),
    ("CreateKeyValueArray", Some(2), 1),
    ("CreateArrayLiteral", Some(4), 1),
    ("CreateObjectLiteral", Some(4), 1),
    ("CreateRegExpLiteral", Some(4), 1),
    ("CreateEmptyArrayLiteral", Some(2), 1),
    ("CreateEmptyObjectLiteral", Some(0), 1),
    ("NewFunctionContext", Some(2), 1),
    ("PushWithContext", Some(3), 1),
    ("PushCatchContext", Some(4), 1),
    ("PushBlockContext", Some(2), 1),
    ("CreateJSGeneratorObject", Some(2), 1),
];

/// Stride between synthesized entry addresses.
const ENTRY_STRIDE: u64 = 0x40;

/// Lookup table from [`RuntimeFunctionId`] to [`RuntimeFunction`].
#[derive(Debug, Clone)]
pub struct RuntimeTable {
    functions: Vec<RuntimeFunction>,
}

impl RuntimeTable {
    /// Table whose entries are laid out from `entry_base`.
    pub fn new(entry_base: u64) -> Self {
        let functions = RuntimeFunctionId::ALL
            .iter()
            .zip(DESCRIPTIONS)
            .map(|(&id, (name, nargs, result_size))| RuntimeFunction {
                id,
                name,
                nargs,
                result_size,
                entry: entry_base + id.index() as u64 * ENTRY_STRIDE,
            })
            .collect();
        RuntimeTable { functions }
    }

    #[inline]
    pub fn lookup(&self, id: RuntimeFunctionId) -> &RuntimeFunction {
        &self.functions[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeFunction> {
        self.functions.iter()
    }
}

impl Default for RuntimeTable {
    fn default() -> Self {
        Self::new(0x1000)
    }
}

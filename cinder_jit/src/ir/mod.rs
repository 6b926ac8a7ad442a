//! Graph intermediate representation.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): typed indices and per-unit storage
//! - **Types** (`types.rs`): machine representations and the semantic lattice
//! - **Operators** (`operators.rs`): the operation catalog and input layouts
//! - **Node** (`node.rs`): one operation instance
//! - **Graph** (`graph.rs`): arena-owned nodes, use lists and rewriting

pub mod arena;
pub mod graph;
pub mod node;
pub mod operators;
pub mod types;

pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use graph::{EdgeKind, Graph, NodeSnapshot};
pub use node::{Node, NodeFlags, NodeId};
pub use operators::{
    CallOp, ControlOp, ElementAccess, ExternalReference, FieldAccess, InputLayout, MachineOp,
    OpProperties, Operator, PretenureFlag, StoreRepresentation, WriteBarrierKind,
};
pub use types::{MachineRepresentation, MachineType, Type, TypeBits};

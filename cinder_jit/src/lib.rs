//! Code assembler and allocation lowering for the Cinder JavaScript engine.
//!
//! Components:
//! - Sea-of-Nodes graph with typed nodes and explicit effect/control edges
//! - Structured code assembler for stubs (labels, variables, calls)
//! - Inline lowering of object, array, context and literal creation
//! - Generic lowering of leftover creations to stub and runtime calls
//! - Scheduling and a textual code generator behind a back-end trait
#![deny(unsafe_op_in_unsafe_fn)]
pub mod assembler;
pub mod calls;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod heap;
pub mod ir;
pub mod lowering;

pub use assembler::CodeAssembler;
pub use config::{AssemblerConfig, LoweringConfig};
pub use error::{CompileError, CompileResult};
pub use ir::{Graph, NodeId};
pub use lowering::lower_creations;

//! Scheduling and the code-generator seam.
//!
//! A finished graph is verified, scheduled into basic blocks and handed to
//! a [`CodeGenerator`]. Instruction selection, register allocation and
//! encoding live behind that trait; the crate ships a
//! [`ListingGenerator`] that renders the schedule as text.

pub mod listing;
pub mod schedule;

pub use listing::{CodeListing, ListingGenerator};
pub use schedule::{BasicBlock, BlockId, Schedule};

use crate::calls::CallDescriptor;
use crate::error::{CodegenError, CompileResult};
use crate::ir::Graph;

bitflags::bitflags! {
    /// Properties of the code object being generated.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CodeFlags: u8 {
        /// Code is a stub called through a descriptor, not a JS function.
        const STUB = 1 << 0;
        /// Keep `Comment` nodes in the output.
        const COMMENTS = 1 << 1;
        /// Code is embedded in the snapshot and may not refer to
        /// per-process constants.
        const EMBEDDED = 1 << 2;
    }
}

/// Everything a code generator receives for one code object.
#[derive(Debug, Clone, Copy)]
pub struct CodegenRequest<'a> {
    pub graph: &'a Graph,
    pub schedule: &'a Schedule,
    pub descriptor: &'a CallDescriptor,
    pub flags: CodeFlags,
    pub name: &'a str,
}

/// Back end that turns a scheduled graph into an artifact.
pub trait CodeGenerator {
    type Artifact;

    fn generate(&mut self, request: CodegenRequest<'_>) -> Result<Self::Artifact, CodegenError>;
}

/// Verify `graph`, schedule it and run `generator`.
pub fn compile<G: CodeGenerator>(
    graph: &Graph,
    descriptor: &CallDescriptor,
    generator: &mut G,
    name: &str,
    flags: CodeFlags,
) -> CompileResult<G::Artifact> {
    graph.verify()?;
    let schedule = Schedule::compute(graph)?;
    log::debug!(
        "{}: {} blocks, {} scheduled nodes",
        name,
        schedule.len(),
        schedule.node_count()
    );
    let artifact = generator.generate(CodegenRequest {
        graph,
        schedule: &schedule,
        descriptor,
        flags,
        name,
    })?;
    Ok(artifact)
}

//! Recoverable errors.
//!
//! Contract violations during graph construction are not errors in this
//! sense; they go through [`crate::diagnostics`]. The errors here describe
//! graphs or settings a later stage refuses to accept.

use thiserror::Error;

use crate::ir::NodeId;

/// Structural problem found by `Graph::verify`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("graph has {count} start nodes, expected exactly one")]
    StartCount { count: usize },

    #[error("node {node} input {index} refers to missing node {input}")]
    InvalidInput {
        node: NodeId,
        index: usize,
        input: NodeId,
    },

    #[error("live node {node} uses dead node {input}")]
    DeadInput { node: NodeId, input: NodeId },

    #[error("node {node} ({op}) has {actual} inputs, its layout expects {expected}")]
    InputCount {
        node: NodeId,
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("control node {node} ({op}) has no control use")]
    UnterminatedControl { node: NodeId, op: &'static str },
}

/// Failure while building a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("node {node} is reachable but has no control block")]
    Unplaced { node: NodeId },

    #[error("control node {node} ({op}) cannot start or continue a block")]
    UnexpectedControl { node: NodeId, op: &'static str },

    #[error("value cycle through node {node} without a phi")]
    Cycle { node: NodeId },
}

/// Failure reported by a code generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("operator {op} is not supported by this code generator")]
    Unsupported { op: &'static str },

    #[error("code object {name:?} exceeds {limit} instructions")]
    TooLarge { name: String, limit: usize },
}

/// Invalid configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{values} inline array values do not fit a {limit}-byte heap object")]
    InlineArrayTooLarge { values: u32, limit: u32 },

    #[error("element unroll limit exceeds the inline array value limit")]
    UnrollLimitAboveInlineLimit,
}

/// Any error on the way from a finished graph to generated code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("graph verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("scheduling failed: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("code generation failed: {0}")]
    Codegen(#[from] CodegenError),
}

/// Result alias for the compile pipeline.
pub type CompileResult<T> = Result<T, CompileError>;

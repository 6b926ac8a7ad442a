//! Contract-violation reporting.
//!
//! Builder misuse (double-binding a label, reading an unbound variable,
//! merging inconsistent values, wrong call arity) is a programming error in
//! the caller, not a recoverable condition. The assembler reports each one
//! as a [`Violation`] through an injected [`Diagnostics`] implementation:
//!
//! - [`ValidatingDiagnostics`]: log and abort (debug builds, tests)
//! - [`NoChecks`]: skip the checks entirely (release builds)
//! - [`RecordingDiagnostics`]: collect violations for inspection
//!
//! The consistency checks themselves are only run when
//! [`Diagnostics::enabled`] returns `true`, so a release build pays nothing
//! for them.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// A builder contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("variable {variable} read before it was bound")]
    UnboundVariable { variable: String },

    #[error("label {label} bound twice")]
    LabelBoundTwice { label: String },

    #[error("variable {variable} merged with inconsistent values at bound label {label}")]
    UnmergedVariable { label: String, variable: String },

    #[error(
        "variable {variable} at label {label} has {found} merged values but the label was \
         reached {expected} times"
    )]
    IncompleteMerge {
        label: String,
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("label {label} is already bound; only loop labels accept later edges")]
    BoundLabelReentered { label: String },

    #[error("call to {callee} passes {actual} arguments, descriptor declares {expected}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        actual: usize,
    },

    #[error("descriptor {callee} does not support tail calls")]
    TailCallUnsupported { callee: String },

    #[error("{operation} emitted with no current block")]
    NoCurrentBlock { operation: &'static str },

    #[error("call generation callbacks registered twice")]
    CallbacksAlreadyRegistered,

    #[error("code already generated for this assembler")]
    CodeAlreadyGenerated,

    #[error("inline allocation of {size} bytes exceeds {limit}")]
    AllocationTooLarge { size: u32, limit: u32 },
}

/// Capability for reporting contract violations.
pub trait Diagnostics: Send + Sync {
    /// Report a violation.
    fn report(&self, violation: Violation);

    /// Whether consistency checks should run at all.
    fn enabled(&self) -> bool;
}

// =============================================================================
// Implementations
// =============================================================================

/// Logs the violation and aborts compilation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatingDiagnostics;

impl Diagnostics for ValidatingDiagnostics {
    fn report(&self, violation: Violation) {
        log::error!("contract violation: {violation}");
        panic!("fatal: {violation}");
    }

    fn enabled(&self) -> bool {
        true
    }
}

/// Skips every check.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChecks;

impl Diagnostics for NoChecks {
    fn report(&self, _violation: Violation) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Collects violations instead of aborting.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnostics {
    violations: Arc<Mutex<Vec<Violation>>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Violations reported so far.
    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Remove and return the recorded violations.
    pub fn take(&self) -> Vec<Violation> {
        std::mem::take(&mut *self.violations.lock())
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, violation: Violation) {
        log::warn!("contract violation recorded: {violation}");
        self.violations.lock().push(violation);
    }

    fn enabled(&self) -> bool {
        true
    }
}

/// Validating in debug builds, no checks in release builds.
pub fn default_for_build() -> Arc<dyn Diagnostics> {
    if cfg!(debug_assertions) {
        Arc::new(ValidatingDiagnostics)
    } else {
        Arc::new(NoChecks)
    }
}

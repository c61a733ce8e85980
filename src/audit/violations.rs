//! Problems found when verifying an audit trail.

use thiserror::Error;

/// A way in which recorded executions disagree with the declared guards.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuditViolation {
    #[error("record {sequence}: transition '{transition}' is not defined")]
    UndefinedTransition { sequence: u64, transition: String },

    #[error("record {sequence}: '{transition}' is defined but was recorded as unknown")]
    MisrecordedUnknown { sequence: u64, transition: String },

    #[error("record {sequence}: guard '{found}' at position {position}, declared '{expected}'")]
    OutOfOrder {
        sequence: u64,
        position: usize,
        expected: String,
        found: String,
    },

    #[error("record {sequence}: guard '{guard}' evaluated beyond the declared list")]
    Undeclared { sequence: u64, guard: String },

    #[error("record {sequence}: mutation ran after {evaluated} of {declared} guards")]
    IncompleteEvaluation {
        sequence: u64,
        evaluated: usize,
        declared: usize,
    },

    #[error("record {sequence}: guard '{guard}' did not pass but evaluation continued")]
    ContinuedPastFailure { sequence: u64, guard: String },

    #[error("record {sequence}: rejection names '{named}' but the last evaluated guard is '{last}'")]
    RejectionMismatch {
        sequence: u64,
        named: String,
        last: String,
    },

    #[error("record {sequence}: rejecting guard '{guard}' passed")]
    RejectingGuardPassed { sequence: u64, guard: String },

    #[error("record {sequence} follows record {previous}")]
    SequenceRegression { previous: u64, sequence: u64 },

    #[error("record {sequence}: parent {parent} is not in the trail")]
    MissingParent { sequence: u64, parent: String },

    #[error("record {sequence}: depth limit recorded outside a nested call or after guards ran")]
    MisplacedDepthLimit { sequence: u64 },

    #[error("record {sequence}: marked rolled back but its parent was kept or it never applied")]
    MisplacedRollback { sequence: u64 },
}

impl AuditViolation {
    /// Sequence number of the offending record.
    pub fn sequence(&self) -> u64 {
        match self {
            AuditViolation::UndefinedTransition { sequence, .. }
            | AuditViolation::MisrecordedUnknown { sequence, .. }
            | AuditViolation::OutOfOrder { sequence, .. }
            | AuditViolation::Undeclared { sequence, .. }
            | AuditViolation::IncompleteEvaluation { sequence, .. }
            | AuditViolation::ContinuedPastFailure { sequence, .. }
            | AuditViolation::RejectionMismatch { sequence, .. }
            | AuditViolation::RejectingGuardPassed { sequence, .. }
            | AuditViolation::SequenceRegression { sequence, .. }
            | AuditViolation::MissingParent { sequence, .. }
            | AuditViolation::MisplacedDepthLimit { sequence }
            | AuditViolation::MisplacedRollback { sequence } => *sequence,
        }
    }
}

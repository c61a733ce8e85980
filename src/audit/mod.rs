//! Audit trail of execution attempts.
//!
//! Every call to `execute`, and every transition a mutation invokes, leaves
//! an [`ExecutionRecord`] naming the guards evaluated, their verdicts, and
//! whether the mutation ran. Records can be queried with an
//! [`ExecutionFilter`], streamed to an [`AuditSink`], and checked against an
//! engine manifest with [`verify_trail`].

mod record;
mod sink;
mod trail;
mod verify;
mod violations;

pub use crate::core::LeafEvaluation;
pub use record::{ExecutionRecord, GuardOutcome, OutcomeKind, RecordedOutcome};
pub use sink::{AuditSink, JsonLinesSink};
pub use trail::{AuditTrail, ExecutionFilter};
pub use verify::verify_trail;
pub use violations::AuditViolation;

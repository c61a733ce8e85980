//! Execution records.
//!
//! One record is written per execution attempt, whatever its outcome. A
//! record is complete when it is published and is never changed afterwards.

use crate::core::{Args, Evaluation, LeafEvaluation, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Result of one transition-level guard, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardOutcome {
    /// Name the guard is reported under.
    pub guard: String,
    /// Index in the transition's declared guard list.
    pub position: usize,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    /// Leaf predicates visited while evaluating this guard.
    pub trace: Vec<LeafEvaluation>,
}

impl GuardOutcome {
    pub(crate) fn from_evaluation(guard: String, position: usize, evaluation: Evaluation) -> Self {
        Self {
            guard,
            position,
            verdict: evaluation.verdict(),
            fault: evaluation.result.err().map(|e| e.to_string()),
            trace: evaluation.trace,
        }
    }
}

/// Coarse outcome category, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Applied,
    Rejected,
    MutationFailed,
    Abandoned,
    DepthExceeded,
    UnknownTransition,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Applied => "applied",
            OutcomeKind::Rejected => "rejected",
            OutcomeKind::MutationFailed => "mutation_failed",
            OutcomeKind::Abandoned => "abandoned",
            OutcomeKind::DepthExceeded => "depth_exceeded",
            OutcomeKind::UnknownTransition => "unknown_transition",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of an execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordedOutcome {
    /// Every guard passed and the mutation was committed.
    Applied,
    /// Guard at `position` failed or faulted; the mutation never ran.
    Rejected { guard: String, position: usize },
    /// Every guard passed but the mutation returned an error.
    MutationFailed { error: String },
    /// Guard evaluation ran past its budget; the mutation never ran.
    Abandoned { elapsed: Duration },
    /// A nested call past the nesting limit; no guard was evaluated.
    DepthExceeded { limit: usize },
    /// No transition by that name.
    UnknownTransition,
}

impl RecordedOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RecordedOutcome::Applied => OutcomeKind::Applied,
            RecordedOutcome::Rejected { .. } => OutcomeKind::Rejected,
            RecordedOutcome::MutationFailed { .. } => OutcomeKind::MutationFailed,
            RecordedOutcome::Abandoned { .. } => OutcomeKind::Abandoned,
            RecordedOutcome::DepthExceeded { .. } => OutcomeKind::DepthExceeded,
            RecordedOutcome::UnknownTransition => OutcomeKind::UnknownTransition,
        }
    }

    /// Whether the mutation function was entered.
    pub fn mutation_ran(&self) -> bool {
        matches!(
            self,
            RecordedOutcome::Applied | RecordedOutcome::MutationFailed { .. }
        )
    }
}

/// Immutable audit entry for one execution attempt.
///
/// Records for transitions invoked from inside another transition's
/// mutation carry the outer record's id in `parent`, and are published
/// before it. A nested `Applied` record whose enclosing mutation failed
/// under copy-on-write isolation is marked `rolled_back`: its guards
/// passed and its mutation ran, but the draft holding its effects was
/// dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    /// Position in the trail; strictly increasing in commit order.
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    pub transition: String,
    /// `None` when argument recording is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,
    pub guards: Vec<GuardOutcome>,
    pub outcome: RecordedOutcome,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rolled_back: bool,
    /// When the attempt started.
    pub timestamp: DateTime<Utc>,
    pub elapsed: Duration,
}

impl ExecutionRecord {
    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, RecordedOutcome::Applied)
    }

    /// Whether this attempt's effects are part of engine state.
    ///
    /// True for `Applied` records that were not rolled back with an
    /// enclosing mutation.
    pub fn is_committed(&self) -> bool {
        self.is_applied() && !self.rolled_back
    }

    /// Name of the guard that rejected this attempt, if any.
    pub fn rejected_by(&self) -> Option<&str> {
        match &self.outcome {
            RecordedOutcome::Rejected { guard, .. } => Some(guard.as_str()),
            _ => None,
        }
    }

    /// Names of the transition-level guards evaluated, in order.
    pub fn evaluated_guards(&self) -> impl Iterator<Item = &str> {
        self.guards.iter().map(|g| g.guard.as_str())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

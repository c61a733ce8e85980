//! Offline verification of an audit trail against an engine manifest.
//!
//! Verification does not stop at the first problem: every record is checked
//! and all violations are returned together.

use super::record::{ExecutionRecord, GuardOutcome, RecordedOutcome};
use super::violations::AuditViolation;
use crate::engine::{EngineManifest, TransitionManifest};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<AuditViolation>>;

/// Check a complete trail against the transitions it was produced by.
///
/// Verified properties:
/// - sequence numbers strictly increase
/// - every nested record's parent is present
/// - a rolled-back record was applied inside a parent that was not kept
/// - a depth-limit record belongs to a nested call and evaluated no guards
/// - every record names a defined transition, or is recorded as unknown
/// - guards were evaluated in declared order, as a prefix of the list
/// - a mutation ran only after every declared guard passed
/// - a rejection stopped at the guard it names, which did not pass, and
///   every guard before it passed
pub fn verify_trail(records: &[ExecutionRecord], manifest: &EngineManifest) -> Check {
    let mut checks: Vec<Check> = Vec::new();

    for pair in records.windows(2) {
        checks.push(check_sequence(&pair[0], &pair[1]));
    }

    for record in records {
        checks.push(check_parent(record, records));
        checks.push(check_rollback(record, records));
        checks.push(check_record(record, manifest));
    }

    Validation::all_vec(checks).map(|_| ())
}

fn fail(violation: AuditViolation) -> Check {
    Validation::fail(violation)
}

fn pass() -> Check {
    Validation::success(())
}

fn check_sequence(previous: &ExecutionRecord, record: &ExecutionRecord) -> Check {
    if record.sequence > previous.sequence {
        pass()
    } else {
        fail(AuditViolation::SequenceRegression {
            previous: previous.sequence,
            sequence: record.sequence,
        })
    }
}

fn check_parent(record: &ExecutionRecord, records: &[ExecutionRecord]) -> Check {
    match record.parent {
        Some(parent) if !records.iter().any(|r| r.id == parent) => {
            fail(AuditViolation::MissingParent {
                sequence: record.sequence,
                parent: parent.to_string(),
            })
        }
        _ => pass(),
    }
}

/// A rolled-back record is a nested `Applied` record under a parent whose
/// own effects were not kept.
fn check_rollback(record: &ExecutionRecord, records: &[ExecutionRecord]) -> Check {
    if !record.rolled_back {
        return pass();
    }
    let parent = record
        .parent
        .and_then(|parent| records.iter().find(|r| r.id == parent));
    match parent {
        Some(parent) if record.is_applied() && !parent.is_committed() => pass(),
        _ => fail(AuditViolation::MisplacedRollback {
            sequence: record.sequence,
        }),
    }
}

fn check_record(record: &ExecutionRecord, manifest: &EngineManifest) -> Check {
    let sequence = record.sequence;
    let Some(declared) = manifest.transition(&record.transition) else {
        return match record.outcome {
            RecordedOutcome::UnknownTransition => pass(),
            _ => fail(AuditViolation::UndefinedTransition {
                sequence,
                transition: record.transition.clone(),
            }),
        };
    };

    let mut checks = vec![check_order(record, declared)];

    match &record.outcome {
        RecordedOutcome::UnknownTransition => {
            checks.push(fail(AuditViolation::MisrecordedUnknown {
                sequence,
                transition: record.transition.clone(),
            }));
        }
        RecordedOutcome::Applied | RecordedOutcome::MutationFailed { .. } => {
            if record.guards.len() != declared.guards.len() {
                checks.push(fail(AuditViolation::IncompleteEvaluation {
                    sequence,
                    evaluated: record.guards.len(),
                    declared: declared.guards.len(),
                }));
            }
            checks.push(all_passed(sequence, &record.guards));
        }
        RecordedOutcome::Abandoned { .. } => {
            checks.push(all_passed(sequence, &record.guards));
        }
        RecordedOutcome::DepthExceeded { .. } => {
            if record.parent.is_none() || !record.guards.is_empty() {
                checks.push(fail(AuditViolation::MisplacedDepthLimit { sequence }));
            }
        }
        RecordedOutcome::Rejected { guard, position } => {
            checks.push(check_rejection(sequence, &record.guards, guard, *position));
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

fn check_order(record: &ExecutionRecord, declared: &TransitionManifest) -> Check {
    let checks = record
        .guards
        .iter()
        .enumerate()
        .map(|(position, outcome)| match declared.guards.get(position) {
            None => fail(AuditViolation::Undeclared {
                sequence: record.sequence,
                guard: outcome.guard.clone(),
            }),
            Some(expected) if expected.name != outcome.guard || outcome.position != position => {
                fail(AuditViolation::OutOfOrder {
                    sequence: record.sequence,
                    position,
                    expected: expected.name.clone(),
                    found: outcome.guard.clone(),
                })
            }
            Some(_) => pass(),
        })
        .collect();

    Validation::all_vec(checks).map(|_| ())
}

fn all_passed(sequence: u64, guards: &[GuardOutcome]) -> Check {
    let checks = guards
        .iter()
        .map(|outcome| {
            if outcome.verdict.passed() {
                pass()
            } else {
                fail(AuditViolation::ContinuedPastFailure {
                    sequence,
                    guard: outcome.guard.clone(),
                })
            }
        })
        .collect();

    Validation::all_vec(checks).map(|_| ())
}

fn check_rejection(sequence: u64, guards: &[GuardOutcome], named: &str, position: usize) -> Check {
    let Some((last, earlier)) = guards.split_last() else {
        return fail(AuditViolation::RejectionMismatch {
            sequence,
            named: named.to_string(),
            last: String::new(),
        });
    };

    let mut checks = vec![all_passed(sequence, earlier)];
    if last.guard != named || last.position != position {
        checks.push(fail(AuditViolation::RejectionMismatch {
            sequence,
            named: named.to_string(),
            last: last.guard.clone(),
        }));
    }
    if last.verdict.passed() {
        checks.push(fail(AuditViolation::RejectingGuardPassed {
            sequence,
            guard: last.guard.clone(),
        }));
    }

    Validation::all_vec(checks).map(|_| ())
}

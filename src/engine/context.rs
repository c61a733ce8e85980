//! Execution plumbing shared by top-level and nested transitions.

use super::transition::{MutationError, Outcome, Rejection, Transition};
use crate::audit::{ExecutionRecord, GuardOutcome, RecordedOutcome};
use crate::config::{EngineConfig, Isolation};
use crate::core::{panic_message, Args, State, StateView};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Transitions and settings visible to a running mutation.
pub(crate) struct Scope<'a, S> {
    pub(crate) transitions: &'a BTreeMap<String, Transition<S>>,
    pub(crate) config: &'a EngineConfig,
}

impl<S> Clone for Scope<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Scope<'_, S> {}

/// Mutable state handle passed to a mutation function.
///
/// Dereferences to the state. The handle is only valid for the duration of
/// the call; it cannot be stored.
///
/// A mutation may run other transitions through [`require`](Self::require)
/// and [`attempt`](Self::attempt). Their guards see the state as this
/// mutation has left it so far, and their effects become part of this
/// mutation's effects.
pub struct MutationContext<'a, S> {
    state: &'a mut S,
    scope: Scope<'a, S>,
    depth: usize,
    record_id: Uuid,
    nested: &'a mut Vec<ExecutionRecord>,
}

impl<S> Deref for MutationContext<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.state
    }
}

impl<S> DerefMut for MutationContext<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.state
    }
}

impl<S: State> MutationContext<'_, S> {
    pub fn state(&self) -> &S {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        self.state
    }

    /// Number of enclosing nested invocations. Zero for a mutation started
    /// by `Engine::execute`.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Id of the execution record this mutation will be logged under.
    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    /// Run a nested transition that must apply.
    ///
    /// A rejection becomes [`MutationError::NestedRejected`]; propagate it
    /// with `?` to fail the enclosing transition.
    pub fn require(&mut self, name: &str, args: Args) -> Result<Value, MutationError> {
        match self.invoke(name, args)? {
            Outcome::Applied(value) => Ok(value),
            Outcome::Rejected(rejection) => Err(MutationError::NestedRejected {
                transition: rejection.transition,
                guard: rejection.guard,
            }),
        }
    }

    /// Run a nested transition whose rejection is acceptable.
    ///
    /// A rejection leaves state as it was and is returned as an ordinary
    /// [`Outcome`], so the enclosing mutation can carry on.
    pub fn attempt(&mut self, name: &str, args: Args) -> Result<Outcome, MutationError> {
        self.invoke(name, args)
    }

    fn invoke(&mut self, name: &str, args: Args) -> Result<Outcome, MutationError> {
        let scope = self.scope;
        let attempt = Attempt::start(name, &args, Some(self.record_id), scope.config);

        let Some(transition) = scope.transitions.get(name) else {
            warn!(transition = name, parent = %self.record_id, "unknown nested transition");
            self.nested
                .push(attempt.finish(Vec::new(), RecordedOutcome::UnknownTransition));
            return Err(MutationError::UnknownNested {
                name: name.to_string(),
            });
        };

        let depth = self.depth + 1;
        let limit = scope.config.max_nesting_depth;
        if depth > limit {
            warn!(transition = name, parent = %self.record_id, depth, limit, "nesting too deep");
            self.nested
                .push(attempt.finish(Vec::new(), RecordedOutcome::DepthExceeded { limit }));
            return Err(MutationError::NestingTooDeep {
                transition: name.to_string(),
                limit,
            });
        }

        let phase = evaluate_guards(
            transition,
            &*self.state,
            &args,
            scope.config.guard_timeout,
            Instant::now(),
        );
        match phase.decision {
            Decision::Rejected(rejection) => {
                debug!(
                    transition = name,
                    guard = %rejection.guard,
                    position = rejection.position,
                    depth,
                    "nested transition rejected"
                );
                let recorded = RecordedOutcome::Rejected {
                    guard: rejection.guard.clone(),
                    position: rejection.position,
                };
                self.nested.push(attempt.finish(phase.outcomes, recorded));
                Ok(Outcome::Rejected(rejection))
            }
            Decision::Abandoned { elapsed, .. } => {
                self.nested
                    .push(attempt.finish(phase.outcomes, RecordedOutcome::Abandoned { elapsed }));
                Err(MutationError::NestedAbandoned {
                    transition: name.to_string(),
                    elapsed,
                })
            }
            Decision::Proceed => {
                let result = apply(
                    scope,
                    transition,
                    &mut *self.state,
                    &args,
                    attempt.id,
                    depth,
                    &mut *self.nested,
                );
                let recorded = match &result {
                    Ok(_) => RecordedOutcome::Applied,
                    Err(error) => RecordedOutcome::MutationFailed {
                        error: error.to_string(),
                    },
                };
                self.nested.push(attempt.finish(phase.outcomes, recorded));

                result
                    .map(Outcome::Applied)
                    .map_err(|source| MutationError::Nested {
                        transition: name.to_string(),
                        source: Box::new(source),
                    })
            }
        }
    }
}

/// An execution attempt in progress, finished into an [`ExecutionRecord`].
pub(crate) struct Attempt {
    pub(crate) id: Uuid,
    parent: Option<Uuid>,
    transition: String,
    args: Option<Args>,
    timestamp: DateTime<Utc>,
    started: Instant,
}

impl Attempt {
    pub(crate) fn start(
        transition: &str,
        args: &Args,
        parent: Option<Uuid>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent,
            transition: transition.to_string(),
            args: config.record_arguments.then(|| args.clone()),
            timestamp: Utc::now(),
            started: Instant::now(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The record's sequence number is assigned when it is appended.
    pub(crate) fn finish(self, guards: Vec<GuardOutcome>, outcome: RecordedOutcome) -> ExecutionRecord {
        let elapsed = self.elapsed();
        ExecutionRecord {
            id: self.id,
            sequence: 0,
            parent: self.parent,
            transition: self.transition,
            args: self.args,
            guards,
            outcome,
            rolled_back: false,
            timestamp: self.timestamp,
            elapsed,
        }
    }
}

pub(crate) enum Decision {
    Proceed,
    Rejected(Rejection),
    Abandoned { elapsed: Duration, budget: Duration },
}

/// Guard outcomes in evaluation order, and what to do next.
pub(crate) struct GuardPhase {
    pub(crate) outcomes: Vec<GuardOutcome>,
    pub(crate) decision: Decision,
}

/// Evaluate a transition's guards in declared order.
///
/// Stops at the first guard that fails or faults. With a budget, the time
/// since `started` is checked after every passing guard. Callers take
/// `started` once the state lock is held, so lock waiting is not charged.
pub(crate) fn evaluate_guards<S>(
    transition: &Transition<S>,
    state: &S,
    args: &Args,
    budget: Option<Duration>,
    started: Instant,
) -> GuardPhase {
    let view = StateView::new(state);
    let mut outcomes = Vec::with_capacity(transition.guards.len());

    for (position, guard) in transition.guards.iter().enumerate() {
        let name = guard.name();
        let evaluation = guard.evaluate(&view, args);
        debug!(
            transition = %transition.name,
            guard = %name,
            position,
            verdict = %evaluation.verdict(),
            "guard evaluated"
        );

        let passed = evaluation.passed();
        let fault = evaluation.result.as_ref().err().cloned();
        if let Some(fault) = &fault {
            warn!(transition = %transition.name, guard = %name, %fault, "guard faulted");
        }
        outcomes.push(GuardOutcome::from_evaluation(name.clone(), position, evaluation));

        if !passed {
            return GuardPhase {
                outcomes,
                decision: Decision::Rejected(Rejection {
                    transition: transition.name.clone(),
                    guard: name,
                    position,
                    fault,
                }),
            };
        }

        if let Some(budget) = budget {
            let elapsed = started.elapsed();
            if elapsed > budget {
                return GuardPhase {
                    outcomes,
                    decision: Decision::Abandoned { elapsed, budget },
                };
            }
        }
    }

    GuardPhase {
        outcomes,
        decision: Decision::Proceed,
    }
}

/// Run a transition's mutation under the configured isolation.
///
/// Panics are caught and reported as [`MutationError::Panicked`].
pub(crate) fn apply<S: State>(
    scope: Scope<'_, S>,
    transition: &Transition<S>,
    state: &mut S,
    args: &Args,
    record_id: Uuid,
    depth: usize,
    nested: &mut Vec<ExecutionRecord>,
) -> Result<Value, MutationError> {
    match scope.config.isolation {
        Isolation::CopyOnWrite => {
            let mut draft = state.clone();
            let first_nested = nested.len();
            match run_mutation(scope, transition, &mut draft, args, record_id, depth, nested) {
                Ok(value) => {
                    *state = draft;
                    Ok(value)
                }
                Err(error) => {
                    roll_back(&mut nested[first_nested..]);
                    Err(error)
                }
            }
        }
        Isolation::InPlace => run_mutation(scope, transition, state, args, record_id, depth, nested),
    }
}

/// Mark nested records whose effects lived only in a dropped draft.
fn roll_back(records: &mut [ExecutionRecord]) {
    for record in records.iter_mut().filter(|r| r.is_applied()) {
        record.rolled_back = true;
    }
}

fn run_mutation<S: State>(
    scope: Scope<'_, S>,
    transition: &Transition<S>,
    state: &mut S,
    args: &Args,
    record_id: Uuid,
    depth: usize,
    nested: &mut Vec<ExecutionRecord>,
) -> Result<Value, MutationError> {
    let mut context = MutationContext {
        state,
        scope,
        depth,
        record_id,
        nested,
    };

    panic::catch_unwind(AssertUnwindSafe(|| (transition.mutation)(&mut context, args)))
        .unwrap_or_else(|payload| {
            Err(MutationError::Panicked {
                transition: transition.name.clone(),
                message: panic_message(payload.as_ref()),
            })
        })
}

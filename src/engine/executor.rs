//! The transition executor.

use super::context::{apply, evaluate_guards, Attempt, Decision, Scope};
use super::manifest::EngineManifest;
use super::transition::{ExecuteError, Outcome, Rejection, Transition};
use crate::audit::{
    verify_trail, AuditSink, AuditTrail, AuditViolation, ExecutionFilter, ExecutionRecord,
    GuardOutcome, RecordedOutcome,
};
use crate::builder::EngineBuilder;
use crate::config::EngineConfig;
use crate::core::{Args, State};
use crate::registry::GuardRegistry;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::{debug, debug_span, info, warn};

/// Result of a dry-run guard check.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckReport {
    pub transition: String,
    /// Guard outcomes in evaluation order, up to the first failure.
    pub guards: Vec<GuardOutcome>,
    pub rejection: Option<Rejection>,
}

impl CheckReport {
    /// Whether `execute` with the same arguments would run the mutation
    /// against the state the check saw.
    pub fn would_apply(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Owns state and runs guarded transitions against it.
///
/// Guards and transitions are fixed when the engine is built. `Engine` is
/// `Send + Sync`; share it with `Arc`.
///
/// # Example
///
/// ```rust
/// use warrant::builder::{EngineBuilder, TransitionBuilder};
/// use warrant::core::{Args, Guard, KeyValueState};
/// use serde_json::Value;
///
/// type Ledger = KeyValueState<String, u64>;
///
/// let mut builder = EngineBuilder::new(Ledger::new().with("alice".to_string(), 30));
/// builder
///     .register_guard(
///         "atLeast",
///         Guard::<Ledger>::try_new("atLeast", |ledger, args| {
///             let from: String = args.get("from")?;
///             let amount: u64 = args.get("amount")?;
///             Ok(ledger.get_or_default(&from) >= amount)
///         }),
///     )
///     .unwrap();
/// builder
///     .define(
///         TransitionBuilder::<Ledger>::new("withdraw")
///             .require("atLeast")
///             .mutate(|ledger, args| {
///                 let from: String = args.get("from")?;
///                 let amount: u64 = args.get("amount")?;
///                 ledger.update(from, |balance| *balance -= amount);
///                 Ok(Value::Null)
///             }),
///     )
///     .unwrap();
/// let engine = builder.build();
///
/// let args = Args::new().with("from", "alice").with("amount", 50);
/// let outcome = engine.execute("withdraw", args).unwrap();
///
/// assert_eq!(outcome.rejection().map(|r| r.guard.as_str()), Some("atLeast"));
/// assert_eq!(engine.read(|ledger| ledger.get_or_default("alice")), 30);
/// ```
pub struct Engine<S: State> {
    state: RwLock<S>,
    transitions: BTreeMap<String, Transition<S>>,
    guards: GuardRegistry<S>,
    config: EngineConfig,
    trail: AuditTrail,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl<S: State> Engine<S> {
    pub fn builder(initial: S) -> EngineBuilder<S> {
        EngineBuilder::new(initial)
    }

    pub(crate) fn new(
        initial: S,
        guards: GuardRegistry<S>,
        transitions: BTreeMap<String, Transition<S>>,
        config: EngineConfig,
        sinks: Vec<Arc<dyn AuditSink>>,
    ) -> Self {
        Self {
            state: RwLock::new(initial),
            transitions,
            guards,
            config,
            trail: AuditTrail::new(),
            sinks,
        }
    }

    /// Run `name` with `args`.
    ///
    /// Guards are evaluated in declared order against one consistent view
    /// of state. The mutation runs only if every guard passed, under
    /// exclusive access. Exactly one top-level record is appended per call,
    /// whatever the result.
    pub fn execute(&self, name: &str, args: Args) -> Result<Outcome, ExecuteError> {
        let span = debug_span!("execute", transition = name);
        let _entered = span.enter();

        let attempt = Attempt::start(name, &args, None, &self.config);
        let Some(transition) = self.transitions.get(name) else {
            warn!(transition = name, "unknown transition");
            let record = self
                .trail
                .append(attempt.finish(Vec::new(), RecordedOutcome::UnknownTransition));
            self.publish(&[record]);
            return Err(ExecuteError::UnknownTransition {
                name: name.to_string(),
            });
        };

        let state = self.state.upgradable_read();
        let phase = evaluate_guards(
            transition,
            &*state,
            &args,
            self.config.guard_timeout,
            Instant::now(),
        );

        let (result, published) = match phase.decision {
            Decision::Rejected(rejection) => {
                debug!(
                    guard = %rejection.guard,
                    position = rejection.position,
                    "transition rejected"
                );
                let recorded = RecordedOutcome::Rejected {
                    guard: rejection.guard.clone(),
                    position: rejection.position,
                };
                let record = self.trail.append(attempt.finish(phase.outcomes, recorded));
                drop(state);
                (Ok(Outcome::Rejected(rejection)), vec![record])
            }
            Decision::Abandoned { elapsed, budget } => {
                warn!(?elapsed, ?budget, "guard evaluation abandoned");
                let recorded = RecordedOutcome::Abandoned { elapsed };
                let record = self.trail.append(attempt.finish(phase.outcomes, recorded));
                drop(state);
                let error = ExecuteError::Abandoned {
                    transition: name.to_string(),
                    elapsed,
                    budget,
                };
                (Err(error), vec![record])
            }
            Decision::Proceed => {
                let mut state = RwLockUpgradableReadGuard::upgrade(state);
                let scope = Scope {
                    transitions: &self.transitions,
                    config: &self.config,
                };
                let mut records = Vec::new();
                let result = apply(
                    scope,
                    transition,
                    &mut *state,
                    &args,
                    attempt.id,
                    0,
                    &mut records,
                );

                let recorded = match &result {
                    Ok(_) => RecordedOutcome::Applied,
                    Err(error) => RecordedOutcome::MutationFailed {
                        error: error.to_string(),
                    },
                };
                records.push(attempt.finish(phase.outcomes, recorded));
                let published = self.trail.extend(records);
                drop(state);

                let result = match result {
                    Ok(value) => {
                        info!(nested = published.len() - 1, "transition applied");
                        Ok(Outcome::Applied(value))
                    }
                    Err(source) => {
                        warn!(error = %source, "mutation failed");
                        Err(ExecuteError::Mutation {
                            transition: name.to_string(),
                            source,
                        })
                    }
                };
                (result, published)
            }
        };

        self.publish(&published);
        result
    }

    /// Evaluate `name`'s guards without running the mutation or recording
    /// anything.
    ///
    /// Runs under a shared lock, so it never waits for guard evaluation in
    /// progress elsewhere. The report may be stale by the time it is read.
    pub fn check(&self, name: &str, args: &Args) -> Result<CheckReport, ExecuteError> {
        let transition = self
            .transitions
            .get(name)
            .ok_or_else(|| ExecuteError::UnknownTransition {
                name: name.to_string(),
            })?;

        let state = self.state.read();
        let phase = evaluate_guards(transition, &*state, args, None, Instant::now());
        drop(state);

        let rejection = match phase.decision {
            Decision::Rejected(rejection) => Some(rejection),
            Decision::Proceed | Decision::Abandoned { .. } => None,
        };
        Ok(CheckReport {
            transition: name.to_string(),
            guards: phase.outcomes,
            rejection,
        })
    }

    /// Run `f` against current state under a shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.read())
    }

    /// Clone of current state.
    pub fn snapshot(&self) -> S {
        self.state.read().clone()
    }

    pub fn list_executions(&self, filter: &ExecutionFilter) -> Vec<ExecutionRecord> {
        self.trail.list(filter)
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.trail
    }

    pub fn transition(&self, name: &str) -> Option<&Transition<S>> {
        self.transitions.get(name)
    }

    pub fn transition_names(&self) -> impl Iterator<Item = &str> {
        self.transitions.keys().map(String::as_str)
    }

    pub fn guards(&self) -> &GuardRegistry<S> {
        &self.guards
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manifest(&self) -> EngineManifest {
        EngineManifest {
            guards: self.guards.describe(),
            transitions: self
                .transitions
                .iter()
                .map(|(name, transition)| (name.clone(), transition.manifest()))
                .collect(),
        }
    }

    /// Verify this engine's own trail against its manifest.
    pub fn verify_audit(&self) -> Validation<(), NonEmptyVec<AuditViolation>> {
        verify_trail(&self.trail.records(), &self.manifest())
    }

    fn publish(&self, records: &[ExecutionRecord]) {
        for sink in &self.sinks {
            for record in records {
                if let Err(error) = sink.append(record) {
                    warn!(%error, sequence = record.sequence, "audit sink append failed");
                }
            }
            if let Err(error) = sink.flush() {
                warn!(%error, "audit sink flush failed");
            }
        }
    }
}

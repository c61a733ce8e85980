//! Transition definitions, outcomes, and execution errors.

use super::context::MutationContext;
use super::manifest::{DeclaredGuard, TransitionManifest};
use crate::core::{ArgError, Args, Guard, GuardError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result of an `execute` call that reached a decision.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// All guards passed and the mutation was committed. Carries the
    /// mutation's return value.
    Applied(Value),

    /// A guard did not pass. State is unchanged.
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Which guard stopped a transition, and why.
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub transition: String,
    /// Name of the failing guard.
    pub guard: String,
    /// Index of the failing guard in the transition's guard list.
    pub position: usize,
    /// Present when the guard faulted rather than returning `false`.
    pub fault: Option<GuardError>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' rejected by guard '{}' at position {}",
            self.transition, self.guard, self.position
        )?;
        if let Some(fault) = &self.fault {
            write!(f, " ({fault})")?;
        }
        Ok(())
    }
}

/// Errors raised by mutation functions.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Argument(#[from] ArgError),

    #[error("{0}")]
    Failed(String),

    #[error("mutation of '{transition}' panicked: {message}")]
    Panicked { transition: String, message: String },

    #[error("nested transition '{transition}' rejected by guard '{guard}'")]
    NestedRejected { transition: String, guard: String },

    #[error("nested transition '{name}' is not defined")]
    UnknownNested { name: String },

    #[error("nested transition '{transition}' failed: {source}")]
    Nested {
        transition: String,
        #[source]
        source: Box<MutationError>,
    },

    #[error("nesting depth {limit} exceeded invoking '{transition}'")]
    NestingTooDeep { transition: String, limit: usize },

    #[error("guard evaluation for nested transition '{transition}' abandoned after {elapsed:?}")]
    NestedAbandoned {
        transition: String,
        elapsed: Duration,
    },
}

impl MutationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors returned by [`Engine::execute`](crate::engine::Engine::execute).
///
/// A guard rejecting the call is not an error; see [`Outcome::Rejected`].
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("transition '{name}' is not defined")]
    UnknownTransition { name: String },

    #[error("transition '{transition}' failed: {source}")]
    Mutation {
        transition: String,
        #[source]
        source: MutationError,
    },

    #[error("guard evaluation for '{transition}' abandoned after {elapsed:?} (budget {budget:?})")]
    Abandoned {
        transition: String,
        elapsed: Duration,
        budget: Duration,
    },
}

/// Mutation function type.
///
/// Receives the state handle for the duration of the call and the call's
/// arguments. Authorization logic belongs in guards, not here.
pub type Mutation<S> =
    Arc<dyn Fn(&mut MutationContext<'_, S>, &Args) -> Result<Value, MutationError> + Send + Sync>;

/// A named mutation gated by an ordered list of guards.
///
/// Every guard must pass, in declared order, before the mutation runs.
pub struct Transition<S> {
    pub(crate) name: String,
    pub(crate) doc: Option<String>,
    pub(crate) guards: Vec<Guard<S>>,
    pub(crate) mutation: Mutation<S>,
}

impl<S> Clone for Transition<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            doc: self.doc.clone(),
            guards: self.guards.clone(),
            mutation: Arc::clone(&self.mutation),
        }
    }
}

impl<S> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("guards", &self.guards)
            .finish_non_exhaustive()
    }
}

impl<S> Transition<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn guards(&self) -> &[Guard<S>] {
        &self.guards
    }

    /// Unconditional transitions have no guards.
    pub fn is_unconditional(&self) -> bool {
        self.guards.is_empty()
    }

    pub(crate) fn manifest(&self) -> TransitionManifest {
        TransitionManifest {
            doc: self.doc.clone(),
            guards: self
                .guards
                .iter()
                .map(|guard| DeclaredGuard {
                    name: guard.name(),
                    description: guard.describe(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        let applied = Outcome::Applied(Value::from(3));
        assert!(applied.is_applied());
        assert_eq!(applied.value(), Some(&Value::from(3)));
        assert!(applied.rejection().is_none());

        let rejected = Outcome::Rejected(Rejection {
            transition: "transfer".to_string(),
            guard: "atLeast".to_string(),
            position: 0,
            fault: None,
        });
        assert!(rejected.is_rejected());
        assert_eq!(rejected.rejection().unwrap().guard, "atLeast");
    }

    #[test]
    fn rejection_display_includes_fault() {
        let rejection = Rejection {
            transition: "transfer".to_string(),
            guard: "atLeast".to_string(),
            position: 1,
            fault: Some(GuardError::Argument(ArgError::Missing {
                name: "amount".to_string(),
            })),
        };

        assert_eq!(
            rejection.to_string(),
            "'transfer' rejected by guard 'atLeast' at position 1 (missing argument 'amount')"
        );
    }

    #[test]
    fn nested_error_keeps_source() {
        use std::error::Error as _;

        let error = MutationError::Nested {
            transition: "clearVote".to_string(),
            source: Box::new(MutationError::failed("ledger closed")),
        };

        assert_eq!(
            error.to_string(),
            "nested transition 'clearVote' failed: ledger closed"
        );
        assert!(error.source().is_some());
    }
}

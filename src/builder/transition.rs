//! Builder for transition definitions.

use crate::core::{Args, Guard, State};
use crate::engine::{Mutation, MutationContext, MutationError, Transition};
use crate::registry::{DefinitionViolation, GuardRegistry, RegistryError};
use serde_json::Value;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

enum GuardRef<S> {
    /// Resolved against the registry when the transition is defined.
    Registered(String),
    Inline(Guard<S>),
}

/// Builder for a transition with a fluent API.
///
/// Guards are evaluated in the order they are added. Registered guards are
/// referenced by name and resolved when the builder is passed to
/// [`EngineBuilder::define`](super::EngineBuilder::define).
pub struct TransitionBuilder<S> {
    name: String,
    doc: Option<String>,
    guards: Vec<GuardRef<S>>,
    mutation: Option<Mutation<S>>,
}

impl<S: State> TransitionBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            guards: Vec::new(),
            mutation: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Append a registered guard by name.
    pub fn require(mut self, guard: impl Into<String>) -> Self {
        self.guards.push(GuardRef::Registered(guard.into()));
        self
    }

    /// Append a guard value, typically a combination of registered guards.
    pub fn guard(mut self, guard: Guard<S>) -> Self {
        self.guards.push(GuardRef::Inline(guard));
        self
    }

    /// Set the mutation (required).
    pub fn mutate<F>(mut self, mutation: F) -> Self
    where
        F: Fn(&mut MutationContext<'_, S>, &Args) -> Result<Value, MutationError>
            + Send
            + Sync
            + 'static,
    {
        self.mutation = Some(Arc::new(mutation));
        self
    }

    /// Human-readable description carried into the engine manifest.
    pub fn doc(mut self, text: impl Into<String>) -> Self {
        self.doc = Some(text.into());
        self
    }

    /// Resolve guard names and check the definition is complete.
    ///
    /// Every problem is reported, not just the first.
    pub(crate) fn build(self, registry: &GuardRegistry<S>) -> Result<Transition<S>, RegistryError> {
        let TransitionBuilder {
            name,
            doc,
            guards: references,
            mutation,
        } = self;

        let mut checks: Vec<Validation<(), NonEmptyVec<DefinitionViolation>>> = Vec::new();
        if mutation.is_none() {
            checks.push(Validation::fail(DefinitionViolation::MissingMutation));
        }

        let mut guards = Vec::with_capacity(references.len());
        for reference in references {
            match reference {
                GuardRef::Registered(guard) => match registry.resolve(&guard) {
                    Ok(resolved) => guards.push(resolved),
                    Err(_) => checks.push(Validation::fail(DefinitionViolation::UnknownGuard {
                        name: guard,
                    })),
                },
                GuardRef::Inline(guard) => guards.push(guard),
            }
        }

        match (Validation::all_vec(checks).map(|_| ()), mutation) {
            (Validation::Success(_), Some(mutation)) => Ok(Transition {
                name,
                doc,
                guards,
                mutation,
            }),
            (Validation::Failure(violations), _) => Err(RegistryError::InvalidTransition {
                transition: name,
                violations: violations.iter().cloned().collect(),
            }),
            (Validation::Success(_), None) => Err(RegistryError::InvalidTransition {
                transition: name,
                violations: vec![DefinitionViolation::MissingMutation],
            }),
        }
    }
}

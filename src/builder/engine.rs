//! Builder for engines.

use super::transition::TransitionBuilder;
use crate::audit::AuditSink;
use crate::config::EngineConfig;
use crate::core::{Guard, State};
use crate::engine::{Engine, Transition};
use crate::registry::{GuardRegistry, NameKind, RegistryError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Configuration phase of an [`Engine`].
///
/// Registration methods take `&mut self` and leave the builder unchanged
/// when they fail, so one bad definition does not cost the others.
/// [`build`](Self::build) freezes guards and transitions.
pub struct EngineBuilder<S: State> {
    initial: S,
    guards: GuardRegistry<S>,
    transitions: BTreeMap<String, Transition<S>>,
    config: EngineConfig,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl<S: State> EngineBuilder<S> {
    /// Start configuring an engine that will own `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            guards: GuardRegistry::new(),
            transitions: BTreeMap::new(),
            config: EngineConfig::default(),
            sinks: Vec::new(),
        }
    }

    pub fn config(&mut self, config: EngineConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Add a destination for execution records.
    pub fn sink(&mut self, sink: Arc<dyn AuditSink>) -> &mut Self {
        self.sinks.push(sink);
        self
    }

    /// Register `guard` under `name`. See [`GuardRegistry::register`].
    pub fn register_guard(
        &mut self,
        name: impl Into<String>,
        guard: Guard<S>,
    ) -> Result<Guard<S>, RegistryError> {
        self.guards.register(name, guard)
    }

    /// A registered guard, for composing into new guards.
    pub fn guard(&self, name: &str) -> Result<Guard<S>, RegistryError> {
        self.guards.resolve(name)
    }

    pub fn guards(&self) -> &GuardRegistry<S> {
        &self.guards
    }

    /// Start a transition definition for this engine's state type.
    pub fn transition(&self, name: impl Into<String>) -> TransitionBuilder<S> {
        TransitionBuilder::new(name)
    }

    /// Add a transition.
    ///
    /// Fails on an empty or already defined name, or with every problem in
    /// the definition at once (unknown guards, missing mutation).
    pub fn define(&mut self, transition: TransitionBuilder<S>) -> Result<(), RegistryError> {
        if transition.name().is_empty() {
            return Err(RegistryError::EmptyName {
                kind: NameKind::Transition,
            });
        }
        if self.transitions.contains_key(transition.name()) {
            return Err(RegistryError::DuplicateTransition {
                name: transition.name().to_string(),
            });
        }

        let transition = transition.build(&self.guards)?;
        debug!(
            transition = %transition.name(),
            guards = transition.guards().len(),
            "transition defined"
        );
        self.transitions.insert(transition.name().to_string(), transition);
        Ok(())
    }

    pub fn build(self) -> Engine<S> {
        Engine::new(
            self.initial,
            self.guards,
            self.transitions,
            self.config,
            self.sinks,
        )
    }
}

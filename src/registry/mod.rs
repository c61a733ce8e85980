//! Guard registry.
//!
//! Every precondition is registered exactly once under a unique name and
//! reused by reference afterwards. Re-registration is always an error.

mod error;

pub use error::{DefinitionViolation, NameKind, RegistryError};

use crate::core::{Guard, GuardDescription};
use std::collections::BTreeMap;
use tracing::debug;

/// Named guards available to transition definitions.
///
/// # Example
///
/// ```rust
/// use warrant::core::{Guard, KeyValueState};
/// use warrant::registry::{GuardRegistry, RegistryError};
///
/// type Ledger = KeyValueState<String, u64>;
///
/// let mut registry = GuardRegistry::<Ledger>::new();
/// registry.register("open", Guard::new("open", |_, _| true)).unwrap();
///
/// assert!(registry.resolve("open").is_ok());
/// assert_eq!(
///     registry.register("open", Guard::new("open", |_, _| false)).unwrap_err(),
///     RegistryError::DuplicateGuard { name: "open".to_string() }
/// );
/// ```
pub struct GuardRegistry<S> {
    guards: BTreeMap<String, Guard<S>>,
}

impl<S> Default for GuardRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> GuardRegistry<S> {
    pub fn new() -> Self {
        Self {
            guards: BTreeMap::new(),
        }
    }

    /// Register `guard` under `name` and return the registered guard.
    ///
    /// A guard whose own name differs from `name` (a compound, or a leaf
    /// registered under an alias) is wrapped so it reports `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        guard: Guard<S>,
    ) -> Result<Guard<S>, RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName {
                kind: NameKind::Guard,
            });
        }
        if self.guards.contains_key(&name) {
            return Err(RegistryError::DuplicateGuard { name });
        }

        let registered = if guard.name() == name {
            guard
        } else {
            Guard::named(name.clone(), guard)
        };
        debug!(guard = %name, description = %registered.describe(), "guard registered");
        self.guards.insert(name, registered.clone());
        Ok(registered)
    }

    pub fn resolve(&self, name: &str) -> Result<Guard<S>, RegistryError> {
        self.guards
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownGuard {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.guards.keys().map(String::as_str)
    }

    /// Every registered guard's description, keyed by name.
    pub fn describe(&self) -> BTreeMap<String, GuardDescription> {
        self.guards
            .iter()
            .map(|(name, guard)| (name.clone(), guard.describe()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

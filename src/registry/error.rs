//! Configuration-time errors.

use std::fmt;
use thiserror::Error;

/// Errors raised while registering guards or defining transitions.
///
/// These are returned to the registrant; the builder that produced them is
/// left exactly as it was before the failing call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("guard '{name}' is not registered")]
    UnknownGuard { name: String },

    #[error("guard '{name}' is already registered")]
    DuplicateGuard { name: String },

    #[error("transition '{name}' is already defined")]
    DuplicateTransition { name: String },

    #[error("{kind} name must not be empty")]
    EmptyName { kind: NameKind },

    #[error("transition '{transition}' is invalid: {}", list(.violations))]
    InvalidTransition {
        transition: String,
        violations: Vec<DefinitionViolation>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Guard,
    Transition,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NameKind::Guard => "guard",
            NameKind::Transition => "transition",
        })
    }
}

/// One problem found while validating a transition definition.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DefinitionViolation {
    #[error("no mutation given")]
    MissingMutation,

    #[error("guard '{name}' is not registered")]
    UnknownGuard { name: String },
}

fn list(violations: &[DefinitionViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

//! Transition definitions and the executor.
//!
//! An [`Engine`] owns state and the frozen set of transitions. `execute`
//! evaluates a transition's guards in order and runs its mutation only when
//! every one of them passed; either way the attempt is recorded.

mod context;
mod executor;
mod manifest;
mod transition;

pub use crate::config::Isolation;
pub use context::MutationContext;
pub use executor::{CheckReport, Engine};
pub use manifest::{DeclaredGuard, EngineManifest, TransitionManifest};
pub use transition::{ExecuteError, Mutation, MutationError, Outcome, Rejection, Transition};

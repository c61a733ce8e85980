//! Core guard and state types.
//!
//! This module contains the pure side of the engine:
//! - State ownership via the `State` trait and read-only `StateView`s
//! - Call arguments
//! - Guard predicates and their combinators
//!
//! Nothing in this module mutates engine state.

mod args;
mod combinator;
mod guard;
mod state;

pub use args::{ArgError, Args};
pub use combinator::{and, not, or, parameterize, Binding, Bindings};
pub use guard::{
    Evaluation, Guard, GuardDescription, GuardError, LeafEvaluation, Predicate, Verdict,
};
pub use state::{KeyValueState, State, StateView};

pub(crate) use guard::panic_message;

//! Configuration-phase API.
//!
//! Guards and transitions are registered on an [`EngineBuilder`]; calling
//! `build` produces an [`Engine`](crate::engine::Engine) whose definitions
//! can no longer change.

mod engine;
mod macros;
mod transition;

pub use engine::EngineBuilder;
pub use transition::TransitionBuilder;

//! Warrant: a guarded transition engine
//!
//! Warrant separates "is this operation allowed right now" from "what does
//! this operation do to state". Preconditions are declared once as named
//! guards, attached to transitions in an ordered list, and the engine
//! guarantees a transition's mutation runs only after every one of its
//! guards passed against a consistent view of state.
//!
//! # Core Concepts
//!
//! - **Guards**: named pure predicates over state and call arguments,
//!   composable with [`and`](core::and), [`or`](core::or), [`not`](core::not)
//!   and [`parameterize`](core::parameterize) without losing their names
//! - **Transitions**: a mutation gated by an ordered guard list
//! - **Engine**: owns state, evaluates guards, applies mutations atomically
//! - **Audit trail**: one immutable record per attempt, verifiable offline
//!
//! # Example
//!
//! ```rust
//! use warrant::args;
//! use warrant::core::{Guard, KeyValueState};
//! use warrant::engine::{Engine, Outcome};
//! use serde_json::Value;
//!
//! type Ledger = KeyValueState<String, u64>;
//!
//! let mut builder = Engine::builder(Ledger::new().with("alice".to_string(), 100));
//! builder
//!     .register_guard(
//!         "atLeast",
//!         Guard::<Ledger>::try_new("atLeast", |ledger, args| {
//!             let from: String = args.get("from")?;
//!             Ok(ledger.get_or_default(&from) >= args.get::<u64>("amount")?)
//!         }),
//!     )
//!     .unwrap();
//! builder
//!     .define(
//!         builder
//!             .transition("transfer")
//!             .require("atLeast")
//!             .mutate(|ledger, args| {
//!                 let from: String = args.get("from")?;
//!                 let dest: String = args.get("dest")?;
//!                 let amount: u64 = args.get("amount")?;
//!                 ledger.update(from, |balance| *balance -= amount);
//!                 ledger.update(dest, |balance| *balance += amount);
//!                 Ok(Value::Null)
//!             }),
//!     )
//!     .unwrap();
//! let engine = builder.build();
//!
//! let outcome = engine
//!     .execute("transfer", args! { "from" => "alice", "dest" => "bob", "amount" => 50 })
//!     .unwrap();
//!
//! assert_eq!(outcome, Outcome::Applied(Value::Null));
//! assert_eq!(engine.read(|ledger| ledger.get_or_default("bob")), 50);
//! assert!(engine.verify_audit().is_success());
//! ```

pub mod audit;
pub mod builder;
pub mod config;
pub mod core;
pub mod engine;
pub mod registry;

// Re-export commonly used types
pub use builder::{EngineBuilder, TransitionBuilder};
pub use config::EngineConfig;
pub use core::{Args, Guard, KeyValueState, State, StateView};
pub use engine::{Engine, ExecuteError, MutationContext, MutationError, Outcome, Rejection};

#[doc(hidden)]
pub mod __private {
    pub use serde_json::json;
}

//! Guard combinators.
//!
//! Combinators build new guard values out of existing ones. The result keeps
//! its operands as a tree, so the combined guard can still be described,
//! rendered, and traced leaf by leaf.
//!
//! Evaluation order is declaration order. `and` stops at the first operand
//! that fails and `or` at the first that passes; operands after that point
//! are never evaluated. A fault in any operand ends the evaluation of the
//! whole compound as a fault, which `not` passes through unchanged.

use super::args::{ArgError, Args};
use super::guard::{Guard, GuardExpr};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Conjunction. An empty list passes.
///
/// # Example
///
/// ```rust
/// use warrant::core::{and, not, Args, Guard, KeyValueState};
///
/// type Flags = KeyValueState<String, bool>;
///
/// let member = Guard::<Flags>::new("member", |view, _| view.get_or_default("member"));
/// let frozen = Guard::<Flags>::new("frozen", |view, _| view.get_or_default("frozen"));
/// let active_member = and([member, not(frozen)]);
///
/// let state = Flags::new().with("member".to_string(), true);
/// assert!(active_member.check(&state, &Args::new()));
/// assert_eq!(active_member.name(), "and(member, not(frozen))");
/// ```
pub fn and<S>(operands: impl IntoIterator<Item = Guard<S>>) -> Guard<S> {
    Guard::from_expr(GuardExpr::And(operands.into_iter().collect()))
}

/// Disjunction. An empty list fails.
pub fn or<S>(operands: impl IntoIterator<Item = Guard<S>>) -> Guard<S> {
    Guard::from_expr(GuardExpr::Or(operands.into_iter().collect()))
}

/// Negation of exactly one evaluation.
pub fn not<S>(operand: Guard<S>) -> Guard<S> {
    Guard::from_expr(GuardExpr::Not(operand))
}

/// Bind some of `guard`'s arguments.
///
/// The bound guard is evaluated with the call's arguments overlaid by the
/// bindings, so "balance at least X" becomes "balance at least 1000", or
/// reads its `account` parameter from the call's `sender` argument.
///
/// # Example
///
/// ```rust
/// use warrant::core::{parameterize, Args, Bindings, Guard, KeyValueState};
///
/// type Votes = KeyValueState<String, u64>;
///
/// let at_least = Guard::<Votes>::try_new("atLeast", |view, args| {
///     let account: String = args.get("account")?;
///     let threshold: u64 = args.get("threshold")?;
///     Ok(view.get_or_default(&account) >= threshold)
/// });
///
/// let quorum = parameterize(
///     at_least,
///     Bindings::new().literal("threshold", 1000).from_arg("account", "voter"),
/// );
///
/// let state = Votes::new().with("ana".to_string(), 1200);
/// assert!(quorum.check(&state, &Args::new().with("voter", "ana")));
/// assert_eq!(quorum.name(), "atLeast");
/// ```
pub fn parameterize<S>(guard: Guard<S>, bindings: Bindings) -> Guard<S> {
    Guard::from_expr(GuardExpr::Bound {
        inner: guard,
        bindings,
    })
}

impl<S> Guard<S> {
    /// `and([self, other])`.
    pub fn and(self, other: Guard<S>) -> Guard<S> {
        and([self, other])
    }

    /// `or([self, other])`.
    pub fn or(self, other: Guard<S>) -> Guard<S> {
        or([self, other])
    }

    /// `parameterize(self, bindings)`.
    pub fn bind(self, bindings: Bindings) -> Guard<S> {
        parameterize(self, bindings)
    }
}

/// Where a bound parameter takes its value from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Binding {
    /// A fixed value.
    Literal(Value),
    /// The value of another call argument.
    FromArg(String),
}

/// Ordered parameter bindings for [`parameterize`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    entries: Vec<(String, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(mut self, param: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((param.into(), Binding::Literal(value.into())));
        self
    }

    pub fn from_arg(mut self, param: impl Into<String>, arg: impl Into<String>) -> Self {
        self.entries.push((param.into(), Binding::FromArg(arg.into())));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(param, binding)| (param.as_str(), binding))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arguments seen by the bound guard.
    ///
    /// Renames read the original call arguments, never another binding.
    pub fn apply(&self, args: &Args) -> Result<Args, ArgError> {
        let mut bound = Args::new();
        for (param, binding) in &self.entries {
            let value = match binding {
                Binding::Literal(value) => value.clone(),
                Binding::FromArg(arg) => {
                    args.raw(arg).cloned().ok_or_else(|| ArgError::Missing {
                        name: arg.clone(),
                    })?
                }
            };
            bound.set(param.clone(), value);
        }
        Ok(args.overlay(&bound))
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (param, binding)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match binding {
                Binding::Literal(value) => write!(f, "{param}={value}")?,
                Binding::FromArg(arg) => write!(f, "{param}<-{arg}")?,
            }
        }
        Ok(())
    }
}

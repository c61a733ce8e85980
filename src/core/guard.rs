//! Guard predicates gating transitions.
//!
//! A guard is a pure predicate over a [`StateView`] and the call's [`Args`].
//! Guards are values: leaf predicates are wrapped in an expression tree that
//! the combinators extend, so every compound guard can still report which
//! named guards it is made of.

use super::args::{ArgError, Args};
use super::combinator::Bindings;
use super::state::StateView;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Fault raised while evaluating a guard.
///
/// A fault never counts as a pass: the guard, and every compound guard
/// containing it, fails closed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GuardError {
    #[error(transparent)]
    Argument(#[from] ArgError),

    #[error("guard '{guard}' panicked: {message}")]
    Panicked { guard: String, message: String },

    #[error("{0}")]
    Failed(String),
}

impl GuardError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Result of a single evaluation, as recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Fault,
}

impl Verdict {
    pub fn passed(self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl From<&Result<bool, GuardError>> for Verdict {
    fn from(result: &Result<bool, GuardError>) -> Self {
        match result {
            Ok(true) => Verdict::Pass,
            Ok(false) => Verdict::Fail,
            Err(_) => Verdict::Fault,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::Fault => "fault",
        })
    }
}

/// One leaf predicate evaluation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEvaluation {
    pub guard: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Outcome of evaluating a guard tree, with the leaves actually visited.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: Result<bool, GuardError>,
    pub trace: Vec<LeafEvaluation>,
}

impl Evaluation {
    pub fn verdict(&self) -> Verdict {
        Verdict::from(&self.result)
    }

    pub fn passed(&self) -> bool {
        matches!(self.result, Ok(true))
    }
}

/// Capability implemented by leaf guard logic.
///
/// Implementations must be pure: no writes, no interior mutation of shared
/// state, and the same answer for the same state and arguments.
pub trait Predicate<S>: Send + Sync {
    fn evaluate(&self, view: &StateView<'_, S>, args: &Args) -> Result<bool, GuardError>;
}

impl<S, F> Predicate<S> for F
where
    F: Fn(&StateView<'_, S>, &Args) -> Result<bool, GuardError> + Send + Sync,
{
    fn evaluate(&self, view: &StateView<'_, S>, args: &Args) -> Result<bool, GuardError> {
        self(view, args)
    }
}

pub(crate) enum GuardExpr<S> {
    Leaf {
        name: String,
        predicate: Box<dyn Predicate<S>>,
    },
    And(Vec<Guard<S>>),
    Or(Vec<Guard<S>>),
    Not(Guard<S>),
    Bound {
        inner: Guard<S>,
        bindings: Bindings,
    },
    Named {
        name: String,
        inner: Guard<S>,
    },
}

/// A named, pure precondition.
///
/// Cloning is cheap; clones share the same predicate tree.
///
/// # Example
///
/// ```rust
/// use warrant::core::{Args, Guard, KeyValueState, StateView};
///
/// type Ledger = KeyValueState<String, u64>;
///
/// let solvent = Guard::<Ledger>::try_new("solvent", |view, args| {
///     let account: String = args.get("account")?;
///     Ok(view.get_or_default(&account) > 0)
/// });
///
/// let state = Ledger::new().with("alice".to_string(), 10);
/// let view = StateView::new(&state);
///
/// assert!(solvent.evaluate(&view, &Args::new().with("account", "alice")).passed());
/// assert!(!solvent.evaluate(&view, &Args::new().with("account", "bob")).passed());
/// assert_eq!(solvent.name(), "solvent");
/// ```
pub struct Guard<S> {
    pub(crate) expr: Arc<GuardExpr<S>>,
}

impl<S> Clone for Guard<S> {
    fn clone(&self) -> Self {
        Self {
            expr: Arc::clone(&self.expr),
        }
    }
}

impl<S> fmt::Debug for Guard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guard").field(&self.describe()).finish()
    }
}

impl<S: 'static> Guard<S> {
    /// Create a guard from an infallible predicate.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StateView<'_, S>, &Args) -> bool + Send + Sync + 'static,
    {
        Self::try_new(name, move |view: &StateView<'_, S>, args: &Args| {
            Ok(predicate(view, args))
        })
    }

    /// Create a guard whose predicate may fault, e.g. on a missing argument.
    pub fn try_new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&StateView<'_, S>, &Args) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        Self::from_predicate(name, predicate)
    }

    pub fn from_predicate(name: impl Into<String>, predicate: impl Predicate<S> + 'static) -> Self {
        Self::from_expr(GuardExpr::Leaf {
            name: name.into(),
            predicate: Box::new(predicate),
        })
    }
}

impl<S> Guard<S> {
    pub(crate) fn from_expr(expr: GuardExpr<S>) -> Self {
        Self {
            expr: Arc::new(expr),
        }
    }

    /// Give this guard a registry name. Evaluation is unchanged.
    pub(crate) fn named(name: impl Into<String>, inner: Guard<S>) -> Self {
        Self::from_expr(GuardExpr::Named {
            name: name.into(),
            inner,
        })
    }

    /// The name this guard is reported under.
    ///
    /// Leaf and registered guards report their own name, a parameterized
    /// guard reports the guard it binds, and an anonymous compound reports
    /// its rendered structure, e.g. `and(member, not(frozen))`.
    pub fn name(&self) -> String {
        match &*self.expr {
            GuardExpr::Leaf { name, .. } | GuardExpr::Named { name, .. } => name.clone(),
            GuardExpr::Bound { inner, .. } => inner.name(),
            GuardExpr::And(_) | GuardExpr::Or(_) | GuardExpr::Not(_) => {
                self.describe().to_string()
            }
        }
    }

    /// Structured description of this guard's tree.
    pub fn describe(&self) -> GuardDescription {
        match &*self.expr {
            GuardExpr::Leaf { name, .. } => GuardDescription::Leaf { name: name.clone() },
            GuardExpr::And(operands) => GuardDescription::And {
                operands: operands.iter().map(Guard::describe).collect(),
            },
            GuardExpr::Or(operands) => GuardDescription::Or {
                operands: operands.iter().map(Guard::describe).collect(),
            },
            GuardExpr::Not(operand) => GuardDescription::Not {
                operand: Box::new(operand.describe()),
            },
            GuardExpr::Bound { inner, bindings } => GuardDescription::Bound {
                inner: Box::new(inner.describe()),
                bindings: bindings.clone(),
            },
            GuardExpr::Named { name, inner } => GuardDescription::Named {
                name: name.clone(),
                inner: Box::new(inner.describe()),
            },
        }
    }

    /// Leaf guard names in declaration order, without repeats.
    pub fn constituents(&self) -> Vec<String> {
        self.describe().leaves()
    }

    /// Evaluate against a view, collecting the leaf trace.
    ///
    /// Faults and panics inside leaf predicates are captured and turn the
    /// whole evaluation into a fault.
    pub fn evaluate(&self, view: &StateView<'_, S>, args: &Args) -> Evaluation {
        let mut trace = Vec::new();
        let result = self.eval(view, args, &mut trace);
        Evaluation { result, trace }
    }

    /// Pure yes/no check. Faults read as `false`.
    pub fn check(&self, state: &S, args: &Args) -> bool {
        self.evaluate(&StateView::new(state), args).passed()
    }

    fn eval(
        &self,
        view: &StateView<'_, S>,
        args: &Args,
        trace: &mut Vec<LeafEvaluation>,
    ) -> Result<bool, GuardError> {
        match &*self.expr {
            GuardExpr::Leaf { name, predicate } => {
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| predicate.evaluate(view, args)))
                        .unwrap_or_else(|payload| {
                            Err(GuardError::Panicked {
                                guard: name.clone(),
                                message: panic_message(payload.as_ref()),
                            })
                        });
                trace.push(LeafEvaluation {
                    guard: name.clone(),
                    verdict: Verdict::from(&result),
                    fault: result.as_ref().err().map(ToString::to_string),
                });
                result
            }
            GuardExpr::And(operands) => {
                for operand in operands {
                    if !operand.eval(view, args, trace)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            GuardExpr::Or(operands) => {
                for operand in operands {
                    if operand.eval(view, args, trace)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            GuardExpr::Not(operand) => operand.eval(view, args, trace).map(|passed| !passed),
            GuardExpr::Bound { inner, bindings } => {
                let bound = bindings.apply(args)?;
                inner.eval(view, &bound, trace)
            }
            GuardExpr::Named { inner, .. } => inner.eval(view, args, trace),
        }
    }
}

/// Serializable shape of a guard tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardDescription {
    Leaf {
        name: String,
    },
    And {
        operands: Vec<GuardDescription>,
    },
    Or {
        operands: Vec<GuardDescription>,
    },
    Not {
        operand: Box<GuardDescription>,
    },
    Bound {
        inner: Box<GuardDescription>,
        bindings: Bindings,
    },
    Named {
        name: String,
        inner: Box<GuardDescription>,
    },
}

impl GuardDescription {
    /// Leaf names in declaration order, without repeats.
    pub fn leaves(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_leaves(&mut names);
        names
    }

    fn collect_leaves(&self, names: &mut Vec<String>) {
        match self {
            GuardDescription::Leaf { name } => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            GuardDescription::And { operands } | GuardDescription::Or { operands } => {
                operands.iter().for_each(|o| o.collect_leaves(names));
            }
            GuardDescription::Not { operand } => operand.collect_leaves(names),
            GuardDescription::Bound { inner, .. } | GuardDescription::Named { inner, .. } => {
                inner.collect_leaves(names)
            }
        }
    }
}

impl fmt::Display for GuardDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardDescription::Leaf { name } | GuardDescription::Named { name, .. } => {
                f.write_str(name)
            }
            GuardDescription::And { operands } => write_call(f, "and", operands),
            GuardDescription::Or { operands } => write_call(f, "or", operands),
            GuardDescription::Not { operand } => write!(f, "not({operand})"),
            GuardDescription::Bound { inner, bindings } => write!(f, "{inner}[{bindings}]"),
        }
    }
}

fn write_call(f: &mut fmt::Formatter<'_>, op: &str, operands: &[GuardDescription]) -> fmt::Result {
    write!(f, "{op}(")?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{operand}")?;
    }
    f.write_str(")")
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

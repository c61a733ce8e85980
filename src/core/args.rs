//! Named call arguments shared by guards and mutations.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors reading a typed value out of [`Args`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArgError {
    #[error("missing argument '{name}'")]
    Missing { name: String },

    #[error("argument '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// Arguments for one execution attempt, keyed by name.
///
/// Backed by a JSON object so arguments can be recorded verbatim in the
/// audit trail.
///
/// # Example
///
/// ```rust
/// use warrant::core::Args;
///
/// let args = Args::new().with("amount", 50).with("dest", "bob");
///
/// let amount: u64 = args.get("amount").unwrap();
/// assert_eq!(amount, 50);
/// assert!(args.get::<u64>("dest").is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(Map<String, Value>);

impl Args {
    /// Create an empty argument bag.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Set `name`, returning the previous value if any.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Typed read. Absent names yield [`ArgError::Missing`].
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgError> {
        let value = self.0.get(name).ok_or_else(|| ArgError::Missing {
            name: name.to_string(),
        })?;
        decode(name, value)
    }

    /// Typed read where absence is not an error.
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ArgError> {
        self.0.get(name).map(|value| decode(name, value)).transpose()
    }

    /// The stored JSON value, without decoding.
    ///
    /// # Example
    ///
    /// ```rust
    /// use serde_json::json;
    /// use warrant::core::Args;
    ///
    /// let args = Args::new().with("accounts", json!(["a", "b"]));
    /// assert_eq!(args.raw("accounts"), Some(&json!(["a", "b"])));
    /// assert_eq!(args.raw("amount"), None);
    /// ```
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether an argument called `name` was passed.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// A copy of `self` with every entry of `other` written over it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use warrant::core::Args;
    ///
    /// let call = Args::new().with("from", "alice").with("amount", 5);
    /// let merged = call.overlay(&Args::new().with("amount", 1000));
    ///
    /// assert_eq!(merged.get::<u64>("amount").unwrap(), 1000);
    /// assert_eq!(merged.get::<String>("from").unwrap(), "alice");
    /// ```
    pub fn overlay(&self, other: &Args) -> Args {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            merged.0.insert(name.clone(), value.clone());
        }
        merged
    }

    /// Name and value pairs. Iteration order follows `serde_json`'s map.
    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.0.iter()
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were passed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The arguments as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn decode<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, ArgError> {
    serde_json::from_value(value.clone()).map_err(|e| ArgError::Invalid {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Args {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

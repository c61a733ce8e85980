//! Engine configuration.
//!
//! Every field has a default, so an embedder may load a partial JSON
//! document and get sensible behaviour for the rest.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a mutation is applied to state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Run the mutation on a copy and commit it only when the mutation
    /// returns `Ok`. A failing or panicking mutation leaves state untouched.
    #[default]
    CopyOnWrite,

    /// Mutate live state directly. A mutation that fails midway leaves its
    /// partial writes behind; the mutation must be all-or-nothing itself.
    InPlace,
}

/// Runtime settings for an [`Engine`](crate::engine::Engine).
///
/// # Example
///
/// ```rust
/// use warrant::config::{EngineConfig, Isolation};
/// use std::time::Duration;
///
/// let config = EngineConfig::from_json(r#"{ "guard_timeout_ms": 250, "isolation": "in_place" }"#)
///     .unwrap();
///
/// assert_eq!(config.guard_timeout, Some(Duration::from_millis(250)));
/// assert_eq!(config.isolation, Isolation::InPlace);
/// assert!(config.record_arguments);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget for the guard-evaluation phase of one `execute` call. When it
    /// runs out the call is abandoned before any mutation starts.
    #[serde(rename = "guard_timeout_ms", with = "optional_millis")]
    pub guard_timeout: Option<Duration>,

    pub isolation: Isolation,

    /// Store call arguments in execution records.
    pub record_arguments: bool,

    /// Deepest chain of transitions invoked from inside mutations.
    pub max_nesting_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            guard_timeout: None,
            isolation: Isolation::CopyOnWrite,
            record_arguments: true,
            max_nesting_depth: 8,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_guard_timeout(mut self, timeout: Duration) -> Self {
        self.guard_timeout = Some(timeout);
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_record_arguments(mut self, record: bool) -> Self {
        self.record_arguments = record;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        value
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

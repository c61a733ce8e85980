//! Serializable description of an engine's guards and transitions.

use crate::core::GuardDescription;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything an auditor needs to know about the engine's preconditions,
/// without any of the code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineManifest {
    /// Registered guards by name.
    pub guards: BTreeMap<String, GuardDescription>,
    /// Defined transitions by name.
    pub transitions: BTreeMap<String, TransitionManifest>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Guards in evaluation order.
    pub guards: Vec<DeclaredGuard>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeclaredGuard {
    /// Name the guard is reported under in execution records.
    pub name: String,
    pub description: GuardDescription,
}

impl EngineManifest {
    pub fn transition(&self, name: &str) -> Option<&TransitionManifest> {
        self.transitions.get(name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

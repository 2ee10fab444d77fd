//! Load options

use serde::{Deserialize, Serialize};
use stixgraph_core::TypeRegistry;

/// What to do when an edge endpoint has no matching node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingPolicy {
    /// Log, record the skip and continue
    #[default]
    Skip,
    /// Abort the load with `DanglingReference`
    Fail,
}

/// What to do with an object that fails local validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidObjectPolicy {
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default)]
    pub dangling: DanglingPolicy,
    #[serde(default)]
    pub invalid_objects: InvalidObjectPolicy,
    /// Extra bundle bookkeeping types to ignore, on top of `x-mitre-collection`
    #[serde(default)]
    pub marker_types: Vec<String>,
}

impl LoadOptions {
    /// Both policies set to `Fail`
    pub fn strict() -> Self {
        Self {
            dangling: DanglingPolicy::Fail,
            invalid_objects: InvalidObjectPolicy::Fail,
            marker_types: Vec::new(),
        }
    }

    /// Dispatch table for these options
    pub fn registry(&self) -> TypeRegistry {
        let mut registry = TypeRegistry::attack();
        for marker in &self.marker_types {
            registry.register_marker(marker.clone());
        }
        registry
    }
}

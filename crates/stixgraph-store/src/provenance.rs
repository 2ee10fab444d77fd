//! Provenance and audit trail management

use crate::model::{EdgeKey, WriteOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a node or edge came from. Kept beside the element, never in its properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Loaded from a STIX object in a bundle
    Bundle {
        /// Bundle path or URI
        source: String,
        loaded_at: DateTime<Utc>,
    },
    /// Synthesized from embedded references
    Derived {
        /// Derivation that produced the edge (e.g. "matrix-tactic-refs")
        rule: String,
        loaded_at: DateTime<Utc>,
    },
}

impl Provenance {
    pub fn bundle(source: impl Into<String>) -> Self {
        Provenance::Bundle {
            source: source.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn derived(rule: impl Into<String>) -> Self {
        Provenance::Derived {
            rule: rule.into(),
            loaded_at: Utc::now(),
        }
    }
}

/// Audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique audit ID
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation: AuditOperation,
}

impl AuditEntry {
    pub fn new(operation: AuditOperation) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation,
        }
    }
}

/// Types of audited write operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditOperation {
    UpsertNode {
        id: String,
        outcome: WriteOutcome,
    },
    UpsertEdge {
        key: EdgeKey,
        outcome: WriteOutcome,
    },
    /// Edge not written because an endpoint node does not exist
    UnmatchedEdge {
        key: EdgeKey,
        missing: String,
    },
    SetProperties {
        id: String,
        property_count: usize,
    },
    PutEmbedding {
        id: String,
        model: String,
        dimensions: usize,
    },
}

//! STIX type → graph label classification
//!
//! `classify` turns kebab-case STIX discriminants into PascalCase labels.
//! `TypeRegistry` is the dispatch table deciding how each discriminant is loaded.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Prefix carried by custom (non-standard) STIX types
const CUSTOM_PREFIX: &str = "x-";

/// Graph label produced by [`classify`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Classify a STIX type (or relationship type) string into a graph label.
///
/// `x-mitre-tactic` → `MitreTactic`, `attack-pattern` → `AttackPattern`,
/// `subtechnique-of` → `SubtechniqueOf`.
pub fn classify(type_name: &str) -> Result<Label> {
    let trimmed = type_name.strip_prefix(CUSTOM_PREFIX).unwrap_or(type_name);

    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::InvalidTypeString(type_name.to_string()));
    }

    let label: String = trimmed
        .split('-')
        .filter(|segment| !segment.is_empty())
        .map(capitalize)
        .collect();

    if label.is_empty() {
        return Err(CoreError::InvalidTypeString(type_name.to_string()));
    }

    Ok(Label(label))
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(segment.len());
            out.push(first.to_ascii_uppercase());
            out.extend(chars.map(|c| c.to_ascii_lowercase()));
            out
        }
        None => String::new(),
    }
}

/// How objects of a given type are loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Loaded as a node
    Domain,
    /// Loaded as an explicit edge
    Relationship,
    /// Bundle bookkeeping (collections, manifests), never loaded
    Marker,
}

/// Dispatch entry for one STIX type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub kind: ObjectKind,
    pub required_fields: Vec<&'static str>,
}

impl TypeSpec {
    fn domain(required_fields: &[&'static str]) -> Self {
        Self {
            kind: ObjectKind::Domain,
            required_fields: required_fields.to_vec(),
        }
    }
}

/// Well-known discriminants
pub mod types {
    pub const ATTACK_PATTERN: &str = "attack-pattern";
    pub const RELATIONSHIP: &str = "relationship";
    pub const MITRE_TACTIC: &str = "x-mitre-tactic";
    pub const MITRE_MATRIX: &str = "x-mitre-matrix";
    pub const MITRE_COLLECTION: &str = "x-mitre-collection";
}

/// Types that become plain nodes with no extra requirements
const DOMAIN_TYPES: &[&str] = &[
    "attack-pattern",
    "campaign",
    "course-of-action",
    "identity",
    "infrastructure",
    "intrusion-set",
    "location",
    "malware",
    "malware-analysis",
    "note",
    "observed-data",
    "report",
    "threat-actor",
    "tool",
    "vulnerability",
    "marking-definition",
    "x-mitre-data-source",
    "x-mitre-data-component",
    "x-mitre-asset",
];

/// Dispatch table from STIX type discriminant to load behaviour.
///
/// Unknown types are treated as domain objects with no required fields.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    specs: HashMap<String, TypeSpec>,
}

impl TypeRegistry {
    /// Registry with no entries (every type is a plain domain object)
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// Registry covering the MITRE ATT&CK vocabulary
    pub fn attack() -> Self {
        let mut registry = Self::empty();
        for name in DOMAIN_TYPES {
            registry.register(*name, TypeSpec::domain(&[]));
        }
        registry.register(types::MITRE_TACTIC, TypeSpec::domain(&["x_mitre_shortname"]));
        registry.register(types::MITRE_MATRIX, TypeSpec::domain(&["tactic_refs"]));
        registry.register(
            types::RELATIONSHIP,
            TypeSpec {
                kind: ObjectKind::Relationship,
                required_fields: vec!["relationship_type", "source_ref", "target_ref"],
            },
        );
        registry.register_marker(types::MITRE_COLLECTION);
        registry
    }

    pub fn register(&mut self, type_name: impl Into<String>, spec: TypeSpec) {
        self.specs.insert(type_name.into(), spec);
    }

    pub fn register_marker(&mut self, type_name: impl Into<String>) {
        self.register(
            type_name,
            TypeSpec {
                kind: ObjectKind::Marker,
                required_fields: Vec::new(),
            },
        );
    }

    /// Look up the spec for a type, falling back to an unconstrained domain object
    pub fn spec(&self, type_name: &str) -> TypeSpec {
        self.specs
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| TypeSpec::domain(&[]))
    }

    pub fn kind(&self, type_name: &str) -> ObjectKind {
        self.specs
            .get(type_name)
            .map(|spec| spec.kind)
            .unwrap_or(ObjectKind::Domain)
    }

    /// All explicitly registered type names
    pub fn known_types(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::attack()
    }
}

//! Graph element records exchanged with a store

use crate::provenance::Provenance;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use stixgraph_core::{NodeDocument, PropertyMap, PropertyValue, RelationshipSummary};

/// Secondary label carried by every node loaded from STIX
pub const SDO_LABEL: &str = "SDO";

/// Identity of an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKey {
    /// Edge from a `relationship` object, keyed by its STIX id
    Explicit(String),
    /// Synthesized edge, keyed by its (source, type, target) triple
    Derived {
        source: String,
        rel_type: String,
        target: String,
    },
}

impl EdgeKey {
    pub fn derived(
        source: impl Into<String>,
        rel_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        EdgeKey::Derived {
            source: source.into(),
            rel_type: rel_type.into(),
            target: target.into(),
        }
    }

    /// Flat key used by backends for primary-key lookups
    pub fn storage_key(&self) -> String {
        match self {
            EdgeKey::Explicit(id) => id.clone(),
            EdgeKey::Derived {
                source,
                rel_type,
                target,
            } => format!("{}|{}|{}", source, rel_type, target),
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, EdgeKey::Derived { .. })
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKey::Explicit(id) => f.write_str(id),
            EdgeKey::Derived {
                source,
                rel_type,
                target,
            } => write!(f, "({})-[{}]->({})", source, rel_type, target),
        }
    }
}

/// Node upsert request
#[derive(Debug, Clone)]
pub struct NodeWrite {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
    pub provenance: Provenance,
}

/// Edge upsert request. Endpoints are matched by node id.
#[derive(Debug, Clone)]
pub struct EdgeWrite {
    pub key: EdgeKey,
    pub rel_type: String,
    pub source: String,
    pub target: String,
    pub properties: PropertyMap,
    pub provenance: Provenance,
}

/// Stored node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: PropertyMap,
    pub provenance: Provenance,
}

impl NodeRecord {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn text_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_str)
    }
}

/// Stored edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub key: EdgeKey,
    pub rel_type: String,
    pub source: String,
    pub target: String,
    pub properties: PropertyMap,
    pub provenance: Provenance,
}

/// Result of an upsert keyed by identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Result of an edge upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOutcome {
    Written(WriteOutcome),
    /// An endpoint did not match any node; nothing was written
    MissingEndpoint(String),
}

/// Vector stored for a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub node_id: String,
    pub model: String,
    pub vector: Vec<f32>,
}

/// Graph statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub nodes: usize,
    pub edges: usize,
    pub derived_edges: usize,
    pub embeddings: usize,
    /// Node count per label
    pub labels: BTreeMap<String, usize>,
    /// Edge count per relationship type
    pub relationship_types: BTreeMap<String, usize>,
}

impl GraphStatistics {
    pub fn from_records<'a>(
        nodes: impl IntoIterator<Item = &'a NodeRecord>,
        edges: impl IntoIterator<Item = &'a EdgeRecord>,
        embeddings: usize,
    ) -> Self {
        let mut stats = GraphStatistics {
            embeddings,
            ..Default::default()
        };
        for node in nodes {
            stats.nodes += 1;
            for label in &node.labels {
                *stats.labels.entry(label.clone()).or_insert(0) += 1;
            }
        }
        for edge in edges {
            stats.edges += 1;
            if edge.key.is_derived() {
                stats.derived_edges += 1;
            }
            *stats
                .relationship_types
                .entry(edge.rel_type.clone())
                .or_insert(0) += 1;
        }
        stats
    }
}

/// Build retrieval documents: nodes with both `name` and `description`,
/// each with its outgoing relationships and the targets' names
pub fn build_documents<'a>(
    nodes: impl IntoIterator<Item = &'a NodeRecord>,
    edges: impl IntoIterator<Item = &'a EdgeRecord>,
) -> Vec<NodeDocument> {
    let nodes: Vec<&NodeRecord> = nodes.into_iter().collect();
    let names: HashMap<&str, &str> = nodes
        .iter()
        .filter_map(|n| n.text_property("name").map(|name| (n.id.as_str(), name)))
        .collect();

    let mut outgoing: HashMap<&str, Vec<RelationshipSummary>> = HashMap::new();
    for edge in edges {
        outgoing
            .entry(edge.source.as_str())
            .or_default()
            .push(RelationshipSummary {
                rel_type: edge.rel_type.clone(),
                target_name: names.get(edge.target.as_str()).map(|n| n.to_string()),
            });
    }

    let mut documents: Vec<NodeDocument> = nodes
        .iter()
        .filter_map(|node| {
            let name = node.text_property("name")?;
            let description = node.text_property("description")?;
            let mut relationships = outgoing.remove(node.id.as_str()).unwrap_or_default();
            relationships.sort_by(|a, b| {
                (a.rel_type.as_str(), a.target_name.as_deref())
                    .cmp(&(b.rel_type.as_str(), b.target_name.as_deref()))
            });
            Some(NodeDocument {
                id: node.id.clone(),
                labels: node.labels.clone(),
                name: name.to_string(),
                description: description.to_string(),
                relationships,
            })
        })
        .collect();

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    documents
}

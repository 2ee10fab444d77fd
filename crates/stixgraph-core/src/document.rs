//! Retrieval text for graph nodes

use serde::{Deserialize, Serialize};

/// An outgoing relationship summarised for retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    pub rel_type: String,
    pub target_name: Option<String>,
}

/// A node as seen by the retrieval layer: name, description and neighbours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: String,
    pub labels: Vec<String>,
    pub name: String,
    pub description: String,
    pub relationships: Vec<RelationshipSummary>,
}

impl NodeDocument {
    /// `"{name}. {description}"` followed by one `"Related to {target} via {type}"`
    /// sentence per named neighbour
    pub fn text(&self) -> String {
        let base = format!("{}. {}", self.name, self.description);

        let related: Vec<String> = self
            .relationships
            .iter()
            .filter_map(|rel| {
                rel.target_name
                    .as_deref()
                    .map(|target| format!("Related to {} via {}", target, rel.rel_type))
            })
            .collect();

        if related.is_empty() {
            base
        } else {
            format!("{}. {}", base, related.join(". "))
        }
    }
}

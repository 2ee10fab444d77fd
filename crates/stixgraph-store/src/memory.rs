//! In-memory graph store with adjacency indexing and an audit trail

use crate::error::Result;
use crate::model::{
    EdgeKey, EdgeOutcome, EdgeRecord, EdgeWrite, GraphStatistics, NodeRecord, NodeWrite,
    StoredEmbedding, WriteOutcome,
};
use crate::provenance::{AuditEntry, AuditOperation};
use crate::session::{GraphSession, GraphStore};
use async_trait::async_trait;
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use stixgraph_core::PropertyMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Audit entries kept by [`MemoryGraphStore::new`]
pub const DEFAULT_AUDIT_LIMIT: usize = 10_000;

#[derive(Debug)]
struct GraphState {
    nodes: HashMap<String, NodeRecord>,
    /// Edges by storage key
    edges: HashMap<String, EdgeRecord>,
    /// Source node id -> storage keys of its outgoing edges
    outgoing: HashMap<String, SmallVec<[String; 8]>>,
    embeddings: HashMap<String, StoredEmbedding>,
    audit_trail: VecDeque<AuditEntry>,
    audit_limit: usize,
}

impl GraphState {
    fn audit(&mut self, operation: AuditOperation) {
        self.audit_trail.push_back(AuditEntry::new(operation));
        while self.audit_trail.len() > self.audit_limit {
            self.audit_trail.pop_front();
        }
    }

    fn unlink(&mut self, source: &str, storage_key: &str) {
        if let Some(keys) = self.outgoing.get_mut(source) {
            keys.retain(|k| k != storage_key);
            if keys.is_empty() {
                self.outgoing.remove(source);
            }
        }
    }
}

/// Graph store held entirely in memory. Clones share the same graph.
#[derive(Debug, Clone)]
pub struct MemoryGraphStore {
    state: Arc<Mutex<GraphState>>,
}

impl MemoryGraphStore {
    /// Empty store keeping the last [`DEFAULT_AUDIT_LIMIT`] audit entries
    pub fn new() -> Self {
        Self::with_audit_limit(DEFAULT_AUDIT_LIMIT)
    }

    /// Keep at most `limit` audit entries, dropping the oldest
    pub fn with_audit_limit(limit: usize) -> Self {
        let state = GraphState {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            outgoing: HashMap::new(),
            embeddings: HashMap::new(),
            audit_trail: VecDeque::new(),
            audit_limit: limit,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Oldest entry first
    pub async fn audit_trail(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit_trail.iter().cloned().collect()
    }

    /// Ids of the targets of a node's outgoing edges, optionally filtered by type
    pub async fn neighbours(&self, id: &str, rel_type: Option<&str>) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .outgoing
            .get(id)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| state.edges.get(k))
                    .filter(|e| rel_type.map_or(true, |t| e.rel_type == t))
                    .map(|e| e.target.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn session(&self) -> Result<Box<dyn GraphSession + '_>> {
        let state = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(MemorySession { state }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Session over a [`MemoryGraphStore`]; holds the graph lock until dropped
pub struct MemorySession {
    state: OwnedMutexGuard<GraphState>,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn upsert_node(&mut self, node: NodeWrite) -> Result<WriteOutcome> {
        let state = &mut *self.state;
        let outcome = if state.nodes.contains_key(&node.id) {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };

        let id = node.id.clone();
        state.nodes.insert(
            node.id.clone(),
            NodeRecord {
                id: node.id,
                labels: node.labels,
                properties: node.properties,
                provenance: node.provenance,
            },
        );
        state.audit(AuditOperation::UpsertNode { id, outcome });
        Ok(outcome)
    }

    async fn upsert_edge(&mut self, edge: EdgeWrite) -> Result<EdgeOutcome> {
        let state = &mut *self.state;
        for endpoint in [&edge.source, &edge.target] {
            if !state.nodes.contains_key(endpoint) {
                let missing = endpoint.clone();
                state.audit(AuditOperation::UnmatchedEdge {
                    key: edge.key.clone(),
                    missing: missing.clone(),
                });
                return Ok(EdgeOutcome::MissingEndpoint(missing));
            }
        }

        let storage_key = edge.key.storage_key();
        let outcome = match state.edges.get(&storage_key) {
            Some(existing) => {
                let previous_source = existing.source.clone();
                if previous_source != edge.source {
                    state.unlink(&previous_source, &storage_key);
                    state
                        .outgoing
                        .entry(edge.source.clone())
                        .or_default()
                        .push(storage_key.clone());
                }
                WriteOutcome::Updated
            }
            None => {
                state
                    .outgoing
                    .entry(edge.source.clone())
                    .or_default()
                    .push(storage_key.clone());
                WriteOutcome::Created
            }
        };

        let key = edge.key.clone();
        state.edges.insert(
            storage_key,
            EdgeRecord {
                key: edge.key,
                rel_type: edge.rel_type,
                source: edge.source,
                target: edge.target,
                properties: edge.properties,
                provenance: edge.provenance,
            },
        );
        state.audit(AuditOperation::UpsertEdge { key, outcome });
        Ok(EdgeOutcome::Written(outcome))
    }

    async fn set_node_properties(&mut self, id: &str, properties: PropertyMap) -> Result<bool> {
        let state = &mut *self.state;
        let property_count = properties.len();
        match state.nodes.get_mut(id) {
            Some(node) => {
                node.properties = properties;
                state.audit(AuditOperation::SetProperties {
                    id: id.to_string(),
                    property_count,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn node(&mut self, id: &str) -> Result<Option<NodeRecord>> {
        Ok(self.state.nodes.get(id).cloned())
    }

    async fn edge(&mut self, key: &EdgeKey) -> Result<Option<EdgeRecord>> {
        Ok(self.state.edges.get(&key.storage_key()).cloned())
    }

    async fn nodes(&mut self) -> Result<Vec<NodeRecord>> {
        let mut nodes: Vec<NodeRecord> = self.state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn edges(&mut self) -> Result<Vec<EdgeRecord>> {
        let mut edges: Vec<EdgeRecord> = self.state.edges.values().cloned().collect();
        edges.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(edges)
    }

    async fn statistics(&mut self) -> Result<GraphStatistics> {
        Ok(GraphStatistics::from_records(
            self.state.nodes.values(),
            self.state.edges.values(),
            self.state.embeddings.len(),
        ))
    }

    async fn put_embedding(&mut self, id: &str, model: &str, vector: &[f32]) -> Result<bool> {
        let state = &mut *self.state;
        if !state.nodes.contains_key(id) {
            return Ok(false);
        }
        state.embeddings.insert(
            id.to_string(),
            StoredEmbedding {
                node_id: id.to_string(),
                model: model.to_string(),
                vector: vector.to_vec(),
            },
        );
        state.audit(AuditOperation::PutEmbedding {
            id: id.to_string(),
            model: model.to_string(),
            dimensions: vector.len(),
        });
        Ok(true)
    }

    async fn embeddings(&mut self) -> Result<Vec<StoredEmbedding>> {
        let mut embeddings: Vec<StoredEmbedding> =
            self.state.embeddings.values().cloned().collect();
        embeddings.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(embeddings)
    }
}

//! Graph store boundary
//!
//! A load opens exactly one [`GraphSession`] and holds it until the load is
//! over. Dropping the session releases it, whichever way the load ends.

use crate::error::Result;
use crate::model::{
    EdgeKey, EdgeOutcome, EdgeRecord, EdgeWrite, GraphStatistics, NodeRecord, NodeWrite,
    StoredEmbedding, WriteOutcome,
};
use async_trait::async_trait;
use stixgraph_core::{NodeDocument, PropertyMap};

/// A property-graph backend
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Acquire a scoped session with exclusive write access
    async fn session(&self) -> Result<Box<dyn GraphSession + '_>>;

    fn backend_name(&self) -> &'static str;
}

/// Operations available while a session is held
#[async_trait]
pub trait GraphSession: Send {
    /// Create or replace a node keyed by id. Labels and properties are
    /// replaced wholesale.
    async fn upsert_node(&mut self, node: NodeWrite) -> Result<WriteOutcome>;

    /// Create or replace an edge between two existing nodes. If either
    /// endpoint is missing nothing is written.
    async fn upsert_edge(&mut self, edge: EdgeWrite) -> Result<EdgeOutcome>;

    /// Replace all properties of an existing node. Returns false if there is no such node.
    async fn set_node_properties(&mut self, id: &str, properties: PropertyMap) -> Result<bool>;

    async fn node(&mut self, id: &str) -> Result<Option<NodeRecord>>;

    async fn edge(&mut self, key: &EdgeKey) -> Result<Option<EdgeRecord>>;

    async fn nodes(&mut self) -> Result<Vec<NodeRecord>>;

    async fn edges(&mut self) -> Result<Vec<EdgeRecord>>;

    async fn statistics(&mut self) -> Result<GraphStatistics>;

    async fn node_count(&mut self) -> Result<usize> {
        Ok(self.statistics().await?.nodes)
    }

    async fn edge_count(&mut self) -> Result<usize> {
        Ok(self.statistics().await?.edges)
    }

    /// Retrieval documents for every node with a name and description
    async fn documents(&mut self) -> Result<Vec<NodeDocument>> {
        let nodes = self.nodes().await?;
        let edges = self.edges().await?;
        Ok(crate::model::build_documents(&nodes, &edges))
    }

    /// Store (or replace) the vector for a node. Returns false if there is no such node.
    async fn put_embedding(&mut self, id: &str, model: &str, vector: &[f32]) -> Result<bool>;

    async fn embeddings(&mut self) -> Result<Vec<StoredEmbedding>>;
}

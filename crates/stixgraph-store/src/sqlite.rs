//! SQLite-backed graph store
//!
//! Every statement binds its values as parameters; no STIX content is ever
//! spliced into SQL text. All rows are namespaced by a graph name so several
//! graphs can share one database file.

use crate::error::Result;
use crate::model::{
    EdgeKey, EdgeOutcome, EdgeRecord, EdgeWrite, GraphStatistics, NodeRecord, NodeWrite,
    StoredEmbedding, WriteOutcome,
};
use crate::provenance::Provenance;
use crate::session::{GraphSession, GraphStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, SqlitePool};
use std::str::FromStr;
use stixgraph_core::{PropertyMap, PropertyValue};
use tracing::debug;

const EDGE_KIND_EXPLICIT: i64 = 0;
const EDGE_KIND_DERIVED: i64 = 1;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS nodes (
      graph TEXT NOT NULL,
      id TEXT NOT NULL,
      labels_json TEXT NOT NULL,
      properties_json TEXT NOT NULL,
      created TEXT,
      modified TEXT,
      provenance_json TEXT NOT NULL,
      PRIMARY KEY (graph, id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS edges (
      graph TEXT NOT NULL,
      edge_key TEXT NOT NULL,
      edge_kind INTEGER NOT NULL,
      rel_type TEXT NOT NULL,
      source_id TEXT NOT NULL,
      target_id TEXT NOT NULL,
      properties_json TEXT NOT NULL,
      provenance_json TEXT NOT NULL,
      PRIMARY KEY (graph, edge_key)
    );
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(graph, source_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(graph, target_id);"#,
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
      graph TEXT NOT NULL,
      node_id TEXT NOT NULL,
      model TEXT NOT NULL,
      vector_json TEXT NOT NULL,
      PRIMARY KEY (graph, node_id)
    );
    "#,
];

/// Graph store persisted in a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
    graph: String,
}

impl SqliteGraphStore {
    /// Connect (creating the database file if needed) and ensure the schema.
    /// `graph` names the namespace this store reads and writes.
    pub async fn connect(database_url: &str, graph: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| crate::StoreError::UnsupportedUri(format!("{}: {}", database_url, e)))?
            .create_if_missing(true);

        // one connection: loads are sequential and `sqlite::memory:` must not be split
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| crate::StoreError::Unavailable(e.to_string()))?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        debug!(database_url, graph, "sqlite graph store ready");

        Ok(Self {
            pool,
            graph: graph.to_string(),
        })
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn session(&self) -> Result<Box<dyn GraphSession + '_>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(SqliteSession {
            conn,
            graph: self.graph.clone(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Session holding one pooled connection; returned to the pool on drop
pub struct SqliteSession {
    conn: PoolConnection<Sqlite>,
    graph: String,
}

impl SqliteSession {
    async fn node_exists(&mut self, id: &str) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM nodes WHERE graph = ? AND id = ?")
            .bind(&self.graph)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(found.is_some())
    }

    async fn edge_exists(&mut self, storage_key: &str) -> Result<bool> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM edges WHERE graph = ? AND edge_key = ?")
                .bind(&self.graph)
                .bind(storage_key)
                .fetch_optional(&mut *self.conn)
                .await?;
        Ok(found.is_some())
    }
}

/// Normalize a STIX timestamp into RFC 3339 UTC; unparsable values are dropped
fn normalize_timestamp(properties: &PropertyMap, field: &str) -> Option<String> {
    let raw = properties.get(field).and_then(PropertyValue::as_str)?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[async_trait]
impl GraphSession for SqliteSession {
    async fn upsert_node(&mut self, node: NodeWrite) -> Result<WriteOutcome> {
        let outcome = if self.node_exists(&node.id).await? {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };

        sqlx::query(
            r#"
            INSERT INTO nodes(graph, id, labels_json, properties_json, created, modified, provenance_json)
            VALUES(?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(graph, id) DO UPDATE SET
              labels_json = excluded.labels_json,
              properties_json = excluded.properties_json,
              created = excluded.created,
              modified = excluded.modified,
              provenance_json = excluded.provenance_json
            "#,
        )
        .bind(&self.graph)
        .bind(&node.id)
        .bind(serde_json::to_string(&node.labels)?)
        .bind(serde_json::to_string(&node.properties)?)
        .bind(normalize_timestamp(&node.properties, "created"))
        .bind(normalize_timestamp(&node.properties, "modified"))
        .bind(serde_json::to_string(&node.provenance)?)
        .execute(&mut *self.conn)
        .await?;

        Ok(outcome)
    }

    async fn upsert_edge(&mut self, edge: EdgeWrite) -> Result<EdgeOutcome> {
        for endpoint in [&edge.source, &edge.target] {
            if !self.node_exists(endpoint).await? {
                return Ok(EdgeOutcome::MissingEndpoint(endpoint.clone()));
            }
        }

        let storage_key = edge.key.storage_key();
        let outcome = if self.edge_exists(&storage_key).await? {
            WriteOutcome::Updated
        } else {
            WriteOutcome::Created
        };
        let kind = if edge.key.is_derived() {
            EDGE_KIND_DERIVED
        } else {
            EDGE_KIND_EXPLICIT
        };

        sqlx::query(
            r#"
            INSERT INTO edges(graph, edge_key, edge_kind, rel_type, source_id, target_id, properties_json, provenance_json)
            VALUES(?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(graph, edge_key) DO UPDATE SET
              edge_kind = excluded.edge_kind,
              rel_type = excluded.rel_type,
              source_id = excluded.source_id,
              target_id = excluded.target_id,
              properties_json = excluded.properties_json,
              provenance_json = excluded.provenance_json
            "#,
        )
        .bind(&self.graph)
        .bind(&storage_key)
        .bind(kind)
        .bind(&edge.rel_type)
        .bind(&edge.source)
        .bind(&edge.target)
        .bind(serde_json::to_string(&edge.properties)?)
        .bind(serde_json::to_string(&edge.provenance)?)
        .execute(&mut *self.conn)
        .await?;

        Ok(EdgeOutcome::Written(outcome))
    }

    async fn set_node_properties(&mut self, id: &str, properties: PropertyMap) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE nodes SET properties_json = ?, created = ?, modified = ?
            WHERE graph = ? AND id = ?
            "#,
        )
        .bind(serde_json::to_string(&properties)?)
        .bind(normalize_timestamp(&properties, "created"))
        .bind(normalize_timestamp(&properties, "modified"))
        .bind(&self.graph)
        .bind(id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn node(&mut self, id: &str) -> Result<Option<NodeRecord>> {
        let row = sqlx::query_as::<_, NodeRow>(
            "SELECT id, labels_json, properties_json, provenance_json FROM nodes WHERE graph = ? AND id = ?",
        )
        .bind(&self.graph)
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;
        row.map(NodeRow::into_record).transpose()
    }

    async fn edge(&mut self, key: &EdgeKey) -> Result<Option<EdgeRecord>> {
        let row = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT edge_key, edge_kind, rel_type, source_id, target_id, properties_json, provenance_json
            FROM edges WHERE graph = ? AND edge_key = ?
            "#,
        )
        .bind(&self.graph)
        .bind(key.storage_key())
        .fetch_optional(&mut *self.conn)
        .await?;
        row.map(EdgeRow::into_record).transpose()
    }

    async fn nodes(&mut self) -> Result<Vec<NodeRecord>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT id, labels_json, properties_json, provenance_json FROM nodes WHERE graph = ? ORDER BY id",
        )
        .bind(&self.graph)
        .fetch_all(&mut *self.conn)
        .await?;
        rows.into_iter().map(NodeRow::into_record).collect()
    }

    async fn edges(&mut self) -> Result<Vec<EdgeRecord>> {
        let rows = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT edge_key, edge_kind, rel_type, source_id, target_id, properties_json, provenance_json
            FROM edges WHERE graph = ?
            "#,
        )
        .bind(&self.graph)
        .fetch_all(&mut *self.conn)
        .await?;
        let mut edges = rows
            .into_iter()
            .map(EdgeRow::into_record)
            .collect::<Result<Vec<_>>>()?;
        edges.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(edges)
    }

    async fn statistics(&mut self) -> Result<GraphStatistics> {
        let nodes = self.nodes().await?;
        let edges = self.edges().await?;
        let (embeddings,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM embeddings WHERE graph = ?")
                .bind(&self.graph)
                .fetch_one(&mut *self.conn)
                .await?;
        Ok(GraphStatistics::from_records(
            &nodes,
            &edges,
            embeddings as usize,
        ))
    }

    async fn put_embedding(&mut self, id: &str, model: &str, vector: &[f32]) -> Result<bool> {
        if !self.node_exists(id).await? {
            return Ok(false);
        }
        sqlx::query(
            r#"
            INSERT INTO embeddings(graph, node_id, model, vector_json)
            VALUES(?, ?, ?, ?)
            ON CONFLICT(graph, node_id) DO UPDATE SET
              model = excluded.model,
              vector_json = excluded.vector_json
            "#,
        )
        .bind(&self.graph)
        .bind(id)
        .bind(model)
        .bind(serde_json::to_string(vector)?)
        .execute(&mut *self.conn)
        .await?;
        Ok(true)
    }

    async fn embeddings(&mut self) -> Result<Vec<StoredEmbedding>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT node_id, model, vector_json FROM embeddings WHERE graph = ? ORDER BY node_id",
        )
        .bind(&self.graph)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter()
            .map(|(node_id, model, vector_json)| {
                Ok(StoredEmbedding {
                    node_id,
                    model,
                    vector: serde_json::from_str(&vector_json)?,
                })
            })
            .collect()
    }
}

#[derive(FromRow)]
struct NodeRow {
    id: String,
    labels_json: String,
    properties_json: String,
    provenance_json: String,
}

impl NodeRow {
    fn into_record(self) -> Result<NodeRecord> {
        Ok(NodeRecord {
            id: self.id,
            labels: serde_json::from_str(&self.labels_json)?,
            properties: serde_json::from_str(&self.properties_json)?,
            provenance: serde_json::from_str::<Provenance>(&self.provenance_json)?,
        })
    }
}

#[derive(FromRow)]
struct EdgeRow {
    edge_key: String,
    edge_kind: i64,
    rel_type: String,
    source_id: String,
    target_id: String,
    properties_json: String,
    provenance_json: String,
}

impl EdgeRow {
    fn into_record(self) -> Result<EdgeRecord> {
        let key = match self.edge_kind {
            EDGE_KIND_DERIVED => EdgeKey::derived(&self.source_id, &self.rel_type, &self.target_id),
            _ => EdgeKey::Explicit(self.edge_key),
        };
        Ok(EdgeRecord {
            key,
            rel_type: self.rel_type,
            source: self.source_id,
            target: self.target_id,
            properties: serde_json::from_str(&self.properties_json)?,
            provenance: serde_json::from_str(&self.provenance_json)?,
        })
    }
}

//! Store connection configuration

use crate::error::{Result, StoreError};
use crate::memory::MemoryGraphStore;
use crate::session::GraphStore;
use crate::sqlite::SqliteGraphStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Graph namespace used when no database name is given
pub const DEFAULT_GRAPH: &str = "default";

/// Store opened when no URI is configured; persists between runs
pub const DEFAULT_STORE_URI: &str = "sqlite://stixgraph.db";

/// Backend selected from a connection URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local graph, lost on exit
    Memory,
    /// SQLite file (or `sqlite::memory:`)
    Sqlite { url: String },
}

impl StoreBackend {
    pub fn from_uri(uri: &str) -> Result<Self> {
        if uri.starts_with("memory:") {
            Ok(StoreBackend::Memory)
        } else if uri.starts_with("sqlite:") {
            Ok(StoreBackend::Sqlite {
                url: uri.to_string(),
            })
        } else {
            Err(StoreError::UnsupportedUri(uri.to_string()))
        }
    }
}

/// Connection settings, usually supplied through the environment
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub uri: String,
    /// Graph namespace inside the backend
    pub database: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("uri", &self.uri)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StoreConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: None,
            username: None,
            password: None,
        }
    }

    pub fn graph(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_GRAPH)
    }

    /// Open the configured backend
    pub async fn open(&self) -> Result<Arc<dyn GraphStore>> {
        match StoreBackend::from_uri(&self.uri)? {
            StoreBackend::Memory => {
                info!("using in-memory graph store");
                Ok(Arc::new(MemoryGraphStore::new()))
            }
            StoreBackend::Sqlite { url } => {
                if self.username.is_some() || self.password.is_some() {
                    debug!("sqlite backend ignores username/password");
                }
                info!(url = %url, graph = self.graph(), "opening sqlite graph store");
                Ok(Arc::new(SqliteGraphStore::connect(&url, self.graph()).await?))
            }
        }
    }
}

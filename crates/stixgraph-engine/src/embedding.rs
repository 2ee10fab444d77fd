//! Node embeddings
//!
//! Every node with a name and description gets a vector for its document
//! text, stored beside the node and keyed by its id.

use crate::error::EmbedError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stixgraph_store::GraphStore;
use tracing::{debug, info, warn};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

/// Text → vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name recorded with each stored vector
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Embedder backed by an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Result<Self, EmbedError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn embed_url(&self) -> String {
        format!("{}/api/embeddings", self.url)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(self.embed_url())
            .json(&OllamaEmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaEmbedResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(EmbedError::EmptyVector);
        }
        Ok(parsed.embedding)
    }
}

/// Summary of an embedding pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedReport {
    pub model: String,
    pub embedded: usize,
    /// (node id, reason) for each node that could not be embedded
    pub failed: Vec<(String, String)>,
}

/// Embed every document in the graph. Per-node embedding failures are
/// recorded and skipped; store failures abort.
pub async fn embed_graph(
    store: &dyn GraphStore,
    embedder: &dyn Embedder,
) -> Result<EmbedReport, EmbedError> {
    let mut session = store.session().await?;
    let documents = session.documents().await?;
    info!(
        "Embedding {} documents with {}",
        documents.len(),
        embedder.model()
    );

    let mut report = EmbedReport {
        model: embedder.model().to_string(),
        ..Default::default()
    };

    for document in &documents {
        let vector = match embedder.embed(&document.text()).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Failed to embed {}: {}", document.id, e);
                report.failed.push((document.id.clone(), e.to_string()));
                continue;
            }
        };

        if session
            .put_embedding(&document.id, embedder.model(), &vector)
            .await?
        {
            debug!("Embedded {} ({} dimensions)", document.id, vector.len());
            report.embedded += 1;
        } else {
            report
                .failed
                .push((document.id.clone(), "node no longer exists".to_string()));
        }
    }

    info!(
        "Embedded {} documents, {} failed",
        report.embedded,
        report.failed.len()
    );
    Ok(report)
}

//! Vector search over stored node embeddings

use crate::embedding::Embedder;
use crate::error::EmbedError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use stixgraph_store::GraphStore;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub name: Option<String>,
    pub labels: Vec<String>,
    pub score: f32,
}

/// Cosine similarity, or `None` when the dimensions differ or a vector has zero length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

/// Rank stored vectors against the query, best first. Only vectors from
/// the embedder's model are compared.
pub async fn search(
    store: &dyn GraphStore,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>, EmbedError> {
    let query_vector = embedder.embed(query).await?;
    let mut session = store.session().await?;
    let embeddings = session.embeddings().await?;

    let mut scored: Vec<(String, f32)> = embeddings
        .into_iter()
        .filter_map(|stored| {
            if stored.model != embedder.model() {
                debug!(
                    "Ignoring vector for {} (model {}, query uses {})",
                    stored.node_id,
                    stored.model,
                    embedder.model()
                );
                return None;
            }
            let score = cosine_similarity(&query_vector, &stored.vector);
            if score.is_none() {
                debug!(
                    "Ignoring vector for {} ({} dimensions, query has {})",
                    stored.node_id,
                    stored.vector.len(),
                    query_vector.len()
                );
            }
            score.map(|s| (stored.node_id, s))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);

    let mut hits = Vec::with_capacity(scored.len());
    for (id, score) in scored {
        let node = session.node(&id).await?;
        hits.push(SearchHit {
            name: node
                .as_ref()
                .and_then(|n| n.text_property("name"))
                .map(str::to_string),
            labels: node.map(|n| n.labels).unwrap_or_default(),
            id,
            score,
        });
    }

    Ok(hits)
}

use std::collections::HashMap;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::embedder::Embedder;
use super::splitter::Splitter;
use super::{CollectionConfig, Document};

#[derive(Debug, Error, Clone)]
pub enum RetrievalError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("dimension mismatch: collection expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("query requires {0} for this mode")]
    MissingQueryField(&'static str),
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryMode {
    Vector,
    Text,
    Hybrid,
}

#[derive(Clone, Debug)]
pub struct Query {
    pub mode: QueryMode,
    pub top_k: usize,
    pub vector: Option<Vec<f32>>,
    pub text: Option<String>,
    pub vector_weight: Option<f32>,
    pub text_weight: Option<f32>,
}

impl Query {
    pub fn vector(vector: Vec<f32>, top_k: usize) -> Self {
        Self { mode: QueryMode::Vector, top_k, vector: Some(vector), text: None, vector_weight: None, text_weight: None }
    }

    pub fn text(text: impl Into<String>, top_k: usize) -> Self {
        Self { mode: QueryMode::Text, top_k, vector: None, text: Some(text.into()), vector_weight: None, text_weight: None }
    }

    pub fn hybrid(vector: Vec<f32>, text: impl Into<String>, top_k: usize) -> Self {
        Self {
            mode: QueryMode::Hybrid,
            top_k,
            vector: Some(vector),
            text: Some(text.into()),
            vector_weight: None,
            text_weight: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchHit {
    pub chunk_id: String,
    pub content: String,
    pub metadata: Value,
    pub score: f64,
}

#[derive(Clone, Debug)]
struct StoredChunk {
    id: String,
    content: String,
    metadata: Value,
    vector: Vec<f32>,
    terms: HashMap<String, u32>,
}

/// Reciprocal-rank-fusion constant shared by every hybrid query.
const RRF_K: f64 = 60.0;

/// All collections a retrieval engine instance knows about, each an
/// independent namespace with its own dimension and chunk set.
pub struct CollectionStore {
    configs: DashMap<String, CollectionConfig>,
    chunks: DashMap<String, Vec<StoredChunk>>,
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionStore {
    pub fn new() -> Self {
        Self { configs: DashMap::new(), chunks: DashMap::new() }
    }

    pub fn create_collection(&self, config: CollectionConfig) {
        self.chunks.entry(config.name.clone()).or_default();
        self.configs.insert(config.name.clone(), config);
    }

    /// Chunks each document with `splitter`, embeds every chunk, and
    /// inserts rows keyed by collection. Idempotent per-chunk id when a
    /// document id is supplied (each chunk id is `{doc_id}:{index}`);
    /// append-only (fresh uuids) otherwise.
    pub async fn upsert(
        &self,
        collection: &str,
        docs: &[Document],
        splitter: &Splitter,
        embedder: &dyn Embedder,
    ) -> Result<(), RetrievalError> {
        let config = self
            .configs
            .get(collection)
            .ok_or_else(|| RetrievalError::CollectionNotFound(collection.to_string()))?
            .clone();

        if embedder.dimension() != config.dimension {
            return Err(RetrievalError::DimensionMismatch { expected: config.dimension, got: embedder.dimension() });
        }

        let mut new_rows = Vec::new();
        for doc in docs {
            let pieces = splitter.split(&doc.content);
            for (index, chunk) in pieces.iter().enumerate() {
                let vectors = embedder
                    .embed(&[chunk.content.as_str()])
                    .await
                    .map_err(RetrievalError::EmbeddingFailed)?;
                let vector = vectors.into_iter().next().unwrap_or_default();
                if vector.len() != config.dimension {
                    return Err(RetrievalError::DimensionMismatch { expected: config.dimension, got: vector.len() });
                }

                let id = match &doc.id {
                    Some(doc_id) => format!("{doc_id}:{index}"),
                    None => Uuid::new_v4().to_string(),
                };

                new_rows.push(StoredChunk {
                    id,
                    content: chunk.content.clone(),
                    metadata: doc.metadata.clone(),
                    vector,
                    terms: tokenize_counts(&chunk.content),
                });
            }
        }

        let mut entry = self.chunks.entry(collection.to_string()).or_default();
        for row in new_rows {
            if let Some(existing) = entry.iter_mut().find(|c| c.id == row.id) {
                *existing = row;
            } else {
                entry.push(row);
            }
        }

        Ok(())
    }

    pub fn delete(&self, collection: &str, chunk_id: &str) {
        if let Some(mut entry) = self.chunks.get_mut(collection) {
            entry.retain(|c| c.id != chunk_id);
        }
    }

    pub fn search(&self, collection: &str, query: &Query) -> Result<Vec<SearchHit>, RetrievalError> {
        let config = self
            .configs
            .get(collection)
            .ok_or_else(|| RetrievalError::CollectionNotFound(collection.to_string()))?;
        let rows = self.chunks.get(collection).ok_or_else(|| RetrievalError::CollectionNotFound(collection.to_string()))?;

        match query.mode {
            QueryMode::Vector => {
                let vector = query.vector.as_ref().ok_or(RetrievalError::MissingQueryField("vector"))?;
                Ok(vector_search(&rows, vector, query.top_k))
            }
            QueryMode::Text => {
                let text = query.text.as_ref().ok_or(RetrievalError::MissingQueryField("text"))?;
                Ok(text_search(&rows, text, query.top_k))
            }
            QueryMode::Hybrid => {
                let vector = query.vector.as_ref().ok_or(RetrievalError::MissingQueryField("vector"))?;
                let text = query.text.as_ref().ok_or(RetrievalError::MissingQueryField("text"))?;
                let vector_weight = query.vector_weight.unwrap_or(config.hybrid_vector_weight);
                let text_weight = query.text_weight.unwrap_or(config.hybrid_text_weight);
                Ok(hybrid_search(&rows, vector, text, vector_weight, text_weight, query.top_k))
            }
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn tokenize_counts(content: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in content.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        *counts.entry(token.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

fn tokenize_terms(query: &str) -> Vec<String> {
    query.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(|t| t.to_lowercase()).collect()
}

fn lexical_score(terms: &HashMap<String, u32>, query_terms: &[String]) -> f64 {
    query_terms.iter().filter_map(|t| terms.get(t)).map(|&count| count as f64).sum()
}

fn vector_search(rows: &[StoredChunk], query_vector: &[f32], top_k: usize) -> Vec<SearchHit> {
    let mut scored: Vec<(f64, &StoredChunk)> =
        rows.iter().map(|row| (cosine_similarity(query_vector, &row.vector) as f64, row)).collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then_with(|| a.1.id.cmp(&b.1.id)));
    scored.into_iter().take(top_k).map(|(score, row)| to_hit(row, score)).collect()
}

fn text_search(rows: &[StoredChunk], query: &str, top_k: usize) -> Vec<SearchHit> {
    let query_terms = tokenize_terms(query);
    let mut scored: Vec<(f64, &StoredChunk)> = rows
        .iter()
        .map(|row| (lexical_score(&row.terms, &query_terms), row))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then_with(|| a.1.id.cmp(&b.1.id)));
    scored.into_iter().take(top_k).map(|(score, row)| to_hit(row, score)).collect()
}

/// Runs vector and text queries independently (limit `2K` each), assigns
/// each hit a per-modality rank, and fuses with Reciprocal Rank Fusion.
/// Chunks present in only one modality use 0 for the missing term.
fn hybrid_search(
    rows: &[StoredChunk],
    query_vector: &[f32],
    query_text: &str,
    vector_weight: f32,
    text_weight: f32,
    top_k: usize,
) -> Vec<SearchHit> {
    let widened = (2 * top_k).max(top_k);
    let vector_hits = vector_search(rows, query_vector, widened);
    let text_hits = text_search(rows, query_text, widened);

    let vector_ranks: HashMap<&str, usize> =
        vector_hits.iter().enumerate().map(|(i, h)| (h.chunk_id.as_str(), i + 1)).collect();
    let text_ranks: HashMap<&str, usize> =
        text_hits.iter().enumerate().map(|(i, h)| (h.chunk_id.as_str(), i + 1)).collect();

    let mut candidate_ids: Vec<&str> = vector_ranks.keys().chain(text_ranks.keys()).copied().collect();
    candidate_ids.sort_unstable();
    candidate_ids.dedup();

    let rows_by_id: HashMap<&str, &StoredChunk> = rows.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut fused: Vec<(f64, &StoredChunk)> = candidate_ids
        .into_iter()
        .filter_map(|id| rows_by_id.get(id).map(|&row| (id, row)))
        .map(|(id, row)| {
            let v_term = vector_ranks.get(id).map(|rank| vector_weight as f64 / (RRF_K + *rank as f64)).unwrap_or(0.0);
            let t_term = text_ranks.get(id).map(|rank| text_weight as f64 / (RRF_K + *rank as f64)).unwrap_or(0.0);
            (v_term + t_term, row)
        })
        .collect();

    fused.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then_with(|| a.1.id.cmp(&b.1.id)));
    fused.into_iter().take(top_k).map(|(score, row)| to_hit(row, score)).collect()
}

fn to_hit(row: &StoredChunk, score: f64) -> SearchHit {
    SearchHit { chunk_id: row.id.clone(), content: row.content.clone(), metadata: row.metadata.clone(), score }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::MockEmbedder;

    async fn seeded_store() -> CollectionStore {
        let store = CollectionStore::new();
        store.create_collection(CollectionConfig::new("docs", 8));
        let embedder = MockEmbedder::new(8);
        let splitter = Splitter::new(1000, 0);
        let docs = vec![
            Document::new("rust ownership and borrowing").with_id("d1"),
            Document::new("python duck typing").with_id("d2"),
        ];
        store.upsert("docs", &docs, &splitter, &embedder).await.unwrap();
        store
    }

    #[tokio::test]
    async fn upsert_rejects_dimension_mismatch() {
        let store = CollectionStore::new();
        store.create_collection(CollectionConfig::new("docs", 8));
        let embedder = MockEmbedder::new(16);
        let splitter = Splitter::default();
        let err = store.upsert("docs", &[Document::new("hi")], &splitter, &embedder).await.unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn upsert_with_same_id_is_idempotent() {
        let store = seeded_store().await;
        let embedder = MockEmbedder::new(8);
        let splitter = Splitter::new(1000, 0);
        store
            .upsert("docs", &[Document::new("rust ownership and borrowing, updated").with_id("d1")], &splitter, &embedder)
            .await
            .unwrap();
        let query = Query::text("updated", 10);
        let hits = store.search("docs", &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "d1:0");
    }

    #[tokio::test]
    async fn text_search_only_returns_matching_rows() {
        let store = seeded_store().await;
        let hits = store.search("docs", &Query::text("python", 10)).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("python"));
    }

    #[tokio::test]
    async fn vector_search_returns_top_k_ordered_by_score() {
        let store = seeded_store().await;
        let embedder = MockEmbedder::new(8);
        let query_vec = embedder.embed(&["rust ownership and borrowing"]).await.unwrap().remove(0);
        let hits = store.search("docs", &Query::vector(query_vec, 1)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "d1:0");
    }

    #[test]
    fn hybrid_rrf_ordering_matches_worked_example() {
        // A (vector rank 1, text rank 3), B (vector rank 2, text rank 1),
        // C (vector rank 3, text rank 2), weights (0.7, 0.3).
        let rows = vec![
            StoredChunk { id: "A".into(), content: "a".into(), metadata: Value::Null, vector: vec![1.0, 0.0], terms: HashMap::new() },
            StoredChunk { id: "B".into(), content: "b".into(), metadata: Value::Null, vector: vec![0.9, 0.1], terms: HashMap::new() },
            StoredChunk { id: "C".into(), content: "c".into(), metadata: Value::Null, vector: vec![0.8, 0.2], terms: HashMap::new() },
        ];

        // vector_search ranks by cosine similarity to [1.0, 0.0]: A > B > C.
        let query_vector = vec![1.0, 0.0];
        // text_search ranks by term overlap; rig terms so B > C > A.
        let mut rows = rows;
        rows[0].terms = [("rust".to_string(), 1)].into_iter().collect();
        rows[1].terms = [("rust".to_string(), 3)].into_iter().collect();
        rows[2].terms = [("rust".to_string(), 2)].into_iter().collect();

        let hits = hybrid_search(&rows, &query_vector, "rust", 0.7, 0.3, 3);
        let order: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn delete_removes_chunk_from_subsequent_searches() {
        let store = seeded_store().await;
        store.delete("docs", "d2:0");
        let hits = store.search("docs", &Query::text("python", 10)).unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn unknown_collection_is_an_error() {
        let store = CollectionStore::new();
        let err = store.search("missing", &Query::text("x", 5)).unwrap_err();
        assert!(matches!(err, RetrievalError::CollectionNotFound(_)));
    }
}

//! Hybrid vector + lexical retrieval engine: chunking, embedding, and
//! collection-scoped upsert/search/delete with Reciprocal Rank Fusion.

mod embedder;
mod splitter;
mod store;

pub use embedder::{Embedder, MockEmbedder};
pub use splitter::{Chunk, Splitter};
pub use store::{CollectionStore, Query, QueryMode, RetrievalError, SearchHit};

use serde_json::Value;

/// A document handed to [`CollectionStore::upsert`] before chunking.
#[derive(Clone, Debug)]
pub struct Document {
    pub id: Option<String>,
    pub content: String,
    pub metadata: Value,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self { id: None, content: content.into(), metadata: Value::Null }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A named collection: fixes the embedding dimension and similarity metric
/// shared by every chunk stored under it.
#[derive(Clone, Debug)]
pub struct CollectionConfig {
    pub name: String,
    pub dimension: usize,
    pub hybrid_vector_weight: f32,
    pub hybrid_text_weight: f32,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self { name: name.into(), dimension, hybrid_vector_weight: 0.7, hybrid_text_weight: 0.3 }
    }
}

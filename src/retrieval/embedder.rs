use async_trait::async_trait;

/// Converts text into fixed-dimension vectors. `dimension()` must match
/// every vector `embed` returns, and must match the collection's configured
/// dimension for upserts to succeed.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String>;
    fn dimension(&self) -> usize;
}

/// Deterministic embedder for tests: hashes each byte of the input into a
/// fixed-width vector so the same text always produces the same vector
/// without calling an external model.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0f32; self.dimension];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % self.dimension] += byte as f32 / 256.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_always_embeds_to_the_same_vector() {
        let embedder = MockEmbedder::new(8);
        let a = embedder.embed(&["hello"]).await.unwrap();
        let b = embedder.embed(&["hello"]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn vectors_match_configured_dimension() {
        let embedder = MockEmbedder::new(16);
        let vectors = embedder.embed(&["a", "b"]).await.unwrap();
        for v in vectors {
            assert_eq!(v.len(), 16);
        }
    }
}

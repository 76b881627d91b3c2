//! Text embeddings for similarity search

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::core::{FlowError, FlowResult};

/// A fixed-dimension vector embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    /// Create an embedding; empty vectors are rejected
    pub fn new(values: Vec<f32>) -> FlowResult<Self> {
        if values.is_empty() {
            return Err(FlowError::vector_store("embedding vector cannot be empty"));
        }
        Ok(Self { values })
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Cosine similarity in `[-1, 1]`; zero-magnitude vectors score 0
    pub fn cosine_similarity(&self, other: &Self) -> FlowResult<f32> {
        if self.dimension() != other.dimension() {
            return Err(FlowError::vector_store(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension(),
                other.dimension()
            )));
        }

        let dot: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();
        let mag_a: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = other.values.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a == 0.0 || mag_b == 0.0 {
            return Ok(0.0);
        }
        Ok(dot / (mag_a * mag_b))
    }
}

/// Service that turns text into embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> FlowResult<Embedding>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Deterministic bag-of-words embedder
///
/// Each lowercase alphanumeric token is hashed into one of `dimension`
/// buckets, so texts sharing vocabulary land close to each other. Good
/// enough for local runs and tests; production deployments plug in a model.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() % self.dimension as u64) as usize
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> FlowResult<Embedding> {
        let mut values = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            values[self.bucket(&token)] += 1.0;
        }
        Embedding::new(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

//! Deterministic local embeddings.
//!
//! [`HashingEmbeddingProvider`] folds every lowercase alphanumeric term into a
//! fixed number of buckets and L2-normalizes the counts. Texts that share
//! vocabulary end up close under cosine similarity. It needs no network or
//! model files, which makes it the default for offline runs and tests.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Terms too common to carry meaning in a query.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "into", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to",
    "what", "when", "which", "who", "why", "with",
];

/// A bag-of-words embedder using the hashing trick.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Default number of buckets.
    pub const DEFAULT_DIMENSIONS: usize = 1024;

    /// Create a provider producing `dimensions`-long vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::InvalidConfiguration(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    fn bucket(&self, term: &str) -> usize {
        // FNV-1a
        let hash = term
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3));
        (hash % self.dimensions as u64) as usize
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self { dimensions: Self::DEFAULT_DIMENSIONS }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    fn name(&self) -> &str {
        "Hashing"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for term in lowered.split(|c: char| !c.is_alphanumeric()) {
            if term.is_empty() || STOP_WORDS.contains(&term) {
                continue;
            }
            vector[self.bucket(term)] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

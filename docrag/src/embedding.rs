//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A provider that maps text to fixed-length vectors.
///
/// Implementations wrap a specific embedding backend behind an async
/// interface. Failures must be reported as [`RagError::EmbeddingError`];
/// returning an empty vector is never a valid success.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::EmbeddingProvider;
///
/// let provider = HashingEmbeddingProvider::new(512)?;
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// for each input in order. Backends with a native batch endpoint
    /// should override it.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Check that `embedding` is non-empty and has the provider's dimension.
pub(crate) fn check_embedding(provider: &dyn EmbeddingProvider, embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(RagError::EmbeddingError {
            provider: provider.name().to_string(),
            message: "provider returned an empty embedding".to_string(),
        });
    }
    if embedding.len() != provider.dimensions() {
        return Err(RagError::EmbeddingError {
            provider: provider.name().to_string(),
            message: format!(
                "expected {} dimensions, got {}",
                provider.dimensions(),
                embedding.len()
            ),
        });
    }
    Ok(())
}

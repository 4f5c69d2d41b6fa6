//! Query-time retrieval: embed the query, fetch the nearest chunks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::document::SearchResult;
use crate::embedding::{EmbeddingProvider, check_embedding};
use crate::error::{RagError, Result, with_timeout};
use crate::vectorstore::VectorStore;

/// Fetches the chunks most similar to a query from one collection.
///
/// # Example
///
/// ```rust,ignore
/// let retriever = Retriever::new(embedder, store, "rag_documents", Duration::from_secs(30));
/// let results = retriever.retrieve("What is RAG?", 5).await?;
/// ```
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    timeout: Duration,
}

impl Retriever {
    /// Create a retriever over `collection`.
    ///
    /// `timeout` bounds the query embedding call.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { embedding_provider, vector_store, collection: collection.into(), timeout }
    }

    /// The collection this retriever searches.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Return up to `top_k` chunks ordered by descending similarity.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidConfiguration`] if `top_k` is zero.
    /// - [`RagError::EmbeddingError`] or [`RagError::TimeoutError`] if the
    ///   query cannot be embedded.
    /// - [`RagError::RetrievalError`] if the collection is empty or the
    ///   vector store cannot be reached.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "top_k must be greater than zero".to_string(),
            ));
        }

        let embedding =
            with_timeout("query embedding", self.timeout, self.embedding_provider.embed(query))
                .await
                .inspect_err(|e| error!(error = %e, "query embedding failed"))?;
        check_embedding(self.embedding_provider.as_ref(), &embedding)?;

        let stored = self.vector_store.count(&self.collection).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "vector store unreachable");
            RagError::RetrievalError(format!(
                "vector store '{}' unreachable: {e}",
                self.vector_store.name()
            ))
        })?;
        if stored == 0 {
            return Err(RagError::RetrievalError(format!(
                "collection '{}' is empty",
                self.collection
            )));
        }

        let results =
            self.vector_store.search(&self.collection, &embedding, top_k).await.map_err(|e| {
                error!(collection = %self.collection, error = %e, "vector store search failed");
                RagError::RetrievalError(format!(
                    "search failed in collection '{}': {e}",
                    self.collection
                ))
            })?;

        debug!(collection = %self.collection, top_k, result_count = results.len(), "retrieved");
        Ok(results)
    }
}

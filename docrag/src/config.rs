//! Configuration for the RAG pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the RAG pipeline.
///
/// Deserialized configs are unchecked; call [`RagConfig::validate`] (the
/// builder does this for you) before handing one to a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in tokens.
    pub chunk_size: usize,
    /// Number of overlapping tokens between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to retrieve for a query.
    pub top_k: usize,
    /// Maximum number of tokens the generator may produce.
    pub max_response_tokens: usize,
    /// Maximum number of context tokens placed into a prompt.
    pub max_context_tokens: usize,
    /// Number of documents embedded concurrently during indexing.
    pub index_concurrency: usize,
    /// Timeout in seconds for each embedding or generation call.
    pub request_timeout_secs: u64,
    /// Name of the vector store collection holding the chunks.
    pub collection: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            max_response_tokens: 1000,
            max_context_tokens: 8000,
            index_concurrency: 4,
            request_timeout_secs: 30,
            collection: "rag_documents".to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The per-call timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `max_response_tokens`, `max_context_tokens`, `index_concurrency` or
    ///   `request_timeout_secs` is zero
    /// - `collection` is empty
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("max_response_tokens", self.max_response_tokens),
            ("max_context_tokens", self.max_context_tokens),
            ("index_concurrency", self.index_concurrency),
        ] {
            if value == 0 {
                return Err(RagError::InvalidConfiguration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::InvalidConfiguration(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.collection.trim().is_empty() {
            return Err(RagError::InvalidConfiguration(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in tokens.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in tokens.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to retrieve.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the maximum number of tokens in a generated response.
    pub fn max_response_tokens(mut self, tokens: usize) -> Self {
        self.config.max_response_tokens = tokens;
        self
    }

    /// Set the cap on context tokens placed into a prompt.
    pub fn max_context_tokens(mut self, tokens: usize) -> Self {
        self.config.max_context_tokens = tokens;
        self
    }

    /// Set how many documents are embedded concurrently while indexing.
    pub fn index_concurrency(mut self, concurrency: usize) -> Self {
        self.config.index_concurrency = concurrency;
        self
    }

    /// Set the timeout, in whole seconds, for each embedding or generation call.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the vector store collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] under the conditions listed
    /// on [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Error types for the `docrag` crate.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunk, overlap, `top_k` or other settings are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A dataset record or file could not be turned into a document.
    #[error("Dataset error: {message}")]
    DatasetError {
        /// Position of the offending record in its batch, if known.
        record: Option<usize>,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The store is empty or could not be searched.
    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    /// The generative model failed or returned nothing.
    #[error("Generation error ({generator}): {message}")]
    GenerationError {
        /// The generator that produced the error.
        generator: String,
        /// The underlying cause, verbatim.
        message: String,
    },

    /// The pipeline is not in a state that allows the requested operation.
    #[error("Pipeline not ready: {operation} requires {required}, current state is {state}")]
    NotReadyError {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the operation needs.
        required: PipelineState,
        /// The state the pipeline was in.
        state: PipelineState,
    },

    /// An external call did not finish within the configured timeout.
    #[error("Timed out after {timeout:?} waiting for {operation}")]
    TimeoutError {
        /// The operation that timed out.
        operation: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

impl RagError {
    pub(crate) fn dataset(record: Option<usize>, message: impl Into<String>) -> Self {
        let message = match record {
            Some(index) => format!("record {index}: {}", message.into()),
            None => message.into(),
        };
        Self::DatasetError { record, message }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Await `future`, failing with [`RagError::TimeoutError`] once `timeout` elapses.
pub(crate) async fn with_timeout<T>(
    operation: &str,
    timeout: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| RagError::TimeoutError { operation: operation.to_string(), timeout })?
}

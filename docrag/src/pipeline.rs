//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] drives the load → index → query workflow by composing
//! an [`EmbeddingProvider`], a [`VectorStore`], a [`Chunker`] and a
//! [`Generator`]. It moves through [`PipelineState`]s and refuses operations
//! that the current state does not allow.
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{RagPipeline, RagConfig, InMemoryVectorStore, HashingEmbeddingProvider};
//!
//! let mut pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .generator(Arc::new(GeminiGenerator::from_env()?))
//!     .build()?;
//!
//! pipeline.load(&records)?;
//! pipeline.index().await?;
//! let answer = pipeline.query("What is RAG?", 5).await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::chunking::{Chunker, TokenWindowChunker};
use crate::config::RagConfig;
use crate::dataset::{DatasetLoader, DatasetOptions, LoadReport};
use crate::document::{Chunk, Document, QueryResult};
use crate::embedding::{EmbeddingProvider, check_embedding};
use crate::error::{RagError, Result, with_timeout};
use crate::generator::Generator;
use crate::prompt::PromptBuilder;
use crate::retriever::Retriever;
use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};
use crate::vectorstore::VectorStore;

/// Lifecycle state of a [`RagPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// No documents loaded.
    Empty,
    /// Documents loaded, some not yet indexed.
    Loaded,
    /// Every loaded document is chunked, embedded and stored.
    Indexed,
    /// Indexed and the store holds chunks to search.
    Ready,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Empty => "Empty",
            PipelineState::Loaded => "Loaded",
            PipelineState::Indexed => "Indexed",
            PipelineState::Ready => "Ready",
        };
        f.write_str(name)
    }
}

/// A document that could not be indexed.
#[derive(Debug)]
pub struct IndexFailure {
    /// The document that failed.
    pub document_id: String,
    /// Why it failed.
    pub error: RagError,
}

/// The outcome of one [`RagPipeline::index`] call.
///
/// Failed documents stay pending; calling `index` again retries only them.
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Documents fully stored by this call.
    pub indexed: Vec<String>,
    /// Documents that failed, with their errors.
    pub failed: Vec<IndexFailure>,
    /// Chunks written to the vector store.
    pub chunks_stored: usize,
    /// Chunks skipped because their id was already stored.
    pub chunks_skipped: usize,
}

impl IndexReport {
    /// Whether every attempted document was indexed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Counts describing what the pipeline holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Vector store collection name.
    pub collection: String,
    /// Chunks stored in the collection.
    pub chunk_count: usize,
    /// Documents loaded into the pipeline.
    pub document_count: usize,
    /// Loaded documents that are fully indexed.
    pub indexed_document_count: usize,
}

/// Chunks produced for one document and the outcome of storing them.
struct DocumentOutcome {
    document_id: String,
    result: Result<(Vec<String>, usize)>,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    generator: Arc<dyn Generator>,
    retriever: Retriever,
    prompt_builder: PromptBuilder,
    loader: DatasetLoader,
    documents: Vec<Document>,
    indexed: HashSet<String>,
    stored_chunks: HashSet<String>,
    state: PipelineState,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Return the loaded documents in load order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Validate and add dataset records.
    ///
    /// Valid records become documents; invalid ones are listed in the
    /// returned [`LoadReport`]. Loading into an indexed pipeline moves it
    /// back to [`PipelineState::Loaded`] until the new documents are indexed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DatasetError`] if `records` is empty or no record
    /// is valid. The pipeline is left unchanged in that case.
    pub fn load(&mut self, records: &[Value]) -> Result<LoadReport> {
        let report = self.loader.parse_records(records)?;
        self.add_documents(&report);
        Ok(report)
    }

    /// Read a JSON dataset file and load its records.
    ///
    /// # Errors
    ///
    /// See [`RagPipeline::load`]; unreadable or malformed files are also
    /// reported as [`RagError::DatasetError`].
    pub fn load_json_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<LoadReport> {
        let report = self.loader.load_json_file(path)?;
        self.add_documents(&report);
        Ok(report)
    }

    fn add_documents(&mut self, report: &LoadReport) {
        self.documents.extend(report.documents.iter().cloned());
        self.state = PipelineState::Loaded;
        info!(
            loaded = report.documents.len(),
            rejected = report.rejected.len(),
            total = self.documents.len(),
            "documents loaded"
        );
    }

    /// Chunk, embed and store every document that is not yet indexed.
    ///
    /// Documents are processed concurrently, up to `index_concurrency` at a
    /// time. Chunks whose id is already stored are skipped, so repeated calls
    /// never duplicate data. When every document is indexed the pipeline
    /// becomes [`PipelineState::Ready`]; otherwise it stays
    /// [`PipelineState::Loaded`] and the report lists the failures.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotReadyError`] if nothing is loaded, and
    /// [`RagError::VectorStoreError`] if the collection cannot be created or
    /// counted. Per-document failures are reported in [`IndexReport::failed`].
    pub async fn index(&mut self) -> Result<IndexReport> {
        if self.state == PipelineState::Empty {
            return Err(RagError::NotReadyError {
                operation: "index",
                required: PipelineState::Loaded,
                state: self.state,
            });
        }

        let collection = self.config.collection.as_str();
        self.vector_store
            .create_collection(collection, self.embedding_provider.dimensions())
            .await
            .inspect_err(|e| error!(collection, error = %e, "failed to create collection"))?;

        let this = &*self;
        let pending: Vec<&Document> =
            this.documents.iter().filter(|d| !this.indexed.contains(&d.id)).collect();
        info!(collection, pending = pending.len(), "indexing documents");

        let outcomes: Vec<DocumentOutcome> = stream::iter(pending)
            .map(|document| async move {
                DocumentOutcome {
                    document_id: document.id.clone(),
                    result: this.index_document(document).await,
                }
            })
            .buffer_unordered(this.config.index_concurrency)
            .collect()
            .await;

        let mut report = IndexReport::default();
        for outcome in outcomes {
            match outcome.result {
                Ok((stored, skipped)) => {
                    report.chunks_stored += stored.len();
                    report.chunks_skipped += skipped;
                    self.stored_chunks.extend(stored);
                    self.indexed.insert(outcome.document_id.clone());
                    report.indexed.push(outcome.document_id);
                }
                Err(error) => {
                    warn!(document.id = %outcome.document_id, error = %error, "document not indexed");
                    report.failed.push(IndexFailure { document_id: outcome.document_id, error });
                }
            }
        }

        if report.is_complete() {
            self.state = PipelineState::Indexed;
            let stored = self.vector_store.count(&self.config.collection).await?;
            if stored > 0 {
                self.state = PipelineState::Ready;
            }
        }

        info!(
            indexed = report.indexed.len(),
            failed = report.failed.len(),
            chunks_stored = report.chunks_stored,
            chunks_skipped = report.chunks_skipped,
            state = %self.state,
            "indexing finished"
        );
        Ok(report)
    }

    /// Chunk one document and store the chunks not stored before.
    ///
    /// Returns the ids written and the number skipped.
    async fn index_document(&self, document: &Document) -> Result<(Vec<String>, usize)> {
        let chunks = self.chunker.chunk(document);
        let total = chunks.len();

        let mut seen = HashSet::new();
        let mut chunks: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !self.stored_chunks.contains(&c.id) && seen.insert(c.id.clone()))
            .collect();
        let skipped = total - chunks.len();
        if chunks.is_empty() {
            info!(document.id = %document.id, skipped, "no new chunks");
            return Ok((Vec::new(), skipped));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = with_timeout(
            "chunk embedding",
            self.config.request_timeout(),
            self.embedding_provider.embed_batch(&texts),
        )
        .await
        .inspect_err(|e| error!(document.id = %document.id, error = %e, "embedding failed"))?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.name().to_string(),
                message: format!(
                    "expected {} embeddings for document '{}', got {}",
                    chunks.len(),
                    document.id,
                    embeddings.len()
                ),
            });
        }
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            check_embedding(self.embedding_provider.as_ref(), &embedding)?;
            chunk.embedding = embedding;
        }

        self.vector_store.upsert(&self.config.collection, &chunks).await.inspect_err(
            |e| error!(document.id = %document.id, error = %e, "upsert failed"),
        )?;

        info!(document.id = %document.id, chunk_count = chunks.len(), skipped, "indexed document");
        Ok((chunks.into_iter().map(|c| c.id).collect(), skipped))
    }

    /// Answer `query` from the `top_k` most similar chunks.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReadyError`] unless the pipeline is
    ///   [`PipelineState::Ready`].
    /// - [`RagError::InvalidConfiguration`] if `top_k` is zero.
    /// - [`RagError::RetrievalError`], [`RagError::EmbeddingError`],
    ///   [`RagError::GenerationError`] or [`RagError::TimeoutError`] from the
    ///   underlying steps, unchanged.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<QueryResult> {
        if self.state != PipelineState::Ready {
            return Err(RagError::NotReadyError {
                operation: "query",
                required: PipelineState::Ready,
                state: self.state,
            });
        }

        let retrieved_chunks = self.retriever.retrieve(query, top_k).await?;
        let prompt = self.prompt_builder.build(query, &retrieved_chunks);

        let response_text = with_timeout(
            "generation",
            self.config.request_timeout(),
            self.generator.generate(&prompt.text, self.config.max_response_tokens),
        )
        .await
        .inspect_err(|e| error!(generator = self.generator.name(), error = %e, "generation failed"))?;

        info!(
            result_count = retrieved_chunks.len(),
            context_chunks = prompt.context_chunks,
            response_len = response_text.len(),
            "query completed"
        );

        Ok(QueryResult { retrieved_chunks, response_text, context_chunks: prompt.context_chunks })
    }

    /// Report collection and document counts.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if the store cannot be counted.
    /// A collection that was never created counts as empty.
    pub async fn stats(&self) -> Result<CollectionStats> {
        let chunk_count = if self.indexed.is_empty() && self.stored_chunks.is_empty() {
            0
        } else {
            self.vector_store.count(&self.config.collection).await?
        };
        Ok(CollectionStats {
            collection: self.config.collection.clone(),
            chunk_count,
            document_count: self.documents.len(),
            indexed_document_count: self.indexed.len(),
        })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider`, `vector_store` and `generator` are
/// required. Without an explicit chunker a [`TokenWindowChunker`] is built
/// from the config's chunk size and overlap.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .generator(Arc::new(generator))
///     .dataset_options(DatasetOptions::default().with_text_field("body"))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generator: Option<Arc<dyn Generator>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    dataset_options: Option<DatasetOptions>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Replace the default token window chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the generator that writes answers.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the tokenizer used for chunking and the prompt context cap.
    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Set how dataset records map onto documents.
    pub fn dataset_options(mut self, options: DatasetOptions) -> Self {
        self.dataset_options = Some(options);
        self
    }

    /// Build the [`RagPipeline`], validating the config and required parts.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if a required field is
    /// missing or the config is inconsistent.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self
            .config
            .ok_or_else(|| RagError::InvalidConfiguration("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RagError::InvalidConfiguration("embedding_provider is required".to_string())
        })?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::InvalidConfiguration("vector_store is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RagError::InvalidConfiguration("generator is required".to_string()))?;

        let tokenizer: Arc<dyn Tokenizer> =
            self.tokenizer.unwrap_or_else(|| Arc::new(WhitespaceTokenizer));
        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(TokenWindowChunker::with_tokenizer(
                config.chunk_size,
                config.chunk_overlap,
                tokenizer.clone(),
            )?),
        };

        let retriever = Retriever::new(
            embedding_provider.clone(),
            vector_store.clone(),
            config.collection.clone(),
            config.request_timeout(),
        );
        let prompt_builder = PromptBuilder::with_tokenizer(config.max_context_tokens, tokenizer);

        Ok(RagPipeline {
            retriever,
            prompt_builder,
            loader: DatasetLoader::new(self.dataset_options.unwrap_or_default()),
            documents: Vec::new(),
            indexed: HashSet::new(),
            stored_chunks: HashSet::new(),
            state: PipelineState::Empty,
            config,
            embedding_provider,
            vector_store,
            chunker,
            generator,
        })
    }
}

impl fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagPipeline")
            .field("state", &self.state)
            .field("collection", &self.config.collection)
            .field("documents", &self.documents.len())
            .field("indexed", &self.indexed.len())
            .finish_non_exhaustive()
    }
}

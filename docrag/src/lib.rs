//! # docrag
//!
//! Retrieval-augmented question answering over a document collection.
//!
//! Documents are split into overlapping token windows, embedded, and stored
//! in a vector store. A query is embedded, the nearest chunks are fetched,
//! and a generative model answers from those chunks only.
//!
//! ## Components
//!
//! - [`TokenWindowChunker`] splits documents into overlapping token windows.
//! - [`EmbeddingProvider`] maps text to vectors; [`HashingEmbeddingProvider`]
//!   is a local, deterministic implementation.
//! - [`VectorStore`] persists chunks; [`InMemoryVectorStore`] ranks them by
//!   cosine similarity.
//! - [`Retriever`] embeds a query and fetches the top-K chunks.
//! - [`PromptBuilder`] places ranked chunks into a capped context block.
//! - [`Generator`] produces the answer.
//! - [`RagPipeline`] wires everything together behind `load`, `index` and
//!   `query`.
//!
//! ## Features
//!
//! - `gemini` enables [`gemini::GeminiGenerator`] and
//!   [`gemini::GeminiEmbeddingProvider`].

pub mod chunking;
pub mod config;
pub mod dataset;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod hashing;
pub mod inmemory;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod tokenizer;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;

pub use chunking::{Chunker, TokenWindowChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use dataset::{DatasetLoader, DatasetOptions, LoadReport, RejectedRecord};
pub use document::{Chunk, Document, QueryResult, SearchResult, chunk_id};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generator::Generator;
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{
    CollectionStats, IndexFailure, IndexReport, PipelineState, RagPipeline, RagPipelineBuilder,
};
pub use prompt::{Prompt, PromptBuilder};
pub use retriever::Retriever;
pub use tokenizer::{Tokenizer, WhitespaceTokenizer};
pub use vectorstore::VectorStore;

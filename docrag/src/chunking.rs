//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`TokenWindowChunker`],
//! which splits a document into fixed-size token windows where consecutive
//! windows share a configurable number of tokens.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::document::{CHUNK_INDEX_KEY, Chunk, Document, chunk_id};
use crate::error::{RagError, Result};
use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no tokens.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into windows of at most `chunk_size` tokens, where each
/// window starts `chunk_overlap` tokens before the previous one ended.
///
/// Chunk IDs are derived with [`chunk_id`] from the document id and chunk
/// index. Each chunk inherits the parent document's metadata plus a
/// `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::TokenWindowChunker;
///
/// let chunker = TokenWindowChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Clone)]
pub struct TokenWindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenWindowChunker {
    /// Create a chunker that tokenizes on whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_tokenizer(chunk_size, chunk_overlap, Arc::new(WhitespaceTokenizer))
    }

    /// Create a chunker with a custom tokenizer.
    ///
    /// # Errors
    ///
    /// Same as [`TokenWindowChunker::new`].
    pub fn with_tokenizer(
        chunk_size: usize,
        chunk_overlap: usize,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap, tokenizer })
    }

    /// Maximum number of tokens per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of tokens shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl fmt::Debug for TokenWindowChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenWindowChunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

/// Token index ranges of each window over `token_count` tokens.
///
/// Stops at the first window that reaches the last token, so the final
/// window is never fully contained in its predecessor.
fn token_windows(token_count: usize, chunk_size: usize, chunk_overlap: usize) -> Vec<Range<usize>> {
    let step = chunk_size - chunk_overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    while start < token_count {
        let end = (start + chunk_size).min(token_count);
        windows.push(start..end);
        if end == token_count {
            break;
        }
        start += step;
    }

    windows
}

impl Chunker for TokenWindowChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let tokens = self.tokenizer.tokenize(&document.text);
        if tokens.is_empty() {
            return Vec::new();
        }

        token_windows(tokens.len(), self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, window)| {
                let span = tokens[window.start].start..tokens[window.end - 1].end;

                let mut metadata = document.metadata.clone();
                metadata.insert(CHUNK_INDEX_KEY.to_string(), chunk_index.to_string());

                Chunk {
                    id: chunk_id(&document.id, chunk_index),
                    text: document.text[span].to_string(),
                    embedding: Vec::new(),
                    metadata,
                    document_id: document.id.clone(),
                }
            })
            .collect()
    }
}

//! Prompt construction from retrieved chunks.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::document::SearchResult;
use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};

/// Metadata key used as a chunk's source label when present.
const TITLE_KEY: &str = "title";

const INSTRUCTIONS: &str = "Answer the question using only the context below. \
If the answer is not contained in the context, say clearly that the context \
does not contain the answer.";

/// A prompt ready to send to a [`Generator`](crate::Generator).
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// The full prompt text.
    pub text: String,
    /// Number of retrieved chunks included in the context, counted from the top.
    pub context_chunks: usize,
    /// Number of lower-ranked chunks dropped to respect the context cap.
    pub dropped_chunks: usize,
}

/// Builds generator prompts from a query and ranked chunks.
///
/// Chunks are placed in rank order, each tagged with a source label. When
/// their combined size exceeds `max_context_tokens`, the lowest-ranked
/// chunks are dropped whole; a chunk is never cut.
#[derive(Clone)]
pub struct PromptBuilder {
    max_context_tokens: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl PromptBuilder {
    /// Create a builder with a context cap counted in whitespace tokens.
    pub fn new(max_context_tokens: usize) -> Self {
        Self::with_tokenizer(max_context_tokens, Arc::new(WhitespaceTokenizer))
    }

    /// Create a builder that counts context tokens with `tokenizer`.
    pub fn with_tokenizer(max_context_tokens: usize, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { max_context_tokens, tokenizer }
    }

    /// Build the prompt for `query` from `results` in their given order.
    pub fn build(&self, query: &str, results: &[SearchResult]) -> Prompt {
        let mut blocks = Vec::with_capacity(results.len());
        let mut used_tokens = 0;

        for (rank, result) in results.iter().enumerate() {
            let block = format!("[Source {}: {}]\n{}", rank + 1, source_label(result), result.chunk.text);
            let tokens = self.tokenizer.count(&block);
            if used_tokens + tokens > self.max_context_tokens {
                break;
            }
            used_tokens += tokens;
            blocks.push(block);
        }

        let context_chunks = blocks.len();
        let dropped_chunks = results.len() - context_chunks;
        if dropped_chunks > 0 {
            warn!(
                context_chunks,
                dropped_chunks,
                max_context_tokens = self.max_context_tokens,
                "context cap reached, dropping lowest-ranked chunks"
            );
        }

        let text = format!(
            "{INSTRUCTIONS}\n\nContext:\n{}\n\nQuestion: {query}\n\nAnswer:",
            blocks.join("\n\n")
        );

        Prompt { text, context_chunks, dropped_chunks }
    }
}

impl fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("max_context_tokens", &self.max_context_tokens)
            .finish_non_exhaustive()
    }
}

fn source_label(result: &SearchResult) -> &str {
    result
        .chunk
        .metadata
        .get(TITLE_KEY)
        .map(String::as_str)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(&result.chunk.document_id)
}

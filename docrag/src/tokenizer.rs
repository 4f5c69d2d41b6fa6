//! Tokenizers used to measure and split text.
//!
//! Chunk sizes, overlaps and the prompt context cap are all counted in
//! tokens as produced by a [`Tokenizer`]. Tokens are byte spans into the
//! original text so callers can slice the source without re-joining tokens.

use std::ops::Range;

/// A strategy for splitting text into tokens.
pub trait Tokenizer: Send + Sync {
    /// Return the byte span of every token in `text`, in order.
    ///
    /// Spans must be non-overlapping, ascending, and lie on `char` boundaries.
    fn tokenize(&self, text: &str) -> Vec<Range<usize>>;

    /// Count the tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.tokenize(text).len()
    }
}

/// Splits text on Unicode whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut start = None;

        for (i, c) in text.char_indices() {
            match (c.is_whitespace(), start) {
                (true, Some(s)) => {
                    spans.push(s..i);
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push(s..text.len());
        }

        spans
    }

    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

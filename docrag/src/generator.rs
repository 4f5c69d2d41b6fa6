//! Generator trait for the hosted language model that writes answers.

use async_trait::async_trait;

use crate::error::Result;

/// A generative language model that turns a prompt into text.
///
/// Implementations return the model output verbatim. Network, authentication
/// and quota failures, as well as an empty response, are reported as
/// [`RagError::GenerationError`](crate::RagError::GenerationError). Callers
/// decide whether to retry; implementations must not retry on their own.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate at most `max_tokens` tokens in response to `prompt`.
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String>;
}

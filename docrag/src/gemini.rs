//! Gemini generator and embedding provider over the Gemini REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::Generator;

/// The default Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default model used for answer generation.
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

/// The default model used for embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// The dimensionality of `text-embedding-004`.
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

fn http_client(api_key: &str) -> std::result::Result<reqwest::Client, String> {
    if api_key.trim().is_empty() {
        return Err("API key must not be empty".to_string());
    }
    let mut key = HeaderValue::from_str(api_key).map_err(|e| format!("invalid API key: {e}"))?;
    key.set_sensitive(true);
    let headers = HeaderMap::from_iter([(HeaderName::from_static("x-goog-api-key"), key)]);
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

fn read_api_key() -> std::result::Result<String, String> {
    std::env::var(API_KEY_ENV).map_err(|_| format!("{API_KEY_ENV} environment variable not set"))
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self { role: Some("user".to_string()), parts: vec![Part { text: text.to_string() }] }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Deserialize)]
struct Embedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a non-success response into a message naming the failure class.
fn describe_failure(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    let class = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication failed",
        StatusCode::TOO_MANY_REQUESTS => "quota exceeded",
        _ => "request rejected",
    };
    format!("{class} ({status}): {detail}")
}

/// Join the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> std::result::Result<String, String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(format!("prompt blocked: {reason}"));
    }
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| "response contained no candidates".to_string())?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(format!("empty response (finish reason: {reason})"));
    }
    Ok(text)
}

async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> std::result::Result<R, String> {
    let response =
        client.post(url).json(body).send().await.map_err(|e| format!("request failed: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(describe_failure(status, &body));
    }

    response.json().await.map_err(|e| format!("failed to parse response: {e}"))
}

/// A [`Generator`] backed by Gemini `generateContent`.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::gemini::GeminiGenerator;
///
/// let generator = GeminiGenerator::from_env()?;
/// let answer = generator.generate("Say hi", 64).await?;
/// ```
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiGenerator {
    /// Create a generator using the given API key and the default model.
    pub fn new(api_key: impl AsRef<str>) -> Result<Self> {
        let client = http_client(api_key.as_ref()).map_err(|message| RagError::GenerationError {
            generator: "Gemini".into(),
            message,
        })?;
        Ok(Self {
            client,
            base_url: GEMINI_API_BASE.to_string(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
        })
    }

    /// Create a generator using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = read_api_key()
            .map_err(|message| RagError::GenerationError { generator: "Gemini".into(), message })?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `gemini-2.5-pro`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        debug!(generator = "Gemini", model = %self.model, prompt_len = prompt.len(), max_tokens, "generating");

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig { max_output_tokens: max_tokens },
        };

        post_json::<_, GenerateResponse>(&self.client, &url, &request)
            .await
            .and_then(extract_text)
            .map_err(|message| {
                error!(generator = "Gemini", error = %message, "generation failed");
                RagError::GenerationError { generator: "Gemini".into(), message }
            })
    }
}

/// An [`EmbeddingProvider`] backed by Gemini `embedContent`.
///
/// Single texts are embedded as retrieval queries, batches as retrieval
/// documents, matching how the pipeline uses the two calls.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a provider using the given API key and `text-embedding-004`.
    pub fn new(api_key: impl AsRef<str>) -> Result<Self> {
        let client = http_client(api_key.as_ref())
            .map_err(|message| RagError::EmbeddingError { provider: "Gemini".into(), message })?;
        Ok(Self {
            client,
            base_url: GEMINI_API_BASE.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        })
    }

    /// Create a provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = read_api_key()
            .map_err(|message| RagError::EmbeddingError { provider: "Gemini".into(), message })?;
        Self::new(api_key)
    }

    /// Set the model name and its output dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }

    /// Point the client at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, text: &str, task_type: &'static str) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content { role: None, parts: vec![Part { text: text.to_string() }] },
            task_type,
        }
    }

    fn embedding_error(message: String) -> RagError {
        error!(provider = "Gemini", error = %message, "embedding request failed");
        RagError::EmbeddingError { provider: "Gemini".into(), message }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "Gemini", text_len = text.len(), "embedding single text");

        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let response: EmbedResponse =
            post_json(&self.client, &url, &self.request(text, "RETRIEVAL_QUERY"))
                .await
                .map_err(Self::embedding_error)?;

        if response.embedding.values.is_empty() {
            return Err(Self::embedding_error("API returned an empty embedding".to_string()));
        }
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "Gemini", batch_size = texts.len(), model = %self.model, "embedding batch");

        let url = format!("{}/models/{}:batchEmbedContents", self.base_url, self.model);
        let request = BatchEmbedRequest {
            requests: texts.iter().map(|t| self.request(t, "RETRIEVAL_DOCUMENT")).collect(),
        };
        let response: BatchEmbedResponse =
            post_json(&self.client, &url, &request).await.map_err(Self::embedding_error)?;

        if response.embeddings.len() != texts.len() {
            return Err(Self::embedding_error(format!(
                "API returned {} embeddings for {} inputs",
                response.embeddings.len(),
                texts.len()
            )));
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

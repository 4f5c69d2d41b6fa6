//! Interactive question answering over a JSON dataset.
//!
//! # Usage
//!
//! ```bash
//! GEMINI_API_KEY=... docrag data/articles.json --metadata-fields title,author
//! ```
//!
//! The dataset is loaded and indexed once, then each line typed at the
//! prompt is answered from the most similar chunks. `quit`, `exit` or `q`
//! leaves the loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use docrag::gemini::{API_KEY_ENV, GeminiEmbeddingProvider, GeminiGenerator};
use docrag::{
    DatasetOptions, EmbeddingProvider, HashingEmbeddingProvider, InMemoryVectorStore, QueryResult,
    RagConfig, RagPipeline,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Embedder {
    /// Local feature-hashing embeddings, no network access.
    Hashing,
    /// Gemini `text-embedding-004`.
    Gemini,
}

#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(about = "Ask questions about a JSON document collection")]
struct Args {
    /// JSON file holding an array of records
    dataset: PathBuf,

    /// Record field holding the document text
    #[arg(long, env = "DOCRAG_TEXT_FIELD", default_value = "content")]
    text_field: String,

    /// Comma-separated fields copied into metadata (default: all scalar fields)
    #[arg(long, env = "DOCRAG_METADATA_FIELDS", value_delimiter = ',')]
    metadata_fields: Option<Vec<String>>,

    /// Record field used as document id (default: record position)
    #[arg(long, env = "DOCRAG_ID_FIELD")]
    id_field: Option<String>,

    /// Maximum tokens per chunk
    #[arg(long, env = "DOCRAG_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    /// Tokens shared by consecutive chunks
    #[arg(long, env = "DOCRAG_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "DOCRAG_TOP_K", default_value_t = 5)]
    top_k: usize,

    /// Maximum tokens in each answer
    #[arg(long, env = "DOCRAG_MAX_RESPONSE_TOKENS", default_value_t = 1000)]
    max_response_tokens: usize,

    /// Maximum tokens of retrieved context placed in the prompt
    #[arg(long, env = "DOCRAG_MAX_CONTEXT_TOKENS", default_value_t = 8000)]
    max_context_tokens: usize,

    /// Timeout for each model call, in seconds
    #[arg(long, env = "DOCRAG_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Embedding backend
    #[arg(long, env = "DOCRAG_EMBEDDER", value_enum, default_value_t = Embedder::Hashing)]
    embedder: Embedder,

    /// Gemini model used for answers
    #[arg(long, env = "DOCRAG_MODEL")]
    model: Option<String>,

    /// Gemini API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,
}

impl Args {
    fn config(&self) -> Result<RagConfig> {
        RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .max_response_tokens(self.max_response_tokens)
            .max_context_tokens(self.max_context_tokens)
            .request_timeout_secs(self.timeout_secs)
            .build()
            .context("invalid configuration")
    }

    fn dataset_options(&self) -> DatasetOptions {
        let mut options = DatasetOptions::default().with_text_field(&self.text_field);
        if let Some(fields) = &self.metadata_fields {
            options = options.with_metadata_fields(fields.iter().map(|f| f.trim()));
        }
        if let Some(field) = &self.id_field {
            options = options.with_id_field(field);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.config()?;
    let top_k = config.top_k;

    let Some(api_key) = args.api_key.as_deref() else {
        bail!("{API_KEY_ENV} is not set; export it or pass --api-key");
    };

    let mut generator = GeminiGenerator::new(api_key)?;
    if let Some(model) = &args.model {
        generator = generator.with_model(model);
    }
    let embedding_provider: Arc<dyn EmbeddingProvider> = match args.embedder {
        Embedder::Hashing => Arc::new(HashingEmbeddingProvider::default()),
        Embedder::Gemini => Arc::new(GeminiEmbeddingProvider::new(api_key)?),
    };

    let mut pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedding_provider)
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .generator(Arc::new(generator))
        .dataset_options(args.dataset_options())
        .build()?;

    let load = pipeline
        .load_json_file(&args.dataset)
        .with_context(|| format!("failed to load {}", args.dataset.display()))?;
    for rejected in &load.rejected {
        warn!(record = rejected.index, reason = %rejected.reason, "record skipped");
    }

    let report = pipeline.index().await?;
    if !report.is_complete() {
        for failure in &report.failed {
            warn!(document.id = %failure.document_id, error = %failure.error, "document not indexed");
        }
        bail!("{} of {} documents could not be indexed", report.failed.len(), pipeline.documents().len());
    }

    let stats = pipeline.stats().await?;
    info!(
        documents = stats.document_count,
        chunk_count = stats.chunk_count,
        collection = %stats.collection,
        "ready"
    );

    repl(&pipeline, top_k).await
}

async fn repl(pipeline: &RagPipeline, top_k: usize) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("Ask a question about the dataset (quit, exit or q to leave).");

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "quit" | "exit" | "q") {
            break;
        }
        if let Err(e) = editor.add_history_entry(question) {
            warn!(error = %e, "failed to record history entry");
        }

        match pipeline.query(question, top_k).await {
            Ok(result) => print_result(&result),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

fn print_result(result: &QueryResult) {
    println!("\n{}\n", result.response_text.trim());
    println!("Sources:");
    for (rank, hit) in result.retrieved_chunks.iter().take(result.context_chunks).enumerate() {
        let label = hit.chunk.metadata.get("title").unwrap_or(&hit.chunk.document_id);
        println!("  {}. {} (score {:.3})", rank + 1, label, hit.score);
    }
    println!();
}

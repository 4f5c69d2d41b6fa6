//! End-to-end tests for the load → index → query lifecycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docrag::{
    EmbeddingProvider, Generator, HashingEmbeddingProvider, InMemoryVectorStore, PipelineState,
    RagConfig, RagError, RagPipeline, Retriever, VectorStore,
};
use serde_json::{Value, json};

const SAMPLE: &str = include_str!("data/ml_topics.json");

fn sample_records() -> Vec<Value> {
    serde_json::from_str(SAMPLE).unwrap()
}

/// Records every prompt and answers with a fixed string.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn name(&self) -> &str {
        "Recording"
    }

    async fn generate(&self, prompt: &str, max_tokens: usize) -> docrag::Result<String> {
        self.prompts.lock().unwrap().push((prompt.to_string(), max_tokens));
        Ok("RAG retrieves context before generating.".to_string())
    }
}

/// Fails every call, like a generator with a revoked API key.
struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    fn name(&self) -> &str {
        "Failing"
    }

    async fn generate(&self, _prompt: &str, _max_tokens: usize) -> docrag::Result<String> {
        Err(RagError::GenerationError {
            generator: "Failing".into(),
            message: "authentication failed (403 Forbidden): API key not valid".into(),
        })
    }
}

/// Never answers within any reasonable timeout.
struct StalledGenerator;

#[async_trait]
impl Generator for StalledGenerator {
    fn name(&self) -> &str {
        "Stalled"
    }

    async fn generate(&self, _prompt: &str, _max_tokens: usize) -> docrag::Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Refuses to embed batches containing "FLAKY" until healed.
struct FlakyEmbedder {
    inner: HashingEmbeddingProvider,
    healed: AtomicBool,
}

impl FlakyEmbedder {
    fn new() -> Self {
        Self { inner: HashingEmbeddingProvider::default(), healed: AtomicBool::new(false) }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn name(&self) -> &str {
        "Flaky"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        if text.contains("FLAKY") && !self.healed.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingError {
                provider: "Flaky".into(),
                message: "connection reset".into(),
            });
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Hangs on the calls it is told to stall, otherwise embeds by hashing.
struct StallingEmbedder {
    inner: HashingEmbeddingProvider,
    stall_documents: bool,
    stall_queries: bool,
}

impl StallingEmbedder {
    fn new(stall_documents: bool, stall_queries: bool) -> Self {
        Self { inner: HashingEmbeddingProvider::default(), stall_documents, stall_queries }
    }
}

#[async_trait]
impl EmbeddingProvider for StallingEmbedder {
    fn name(&self) -> &str {
        "Stalling"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        if self.stall_queries {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> docrag::Result<Vec<Vec<f32>>> {
        if self.stall_documents {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

fn pipeline_with(
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(store)
        .generator(generator)
        .build()
        .unwrap()
}

fn default_pipeline(generator: Arc<dyn Generator>) -> (RagPipeline, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(
        RagConfig::default(),
        Arc::new(HashingEmbeddingProvider::default()),
        store.clone(),
        generator,
    );
    (pipeline, store)
}

#[tokio::test]
async fn sample_dataset_answers_what_is_rag() {
    let generator = Arc::new(RecordingGenerator::default());
    let (mut pipeline, store) = default_pipeline(generator.clone());

    let load = pipeline.load(&sample_records()).unwrap();
    assert_eq!(load.documents.len(), 8);
    assert!(load.rejected.is_empty());
    assert_eq!(pipeline.state(), PipelineState::Loaded);

    let report = pipeline.index().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.indexed.len(), 8);
    // Every sample document is far below 1000 tokens.
    assert_eq!(report.chunks_stored, 8);
    assert_eq!(store.count("rag_documents").await.unwrap(), 8);
    assert_eq!(pipeline.state(), PipelineState::Ready);

    let result = pipeline.query("What is RAG?", 5).await.unwrap();
    assert_eq!(result.retrieved_chunks.len(), 5);
    let top = &result.retrieved_chunks[0].chunk;
    assert_eq!(top.metadata["title"], "RAG Systems Explained");
    assert_eq!(top.metadata["author"], "Dr. James Park");
    assert_eq!(top.metadata["chunk_index"], "0");
    assert_eq!(result.response_text, "RAG retrieves context before generating.");
    assert_eq!(result.context_chunks, 5);

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    let (prompt, max_tokens) = &prompts[0];
    assert_eq!(*max_tokens, 1000);
    assert!(prompt.contains("[Source 1: RAG Systems Explained]"));
    assert!(prompt.contains("Question: What is RAG?"));
}

#[tokio::test]
async fn scores_are_descending() {
    let (mut pipeline, _) = default_pipeline(Arc::new(RecordingGenerator::default()));
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();

    let result = pipeline.query("neural networks and deep learning", 8).await.unwrap();
    for pair in result.retrieved_chunks.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(result.retrieved_chunks[0].chunk.metadata["title"], "Deep Learning and Neural Networks");
}

#[tokio::test]
async fn repeated_queries_are_deterministic() {
    let (mut pipeline, _) = default_pipeline(Arc::new(RecordingGenerator::default()));
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();

    let first = pipeline.query("vector similarity search", 4).await.unwrap();
    let second = pipeline.query("vector similarity search", 4).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn reindexing_does_not_duplicate_chunks() {
    let (mut pipeline, store) = default_pipeline(Arc::new(RecordingGenerator::default()));
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();

    let again = pipeline.index().await.unwrap();
    assert!(again.is_complete());
    assert!(again.indexed.is_empty());
    assert_eq!(again.chunks_stored, 0);
    assert_eq!(store.count("rag_documents").await.unwrap(), 8);
    assert_eq!(pipeline.state(), PipelineState::Ready);

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.chunk_count, 8);
    assert_eq!(stats.document_count, 8);
    assert_eq!(stats.indexed_document_count, 8);
}

#[tokio::test]
async fn query_before_index_is_not_ready() {
    let (mut pipeline, _) = default_pipeline(Arc::new(RecordingGenerator::default()));

    let err = pipeline.query("anything", 3).await.unwrap_err();
    assert!(matches!(err, RagError::NotReadyError { state: PipelineState::Empty, .. }));

    pipeline.load(&sample_records()).unwrap();
    let err = pipeline.query("What is RAG?", 3).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::NotReadyError { state: PipelineState::Loaded, required: PipelineState::Ready, .. }
    ));
}

#[tokio::test]
async fn index_on_empty_pipeline_is_not_ready() {
    let (mut pipeline, _) = default_pipeline(Arc::new(RecordingGenerator::default()));
    let err = pipeline.index().await.unwrap_err();
    assert!(matches!(err, RagError::NotReadyError { operation: "index", .. }));
}

#[tokio::test]
async fn loading_more_documents_requires_reindex() {
    let (mut pipeline, store) = default_pipeline(Arc::new(RecordingGenerator::default()));
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();

    let extra = pipeline
        .load(&[json!({"title": "Gradient Boosting", "content": "Gradient boosting builds trees sequentially."})])
        .unwrap();
    assert_eq!(extra.documents[0].id, "8");
    assert_eq!(pipeline.state(), PipelineState::Loaded);
    assert!(pipeline.query("boosting", 1).await.is_err());

    let report = pipeline.index().await.unwrap();
    assert_eq!(report.indexed, vec!["8".to_string()]);
    assert_eq!(store.count("rag_documents").await.unwrap(), 9);
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test]
async fn malformed_records_are_reported_not_fatal() {
    let (mut pipeline, _) = default_pipeline(Arc::new(RecordingGenerator::default()));
    let mut records = sample_records();
    records.push(json!({"title": "No content"}));
    records.push(json!({"content": "", "title": "Blank"}));

    let report = pipeline.load(&records).unwrap();
    assert_eq!(report.documents.len(), 8);
    let rejected: Vec<usize> = report.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![8, 9]);

    let err = pipeline.load(&[json!({"title": "still nothing"})]).unwrap_err();
    assert!(matches!(err, RagError::DatasetError { .. }));
    assert_eq!(pipeline.documents().len(), 8);
}

#[tokio::test]
async fn partial_failure_reports_documents_and_retries_only_failures() {
    let embedder = Arc::new(FlakyEmbedder::new());
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(5).build().unwrap();
    let mut pipeline = pipeline_with(
        config,
        embedder.clone(),
        store.clone(),
        Arc::new(RecordingGenerator::default()),
    );

    pipeline
        .load(&[
            json!({"content": "alpha beta gamma"}),
            json!({"content": "this one is FLAKY today"}),
            json!({"content": "delta epsilon"}),
        ])
        .unwrap();

    let report = pipeline.index().await.unwrap();
    assert!(!report.is_complete());
    let indexed: HashSet<&str> = report.indexed.iter().map(String::as_str).collect();
    assert_eq!(indexed, HashSet::from(["0", "2"]));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].document_id, "1");
    assert!(matches!(report.failed[0].error, RagError::EmbeddingError { .. }));
    assert_eq!(pipeline.state(), PipelineState::Loaded);
    assert_eq!(store.count("rag_documents").await.unwrap(), 2);

    embedder.healed.store(true, Ordering::SeqCst);
    let retry = pipeline.index().await.unwrap();
    assert!(retry.is_complete());
    assert_eq!(retry.indexed, vec!["1".to_string()]);
    assert_eq!(store.count("rag_documents").await.unwrap(), 3);
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test]
async fn long_documents_are_chunked_with_overlap() {
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().chunk_size(10).chunk_overlap(3).build().unwrap();
    let mut pipeline = pipeline_with(
        config,
        Arc::new(HashingEmbeddingProvider::default()),
        store.clone(),
        Arc::new(RecordingGenerator::default()),
    );
    let text = (0..24).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ");
    pipeline.load(&[json!({"content": text, "title": "Long"})]).unwrap();

    let report = pipeline.index().await.unwrap();
    // Windows 0..10, 7..17, 14..24.
    assert_eq!(report.chunks_stored, 3);
    assert_eq!(store.count("rag_documents").await.unwrap(), 3);

    let result = pipeline.query("t15 t16", 3).await.unwrap();
    assert!(result.retrieved_chunks.iter().all(|r| r.chunk.metadata["title"] == "Long"));
    assert!(result.retrieved_chunks[0].chunk.text.contains("t15 t16"));
}

#[tokio::test]
async fn generation_errors_are_surfaced_verbatim() {
    let (mut pipeline, _) = default_pipeline(Arc::new(FailingGenerator));
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();

    let err = pipeline.query("What is RAG?", 3).await.unwrap_err();
    match err {
        RagError::GenerationError { generator, message } => {
            assert_eq!(generator, "Failing");
            assert!(message.contains("API key not valid"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_generation_times_out() {
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().request_timeout_secs(2).build().unwrap();
    let mut pipeline = pipeline_with(
        config,
        Arc::new(HashingEmbeddingProvider::default()),
        store,
        Arc::new(StalledGenerator),
    );
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();

    let err = pipeline.query("What is RAG?", 3).await.unwrap_err();
    assert!(matches!(err, RagError::TimeoutError { timeout, .. } if timeout == Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn stalled_chunk_embedding_fails_the_document() {
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().request_timeout_secs(2).build().unwrap();
    let mut pipeline = pipeline_with(
        config,
        Arc::new(StallingEmbedder::new(true, false)),
        store.clone(),
        Arc::new(RecordingGenerator::default()),
    );
    pipeline.load(&[json!({"content": "alpha beta gamma"})]).unwrap();

    let report = pipeline.index().await.unwrap();
    assert!(report.indexed.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].document_id, "0");
    assert!(matches!(
        report.failed[0].error,
        RagError::TimeoutError { timeout, .. } if timeout == Duration::from_secs(2)
    ));
    assert_eq!(pipeline.state(), PipelineState::Loaded);
    assert_eq!(store.count("rag_documents").await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_query_embedding_times_out() {
    let config = RagConfig::builder().request_timeout_secs(2).build().unwrap();
    let mut pipeline = pipeline_with(
        config,
        Arc::new(StallingEmbedder::new(false, true)),
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(RecordingGenerator::default()),
    );
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Ready);

    let err = pipeline.query("What is RAG?", 3).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::TimeoutError { ref operation, timeout } if operation == "query embedding" && timeout == Duration::from_secs(2)
    ));
}

#[tokio::test]
async fn zero_top_k_is_invalid() {
    let (mut pipeline, _) = default_pipeline(Arc::new(RecordingGenerator::default()));
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();
    assert!(matches!(
        pipeline.query("What is RAG?", 0).await,
        Err(RagError::InvalidConfiguration(_))
    ));
}

#[tokio::test]
async fn small_context_cap_drops_lowest_ranked_chunks() {
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().max_context_tokens(150).build().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let mut pipeline = pipeline_with(
        config,
        Arc::new(HashingEmbeddingProvider::default()),
        store,
        generator.clone(),
    );
    pipeline.load(&sample_records()).unwrap();
    pipeline.index().await.unwrap();

    let result = pipeline.query("What is RAG?", 8).await.unwrap();
    assert_eq!(result.retrieved_chunks.len(), 8);
    assert!(result.context_chunks >= 1);
    assert!(result.context_chunks < 8);
    let prompts = generator.prompts.lock().unwrap();
    let prompt = &prompts[0].0;
    assert!(prompt.contains("[Source 1: RAG Systems Explained]"));
    assert!(!prompt.contains("[Source 8:"));
}

#[test]
fn overlap_not_below_chunk_size_fails_at_build_time() {
    let config = RagConfig { chunk_size: 200, chunk_overlap: 200, ..RagConfig::default() };
    let err = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .generator(Arc::new(RecordingGenerator::default()))
        .build()
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn retriever_rejects_empty_and_missing_collections() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::default());
    let retriever = Retriever::new(embedder.clone(), store.clone(), "docs", Duration::from_secs(5));

    let err = retriever.retrieve("query", 3).await.unwrap_err();
    assert!(matches!(err, RagError::RetrievalError(ref m) if m.contains("unreachable")));

    store.create_collection("docs", embedder.dimensions()).await.unwrap();
    let err = retriever.retrieve("query", 3).await.unwrap_err();
    assert!(matches!(err, RagError::RetrievalError(ref m) if m.contains("is empty")));
}

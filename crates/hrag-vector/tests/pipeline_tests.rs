use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hrag_core::chunker::Chunker;
use hrag_core::config::ChunkingConfig;
use hrag_core::report::FailureKind;
use hrag_core::traits::{Embedder, Summarizer};
use hrag_core::types::{Document, Tier};
use hrag_core::{Error, ServiceError};
use hrag_embed::{CallGate, ExtractiveChat, HashEmbedder, Models, RetryPolicy};
use hrag_vector::{EmbeddingCache, IndexStore, Orchestrator, OrchestratorConfig};

const DIM: usize = 32;

fn words(prefix: &str, n: usize) -> String {
    (0..n).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>().join(" ")
}

fn chunker() -> Chunker {
    Chunker::new(ChunkingConfig { parent_words: 0, parent_overlap: 0, child_words: 10, child_overlap: 2 }).unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy { max_attempts: 2, initial_backoff: Duration::from_millis(10), max_backoff: Duration::from_millis(20), multiplier: 2.0 }
}

fn config(strict: bool, concurrency: usize) -> OrchestratorConfig {
    OrchestratorConfig { concurrency, strict, report_errors: 5, embed_batch_size: 4, progress: false }
}

/// Summarizer that fails on texts containing a marker.
struct PoisonSummarizer {
    marker: &'static str,
    error: ServiceError,
}

#[async_trait]
impl Summarizer for PoisonSummarizer {
    fn model_id(&self) -> &str {
        "poison"
    }

    async fn summarize(&self, text: &str) -> Result<String, ServiceError> {
        if text.contains(self.marker) {
            return Err(self.error.clone());
        }
        Ok(text.split_whitespace().take(5).collect::<Vec<_>>().join(" "))
    }
}

/// Hash embedder that counts calls and overlapping requests.
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingEmbedder {
    fn new(dim: usize) -> Self {
        Self { inner: HashEmbedder::new(dim), calls: AtomicUsize::new(0), current: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str {
        "counting"
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

/// Hash embedder that fails any batch containing a marker.
struct PoisonEmbedder {
    inner: HashEmbedder,
    marker: &'static str,
}

#[async_trait]
impl Embedder for PoisonEmbedder {
    fn model_id(&self) -> &str {
        "poison-embed"
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.iter().any(|t| t.contains(self.marker)) {
            return Err(ServiceError::Http { status: 400, message: "rejected input".into() });
        }
        self.inner.embed_batch(texts).await
    }
}

fn plain_summarizer() -> Arc<PoisonSummarizer> {
    Arc::new(PoisonSummarizer { marker: "never-present", error: ServiceError::Cancelled })
}

fn models_with(embedder: Arc<dyn Embedder>, summarizer: Arc<dyn Summarizer>, limit: usize) -> Models {
    Models::new(embedder, Arc::new(ExtractiveChat::default()), summarizer, CallGate::new(limit), fast_policy())
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("a.txt", words("alpha", 35), "/c/a.txt"),
        Document::new("b.txt", "", "/c/b.txt"),
        Document::new("c.txt", words("gamma", 35), "/c/c.txt"),
    ]
}

#[tokio::test]
async fn unreadable_document_is_skipped_and_others_indexed() {
    let models = Models::offline(DIM, 8, CallGate::new(4), fast_policy());
    let store = Arc::new(IndexStore::new(DIM));
    let orch = Orchestrator::from_models(chunker(), &models, store.clone(), config(false, 4));

    let report = orch.run(corpus()).await.expect("lenient run");

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.messages(FailureKind::MalformedDocument).len(), 1);
    assert_eq!(store.len(Tier::Summary), 2);
    assert_eq!(store.len(Tier::Detail), 10);
    assert_eq!(report.parents_indexed, 2);
    assert_eq!(report.children_indexed, 10);
    for child in store.entries(Tier::Detail) {
        let parent = child.payload.parent_id.expect("child has parent");
        assert!(store.contains(Tier::Summary, &parent));
    }
}

#[tokio::test]
async fn malformed_documents_do_not_trip_strict_mode() {
    let models = Models::offline(DIM, 8, CallGate::new(4), fast_policy());
    let store = Arc::new(IndexStore::new(DIM));
    let orch = Orchestrator::from_models(chunker(), &models, store, config(true, 4));

    let report = orch.run(corpus()).await.expect("strict run with only a malformed document");
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn lenient_mode_collects_service_failures() {
    let summarizer = Arc::new(PoisonSummarizer {
        marker: "gamma0",
        error: ServiceError::Http { status: 400, message: "content filtered".into() },
    });
    let models = models_with(Arc::new(HashEmbedder::new(DIM)), summarizer, 4);
    let store = Arc::new(IndexStore::new(DIM));
    let orch = Orchestrator::from_models(chunker(), &models, store.clone(), config(false, 2));

    let report = orch.run(corpus()).await.expect("lenient run");

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 1);
    let messages = report.messages(FailureKind::ExternalService);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("c.txt"));
    assert!(store.contains(Tier::Summary, "a.txt#p0000"));
    assert!(!store.contains(Tier::Summary, "c.txt#p0000"));
}

#[tokio::test]
async fn strict_mode_aborts_with_partial_report() {
    let summarizer = Arc::new(PoisonSummarizer {
        marker: "alpha0",
        error: ServiceError::Http { status: 400, message: "content filtered".into() },
    });
    let models = models_with(Arc::new(HashEmbedder::new(DIM)), summarizer, 1);
    let store = Arc::new(IndexStore::new(DIM));
    let orch = Orchestrator::from_models(chunker(), &models, store, config(true, 1));

    match orch.run(corpus()).await {
        Err(Error::StrictAbort(report)) => {
            assert_eq!(report.failed, 1);
            assert_eq!(report.processed, 0);
            assert_eq!(report.total(), 3);
        }
        other => panic!("expected strict abort, got {other:?}"),
    }
    assert!(orch.cancel_token().is_cancelled());
}

#[tokio::test]
async fn auth_failure_ends_the_run_as_configuration_error() {
    let summarizer =
        Arc::new(PoisonSummarizer { marker: "", error: ServiceError::Auth { message: "invalid api key".into() } });
    let models = models_with(Arc::new(HashEmbedder::new(DIM)), summarizer, 2);
    let orch = Orchestrator::from_models(chunker(), &models, Arc::new(IndexStore::new(DIM)), config(false, 2));

    assert!(matches!(orch.run(corpus()).await, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn mismatched_index_dimension_fails_before_any_call() {
    let embedder = Arc::new(CountingEmbedder::new(DIM));
    let models = models_with(embedder.clone(), Arc::new(PoisonSummarizer { marker: "never", error: ServiceError::Cancelled }), 2);
    let orch = Orchestrator::from_models(chunker(), &models, Arc::new(IndexStore::new(DIM + 1)), config(false, 2));

    assert!(matches!(orch.run(corpus()).await, Err(Error::Configuration(_))));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_run_counts_items_as_cancelled() {
    let models = Models::offline(DIM, 8, CallGate::new(2), fast_policy());
    let store = Arc::new(IndexStore::new(DIM));
    let orch = Orchestrator::from_models(chunker(), &models, store.clone(), config(false, 2));
    orch.cancel_token().cancel();

    let report = orch.run(corpus()).await.expect("cancelled run still reports");
    assert_eq!(report.processed, 0);
    assert_eq!(report.cancelled, 3);
    assert_eq!(report.skipped, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn in_flight_calls_never_exceed_the_gate() {
    let embedder = Arc::new(CountingEmbedder::new(DIM));
    let summarizer = Arc::new(PoisonSummarizer { marker: "never-present", error: ServiceError::Cancelled });
    let models = models_with(embedder.clone(), summarizer, 2);
    let docs: Vec<Document> =
        (0..12).map(|i| Document::new(format!("d{i:02}.txt"), words(&format!("t{i}x"), 40), format!("/c/d{i:02}.txt"))).collect();
    let orch = Orchestrator::from_models(chunker(), &models, Arc::new(IndexStore::new(DIM)), config(false, 8));

    let report = orch.run(docs).await.unwrap();
    assert_eq!(report.processed, 12);
    assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn cache_serves_repeat_ingest() {
    let embedder = Arc::new(CountingEmbedder::new(DIM));
    let summarizer = Arc::new(PoisonSummarizer { marker: "never-present", error: ServiceError::Cancelled });
    let models = models_with(embedder.clone(), summarizer, 4);
    let cache = Arc::new(EmbeddingCache::in_memory(DIM));
    let docs = vec![Document::new("a.txt", words("alpha", 35), "/c/a.txt")];

    let first = Orchestrator::from_models(chunker(), &models, Arc::new(IndexStore::new(DIM)), config(false, 2))
        .with_cache(cache.clone());
    let r1 = first.run(docs.clone()).await.unwrap();
    let calls_after_first = embedder.calls.load(Ordering::SeqCst);
    assert_eq!(r1.cache_hits, 0);
    assert!(calls_after_first > 0);

    let second = Orchestrator::from_models(chunker(), &models, Arc::new(IndexStore::new(DIM)), config(false, 2))
        .with_cache(cache.clone());
    let r2 = second.run(docs).await.unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    assert_eq!(r2.cache_hits, 6);
    assert_eq!(r2.children_indexed, 5);
}

#[tokio::test]
async fn child_embedding_failure_leaves_no_orphan_summary() {
    let embedder = Arc::new(PoisonEmbedder { inner: HashEmbedder::new(DIM), marker: "poison" });
    let models = models_with(embedder, plain_summarizer(), 4);
    let store = Arc::new(IndexStore::new(DIM));
    let docs = vec![
        Document::new("a.txt", words("alpha", 35), "/c/a.txt"),
        Document::new("c.txt", format!("{} poison", words("gamma", 20)), "/c/c.txt"),
    ];

    let report = Orchestrator::from_models(chunker(), &models, store.clone(), config(false, 2)).run(docs).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert!(store.contains(Tier::Summary, "a.txt#p0000"));
    assert!(!store.contains(Tier::Summary, "c.txt#p0000"));
    assert!(store.children_of("c.txt#p0000").is_empty());
    assert_eq!(store.len(Tier::Summary), 1);
    assert_eq!(store.len(Tier::Detail), 5);
}

#[tokio::test]
async fn reingesting_a_shorter_document_drops_stale_children() {
    let models = Models::offline(DIM, 8, CallGate::new(4), fast_policy());
    let store = Arc::new(IndexStore::new(DIM));
    let orch = Orchestrator::from_models(chunker(), &models, store.clone(), config(false, 2));

    orch.run(vec![Document::new("a.txt", words("alpha", 35), "/c/a.txt")]).await.unwrap();
    assert_eq!(store.len(Tier::Detail), 5);

    let report = orch.run(vec![Document::new("a.txt", words("alpha", 10), "/c/a.txt")]).await.unwrap();
    assert_eq!(report.children_indexed, 1);
    assert_eq!(store.len(Tier::Summary), 1);
    assert_eq!(store.len(Tier::Detail), 1);
    assert_eq!(store.children_of("a.txt#p0000"), vec!["a.txt#p0000/c0000".to_string()]);
    assert_eq!(store.replaced_documents(), vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn failed_revision_keeps_the_previous_entries() {
    let store = Arc::new(IndexStore::new(DIM));
    let clean = models_with(Arc::new(HashEmbedder::new(DIM)), plain_summarizer(), 2);
    Orchestrator::from_models(chunker(), &clean, store.clone(), config(false, 1))
        .run(vec![Document::new("a.txt", words("alpha", 35), "/c/a.txt")])
        .await
        .unwrap();

    let poisoned = models_with(Arc::new(PoisonEmbedder { inner: HashEmbedder::new(DIM), marker: "poison" }), plain_summarizer(), 2);
    let report = Orchestrator::from_models(chunker(), &poisoned, store.clone(), config(false, 1))
        .run(vec![Document::new("a.txt", format!("{} poison", words("alpha", 20)), "/c/a.txt")])
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(store.len(Tier::Detail), 5);
    assert_eq!(store.children_of("a.txt#p0000").len(), 5);
}

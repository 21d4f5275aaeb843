use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use hrag_core::chunker::Chunker;
use hrag_core::config::{expand_path, Settings};
use hrag_core::loader::{DocumentLoader, LoadOutcome};
use hrag_core::report::RunReport;
use hrag_core::types::RetrievalResult;
use hrag_core::Error;
use hrag_embed::{build_models, Models};
use hrag_eval::{load_testset, save_testset, write_csv, write_jsonl, EvalSummary, Evaluator, TestsetGenerator};
use hrag_retrieve::{AnswerGenerator, HierarchicalRetriever};
use hrag_vector::persist::{self, IndexMeta};
use hrag_vector::{EmbeddingCache, IndexStats, IndexStore, Orchestrator, OrchestratorConfig};

use crate::args::{EvalArgs, IngestArgs, QueryArgs, TestsetArgs};

pub struct IngestOutcome {
    pub report: RunReport,
    pub stats: IndexStats,
}

pub struct QueryOutcome {
    pub result: RetrievalResult,
    pub answer: Option<String>,
}

pub struct TestsetSummary {
    pub path: PathBuf,
    pub written: usize,
    pub skipped: Vec<(String, String)>,
}

pub struct EvalRun {
    pub summary: EvalSummary,
    pub csv: PathBuf,
    pub jsonl: PathBuf,
    pub failures: Vec<(String, String)>,
}

pub struct Status {
    pub uri: String,
    pub meta: Option<IndexMeta>,
    pub stats: IndexStats,
    pub cached_embeddings: Option<usize>,
}

fn index_uri(settings: &Settings) -> String {
    expand_path(&settings.index.dir).to_string_lossy().to_string()
}

fn load_corpus(settings: &Settings, dir: Option<&Path>, limit: Option<usize>) -> anyhow::Result<LoadOutcome> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| expand_path(&settings.corpus.dir));
    let loader = DocumentLoader::new(settings.corpus.extensions.clone());
    let outcome = match limit.or(settings.corpus.limit) {
        Some(limit) => loader.load_dir_limited(&dir, limit),
        None => loader.load_dir(&dir),
    }
    .with_context(|| format!("loading corpus from {}", dir.display()))?;
    Ok(outcome)
}

/// Open the index written by an earlier ingest. Vectors from a different
/// embedder are not comparable, so a mismatch is refused.
async fn open_index(uri: &str, models: &Models) -> hrag_core::Result<IndexStore> {
    let (store, meta) = persist::load(uri, models.embedder.dim()).await?;
    if let Some(meta) = meta {
        if meta.embedder_id != models.embedder.model_id() {
            return Err(Error::config(format!(
                "index at {uri} was built with '{}' but the configured embedder is '{}'",
                meta.embedder_id,
                models.embedder.model_id()
            )));
        }
    }
    Ok(store)
}

pub async fn ingest(settings: &Settings, args: &IngestArgs) -> anyhow::Result<IngestOutcome> {
    let corpus = load_corpus(settings, args.dir.as_deref(), args.limit)?;
    let models = build_models(settings)?;
    let chunker = Chunker::new(settings.chunking)?;
    let uri = index_uri(settings);
    let store = Arc::new(open_index(&uri, &models).await?);

    let mut config = OrchestratorConfig::from_settings(&settings.orchestrator).with_progress(!args.no_progress);
    config.strict |= args.strict;
    let mut orchestrator = Orchestrator::from_models(chunker, &models, store.clone(), config);
    if settings.index.cache {
        let cache = EmbeddingCache::open(&uri, models.embedder.dim()).await?;
        info!(entries = cache.len(), "embedding cache opened");
        orchestrator = orchestrator.with_cache(Arc::new(cache));
    }

    let token = orchestrator.cancel_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling outstanding work");
            token.cancel();
        }
    });
    let result = orchestrator.run(corpus.documents).await;
    watcher.abort();

    let mut report = result?;
    for file in &corpus.skipped {
        let item = file.path.display().to_string();
        report.record_failure(&item, &Error::malformed(&item, &file.reason));
    }
    let stats = persist::save(&store, &uri, models.embedder.model_id()).await?;
    Ok(IngestOutcome { report, stats })
}

pub async fn query(settings: &Settings, args: &QueryArgs) -> anyhow::Result<QueryOutcome> {
    let models = build_models(settings)?;
    let store = Arc::new(open_index(&index_uri(settings), &models).await?);
    if store.is_empty() {
        warn!("index is empty; run `hrag ingest` first");
    }
    let retriever = HierarchicalRetriever::new(models.embedder(), store);
    let top_parents = args.top_parents.unwrap_or(settings.retrieval.top_parents);
    let top_children = args.top_children.unwrap_or(settings.retrieval.top_children);
    let result = retriever.retrieve(&args.text, top_parents, top_children).await?;

    let answer = if args.answer {
        Some(AnswerGenerator::new(models.chat()).answer(&args.text, &result.contexts()).await?)
    } else {
        None
    };
    Ok(QueryOutcome { result, answer })
}

pub async fn testset(settings: &Settings, args: &TestsetArgs) -> anyhow::Result<TestsetSummary> {
    let corpus = load_corpus(settings, args.dir.as_deref(), None)?;
    let models = build_models(settings)?;
    let chunker = Chunker::new(settings.chunking)?;
    let size = args.size.unwrap_or(settings.eval.testset_size);
    let raise = args.raise || settings.eval.raise_exceptions;

    let outcome = TestsetGenerator::new(models.chat(), size, raise).generate(&corpus.documents, &chunker).await?;
    let path = args.out.clone().unwrap_or_else(|| expand_path(&settings.eval.testset_path));
    save_testset(&path, &outcome.samples)?;
    info!(path = %path.display(), samples = outcome.samples.len(), "test set written");
    Ok(TestsetSummary { path, written: outcome.samples.len(), skipped: outcome.skipped })
}

pub async fn eval(settings: &Settings, args: &EvalArgs) -> anyhow::Result<EvalRun> {
    let testset_path = args.testset.clone().unwrap_or_else(|| expand_path(&settings.eval.testset_path));
    let samples = load_testset(&testset_path)?;
    let models = build_models(settings)?;
    let store = Arc::new(open_index(&index_uri(settings), &models).await?);
    if store.is_empty() {
        anyhow::bail!("index at {} is empty; run `hrag ingest` first", index_uri(settings));
    }

    let evaluator = Evaluator::new(
        HierarchicalRetriever::new(models.embedder(), store),
        AnswerGenerator::new(models.chat()),
        models.embedder(),
        settings.retrieval.top_parents,
        settings.retrieval.top_children,
    )
    .with_concurrency(settings.orchestrator.concurrency)
    .raise_exceptions(args.raise || settings.eval.raise_exceptions);
    let outcome = evaluator.evaluate(&samples).await?;

    let csv = args.output.clone().unwrap_or_else(|| expand_path(&settings.eval.output));
    let jsonl = csv.with_extension("jsonl");
    write_csv(&csv, &outcome.records)?;
    write_jsonl(&jsonl, &outcome.records)?;
    Ok(EvalRun { summary: outcome.summary(), csv, jsonl, failures: outcome.failures })
}

pub async fn status(settings: &Settings) -> anyhow::Result<Status> {
    let uri = index_uri(settings);
    let meta = persist::load_meta(&uri).await?;
    let dim = meta.as_ref().map_or(settings.models.embedding_dim, |m| m.dim);
    let (store, _) = persist::load(&uri, dim).await?;
    let cached_embeddings = if settings.index.cache { Some(EmbeddingCache::open(&uri, dim).await?.len()) } else { None };
    Ok(Status { uri, meta, stats: store.stats(), cached_embeddings })
}

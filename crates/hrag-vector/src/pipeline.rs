//! Ingest orchestrator: chunk, summarize, embed and upsert a corpus.
//!
//! Documents are processed concurrently; every model call goes through
//! the shared `CallGate`, which is what actually bounds in-flight
//! requests. Per-document failures are collected into a `RunReport`.
//! Configuration failures always end the run; in strict mode so does the
//! first service or consistency failure.
//!
//! A document is written only once every summary and vector it needs has
//! been computed. Its previous entries are dropped at that point; a
//! document that fails earlier leaves the store as it was.

use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hrag_core::chunker::Chunker;
use hrag_core::config::OrchestratorSettings;
use hrag_core::report::RunReport;
use hrag_core::traits::{Embedder, Summarizer};
use hrag_core::types::{content_hash, Document, ParentGroup, Payload, Tier};
use hrag_core::{Error, Result};
use hrag_embed::{Models, Resilient};

use crate::cache::{CacheEntry, EmbeddingCache};
use crate::store::IndexStore;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub concurrency: usize,
    pub strict: bool,
    pub report_errors: usize,
    pub embed_batch_size: usize,
    pub progress: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&OrchestratorSettings::default())
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            strict: settings.strict,
            report_errors: settings.report_errors,
            embed_batch_size: settings.embed_batch_size.max(1),
            progress: false,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

/// Model output for one parent group, ready to be written.
struct PreparedGroup {
    summary: String,
    summary_vector: Vec<f32>,
    child_vectors: Vec<Vec<f32>>,
    cache_hits: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct DocOutcome {
    parents: usize,
    children: usize,
    cache_hits: usize,
}

pub struct Orchestrator {
    chunker: Chunker,
    summarizer: Resilient<dyn Summarizer>,
    embedder: Resilient<dyn Embedder>,
    store: Arc<IndexStore>,
    cache: Option<Arc<EmbeddingCache>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        chunker: Chunker,
        summarizer: Resilient<dyn Summarizer>,
        embedder: Resilient<dyn Embedder>,
        store: Arc<IndexStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { chunker, summarizer, embedder, store, cache: None, config }
    }

    pub fn from_models(chunker: Chunker, models: &Models, store: Arc<IndexStore>, config: OrchestratorConfig) -> Self {
        Self::new(chunker, models.summarizer(), models.embedder(), store, config)
    }

    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Run-level cancellation. Cancelling stops new model calls from being
    /// admitted; in-flight calls finish and their upserts stay valid.
    pub fn cancel_token(&self) -> CancellationToken {
        self.embedder.gate().token()
    }

    fn cancel(&self) {
        self.embedder.gate().cancel();
        self.summarizer.gate().cancel();
    }

    pub async fn run(&self, documents: Vec<Document>) -> Result<RunReport> {
        let dim = Embedder::dim(&self.embedder);
        if dim != self.store.dim() {
            return Err(Error::config(format!(
                "embedder '{}' produces dimension {dim} but the index expects {}",
                Embedder::model_id(&self.embedder),
                self.store.dim()
            )));
        }

        let started = Instant::now();
        let total = documents.len();
        info!(documents = total, concurrency = self.config.concurrency, strict = self.config.strict, "ingest started");
        let pb = self.progress_bar(total);

        let mut report = RunReport::new(self.config.report_errors);
        let mut aborted = false;
        let mut results = stream::iter(documents)
            .map(|doc| async move {
                let outcome = self.index_document(&doc).await;
                (doc.id, outcome)
            })
            .buffer_unordered(self.config.concurrency);

        while let Some((doc_id, outcome)) = results.next().await {
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            match outcome {
                Ok(o) => {
                    debug!(doc = %doc_id, parents = o.parents, children = o.children, "document indexed");
                    report.record_success(o.parents, o.children);
                    report.cache_hits += o.cache_hits;
                }
                Err(err) => {
                    let err = err.escalate();
                    if matches!(err, Error::Configuration(_)) {
                        self.cancel();
                        if let Some(pb) = &pb {
                            pb.abandon_with_message("configuration error");
                        }
                        return Err(err);
                    }
                    match &err {
                        Error::MalformedDocument { .. } => warn!(doc = %doc_id, error = %err, "skipping document"),
                        Error::Cancelled => debug!(doc = %doc_id, "document cancelled"),
                        _ => warn!(doc = %doc_id, error = %err, "document failed"),
                    }
                    let unrecoverable = !matches!(err, Error::MalformedDocument { .. } | Error::Cancelled);
                    report.record_failure(&doc_id, &err);
                    if self.config.strict && unrecoverable && !aborted {
                        warn!(doc = %doc_id, "strict mode: cancelling run");
                        self.cancel();
                        aborted = true;
                    }
                }
            }
        }

        if let Some(pb) = &pb {
            pb.finish_with_message("ingest finished");
        }
        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            parents = report.parents_indexed,
            children = report.children_indexed,
            cache_hits = report.cache_hits,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingest finished"
        );
        if aborted {
            return Err(Error::StrictAbort(Box::new(report)));
        }
        Ok(report)
    }

    fn progress_bar(&self, total: usize) -> Option<ProgressBar> {
        if !self.config.progress {
            return None;
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    }

    async fn index_document(&self, doc: &Document) -> Result<DocOutcome> {
        if self.cancel_token().is_cancelled() {
            return Err(Error::Cancelled);
        }
        let groups = self.chunker.chunk(doc)?;
        let prepared = try_join_all(groups.iter().map(|g| self.prepare_group(g))).await?;

        let replaced = self.store.remove_document(&doc.id);
        if replaced > 0 {
            debug!(doc = %doc.id, replaced, "replacing previous entries");
        }
        let mut outcome = DocOutcome::default();
        for (group, ready) in groups.iter().zip(prepared) {
            outcome.cache_hits += ready.cache_hits;
            if let Err(err) = self.write_group(doc, group, ready) {
                self.store.remove_document(&doc.id);
                return Err(err);
            }
            outcome.parents += 1;
            outcome.children += group.children.len();
        }
        Ok(outcome)
    }

    async fn prepare_group(&self, group: &ParentGroup) -> Result<PreparedGroup> {
        let summary = self.summarizer.try_summarize(&group.parent.text).await?;
        let (mut vectors, mut cache_hits) = self.embed_texts(std::slice::from_ref(&summary)).await?;
        let summary_vector = vectors.pop().ok_or_else(|| Error::Storage("no vector for summary".to_string()))?;

        let texts: Vec<String> = group.children.iter().map(|c| c.text.clone()).collect();
        let (child_vectors, hits) = self.embed_texts(&texts).await?;
        cache_hits += hits;
        Ok(PreparedGroup { summary, summary_vector, child_vectors, cache_hits })
    }

    /// Summary entry first, then the children that reference it.
    fn write_group(&self, doc: &Document, group: &ParentGroup, ready: PreparedGroup) -> Result<()> {
        let payload = |text: String, parent_id: Option<String>| Payload {
            document_id: doc.id.clone(),
            source_path: doc.source_path.clone(),
            text,
            parent_id,
        };
        self.store.upsert(Tier::Summary, group.parent.id.clone(), ready.summary_vector, payload(ready.summary, None))?;
        for (child, vector) in group.children.iter().zip(ready.child_vectors) {
            self.store.upsert(
                Tier::Detail,
                child.id.clone(),
                vector,
                payload(child.text.clone(), Some(child.parent_id.clone())),
            )?;
        }
        Ok(())
    }

    /// Embed `texts` in order, serving what it can from the cache and
    /// sending the rest in batches.
    async fn embed_texts(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, usize)> {
        let model_id = Embedder::model_id(&self.embedder).to_string();
        let hashes: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
        let cached = match &self.cache {
            Some(cache) => cache.get_many(&model_id, &hashes),
            None => Default::default(),
        };
        let mut out: Vec<Option<Vec<f32>>> = hashes.iter().map(|h| cached.get(h).cloned()).collect();
        let hits = out.iter().filter(|v| v.is_some()).count();
        let missing: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();

        for batch in missing.chunks(self.config.embed_batch_size) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.embedder.try_embed_batch(&batch_texts).await?;
            let mut fresh = Vec::with_capacity(batch.len());
            for (&i, vector) in batch.iter().zip(vectors) {
                fresh.push(CacheEntry { content_hash: hashes[i].clone(), embedder_id: model_id.clone(), vector: vector.clone() });
                out[i] = Some(vector);
            }
            if let Some(cache) = &self.cache {
                cache.put_many(&fresh).await?;
            }
        }
        out.into_iter()
            .map(|v| v.ok_or_else(|| Error::Storage("embedding missing after batch".to_string())))
            .collect::<Result<Vec<_>>>()
            .map(|vectors| (vectors, hits))
    }
}

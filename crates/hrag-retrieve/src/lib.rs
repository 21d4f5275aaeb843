use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use hrag_core::traits::{ChatModel, Embedder};
use hrag_core::types::{ChildChunk, RetrievalResult, RetrievedChunk, ScoredParent, Tier};
use hrag_core::Result;
use hrag_embed::{prompts, Resilient};
use hrag_vector::{IndexStore, ParentFilter};

/// Two-stage search: pick the best parents by summary, then rank only
/// their children against the same query vector.
pub struct HierarchicalRetriever<E: ?Sized = dyn Embedder> {
    embedder: Resilient<E>,
    store: Arc<IndexStore>,
}

impl<E: Embedder + ?Sized> HierarchicalRetriever<E> {
    pub fn new(embedder: Resilient<E>, store: Arc<IndexStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// At most `top_children` chunks, all belonging to the `top_parents`
    /// best-matching parents, best first with ties broken by id. Fewer
    /// results are returned when the index holds fewer.
    pub async fn retrieve(&self, query: &str, top_parents: usize, top_children: usize) -> Result<RetrievalResult> {
        let started = Instant::now();
        let empty = RetrievalResult { query: query.to_string(), parents: Vec::new(), chunks: Vec::new(), candidate_pool: 0 };
        if top_parents == 0 || top_children == 0 {
            return Ok(empty);
        }
        let q_vec = self.embedder.try_embed(query).await.map_err(|e| e.escalate())?;

        // 1) summary tier
        let parents: Vec<ScoredParent> = self
            .store
            .search(Tier::Summary, &q_vec, top_parents, None)?
            .into_iter()
            .filter_map(|(id, score)| {
                self.store.get(Tier::Summary, &id).map(|e| ScoredParent {
                    id,
                    document_id: e.payload.document_id,
                    summary: e.payload.text,
                    score,
                })
            })
            .collect();
        if parents.is_empty() {
            return Ok(empty);
        }

        // 2) detail tier, restricted to the chosen parents
        let filter = ParentFilter::new(parents.iter().map(|p| p.id.clone()));
        let candidate_pool = self.store.child_count_for(&filter);
        let chunks: Vec<RetrievedChunk> = self
            .store
            .search(Tier::Detail, &q_vec, top_children, Some(&filter))?
            .into_iter()
            .filter_map(|(id, score)| {
                self.store.get(Tier::Detail, &id).map(|e| RetrievedChunk {
                    chunk: ChildChunk {
                        id,
                        parent_id: e.payload.parent_id.unwrap_or_default(),
                        text: e.payload.text,
                        vector: None,
                    },
                    document_id: e.payload.document_id,
                    source_path: e.payload.source_path,
                    score,
                })
            })
            .collect();

        debug!(
            query,
            parents = parents.len(),
            candidate_pool,
            chunks = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieved"
        );
        Ok(RetrievalResult { query: query.to_string(), parents, chunks, candidate_pool })
    }
}

/// Answers a question from retrieved contexts with a chat model.
pub struct AnswerGenerator<C: ?Sized = dyn ChatModel> {
    chat: Resilient<C>,
}

impl<C: ChatModel + ?Sized> AnswerGenerator<C> {
    pub fn new(chat: Resilient<C>) -> Self {
        Self { chat }
    }

    pub async fn answer(&self, question: &str, contexts: &[String]) -> Result<String> {
        let prompt = prompts::answer_prompt(question, contexts);
        self.chat.try_complete(prompts::ANSWER_SYSTEM, &prompt).await.map_err(|e| e.escalate())
    }
}

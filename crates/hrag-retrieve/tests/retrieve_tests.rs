use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use hrag_core::chunker::Chunker;
use hrag_core::config::ChunkingConfig;
use hrag_core::traits::Embedder;
use hrag_core::types::{Document, Payload, Tier};
use hrag_core::ServiceError;
use hrag_embed::{CallGate, Models, Resilient, RetryPolicy};
use hrag_retrieve::{AnswerGenerator, HierarchicalRetriever};
use hrag_vector::{IndexStore, Orchestrator, OrchestratorConfig};

/// Embedder with canned vectors per query string.
struct Lookup {
    vectors: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl Embedder for Lookup {
    fn model_id(&self) -> &str {
        "lookup"
    }

    fn dim(&self) -> usize {
        3
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().ok_or(ServiceError::InvalidResponse { message: format!("no vector for {t}") }))
            .collect()
    }
}

fn lookup(pairs: &[(&str, [f32; 3])]) -> Resilient<dyn Embedder> {
    let vectors = pairs.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect();
    let embedder: Arc<dyn Embedder> = Arc::new(Lookup { vectors });
    Resilient::new(embedder, CallGate::new(2), RetryPolicy::no_retry())
}

fn payload(doc: &str, text: &str, parent: Option<&str>) -> Payload {
    Payload {
        document_id: doc.to_string(),
        source_path: format!("/corpus/{doc}"),
        text: text.to_string(),
        parent_id: parent.map(str::to_string),
    }
}

/// Three documents, one parent each, four children per parent. Parent
/// `d0` points along x, `d1` along y, `d2` along z; children lean towards
/// their parent's axis with varying strength.
fn three_doc_store() -> Arc<IndexStore> {
    let store = IndexStore::new(3);
    let axes = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    for (d, axis) in axes.iter().enumerate() {
        let doc = format!("d{d}");
        let parent = format!("{doc}#p0000");
        store.upsert(Tier::Summary, parent.clone(), axis.to_vec(), payload(&doc, &format!("summary {d}"), None)).unwrap();
        for c in 0..4 {
            let mut v = axis.to_vec();
            // children 0 and 1 share a vector so their scores tie
            let lean = [0.1, 0.1, 0.5, 0.9][c];
            v[(d + 1) % 3] = lean;
            store
                .upsert(Tier::Detail, format!("{parent}/c{c:04}"), v, payload(&doc, &format!("child {d}.{c}"), Some(&parent)))
                .unwrap();
        }
    }
    Arc::new(store)
}

#[tokio::test]
async fn top_children_come_from_top_parents_only() {
    let store = three_doc_store();
    let retriever = HierarchicalRetriever::new(lookup(&[("q", [1.0, 0.6, 0.0])]), store);

    let result = retriever.retrieve("q", 2, 5).await.unwrap();

    let parent_ids: Vec<&str> = result.parents.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(parent_ids, vec!["d0#p0000", "d1#p0000"]);
    assert_eq!(result.candidate_pool, 8);
    assert_eq!(result.len(), 5);
    for chunk in &result.chunks {
        assert!(parent_ids.contains(&chunk.chunk.parent_id.as_str()), "{} escaped the parent filter", chunk.chunk.id);
    }
    for w in result.chunks.windows(2) {
        assert!(w[0].score > w[1].score || (w[0].score == w[1].score && w[0].chunk.id < w[1].chunk.id));
    }
    assert_eq!(result.chunks[0].chunk.id, "d0#p0000/c0002");
    assert_eq!(result.contexts()[0], "child 0.2");
    assert_eq!(result.chunks[4].chunk.id, "d1#p0000/c0000");
    assert_eq!(result.chunks[0].source_path, "/corpus/d0");
}

#[tokio::test]
async fn tied_scores_break_by_ascending_id() {
    let store = three_doc_store();
    let retriever = HierarchicalRetriever::new(lookup(&[("x", [1.0, 0.0, 0.0])]), store);

    let result = retriever.retrieve("x", 1, 4).await.unwrap();
    let ids: Vec<&str> = result.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["d0#p0000/c0000", "d0#p0000/c0001", "d0#p0000/c0002", "d0#p0000/c0003"]);
}

#[tokio::test]
async fn more_parents_never_shrink_the_candidate_pool() {
    let store = three_doc_store();
    let retriever = HierarchicalRetriever::new(lookup(&[("q", [0.3, 0.5, 0.2])]), store);

    let mut last = 0;
    for k in 1..=4 {
        let result = retriever.retrieve("q", k, 3).await.unwrap();
        assert!(result.candidate_pool >= last);
        last = result.candidate_pool;
    }
    assert_eq!(last, 12);
}

#[tokio::test]
async fn more_children_never_shrink_the_result() {
    let store = three_doc_store();
    let retriever = HierarchicalRetriever::new(lookup(&[("q", [0.3, 0.5, 0.2])]), store);

    let mut last = 0;
    for n in 1..=10 {
        let result = retriever.retrieve("q", 2, n).await.unwrap();
        assert!(result.len() >= last, "top_children {n} returned {} after {last}", result.len());
        last = result.len();
    }
    assert_eq!(last, 8);
}

#[tokio::test]
async fn underfilled_index_returns_what_exists() {
    let store = IndexStore::new(3);
    store.upsert(Tier::Summary, "only#p0000", vec![1.0, 0.0, 0.0], payload("only", "s", None)).unwrap();
    store
        .upsert(Tier::Detail, "only#p0000/c0000", vec![1.0, 0.0, 0.0], payload("only", "c", Some("only#p0000")))
        .unwrap();
    let retriever = HierarchicalRetriever::new(lookup(&[("q", [1.0, 0.0, 0.0])]), Arc::new(store));

    let result = retriever.retrieve("q", 2, 5).await.unwrap();
    assert_eq!(result.parents.len(), 1);
    assert_eq!(result.len(), 1);

    let empty = HierarchicalRetriever::new(lookup(&[("q", [1.0, 0.0, 0.0])]), Arc::new(IndexStore::new(3)));
    assert!(empty.retrieve("q", 2, 5).await.unwrap().is_empty());
    assert!(retriever.retrieve("q", 0, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_ingest_then_retrieve_and_answer() {
    let models = Models::offline(128, 12, CallGate::new(4), RetryPolicy::no_retry());
    let chunker = Chunker::new(ChunkingConfig { parent_words: 0, parent_overlap: 0, child_words: 12, child_overlap: 3 }).unwrap();
    let store = Arc::new(IndexStore::new(128));
    let docs = vec![
        Document::new("water.txt", "Rainwater tanks need a mesh filter. Clean the rainwater filter every month so the tank water stays clear and safe for the garden.", "/c/water.txt"),
        Document::new("goats.txt", "Goats need fresh hay and clean bedding. In winter goats eat more hay and need shelter from wind and rain.", "/c/goats.txt"),
        Document::new("solar.txt", "Solar panels charge the battery bank. Keep the panels free of dust and check battery voltage after cloudy weeks.", "/c/solar.txt"),
    ];
    let report = Orchestrator::from_models(chunker, &models, store.clone(), OrchestratorConfig::default())
        .run(docs)
        .await
        .unwrap();
    assert_eq!(report.processed, 3);

    let retriever = HierarchicalRetriever::new(models.embedder(), store);
    let result = retriever.retrieve("how often should I clean the rainwater filter", 1, 2).await.unwrap();
    assert_eq!(result.parents[0].document_id, "water.txt");
    assert!(result.chunks.iter().all(|c| c.document_id == "water.txt"));

    let answer = AnswerGenerator::new(models.chat()).answer(&result.query, &result.contexts()).await.unwrap();
    assert!(!answer.is_empty());
}

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use hrag_core::traits::{ChatModel, Embedder};
use hrag_core::{Error, Result};
use hrag_embed::Resilient;
use hrag_retrieve::{AnswerGenerator, HierarchicalRetriever};

use crate::export::{EvalRecord, EvalSummary};
use crate::metrics::{answer_relevancy, context_recall};
use crate::testset::TestSample;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutcome {
    pub records: Vec<EvalRecord>,
    /// Questions that could not be evaluated, with the reason.
    pub failures: Vec<(String, String)>,
}

impl EvalOutcome {
    pub fn summary(&self) -> EvalSummary {
        EvalSummary::from_records(&self.records, self.failures.len())
    }
}

pub struct Evaluator<E: ?Sized = dyn Embedder, C: ?Sized = dyn ChatModel> {
    retriever: HierarchicalRetriever<E>,
    answerer: AnswerGenerator<C>,
    embedder: Resilient<E>,
    top_parents: usize,
    top_children: usize,
    concurrency: usize,
    raise_exceptions: bool,
}

impl<E: Embedder + ?Sized, C: ChatModel + ?Sized> Evaluator<E, C> {
    pub fn new(
        retriever: HierarchicalRetriever<E>,
        answerer: AnswerGenerator<C>,
        embedder: Resilient<E>,
        top_parents: usize,
        top_children: usize,
    ) -> Self {
        Self { retriever, answerer, embedder, top_parents, top_children, concurrency: 4, raise_exceptions: false }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn raise_exceptions(mut self, raise: bool) -> Self {
        self.raise_exceptions = raise;
        self
    }

    /// Score every sample; records keep the order of `samples`.
    pub async fn evaluate(&self, samples: &[TestSample]) -> Result<EvalOutcome> {
        info!(samples = samples.len(), top_parents = self.top_parents, top_children = self.top_children, "evaluation started");
        let mut results = stream::iter(samples).map(|s| async move { (s, self.evaluate_one(s).await) }).buffered(self.concurrency);

        let mut outcome = EvalOutcome::default();
        while let Some((sample, result)) = results.next().await {
            match result {
                Ok(record) => {
                    debug!(question = %sample.question, relevancy = record.answer_relevancy, recall = record.context_recall, "scored");
                    outcome.records.push(record);
                }
                Err(e) => {
                    let e = e.escalate();
                    if self.raise_exceptions || e.is_fatal() {
                        return Err(e);
                    }
                    warn!(question = %sample.question, error = %e, "evaluation failed for sample");
                    outcome.failures.push((sample.question.clone(), e.to_string()));
                }
            }
        }
        info!(summary = %outcome.summary(), "evaluation finished");
        Ok(outcome)
    }

    pub async fn evaluate_one(&self, sample: &TestSample) -> Result<EvalRecord> {
        let retrieved = self.retriever.retrieve(&sample.question, self.top_parents, self.top_children).await?;
        let contexts = retrieved.contexts();
        let answer = self.answerer.answer(&sample.question, &contexts).await?;
        let vectors = self.embedder.try_embed_batch(&[sample.question.clone(), answer.clone()]).await?;
        let [q, a] = vectors.as_slice() else {
            return Err(Error::Storage("expected two embeddings".to_string()));
        };
        Ok(EvalRecord {
            question: sample.question.clone(),
            ground_truth: sample.ground_truth.clone(),
            generated_answer: answer,
            answer_relevancy: answer_relevancy(q, a),
            context_recall: context_recall(&sample.ground_truth, &contexts),
            retrieved_contexts: contexts,
        })
    }
}

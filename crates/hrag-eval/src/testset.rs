use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use hrag_core::chunker::Chunker;
use hrag_core::traits::ChatModel;
use hrag_core::types::{Document, ParentChunk};
use hrag_core::{Error, Result, ServiceError};
use hrag_embed::{prompts, Resilient};

/// One evaluation question with its reference answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSample {
    pub question: String,
    pub ground_truth: String,
    /// Parent chunk the pair was generated from.
    pub source_id: String,
    pub document_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestsetOutcome {
    pub samples: Vec<TestSample>,
    /// Parents whose generation failed and were skipped.
    pub skipped: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct GeneratedPair {
    question: String,
    ground_truth: String,
}

/// Prompt-and-parse generator: asks the chat model for one JSON pair per
/// sampled parent chunk.
pub struct TestsetGenerator<C: ?Sized = dyn ChatModel> {
    chat: Resilient<C>,
    size: usize,
    raise_exceptions: bool,
}

impl<C: ChatModel + ?Sized> TestsetGenerator<C> {
    pub fn new(chat: Resilient<C>, size: usize, raise_exceptions: bool) -> Self {
        Self { chat, size, raise_exceptions }
    }

    /// Generate up to `size` samples. With `raise_exceptions` unset a
    /// failing parent is skipped and the batch continues, so the result may
    /// hold fewer samples than requested.
    pub async fn generate(&self, documents: &[Document], chunker: &Chunker) -> Result<TestsetOutcome> {
        let mut parents: Vec<ParentChunk> = Vec::new();
        for doc in documents {
            match chunker.chunk(doc) {
                Ok(groups) => parents.extend(groups.into_iter().map(|g| g.parent)),
                Err(e) => warn!(doc = %doc.id, error = %e, "document not usable for test set"),
            }
        }
        let picked = sample_evenly(&parents, self.size);
        info!(parents = parents.len(), requested = self.size, picked = picked.len(), "generating test set");

        let mut outcome = TestsetOutcome::default();
        for parent in picked {
            match self.generate_one(parent).await {
                Ok(sample) => outcome.samples.push(sample),
                Err(e) => {
                    let e = e.escalate();
                    if self.raise_exceptions || e.is_fatal() {
                        return Err(e);
                    }
                    warn!(parent = %parent.id, error = %e, "skipping test sample");
                    outcome.skipped.push((parent.id.clone(), e.to_string()));
                }
            }
        }
        info!(samples = outcome.samples.len(), skipped = outcome.skipped.len(), "test set generated");
        Ok(outcome)
    }

    async fn generate_one(&self, parent: &ParentChunk) -> Result<TestSample> {
        let reply = self.chat.try_complete(prompts::TESTSET_SYSTEM, &prompts::testset_prompt(&parent.text)).await?;
        let pair = parse_pair(&reply).map_err(|source| Error::ExternalService {
            operation: "testset".to_string(),
            attempts: 1,
            source,
        })?;
        Ok(TestSample {
            question: pair.question,
            ground_truth: pair.ground_truth,
            source_id: parent.id.clone(),
            document_id: parent.document_id.clone(),
        })
    }
}

/// Every n-th parent so samples spread over the whole corpus.
fn sample_evenly(parents: &[ParentChunk], size: usize) -> Vec<&ParentChunk> {
    if size == 0 || parents.is_empty() {
        return Vec::new();
    }
    if parents.len() <= size {
        return parents.iter().collect();
    }
    (0..size).map(|i| &parents[i * parents.len() / size]).collect()
}

/// Accepts bare JSON or JSON wrapped in prose / code fences.
fn parse_pair(reply: &str) -> std::result::Result<GeneratedPair, ServiceError> {
    let invalid = |message: String| ServiceError::InvalidResponse { message };
    let start = reply.find('{').ok_or_else(|| invalid("no JSON object in reply".to_string()))?;
    let end = reply.rfind('}').filter(|&e| e > start).ok_or_else(|| invalid("unterminated JSON object".to_string()))?;
    let pair: GeneratedPair =
        serde_json::from_str(&reply[start..=end]).map_err(|e| invalid(format!("bad question/answer JSON: {e}")))?;
    if pair.question.trim().is_empty() || pair.ground_truth.trim().is_empty() {
        return Err(invalid("empty question or ground truth".to_string()));
    }
    Ok(GeneratedPair { question: pair.question.trim().to_string(), ground_truth: pair.ground_truth.trim().to_string() })
}

pub fn save_testset(path: &Path, samples: &[TestSample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(fs::File::create(path)?);
    for s in samples {
        let line = serde_json::to_string(s).map_err(|e| Error::Storage(e.to_string()))?;
        writeln!(w, "{line}")?;
    }
    w.flush()?;
    Ok(())
}

pub fn load_testset(path: &Path) -> Result<Vec<TestSample>> {
    let file = fs::File::open(path).map_err(|e| Error::config(format!("cannot open test set {}: {e}", path.display())))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample = serde_json::from_str(&line)
            .map_err(|e| Error::Storage(format!("{}:{}: {e}", path.display(), n + 1)))?;
        out.push(sample);
    }
    Ok(out)
}

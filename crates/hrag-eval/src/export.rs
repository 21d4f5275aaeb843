use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use hrag_core::{Error, Result};

/// Separator between retrieved contexts in the CSV column.
pub const CONTEXT_JOIN: &str = " || ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub question: String,
    pub ground_truth: String,
    pub generated_answer: String,
    pub retrieved_contexts: Vec<String>,
    pub answer_relevancy: f32,
    pub context_recall: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub samples: usize,
    pub failed: usize,
    pub answer_relevancy: f32,
    pub context_recall: f32,
}

impl EvalSummary {
    pub fn from_records(records: &[EvalRecord], failed: usize) -> Self {
        if records.is_empty() {
            return Self { failed, ..Self::default() };
        }
        let n = records.len() as f32;
        Self {
            samples: records.len(),
            failed,
            answer_relevancy: records.iter().map(|r| r.answer_relevancy).sum::<f32>() / n,
            context_recall: records.iter().map(|r| r.context_recall).sum::<f32>() / n,
        }
    }
}

impl std::fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "samples={} failed={} answer_relevancy={:.3} context_recall={:.3}",
            self.samples, self.failed, self.answer_relevancy, self.context_recall
        )
    }
}

/// Wrap the value in double-quotes if it contains a comma, newline, or
/// double-quote, doubling any embedded double-quotes.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(records: &[EvalRecord]) -> String {
    let mut buf = String::from("question,ground_truth,generated_answer,retrieved_contexts,answer_relevancy,context_recall\n");
    for r in records {
        buf.push_str(&format!(
            "{},{},{},{},{:.4},{:.4}\n",
            csv_escape(&r.question),
            csv_escape(&r.ground_truth),
            csv_escape(&r.generated_answer),
            csv_escape(&r.retrieved_contexts.join(CONTEXT_JOIN)),
            r.answer_relevancy,
            r.context_recall,
        ));
    }
    buf
}

fn create(path: &Path) -> Result<BufWriter<fs::File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(BufWriter::new(fs::File::create(path)?))
}

pub fn write_csv(path: &Path, records: &[EvalRecord]) -> Result<()> {
    let mut w = create(path)?;
    w.write_all(to_csv(records).as_bytes())?;
    w.flush()?;
    Ok(())
}

pub fn write_jsonl(path: &Path, records: &[EvalRecord]) -> Result<()> {
    let mut w = create(path)?;
    for r in records {
        let line = serde_json::to_string(r).map_err(|e| Error::Storage(e.to_string()))?;
        writeln!(w, "{line}")?;
    }
    w.flush()?;
    Ok(())
}

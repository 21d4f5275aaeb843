//! Offline evaluation: generate question/answer pairs from the corpus,
//! run them through retrieval and answering, and score the results.

pub mod evaluator;
pub mod export;
pub mod metrics;
pub mod testset;

pub use evaluator::{EvalOutcome, Evaluator};
pub use export::{write_csv, write_jsonl, EvalRecord, EvalSummary};
pub use testset::{load_testset, save_testset, TestSample, TestsetGenerator, TestsetOutcome};

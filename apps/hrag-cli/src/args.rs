//! Command-line arguments for the `hrag` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hrag", version, about = "Hierarchical retrieval over a plain-text corpus", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to config.toml plus config.<RUST_ENV>.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the deterministic offline models instead of the configured provider
    #[arg(long, global = true)]
    pub offline: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk, summarize and embed a corpus into the two-tier index
    Ingest(IngestArgs),
    /// Retrieve the best child chunks for a question
    Query(QueryArgs),
    /// Generate a question/ground-truth test set from the corpus
    Testset(TestsetArgs),
    /// Score retrieval and answers against a saved test set
    Eval(EvalArgs),
    /// Show what the index on disk contains
    Status,
}

#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Corpus directory (overrides corpus.dir)
    pub dir: Option<PathBuf>,

    /// Only ingest the first N files
    #[arg(long)]
    pub limit: Option<usize>,

    /// Abort on the first external-service or consistency failure
    #[arg(long)]
    pub strict: bool,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    pub text: String,

    /// Parents kept from the summary tier (K)
    #[arg(short = 'k', long)]
    pub top_parents: Option<usize>,

    /// Children returned from the detail tier (N)
    #[arg(short = 'n', long)]
    pub top_children: Option<usize>,

    /// Also generate an answer from the retrieved chunks
    #[arg(long)]
    pub answer: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TestsetArgs {
    /// Corpus directory (overrides corpus.dir)
    pub dir: Option<PathBuf>,

    #[arg(long)]
    pub size: Option<usize>,

    /// Output JSONL file (overrides eval.testset_path)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Fail on the first unusable chunk instead of skipping it
    #[arg(long)]
    pub raise: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EvalArgs {
    /// Test set JSONL (overrides eval.testset_path)
    #[arg(long)]
    pub testset: Option<PathBuf>,

    /// Results CSV; a JSONL copy is written next to it
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub raise: bool,
}

use clap::Parser;

use hrag_cli::args::{Cli, Command};
use hrag_cli::{commands, logging, resolve_settings};
use hrag_core::Error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let settings = resolve_settings(&cli).map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;

    match &cli.command {
        Command::Ingest(args) => match commands::ingest(&settings, args).await {
            Ok(outcome) => {
                print!("{}", outcome.report);
                println!(
                    "index: {} summaries, {} details, {} parents with children (dim {})",
                    outcome.stats.summaries, outcome.stats.details, outcome.stats.parents_with_children, outcome.stats.dim
                );
                if outcome.report.has_failures() {
                    std::process::exit(2);
                }
            }
            Err(err) => {
                if let Some(Error::StrictAbort(report)) = err.downcast_ref::<Error>() {
                    eprint!("{report}");
                }
                return Err(err);
            }
        },
        Command::Query(args) => {
            let outcome = commands::query(&settings, args).await?;
            let result = &outcome.result;
            println!("parents ({} candidate children):", result.candidate_pool);
            for p in &result.parents {
                println!("  {:.4}  {}  {}", p.score, p.id, p.summary);
            }
            if result.is_empty() {
                println!("no matching chunks");
            }
            for (rank, c) in result.chunks.iter().enumerate() {
                println!("{}. [{:.4}] {} ({})", rank + 1, c.score, c.chunk.id, c.source_path);
                println!("   {}", c.chunk.text);
            }
            if let Some(answer) = &outcome.answer {
                println!("\nanswer: {answer}");
            }
        }
        Command::Testset(args) => {
            let summary = commands::testset(&settings, args).await?;
            println!("wrote {} samples to {}", summary.written, summary.path.display());
            for (id, reason) in &summary.skipped {
                println!("  skipped {id}: {reason}");
            }
        }
        Command::Eval(args) => {
            let run = commands::eval(&settings, args).await?;
            println!("{}", run.summary);
            for (question, reason) in &run.failures {
                println!("  failed: {question}: {reason}");
            }
            println!("results: {} / {}", run.csv.display(), run.jsonl.display());
        }
        Command::Status => {
            let status = commands::status(&settings).await?;
            println!("index: {}", status.uri);
            match &status.meta {
                Some(meta) => println!("embedder: {} (dim {})", meta.embedder_id, meta.dim),
                None => println!("embedder: none recorded (index not built yet)"),
            }
            println!(
                "summaries: {}  details: {}  parents with children: {}",
                status.stats.summaries, status.stats.details, status.stats.parents_with_children
            );
            if let Some(n) = status.cached_embeddings {
                println!("cached embeddings: {n}");
            }
        }
    }
    Ok(())
}

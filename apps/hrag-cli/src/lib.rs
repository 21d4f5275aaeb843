//! The `hrag` command line: ingest a corpus, query the index, build a test
//! set and score it. Each command takes the resolved `Settings` so it can be
//! driven from tests without touching the process environment.

pub mod args;
pub mod commands;
pub mod logging;

use hrag_core::config::{Config, ProviderKind, Settings};
use std::path::Path;

use crate::args::Cli;

/// Resolve settings from the config layers plus command-line overrides.
pub fn resolve_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => {
            let mut settings = Config::load_file(path)?.settings()?;
            // relative paths in an explicit file are relative to that file
            let base = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            settings.rebase_paths(base);
            settings
        }
        None => Config::load()?.settings()?,
    };
    if cli.offline {
        settings.models.provider = ProviderKind::Offline;
    }
    Ok(settings)
}

//! Per-run accounting for the ingest orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedDocument,
    ExternalService,
    IndexConsistency,
    Configuration,
    Cancelled,
    Other,
}

impl FailureKind {
    pub fn of(err: &Error) -> Self {
        match err {
            Error::MalformedDocument { .. } => FailureKind::MalformedDocument,
            Error::ExternalService { .. } => FailureKind::ExternalService,
            Error::IndexConsistency { .. } => FailureKind::IndexConsistency,
            Error::Configuration(_) => FailureKind::Configuration,
            Error::Cancelled => FailureKind::Cancelled,
            Error::StrictAbort(_) | Error::Storage(_) | Error::Io(_) => FailureKind::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::MalformedDocument => "malformed_document",
            FailureKind::ExternalService => "external_service",
            FailureKind::IndexConsistency => "index_consistency",
            FailureKind::Configuration => "configuration",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Counts plus the first few messages of each failure category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub parents_indexed: usize,
    pub children_indexed: usize,
    pub cache_hits: usize,
    pub errors: BTreeMap<FailureKind, Vec<String>>,
    pub error_limit: usize,
}

impl RunReport {
    pub fn new(error_limit: usize) -> Self {
        Self { error_limit, ..Self::default() }
    }

    /// Record a per-item failure. Malformed documents count as skipped.
    pub fn record_failure(&mut self, item: &str, err: &Error) {
        let kind = FailureKind::of(err);
        match kind {
            FailureKind::MalformedDocument => self.skipped += 1,
            FailureKind::Cancelled => self.cancelled += 1,
            _ => self.failed += 1,
        }
        let messages = self.errors.entry(kind).or_default();
        if messages.len() < self.error_limit {
            messages.push(format!("{item}: {err}"));
        }
    }

    pub fn record_success(&mut self, parents: usize, children: usize) {
        self.processed += 1;
        self.parents_indexed += parents;
        self.children_indexed += children;
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed + self.cancelled
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn messages(&self, kind: FailureKind) -> &[String] {
        self.errors.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn headline(&self) -> String {
        format!(
            "processed={} skipped={} failed={} cancelled={}",
            self.processed, self.skipped, self.failed, self.cancelled
        )
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.headline())?;
        writeln!(
            f,
            "parents indexed={} children indexed={} cache hits={}",
            self.parents_indexed, self.children_indexed, self.cache_hits
        )?;
        for (kind, messages) in &self.errors {
            writeln!(f, "[{kind}]")?;
            for m in messages {
                writeln!(f, "  - {m}")?;
            }
        }
        Ok(())
    }
}

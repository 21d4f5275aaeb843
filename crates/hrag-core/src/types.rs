//! Domain types shared by the chunker, index store and retriever.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;

/// A raw file from the corpus directory.
///
/// - `id`: path relative to the corpus root, `/`-separated
/// - `raw_text`: decoded file content
/// - `source_path`: original location on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub raw_text: String,
    pub source_path: String,
}

impl Document {
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self { id: id.into(), raw_text: raw_text.into(), source_path: source_path.into() }
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.raw_text)
    }
}

/// Coarse segment of a document. Its summary keys the summary tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentChunk {
    pub id: ChunkId,
    pub document_id: String,
    pub text: String,
    pub summary: Option<String>,
    pub summary_vector: Option<Vec<f32>>,
}

/// Fine segment inside a parent. Holds the only link between the two
/// tiers; parents never list their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildChunk {
    pub id: ChunkId,
    pub parent_id: ChunkId,
    pub text: String,
    pub vector: Option<Vec<f32>>,
}

/// One parent with the children cut from its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentGroup {
    pub parent: ParentChunk,
    pub children: Vec<ChildChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Summary,
    Detail,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Summary, Tier::Detail];

    /// Collection name used in the persisted layout.
    pub fn table_name(self) -> &'static str {
        match self {
            Tier::Summary => "summary",
            Tier::Detail => "detail",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Data stored next to a vector. `parent_id` is only set on detail entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub document_id: String,
    pub source_path: String,
    pub text: String,
    pub parent_id: Option<ChunkId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub tier: Tier,
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredParent {
    pub id: ChunkId,
    pub document_id: String,
    pub summary: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: ChildChunk,
    pub document_id: String,
    pub source_path: String,
    pub score: f32,
}

/// Answer to one query. Built fresh per call and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub parents: Vec<ScoredParent>,
    pub chunks: Vec<RetrievedChunk>,
    /// Number of children that were eligible for the second stage.
    pub candidate_pool: usize,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn contexts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk.text.clone()).collect()
    }
}

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

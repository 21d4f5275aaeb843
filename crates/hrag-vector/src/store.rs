//! Two-tier vector index.
//!
//! The summary tier holds one vector per parent chunk; the detail tier
//! holds one vector per child chunk. Children are additionally indexed
//! by parent id so a filtered detail search only visits the children of
//! the selected parents.
//!
//! Both tiers live in `DashMap`s: concurrent upserts to the same id are
//! serialized per shard (last completed write wins) and searches never
//! wait on a store-wide lock. A search running during bulk population may
//! see a partially built index.
//!
//! Re-indexing a document first drops everything it produced before, so a
//! shorter revision leaves no stale children behind. Replaced document ids
//! are remembered until the store is saved.

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use hrag_core::types::{ChunkId, IndexEntry, Payload, Tier};
use hrag_core::{Error, Result};

/// Restricts a search to a set of parent ids.
///
/// On the detail tier only children of these parents are candidates; on
/// the summary tier only the parents themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentFilter {
    parents: BTreeSet<ChunkId>,
}

impl ParentFilter {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ChunkId>,
    {
        Self { parents: ids.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkId> {
        self.parents.iter()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dim: usize,
    pub summaries: usize,
    pub details: usize,
    pub parents_with_children: usize,
}

#[derive(Debug)]
pub struct IndexStore {
    dim: usize,
    summary: DashMap<ChunkId, IndexEntry>,
    detail: DashMap<ChunkId, IndexEntry>,
    children: DashMap<ChunkId, BTreeSet<ChunkId>>,
    replaced: DashSet<String>,
}

impl IndexStore {
    pub fn new(dim: usize) -> Self {
        Self { dim, summary: DashMap::new(), detail: DashMap::new(), children: DashMap::new(), replaced: DashSet::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn tier(&self, tier: Tier) -> &DashMap<ChunkId, IndexEntry> {
        match tier {
            Tier::Summary => &self.summary,
            Tier::Detail => &self.detail,
        }
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::config(format!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dim
            )));
        }
        Ok(())
    }

    /// Insert or overwrite an entry. A detail entry must name a parent that
    /// is already present in the summary tier.
    pub fn upsert(&self, tier: Tier, id: impl Into<ChunkId>, vector: Vec<f32>, payload: Payload) -> Result<()> {
        let id = id.into();
        self.check_dim(&vector)?;
        match tier {
            Tier::Summary => {
                debug!(id = %id, "upsert summary");
                self.summary.insert(id.clone(), IndexEntry { tier, id, vector, payload });
            }
            Tier::Detail => {
                let parent_id = match payload.parent_id.as_deref() {
                    Some(p) if self.summary.contains_key(p) => p.to_string(),
                    other => {
                        return Err(Error::IndexConsistency {
                            child_id: id,
                            parent_id: other.unwrap_or_default().to_string(),
                        })
                    }
                };
                debug!(id = %id, parent = %parent_id, "upsert detail");
                let previous = self.detail.insert(id.clone(), IndexEntry { tier, id: id.clone(), vector, payload });
                if let Some(old_parent) = previous.and_then(|e| e.payload.parent_id) {
                    if old_parent != parent_id {
                        if let Some(mut set) = self.children.get_mut(&old_parent) {
                            set.remove(&id);
                        }
                    }
                }
                self.children.entry(parent_id).or_default().insert(id);
            }
        }
        Ok(())
    }

    /// Top `k` entries by cosine similarity, best first, ties broken by
    /// ascending id.
    pub fn search(&self, tier: Tier, query: &[f32], k: usize, filter: Option<&ParentFilter>) -> Result<Vec<(ChunkId, f32)>> {
        self.check_dim(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_norm = norm(query);
        let map = self.tier(tier);
        let mut scored: Vec<(ChunkId, f32)> = match (tier, filter) {
            (_, None) => map.iter().map(|e| (e.key().clone(), cosine(query, query_norm, &e.value().vector))).collect(),
            (Tier::Summary, Some(f)) => f
                .iter()
                .filter_map(|id| map.get(id).map(|e| (id.clone(), cosine(query, query_norm, &e.vector))))
                .collect(),
            (Tier::Detail, Some(f)) => {
                let mut scored = Vec::with_capacity(self.child_count_for(f));
                for set in f.iter().filter_map(|p| self.children.get(p)) {
                    scored.extend(
                        set.iter().filter_map(|id| map.get(id).map(|e| (id.clone(), cosine(query, query_norm, &e.vector)))),
                    );
                }
                scored
            }
        };
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Drop every summary and detail entry of `document_id` and remember
    /// the id so the next save clears its persisted rows. Returns the
    /// number of entries removed.
    pub fn remove_document(&self, document_id: &str) -> usize {
        let parents: Vec<ChunkId> =
            self.summary.iter().filter(|e| e.payload.document_id == document_id).map(|e| e.key().clone()).collect();
        let mut removed = 0;
        self.detail.retain(|_, e| {
            let keep = e.payload.document_id != document_id;
            removed += usize::from(!keep);
            keep
        });
        for parent in &parents {
            self.children.remove(parent);
            if self.summary.remove(parent).is_some() {
                removed += 1;
            }
        }
        self.replaced.insert(document_id.to_string());
        if removed > 0 {
            debug!(doc = %document_id, removed, "removed document entries");
        }
        removed
    }

    /// Documents dropped through `remove_document`, sorted.
    pub fn replaced_documents(&self) -> Vec<String> {
        let mut out: Vec<String> = self.replaced.iter().map(|d| d.key().clone()).collect();
        out.sort();
        out
    }

    pub fn get(&self, tier: Tier, id: &str) -> Option<IndexEntry> {
        self.tier(tier).get(id).map(|e| e.value().clone())
    }

    pub fn contains(&self, tier: Tier, id: &str) -> bool {
        self.tier(tier).contains_key(id)
    }

    pub fn len(&self, tier: Tier) -> usize {
        self.tier(tier).len()
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.detail.is_empty()
    }

    /// Child ids of `parent_id` in ascending order.
    pub fn children_of(&self, parent_id: &str) -> Vec<ChunkId> {
        self.children.get(parent_id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Size of the candidate pool a filtered detail search would score.
    pub fn child_count_for(&self, filter: &ParentFilter) -> usize {
        filter.iter().filter_map(|p| self.children.get(p)).map(|set| set.len()).sum()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            dim: self.dim,
            summaries: self.summary.len(),
            details: self.detail.len(),
            parents_with_children: self.children.iter().filter(|e| !e.value().is_empty()).count(),
        }
    }

    /// Snapshot of one tier, sorted by id.
    pub fn entries(&self, tier: Tier) -> Vec<IndexEntry> {
        let mut out: Vec<IndexEntry> = self.tier(tier).iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; zero vectors score 0.
fn cosine(query: &[f32], query_norm: f32, v: &[f32]) -> f32 {
    let denom = query_norm * norm(v);
    if denom <= f32::EPSILON {
        return 0.0;
    }
    query.iter().zip(v).map(|(a, b)| a * b).sum::<f32>() / denom
}

//! Embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! Consulted before calling the embedder and written through on misses.
//! The in-memory map is authoritative for a run; when opened against a
//! LanceDB directory the `emb_cache` table is loaded at startup and every
//! new entry is merged into it, so re-ingesting an unchanged corpus makes
//! no embedding calls.
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use dashmap::DashMap;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use hrag_core::Result;

use crate::schema::build_cache_schema;
use crate::table::{ensure_table, open_db, storage, string_column, table_exists, vector_array, vector_at, vector_column};

pub const CACHE_TABLE: &str = "emb_cache";

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

pub struct EmbeddingCache {
    dim: usize,
    entries: DashMap<(String, String), Vec<f32>>,
    conn: Option<Connection>,
    // one writer at a time against the lance table
    write_lock: tokio::sync::Mutex<()>,
}

impl EmbeddingCache {
    pub fn in_memory(dim: usize) -> Self {
        Self { dim, entries: DashMap::new(), conn: None, write_lock: tokio::sync::Mutex::new(()) }
    }

    /// Open (or create) the cache table under `uri` and load its rows.
    pub async fn open(uri: &str, dim: usize) -> Result<Self> {
        let conn = open_db(uri).await?;
        let cache = Self { dim, entries: DashMap::new(), conn: Some(conn), write_lock: tokio::sync::Mutex::new(()) };
        let loaded = cache.load().await?;
        info!(uri, loaded, "embedding cache opened");
        Ok(cache)
    }

    async fn load(&self) -> Result<usize> {
        let Some(conn) = &self.conn else { return Ok(0) };
        if !table_exists(conn, CACHE_TABLE).await? {
            return Ok(0);
        }
        let t = conn.open_table(CACHE_TABLE).execute().await.map_err(storage)?;
        let mut stream = t.query().execute().await.map_err(storage)?;
        let mut loaded = 0usize;
        while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(storage)? {
            let hash_col = string_column(&batch, "content_hash")?;
            let eid_col = string_column(&batch, "embedder_id")?;
            let vec_col = vector_column(&batch)?;
            for i in 0..batch.num_rows() {
                let vals = vector_at(vec_col, i);
                if vals.len() != self.dim {
                    continue;
                }
                self.entries.insert((hash_col.value(i).to_string(), eid_col.value(i).to_string()), vals);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, embedder_id: &str, content_hash: &str) -> Option<Vec<f32>> {
        self.entries.get(&(content_hash.to_string(), embedder_id.to_string())).map(|v| v.clone())
    }

    /// Cached vectors for the given hashes; misses are simply absent.
    pub fn get_many(&self, embedder_id: &str, hashes: &[String]) -> HashMap<String, Vec<f32>> {
        hashes.iter().filter_map(|h| self.get(embedder_id, h).map(|v| (h.clone(), v))).collect()
    }

    pub async fn put_many(&self, entries: &[CacheEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        for e in entries {
            self.entries.insert((e.content_hash.clone(), e.embedder_id.clone()), e.vector.clone());
        }
        let Some(conn) = &self.conn else { return Ok(()) };
        let _guard = self.write_lock.lock().await;
        ensure_table(conn, CACHE_TABLE, build_cache_schema(self.dim)).await?;
        let t = conn.open_table(CACHE_TABLE).execute().await.map_err(storage)?;
        let now = Utc::now().timestamp_millis();
        let vectors: Vec<Vec<f32>> = entries.iter().map(|e| e.vector.clone()).collect();
        let batch = RecordBatch::try_new(
            build_cache_schema(self.dim),
            vec![
                Arc::new(StringArray::from(entries.iter().map(|e| e.content_hash.clone()).collect::<Vec<_>>())),
                Arc::new(StringArray::from(entries.iter().map(|e| e.embedder_id.clone()).collect::<Vec<_>>())),
                Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
                Arc::new(vector_array(&vectors, self.dim)),
            ],
        )
        .map_err(storage)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_cache_schema(self.dim)));
        let mut mi = t.merge_insert(&["content_hash", "embedder_id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await.map_err(storage)?;
        debug!(count = entries.len(), "cache entries written");
        Ok(())
    }
}

//! Save and reload an `IndexStore` as LanceDB tables.
//!
//! Layout under the index directory:
//! - `summary`, `detail`: `{id, parent_id, document_id, source_path, text, vector}`
//! - `meta`: `embedder_id`, `dim`
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray};
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use hrag_core::types::{IndexEntry, Payload, Tier};
use hrag_core::{Error, Result};

use crate::schema::build_index_schema;
use crate::store::{IndexStats, IndexStore};
use crate::table::{
    get_meta, open_db, optional_string, set_meta, sql_string, storage, string_column, table_exists, vector_array,
    vector_at, vector_column,
};

const WRITE_BATCH: usize = 1000;

/// Model that produced a persisted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub embedder_id: String,
    pub dim: usize,
}

fn entries_to_record_batch(entries: &[IndexEntry], dim: usize) -> Result<RecordBatch> {
    let vectors: Vec<Vec<f32>> = entries.iter().map(|e| e.vector.clone()).collect();
    RecordBatch::try_new(
        build_index_schema(dim),
        vec![
            Arc::new(StringArray::from(entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.payload.parent_id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.payload.document_id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.payload.source_path.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.payload.text.clone()).collect::<Vec<_>>())),
            Arc::new(vector_array(&vectors, dim)),
        ],
    )
    .map_err(storage)
}

async fn write_tier(conn: &Connection, store: &IndexStore, tier: Tier, replaced: &[String]) -> Result<usize> {
    let entries = store.entries(tier);
    let name = tier.table_name();
    let schema = build_index_schema(store.dim());
    if !replaced.is_empty() && table_exists(conn, name).await? {
        let t = conn.open_table(name).execute().await.map_err(storage)?;
        for docs in replaced.chunks(WRITE_BATCH) {
            let list: Vec<String> = docs.iter().map(|d| sql_string(d)).collect();
            t.delete(&format!("document_id IN ({})", list.join(", "))).await.map_err(storage)?;
        }
    }
    for batch_entries in entries.chunks(WRITE_BATCH) {
        let batch = entries_to_record_batch(batch_entries, store.dim())?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema.clone()));
        if table_exists(conn, name).await? {
            let t = conn.open_table(name).execute().await.map_err(storage)?;
            let mut mi = t.merge_insert(&["id"]);
            mi.when_matched_update_all(None).when_not_matched_insert_all();
            mi.execute(reader).await.map_err(storage)?;
        } else {
            conn.create_table(name, reader).execute().await.map_err(storage)?;
        }
    }
    Ok(entries.len())
}

/// Write both tiers and the model metadata. Rows of documents the store
/// re-indexed are deleted first; other rows with the same id are replaced.
pub async fn save(store: &IndexStore, uri: &str, embedder_id: &str) -> Result<IndexStats> {
    let conn = open_db(uri).await?;
    if let Some(meta) = read_meta(&conn).await? {
        if meta.dim != store.dim() {
            return Err(Error::config(format!(
                "index at {uri} was built with dimension {}, refusing to write dimension {}",
                meta.dim,
                store.dim()
            )));
        }
    }
    let replaced = store.replaced_documents();
    let summaries = write_tier(&conn, store, Tier::Summary, &replaced).await?;
    let details = write_tier(&conn, store, Tier::Detail, &replaced).await?;
    set_meta(&conn, "embedder_id", embedder_id).await?;
    set_meta(&conn, "dim", &store.dim().to_string()).await?;
    info!(uri, summaries, details, replaced = replaced.len(), "index saved");
    Ok(store.stats())
}

async fn read_meta(conn: &Connection) -> Result<Option<IndexMeta>> {
    let Some(dim) = get_meta(conn, "dim").await? else { return Ok(None) };
    let dim = dim.parse::<usize>().map_err(|e| Error::Storage(format!("bad dim in meta table: {e}")))?;
    let embedder_id = get_meta(conn, "embedder_id").await?.unwrap_or_default();
    Ok(Some(IndexMeta { embedder_id, dim }))
}

pub async fn load_meta(uri: &str) -> Result<Option<IndexMeta>> {
    let conn = open_db(uri).await?;
    read_meta(&conn).await
}

async fn read_tier(conn: &Connection, store: &IndexStore, tier: Tier) -> Result<usize> {
    let name = tier.table_name();
    if !table_exists(conn, name).await? {
        return Ok(0);
    }
    let t = conn.open_table(name).execute().await.map_err(storage)?;
    let mut stream = t.query().execute().await.map_err(storage)?;
    let mut count = 0usize;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(storage)? {
        let ids = string_column(&batch, "id")?;
        let parents = string_column(&batch, "parent_id")?;
        let docs = string_column(&batch, "document_id")?;
        let paths = string_column(&batch, "source_path")?;
        let texts = string_column(&batch, "text")?;
        let vectors = vector_column(&batch)?;
        for i in 0..batch.num_rows() {
            let payload = Payload {
                document_id: docs.value(i).to_string(),
                source_path: paths.value(i).to_string(),
                text: texts.value(i).to_string(),
                parent_id: optional_string(parents, i),
            };
            store.upsert(tier, ids.value(i), vector_at(vectors, i), payload)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Rebuild a store from `uri`. Fails with `Configuration` when the index
/// was built with a different dimension, and with `IndexConsistency` if a
/// persisted child points at a parent that is not on disk.
pub async fn load(uri: &str, dim: usize) -> Result<(IndexStore, Option<IndexMeta>)> {
    let conn = open_db(uri).await?;
    let meta = read_meta(&conn).await?;
    if let Some(m) = &meta {
        if m.dim != dim {
            return Err(Error::config(format!(
                "index at {uri} has dimension {} but the embedder produces {dim}",
                m.dim
            )));
        }
    }
    let store = IndexStore::new(dim);
    let summaries = read_tier(&conn, &store, Tier::Summary).await?;
    let details = read_tier(&conn, &store, Tier::Detail).await?;
    info!(uri, summaries, details, "index loaded");
    Ok((store, meta))
}

//! LanceDB connection and housekeeping helpers.
//!
//! Opens databases, creates empty tables on demand, and keeps a small
//! key/value `meta` table describing the model that built the index.
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

use hrag_core::{Error, Result};

use crate::schema::build_meta_schema;

pub const META_TABLE: &str = "meta";

pub(crate) fn storage(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    if !uri.contains("://") {
        std::fs::create_dir_all(uri)?;
    }
    connect(uri).execute().await.map_err(storage)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(storage)?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(storage)?;
    Ok(())
}

pub async fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    ensure_table(conn, META_TABLE, build_meta_schema()).await?;
    let t = conn.open_table(META_TABLE).execute().await.map_err(storage)?;
    let rb = RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )
    .map_err(storage)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    mi.execute(reader).await.map_err(storage)?;
    Ok(())
}

/// Quote `value` as a SQL string literal for a Lance filter.
pub(crate) fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub async fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, META_TABLE).await? {
        return Ok(None);
    }
    let t = conn.open_table(META_TABLE).execute().await.map_err(storage)?;
    let mut stream = t
        .query()
        .only_if(&format!("key = {}", sql_string(key)))
        .execute()
        .await
        .map_err(storage)?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(storage)? {
        if batch.num_rows() == 0 {
            continue;
        }
        let val = string_column(&batch, "value")?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

pub(crate) fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Storage(format!("{name} column missing")))
}

pub(crate) fn vector_column<'a>(batch: &'a RecordBatch) -> Result<&'a FixedSizeListArray> {
    batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| Error::Storage("vector column missing".to_string()))
}

pub(crate) fn vector_at(col: &FixedSizeListArray, i: usize) -> Vec<f32> {
    let list = col.value(i);
    list.as_primitive::<Float32Type>().values().iter().copied().collect()
}

pub(crate) fn vector_array(vectors: &[Vec<f32>], dim: usize) -> FixedSizeListArray {
    let items = vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(items, dim as i32)
}

pub(crate) fn optional_string(col: &StringArray, i: usize) -> Option<String> {
    if col.is_null(i) {
        None
    } else {
        Some(col.value(i).to_string())
    }
}

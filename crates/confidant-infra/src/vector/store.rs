//! LanceDB-backed scoped memory store.
//!
//! Implements `VectorMemoryStore` from `confidant-core`. Memories of every
//! scope share one table; scope, session, user and server are plain columns
//! turned into a prefilter, and similarity search is a cosine nearest-neighbour
//! query. LanceDB reports cosine distance, so similarity is `1 - distance`.

use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use uuid::Uuid;

use confidant_core::memory::vector::VectorMemoryStore;
use confidant_types::error::RepositoryError;
use confidant_types::memory::{MemoryFilter, MemoryMatch, MemoryRecord};

use super::lance::LanceVectorStore;
use super::schema::{MEMORY_TABLE, memory_schema, vector_item_field};

/// Vector memory store over the LanceDB `memories` table.
pub struct LanceMemoryStore {
    store: LanceVectorStore,
}

impl LanceMemoryStore {
    pub fn new(store: LanceVectorStore) -> Self {
        Self { store }
    }

    /// The memory table, or `None` before the first memory is stored.
    async fn table(&self) -> Result<Option<lancedb::Table>, RepositoryError> {
        self.store
            .open_table(MEMORY_TABLE)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to open memory table: {e}")))
    }

    async fn table_for(&self, dimension: i32) -> Result<lancedb::Table, RepositoryError> {
        self.store
            .ensure_table(MEMORY_TABLE, Arc::new(memory_schema(dimension)))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to ensure memory table: {e}")))
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQL string literal with embedded quotes doubled.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Predicate for every set field of `filter`, or `None` when nothing is set.
fn filter_predicate(filter: &MemoryFilter) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(scope) = filter.scope {
        clauses.push(format!("scope = {}", quote(&scope.to_string())));
    }
    if let Some(session_id) = filter.session_id {
        clauses.push(format!("session_id = {}", quote(&session_id.to_string())));
    }
    if let Some(user_id) = &filter.user_id {
        clauses.push(format!("user_id = {}", quote(user_id)));
    }
    if let Some(server_id) = &filter.server_id {
        clauses.push(format!("server_id = {}", quote(server_id)));
    }
    if let Some(before) = filter.created_before {
        // Fixed-width timestamps compare correctly as text.
        clauses.push(format!("created_at < {}", quote(&format_datetime(&before))));
    }
    if let Some(below) = filter.importance_below {
        clauses.push(format!("importance < {below}"));
    }
    (!clauses.is_empty()).then(|| clauses.join(" AND "))
}

/// Width of the record's embedding, which must be non-empty.
fn dimension(record: &MemoryRecord) -> Result<i32, RepositoryError> {
    i32::try_from(record.embedding.len())
        .ok()
        .filter(|d| *d > 0)
        .ok_or_else(|| {
            RepositoryError::Query(format!(
                "invalid embedding width {}",
                record.embedding.len()
            ))
        })
}

fn build_record_batch(record: &MemoryRecord, dimension: i32) -> Result<RecordBatch, RepositoryError> {
    let vector = FixedSizeListArray::try_new(
        vector_item_field(),
        dimension,
        Arc::new(Float32Array::from(record.embedding.clone())),
        None,
    )
    .map_err(|e| RepositoryError::Query(format!("Failed to build vector column: {e}")))?;

    RecordBatch::try_new(
        Arc::new(memory_schema(dimension)),
        vec![
            Arc::new(StringArray::from(vec![record.id.to_string()])),
            Arc::new(StringArray::from(vec![record.session_id.to_string()])),
            Arc::new(StringArray::from(vec![record.user_id.clone()])),
            Arc::new(StringArray::from(vec![record.server_id.clone()])),
            Arc::new(StringArray::from(vec![record.scope.to_string()])),
            Arc::new(StringArray::from(vec![record.content.clone()])),
            Arc::new(StringArray::from(vec![record.memory_type.to_string()])),
            Arc::new(Float32Array::from(vec![record.importance])),
            Arc::new(UInt32Array::from(vec![record.estimated_tokens])),
            Arc::new(StringArray::from(vec![format_datetime(&record.created_at)])),
            Arc::new(vector),
        ],
    )
    .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, RepositoryError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| RepositoryError::Query(format!("memory column '{name}' missing or mistyped")))
}

fn optional_string(col: &StringArray, i: usize) -> Option<String> {
    (!col.is_null(i)).then(|| col.value(i).to_string())
}

fn batch_to_records(batch: &RecordBatch) -> Result<Vec<MemoryRecord>, RepositoryError> {
    let ids = column::<StringArray>(batch, "id")?;
    let session_ids = column::<StringArray>(batch, "session_id")?;
    let user_ids = column::<StringArray>(batch, "user_id")?;
    let server_ids = column::<StringArray>(batch, "server_id")?;
    let scopes = column::<StringArray>(batch, "scope")?;
    let contents = column::<StringArray>(batch, "content")?;
    let memory_types = column::<StringArray>(batch, "memory_type")?;
    let importances = column::<Float32Array>(batch, "importance")?;
    let estimated_tokens = column::<UInt32Array>(batch, "estimated_tokens")?;
    let created_ats = column::<StringArray>(batch, "created_at")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let id = Uuid::parse_str(ids.value(i))
            .map_err(|e| RepositoryError::Query(format!("invalid memory id: {e}")))?;
        let session_id = Uuid::parse_str(session_ids.value(i))
            .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
        let created_at = DateTime::parse_from_rfc3339(created_ats.value(i))
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))?;
        let vector = vectors.value(i);
        let embedding = vector
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| RepositoryError::Query("vector items are not float32".to_string()))?
            .values()
            .to_vec();

        records.push(MemoryRecord {
            id,
            session_id,
            user_id: optional_string(user_ids, i),
            server_id: optional_string(server_ids, i),
            scope: scopes.value(i).parse().map_err(RepositoryError::Query)?,
            content: contents.value(i).to_string(),
            memory_type: memory_types.value(i).parse().map_err(RepositoryError::Query)?,
            importance: importances.value(i),
            estimated_tokens: estimated_tokens.value(i),
            embedding,
            created_at,
        });
    }
    Ok(records)
}

impl VectorMemoryStore for LanceMemoryStore {
    async fn upsert(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        let dimension = dimension(record)?;
        let batch = build_record_batch(record, dimension)?;
        let table = self.table_for(dimension).await?;

        table
            .delete(&format!("id = {}", quote(&record.id.to_string())))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to replace memory: {e}")))?;

        let schema = batch.schema();
        table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add memory: {e}")))?;
        Ok(())
    }

    async fn query_similar(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryMatch>, RepositoryError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let Some(table) = self.table().await? else {
            return Ok(Vec::new());
        };

        let mut query = table
            .vector_search(vector)
            .map_err(|e| RepositoryError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(top_k);
        if let Some(predicate) = filter_predicate(filter) {
            query = query.only_if(predicate);
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector search failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut matches = Vec::new();
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let distances = column::<Float32Array>(batch, "_distance")?;
            for (i, record) in batch_to_records(batch)?.into_iter().enumerate() {
                let similarity = 1.0 - distances.value(i);
                if similarity >= min_score {
                    matches.push(MemoryMatch { record, similarity });
                }
            }
        }

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn list(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        let Some(table) = self.table().await? else {
            return Ok(Vec::new());
        };

        let mut query = table.query();
        if let Some(predicate) = filter_predicate(filter) {
            query = query.only_if(predicate);
        }
        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Memory listing failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            records.extend(batch_to_records(batch)?);
        }
        records.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn delete_where(&self, filter: &MemoryFilter) -> Result<u64, RepositoryError> {
        let Some(table) = self.table().await? else {
            return Ok(0);
        };

        let predicate = filter_predicate(filter).unwrap_or_else(|| "true".to_string());
        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count memories: {e}")))?;
        if count == 0 {
            return Ok(0);
        }

        table
            .delete(&predicate)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to delete memories: {e}")))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use confidant_types::memory::{MemoryScope, MemoryType};

    use super::*;

    async fn setup_store() -> (LanceMemoryStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let lance = LanceVectorStore::open(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        (LanceMemoryStore::new(lance), temp_dir)
    }

    fn record(scope: MemoryScope, content: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            user_id: Some("alice".to_string()),
            server_id: Some("guild-1".to_string()),
            scope,
            content: content.to_string(),
            memory_type: MemoryType::Fact,
            importance: 0.6,
            estimated_tokens: 4,
            embedding,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_predicate() {
        assert_eq!(filter_predicate(&MemoryFilter::default()), None);
        assert_eq!(
            filter_predicate(&MemoryFilter::user("o'brien")).as_deref(),
            Some("scope = 'user' AND user_id = 'o''brien'")
        );
        let cleanup = MemoryFilter {
            importance_below: Some(0.4),
            ..Default::default()
        };
        assert_eq!(filter_predicate(&cleanup).as_deref(), Some("importance < 0.4"));
    }

    #[tokio::test]
    async fn test_empty_store_reads_nothing() {
        let (store, _tmp) = setup_store().await;

        assert!(
            store
                .query_similar(&[1.0, 0.0], &MemoryFilter::default(), 5, 0.0)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(store.list(&MemoryFilter::default(), 10).await.unwrap().is_empty());
        assert_eq!(store.delete_where(&MemoryFilter::user("alice")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_list_roundtrips() {
        let (store, _tmp) = setup_store().await;
        let mut rec = record(MemoryScope::User, "likes chess", vec![1.0, 0.5]);
        store.upsert(&rec).await.unwrap();

        rec.content = "loves chess".to_string();
        store.upsert(&rec).await.unwrap();

        let listed = store.list(&MemoryFilter::user("alice"), 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, rec.id);
        assert_eq!(listed[0].content, "loves chess");
        assert_eq!(listed[0].embedding, vec![1.0, 0.5]);
        assert_eq!(listed[0].memory_type, MemoryType::Fact);
        assert_eq!(listed[0].server_id.as_deref(), Some("guild-1"));
    }

    #[tokio::test]
    async fn test_query_similar_ranks_and_filters() {
        let (store, _tmp) = setup_store().await;
        for rec in [
            record(MemoryScope::User, "chess", vec![1.0, 0.0, 0.0]),
            record(MemoryScope::User, "chess openings", vec![0.9, 0.1, 0.0]),
            record(MemoryScope::User, "gardening", vec![0.0, 0.0, 1.0]),
            record(MemoryScope::Server, "server chess club", vec![1.0, 0.0, 0.0]),
        ] {
            store.upsert(&rec).await.unwrap();
        }

        let matches = store
            .query_similar(&[1.0, 0.0, 0.0], &MemoryFilter::user("alice"), 5, 0.7)
            .await
            .unwrap();

        let contents: Vec<&str> = matches.iter().map(|m| m.record.content.as_str()).collect();
        assert_eq!(contents, vec!["chess", "chess openings"]);
        assert!((matches[0].similarity - 1.0).abs() < 1e-4);
        assert!(matches[0].similarity >= matches[1].similarity);

        let top_one = store
            .query_similar(&[1.0, 0.0, 0.0], &MemoryFilter::default(), 1, 0.0)
            .await
            .unwrap();
        assert_eq!(top_one.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_where_age_and_importance() {
        let (store, _tmp) = setup_store().await;

        let mut old_low = record(MemoryScope::User, "old trivia", vec![1.0, 0.0]);
        old_low.importance = 0.2;
        old_low.created_at = Utc::now() - chrono::Duration::days(120);
        let mut old_high = record(MemoryScope::User, "old but vital", vec![1.0, 0.0]);
        old_high.importance = 0.9;
        old_high.created_at = Utc::now() - chrono::Duration::days(120);
        let mut fresh_low = record(MemoryScope::User, "fresh trivia", vec![1.0, 0.0]);
        fresh_low.importance = 0.2;

        for rec in [&old_low, &old_high, &fresh_low] {
            store.upsert(rec).await.unwrap();
        }

        let filter = MemoryFilter {
            created_before: Some(Utc::now() - chrono::Duration::days(90)),
            importance_below: Some(0.4),
            ..Default::default()
        };
        assert_eq!(store.delete_where(&filter).await.unwrap(), 1);

        let remaining = store.list(&MemoryFilter::default(), 10).await.unwrap();
        let contents: Vec<&str> = remaining.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["old but vital", "fresh trivia"]);
    }

    #[tokio::test]
    async fn test_delete_by_user_spans_scopes() {
        let (store, _tmp) = setup_store().await;
        store
            .upsert(&record(MemoryScope::User, "a", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(&record(MemoryScope::Session, "b", vec![1.0, 0.0]))
            .await
            .unwrap();
        let mut other = record(MemoryScope::User, "c", vec![1.0, 0.0]);
        other.user_id = Some("bob".to_string());
        store.upsert(&other).await.unwrap();

        let filter = MemoryFilter {
            user_id: Some("alice".to_string()),
            ..Default::default()
        };
        assert_eq!(store.delete_where(&filter).await.unwrap(), 2);
        assert_eq!(store.list(&MemoryFilter::default(), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_embedding_is_rejected() {
        let (store, _tmp) = setup_store().await;
        let err = store
            .upsert(&record(MemoryScope::User, "no vector", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)));
    }
}

//! Vector memory store trait.
//!
//! Defines the interface for similarity search over scoped memories.
//! Implementations live in confidant-infra (`LanceMemoryStore`).

use confidant_types::error::RepositoryError;
use confidant_types::memory::{MemoryFilter, MemoryMatch, MemoryRecord};

/// Trait for vector-indexed memory storage with semantic search.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait VectorMemoryStore: Send + Sync {
    /// Insert or replace a record; `record.embedding` is the indexed vector.
    fn upsert(
        &self,
        record: &MemoryRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Records matching `filter` with similarity >= `min_score`, best first.
    fn query_similar(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        top_k: usize,
        min_score: f32,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryMatch>, RepositoryError>> + Send;

    /// Records matching `filter`, most important first.
    fn list(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send;

    /// Delete every record matching `filter`. Returns the count deleted.
    fn delete_where(
        &self,
        filter: &MemoryFilter,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

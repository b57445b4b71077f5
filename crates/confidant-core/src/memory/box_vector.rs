//! BoxVectorMemoryStore -- object-safe dynamic dispatch wrapper for VectorMemoryStore.
//!
//! Follows the same blanket-impl pattern as BoxLlmProvider:
//! 1. Define an object-safe `VectorMemoryStoreDyn` trait with boxed futures
//! 2. Blanket-impl `VectorMemoryStoreDyn` for all `T: VectorMemoryStore`
//! 3. `BoxVectorMemoryStore` wraps `Box<dyn VectorMemoryStoreDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use confidant_types::error::RepositoryError;
use confidant_types::memory::{MemoryFilter, MemoryMatch, MemoryRecord};

use super::vector::VectorMemoryStore;

/// Object-safe version of [`VectorMemoryStore`] with boxed futures.
pub trait VectorMemoryStoreDyn: Send + Sync {
    fn upsert_boxed<'a>(
        &'a self,
        record: &'a MemoryRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>>;

    fn query_similar_boxed<'a>(
        &'a self,
        vector: &'a [f32],
        filter: &'a MemoryFilter,
        top_k: usize,
        min_score: f32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemoryMatch>, RepositoryError>> + Send + 'a>>;

    fn list_boxed<'a>(
        &'a self,
        filter: &'a MemoryFilter,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send + 'a>>;

    fn delete_where_boxed<'a>(
        &'a self,
        filter: &'a MemoryFilter,
    ) -> Pin<Box<dyn Future<Output = Result<u64, RepositoryError>> + Send + 'a>>;
}

/// Blanket implementation: any `VectorMemoryStore` automatically implements the Dyn trait.
impl<T: VectorMemoryStore> VectorMemoryStoreDyn for T {
    fn upsert_boxed<'a>(
        &'a self,
        record: &'a MemoryRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>> {
        Box::pin(self.upsert(record))
    }

    fn query_similar_boxed<'a>(
        &'a self,
        vector: &'a [f32],
        filter: &'a MemoryFilter,
        top_k: usize,
        min_score: f32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemoryMatch>, RepositoryError>> + Send + 'a>>
    {
        Box::pin(self.query_similar(vector, filter, top_k, min_score))
    }

    fn list_boxed<'a>(
        &'a self,
        filter: &'a MemoryFilter,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<MemoryRecord>, RepositoryError>> + Send + 'a>>
    {
        Box::pin(self.list(filter, limit))
    }

    fn delete_where_boxed<'a>(
        &'a self,
        filter: &'a MemoryFilter,
    ) -> Pin<Box<dyn Future<Output = Result<u64, RepositoryError>> + Send + 'a>> {
        Box::pin(self.delete_where(filter))
    }
}

/// Type-erased vector store for runtime backend selection.
pub struct BoxVectorMemoryStore {
    inner: Box<dyn VectorMemoryStoreDyn + Send + Sync>,
}

impl BoxVectorMemoryStore {
    /// Wrap a concrete `VectorMemoryStore` in a type-erased box.
    pub fn new<T: VectorMemoryStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }

    pub async fn upsert(&self, record: &MemoryRecord) -> Result<(), RepositoryError> {
        self.inner.upsert_boxed(record).await
    }

    pub async fn query_similar(
        &self,
        vector: &[f32],
        filter: &MemoryFilter,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryMatch>, RepositoryError> {
        self.inner
            .query_similar_boxed(vector, filter, top_k, min_score)
            .await
    }

    pub async fn list(
        &self,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, RepositoryError> {
        self.inner.list_boxed(filter, limit).await
    }

    pub async fn delete_where(&self, filter: &MemoryFilter) -> Result<u64, RepositoryError> {
        self.inner.delete_where_boxed(filter).await
    }
}

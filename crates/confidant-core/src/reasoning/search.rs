//! Web search collaborator interface and its type-erased wrapper.

use std::future::Future;
use std::pin::Pin;

use confidant_types::error::SearchError;
use confidant_types::search::SearchResult;

/// Trait for web search backends.
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &str;

    fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> impl Future<Output = Result<Vec<SearchResult>, SearchError>> + Send;
}

/// Object-safe version of [`WebSearch`] with boxed futures.
pub trait WebSearchDyn: Send + Sync {
    fn name_dyn(&self) -> &str;

    fn search_boxed<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>, SearchError>> + Send + 'a>>;
}

impl<T: WebSearch> WebSearchDyn for T {
    fn name_dyn(&self) -> &str {
        self.name()
    }

    fn search_boxed<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>, SearchError>> + Send + 'a>> {
        Box::pin(self.search(query, max_results))
    }
}

/// Type-erased web search backend.
pub struct BoxWebSearch {
    inner: Box<dyn WebSearchDyn + Send + Sync>,
}

impl BoxWebSearch {
    pub fn new<T: WebSearch + 'static>(search: T) -> Self {
        Self {
            inner: Box::new(search),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name_dyn()
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.inner.search_boxed(query, max_results).await
    }
}

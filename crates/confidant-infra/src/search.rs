//! SearXNG web search client.
//!
//! Implements the `WebSearch` trait from `confidant-core` against the JSON
//! output of a SearXNG instance (`GET /search?q=..&format=json`).

use std::time::Duration;

use serde::Deserialize;

use confidant_core::reasoning::search::WebSearch;
use confidant_types::error::SearchError;
use confidant_types::search::SearchResult;

#[derive(Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Deserialize)]
struct SearxResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone)]
pub struct SearxngSearch {
    client: reqwest::Client,
    base_url: String,
}

impl SearxngSearch {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl WebSearch for SearxngSearch {
    fn name(&self) -> &str {
        "searxng"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Unavailable(format!("HTTP {status}")));
        }

        let parsed: SearxResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .take(max_results)
            .map(|r| SearchResult {
                title: r.title,
                snippet: r.content,
                url: r.url,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_search_maps_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust async"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "Async Book", "url": "https://rust-lang.github.io/async-book/", "content": "Asynchronous programming in Rust"},
                    {"title": "No link", "url": "", "content": "dropped"},
                    {"title": "Tokio", "url": "https://tokio.rs", "content": "An async runtime"},
                    {"title": "Third", "url": "https://example.com", "content": "cut"}
                ]
            })))
            .mount(&server)
            .await;

        let search = SearxngSearch::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let results = search.search("rust async", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Async Book");
        assert_eq!(results[0].snippet, "Asynchronous programming in Rust");
        assert_eq!(results[1].url, "https://tokio.rs");
    }

    #[tokio::test]
    async fn test_search_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let search = SearxngSearch::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = search.search("anything", 3).await.unwrap_err();
        assert!(matches!(err, SearchError::Unavailable(_)));
    }
}

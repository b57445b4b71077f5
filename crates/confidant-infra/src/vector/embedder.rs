//! HTTP embedding client for OpenAI-compatible `/embeddings` endpoints.
//!
//! Implements the `Embedder` trait from `confidant-core`. Works against
//! OpenAI, OpenRouter, and local servers such as Ollama.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use confidant_core::memory::embedder::Embedder;
use confidant_types::config::EmbeddingConfig;
use confidant_types::error::EmbeddingError;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Remote embedder. No `Debug` impl: it holds the API key.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpEmbedder {
    pub fn new(
        config: &EmbeddingConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Request(format!("failed to build HTTP client: {e}")))?;

        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(lookup)
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn embedder(base_url: &str) -> HttpEmbedder {
        let config = EmbeddingConfig {
            base_url: base_url.to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: Some("EMBED_KEY".to_string()),
            timeout_secs: 5,
        };
        HttpEmbedder::new(&config, |_| Some("embed-secret".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_embed_returns_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(bearer_token("embed-secret"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small",
                "input": "likes chess"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let vector = embedder(&server.uri()).embed("likes chess").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let err = embedder(&server.uri()).embed("x").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Request(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_embed_empty_data_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = embedder(&server.uri()).embed("x").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }
}

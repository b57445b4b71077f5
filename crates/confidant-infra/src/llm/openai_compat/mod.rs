//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves OpenAI, Grok (xAI),
//! OpenRouter, Groq, and Ollama through per-backend presets.
//!
//! The API key is held as a [`SecretString`] and only exposed when the
//! `Authorization` header is built.

pub mod config;
pub mod types;

use secrecy::{ExposeSecret, SecretString};

use confidant_core::llm::provider::LlmProvider;
use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError, MessageRole, Usage};

use self::config::OpenAiCompatConfig;
use self::types::{ChatMessage, ChatRequest, ChatResponse};

/// Unified provider for any OpenAI-compatible API.
///
/// Does NOT derive Debug so the key can never reach a log line.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    provider_name: String,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    requires_key: bool,
    conversation_header: Option<String>,
    timeout_secs: u64,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            provider_name: config.provider_name,
            base_url: config.base_url,
            api_key: config.api_key,
            model: config.model,
            requires_key: config.requires_key,
            conversation_header: config.conversation_header,
            timeout_secs: config.timeout.as_secs(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let model = if request.model.is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };

        ChatRequest {
            model,
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.to_string(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            prompt_cache_key: request.conversation_id.as_deref(),
        }
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(request);

        let mut http = self.client.post(self.url("/chat/completions")).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key.expose_secret());
        }
        if let (Some(header), Some(conversation_id)) =
            (&self.conversation_header, request.conversation_id.as_deref())
        {
            http = http.header(header.as_str(), conversation_id);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                LlmError::Provider {
                    message: format!("HTTP request failed: {e}"),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(retry_after_ms);
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), retry_after_ms, error_body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Deserialization("response had no choices".to_string()))?;
        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::Provider {
                message: "provider returned an empty completion".to_string(),
            });
        }

        let usage = parsed
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens, u.cached_tokens()))
            .unwrap_or_default();

        let mut metadata = serde_json::Map::new();
        if let Some(reason) = choice.finish_reason {
            metadata.insert("finish_reason".into(), reason.into());
        }
        if let Some(fingerprint) = parsed.system_fingerprint {
            metadata.insert("system_fingerprint".into(), fingerprint.into());
        }

        Ok(CompletionResponse {
            id: parsed.id,
            content,
            role: MessageRole::Assistant,
            model: if parsed.model.is_empty() {
                body.model.to_string()
            } else {
                parsed.model
            },
            usage,
            metadata,
        })
    }

    async fn probe(&self) -> bool {
        !self.requires_key || self.api_key.is_some()
    }
}

/// Milliseconds from a delta-seconds `Retry-After` value. HTTP dates are ignored.
fn retry_after_ms(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

/// Map a non-success HTTP status to an [`LlmError`].
fn map_status(status: u16, retry_after_ms: Option<u64>, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        503 | 529 => LlmError::Overloaded(body),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use confidant_types::llm::Message;

    use super::*;

    fn provider(name: &str, base_url: &str, key: Option<&str>) -> OpenAiCompatibleProvider {
        let conversation_header = config::preset_for(name)
            .and_then(|p| p.conversation_header)
            .map(str::to_string);
        OpenAiCompatibleProvider::new(OpenAiCompatConfig {
            provider_name: name.to_string(),
            base_url: base_url.to_string(),
            api_key: key.map(|k| SecretString::from(k.to_string())),
            model: "test-model".to_string(),
            requires_key: true,
            conversation_header,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            messages: vec![Message::system("persona"), Message::user("hello")],
            max_tokens: 64,
            temperature: Some(0.7),
            conversation_id: Some("555".to_string()),
        }
    }

    fn ok_body() -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "model": "test-model-2026",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi there!"},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 200,
                "completion_tokens": 10,
                "total_tokens": 210,
                "prompt_tokens_details": {"cached_tokens": 150}
            }
        })
    }

    #[tokio::test]
    async fn test_complete_maps_content_and_cache_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "max_tokens": 64,
                "prompt_cache_key": "555",
                "messages": [
                    {"role": "system", "content": "persona"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .mount(&server)
            .await;

        let provider = provider("openai", &server.uri(), Some("sk-test"));
        let response = provider.complete(&request()).await.unwrap();

        assert_eq!(response.content, "Hi there!");
        assert_eq!(response.model, "test-model-2026");
        assert_eq!(response.usage.prompt_tokens, 200);
        assert_eq!(response.usage.cached_tokens, Some(150));
        assert!((response.usage.cache_hit_ratio.unwrap() - 0.75).abs() < 1e-6);
        assert_eq!(response.metadata["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn test_grok_sends_conversation_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("x-grok-conv-id", "555"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider("grok", &server.uri(), Some("xai-test"));
        provider.complete(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_errors_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let provider = provider("openai", &server.uri(), Some("sk-test"));
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after_ms: Some(7000)
            }
        ));
    }

    #[tokio::test]
    async fn test_huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "18446744073709552"),
            )
            .mount(&server)
            .await;

        let provider = provider("openai", &server.uri(), Some("sk-test"));
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after_ms: Some(u64::MAX)
            }
        ));
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(retry_after_ms(" 7 "), Some(7000));
        assert_eq!(retry_after_ms("18446744073709552"), Some(u64::MAX));
        assert_eq!(retry_after_ms("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = provider("openai", &server.uri(), Some("sk-wrong"));
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "x",
                "model": "m",
                "choices": [{"message": {"content": "  "}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let provider = provider("openai", &server.uri(), Some("sk-test"));
        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_probe_requires_key() {
        assert!(!provider("openai", "http://unused", None).probe().await);
        assert!(provider("openai", "http://unused", Some("k")).probe().await);
    }

    #[test]
    fn test_map_status() {
        assert!(matches!(map_status(503, None, "busy".into()), LlmError::Overloaded(_)));
        assert!(matches!(map_status(403, None, String::new()), LlmError::AuthenticationFailed));
        match map_status(500, None, "boom".into()) {
            LlmError::Provider { message } => assert!(message.contains("500")),
            other => panic!("unexpected: {other}"),
        }
    }
}

//! OpenAI-compatible chat-completions client
//!
//! Works against any provider that speaks the `/chat/completions`
//! function-calling dialect (OpenAI, OpenRouter, vLLM, ...).

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::llm::types::*;
use crate::llm::ChatModel;
use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

/// HTTP client for an OpenAI-style chat-completions endpoint
#[derive(Clone)]
pub struct OpenAiClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
}

impl OpenAiClient {
    /// Create a new client from configuration
    pub fn new(config: LlmConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_s))
            .build()?;

        Ok(OpenAiClient { client, config })
    }

    /// Get the configured model
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Apply configured model/temperature/max_tokens defaults to a request
    fn apply_defaults(&self, mut request: ChatRequest) -> ChatRequest {
        if request.model.is_empty() {
            request.model = self.config.model.clone();
        }
        if request.temperature.is_none() {
            request.temperature = Some(self.config.temperature);
        }
        if request.max_tokens.is_none() && self.config.max_tokens > 0 {
            request.max_tokens = Some(self.config.max_tokens);
        }
        request
    }

    async fn send_request(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        debug!("Sending chat request: model={}", request.model);

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.json::<ChatResponse>().await?;

            if let Some(ref usage) = body.usage {
                info!(
                    "LLM response: model={}, tokens={}",
                    body.model, usage.total_tokens
                );
            }

            Ok(body)
        } else {
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                warn!("Rate limit exceeded: {}", error_text);
                Err(Error::RateLimit(error_text))
            } else {
                // Non-2xx is surfaced verbatim
                Err(Error::Llm(format!("API error ({}): {}", status, error_text)))
            }
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.send_request(self.apply_defaults(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            model: "test-model".to_string(),
            base_url,
            api_key: SecretString::from("test-key"),
            temperature: 0.1,
            max_tokens: 1024,
            timeout_s: 5,
        }
    }

    #[tokio::test]
    async fn test_chat_success_with_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "c1",
                "model": "test-model",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "42"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 1, "total_tokens": 11}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let response = client
            .chat(ChatRequest::new("", vec![Message::user("what is 6x7?")]))
            .await
            .unwrap();

        assert_eq!(response.content(), Some("42"));
        assert_eq!(response.usage.unwrap().total_tokens, 11);
    }

    #[tokio::test]
    async fn test_chat_applies_config_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "ok"},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        // Empty model in the request falls back to the configured one.
        let response = client
            .chat(ChatRequest::new("", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.content(), Some("ok"));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "test-model");
        assert!((body["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(body["max_tokens"], 1024);
    }

    #[tokio::test]
    async fn test_non_2xx_surfaced_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let err = client
            .chat(ChatRequest::new("", vec![Message::user("hi")]))
            .await
            .unwrap_err();

        match err {
            Error::Llm(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("upstream exploded"));
            }
            other => panic!("expected Llm error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(test_config(server.uri())).unwrap();
        let err = client
            .chat(ChatRequest::new("", vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimit(_)));
        assert!(err.is_retryable());
    }
}

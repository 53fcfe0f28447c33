//! Scripted chat model for tests and offline runs

use crate::error::{Error, Result};
use crate::llm::types::*;
use crate::llm::ChatModel;
use async_trait::async_trait;
use std::sync::Mutex;

/// A `ChatModel` that replays a fixed sequence of responses.
///
/// Each call pops the next programmed response; running past the end
/// returns an error. The full request log is retained for assertions.
pub struct MockChatModel {
    responses: Mutex<Vec<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Build a response whose first choice carries plain content
    pub fn content_response(content: impl Into<String>) -> ChatResponse {
        serde_json::from_value(serde_json::json!({
            "id": "mock",
            "model": "mock",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content.into()},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        }))
        .expect("mock response shape")
    }

    /// Build a response whose first choice carries one structured tool call
    pub fn tool_call_response(name: &str, arguments: serde_json::Value) -> ChatResponse {
        serde_json::from_value(serde_json::json!({
            "id": "mock",
            "model": "mock",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{
                        "id": "call_0",
                        "type": "function",
                        "function": {"name": name, "arguments": arguments.to_string()}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        }))
        .expect("mock response shape")
    }

    /// Number of chat calls made so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The user-message content of the Nth request (0-indexed)
    pub fn prompt_for_call(&self, n: usize) -> Option<String> {
        self.requests.lock().unwrap().get(n).map(|r| {
            r.messages
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Error::Llm(
                "MockChatModel: no more programmed responses".to_string(),
            ));
        }
        Ok(responses.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let mock = MockChatModel::new(vec![
            MockChatModel::tool_call_response("echo", serde_json::json!({"text": "a"})),
            MockChatModel::content_response("done"),
        ]);

        let first = mock.chat(ChatRequest::new("m", vec![])).await.unwrap();
        assert_eq!(first.tool_calls().unwrap()[0].function.name, "echo");

        let second = mock.chat(ChatRequest::new("m", vec![])).await.unwrap();
        assert_eq!(second.content(), Some("done"));

        assert!(mock.chat(ChatRequest::new("m", vec![])).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }
}

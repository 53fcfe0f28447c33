//! LLM client layer
//!
//! A single `ChatModel` trait is the seam between the agent control
//! plane and any chat-completions provider. The shipped implementation
//! speaks the OpenAI function-calling dialect; `MockChatModel` replays
//! scripted responses for tests.

mod client;
pub mod mock;
mod types;

pub use client::OpenAiClient;
pub use mock::MockChatModel;
pub use types::{
    AssistantToolCall, ChatRequest, ChatResponse, Choice, FunctionCall, FunctionDefinition,
    FunctionName, Message, Role, ToolChoice, ToolDefinition, Usage,
};

use crate::error::Result;
use async_trait::async_trait;

/// The interface between the agent runtime and an LLM provider.
///
/// Implementations must be `Send + Sync`; they are shared behind
/// `Arc<dyn ChatModel>` by the planner, reflector, and flow engine.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Execute one chat completion
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

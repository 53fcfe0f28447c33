//! Error types for Agentflow

use thiserror::Error;

/// Result type alias using Agentflow's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Agentflow
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider error (HTTP failure, non-2xx status, malformed body)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Planning error - the LLM response could not be turned into an action
    #[error("Planning error: {0}")]
    Planning(String),

    /// Tool execution error
    #[error("Tool error: {0}")]
    Tool(String),

    /// MCP transport or server-side JSON-RPC error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// Tool registry error (duplicate or missing name)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Workflow validation error
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// A subtask's agent loop failed
    #[error("Task error: {0}")]
    Task(String),

    /// Execution was canceled from the outside
    #[error("Canceled: {0}")]
    Canceled(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Mcp(_) | Error::RateLimit(_) | Error::Timeout(_)
        )
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::NotFound(_) | Error::Workflow(_) | Error::Registry(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout("tool call".into()).is_retryable());
        assert!(Error::RateLimit("429".into()).is_retryable());
        assert!(Error::Mcp("connection reset".into()).is_retryable());
        assert!(!Error::Planning("unparseable".into()).is_retryable());
        assert!(!Error::Workflow("cycle".into()).is_retryable());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::Workflow("duplicate task id".into()).is_client_error());
        assert!(Error::Registry("already registered".into()).is_client_error());
        assert!(!Error::Llm("boom".into()).is_client_error());
    }
}

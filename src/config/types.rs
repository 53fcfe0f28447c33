//! Configuration types
//!
//! The recognized sections: `llm`, `agent`, `mcp.servers`, `tools`
//! (opaque to the core), and `storage`.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::mcp::TransportKind;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// MCP server configuration
    #[serde(default)]
    pub mcp: McpConfig,

    /// Tool-specific configuration, opaque to the core
    #[serde(default)]
    pub tools: HashMap<String, serde_json::Value>,

    /// Trace storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key
    #[serde(skip_serializing, default = "default_secret")]
    pub api_key: SecretString,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Generation token cap; 0 leaves it to the provider
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_s: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            model: default_model(),
            base_url: default_base_url(),
            api_key: default_secret(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_s: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> u64 {
    30
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Step ceiling per trace; 0 disables
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Token ceiling per trace; 0 disables
    #[serde(default)]
    pub max_tokens: u64,
    /// Wall-clock ceiling per trace (humantime string); zero disables
    #[serde(with = "humantime_serde", default = "default_max_duration")]
    pub max_duration: Duration,
    /// Reflect every N steps; 0 disables reflection
    #[serde(default = "default_reflection_steps")]
    pub reflection_steps: usize,
    /// Tool retry attempts after the first failure
    #[serde(default)]
    pub max_retries: u32,
    /// Base delay for the tool retry back-off (humantime string)
    #[serde(with = "humantime_serde", default = "default_retry_backoff")]
    pub retry_backoff: Duration,
    /// Per-call tool timeout (humantime string)
    #[serde(with = "humantime_serde", default = "default_tool_timeout")]
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_steps: default_max_steps(),
            max_tokens: 0,
            max_duration: default_max_duration(),
            reflection_steps: default_reflection_steps(),
            max_retries: 0,
            retry_backoff: default_retry_backoff(),
            tool_timeout: default_tool_timeout(),
        }
    }
}

fn default_max_steps() -> usize {
    20
}

fn default_max_duration() -> Duration {
    Duration::from_secs(300)
}

fn default_reflection_steps() -> usize {
    5
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(30)
}

/// MCP section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Configured servers, by name
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
    /// Catalog refresh interval (humantime string)
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,
}

impl Default for McpConfig {
    fn default() -> Self {
        McpConfig {
            servers: HashMap::new(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(300)
}

/// One MCP server entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server URL
    pub url: String,
    /// Extra headers merged into every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Transport override; inferred from the URL shape when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// One JSON file per trace
    File,
    /// In-process map, lost on exit
    Memory,
}

/// Trace storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind
    #[serde(rename = "type", default = "default_backend")]
    pub backend: StorageBackendType,
    /// Directory for the file backend
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_backend(),
            base_path: default_base_path(),
        }
    }
}

fn default_backend() -> StorageBackendType {
    StorageBackendType::File
}

fn default_base_path() -> PathBuf {
    super::paths::state_dir().join("traces")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.max_steps, 20);
        assert_eq!(config.agent.reflection_steps, 5);
        assert_eq!(config.agent.max_duration, Duration::from_secs(300));
        assert_eq!(config.llm.timeout_s, 30);
        assert_eq!(config.storage.backend, StorageBackendType::File);
        assert!(config.mcp.servers.is_empty());
    }

    #[test]
    fn test_duration_strings_parse() {
        let config: Config = toml::from_str(
            r#"
            [agent]
            max_steps = 10
            max_duration = "2m"
            retry_backoff = "250ms"

            [mcp]
            refresh_interval = "1m"

            [mcp.servers.alpha]
            url = "http://localhost:9000/mcp"
            headers = { "x-api-key" = "secret" }
            "#,
        )
        .unwrap();

        assert_eq!(config.agent.max_duration, Duration::from_secs(120));
        assert_eq!(config.agent.retry_backoff, Duration::from_millis(250));
        assert_eq!(config.mcp.refresh_interval, Duration::from_secs(60));
        assert_eq!(
            config.mcp.servers["alpha"].headers["x-api-key"],
            "secret"
        );
    }

    #[test]
    fn test_transport_override_parses() {
        let config: Config = toml::from_str(
            r#"
            [mcp.servers.beta]
            url = "http://localhost:9001/rpc"
            transport = "sse"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.mcp.servers["beta"].transport,
            Some(TransportKind::Sse)
        );
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.llm.api_key = SecretString::from("sk-very-secret");
        let out = toml::to_string(&config).unwrap();
        assert!(!out.contains("sk-very-secret"));
    }
}

//! Core tool trait and manifest types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::llm::ToolDefinition;

/// Where a tool comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Registered in-process
    Builtin,
    /// Discovered from a remote MCP server
    Mcp,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Builtin => write!(f, "builtin"),
            ToolKind::Mcp => write!(f, "mcp"),
        }
    }
}

/// A tool that can be called by the agent
///
/// Built-in tools and MCP-backed tools implement the same capability
/// set; planning code never needs to know which kind it is holding.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the JSON Schema for tool arguments
    fn input_schema(&self) -> Value;

    /// Get the JSON Schema for the tool's output map
    fn output_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    /// Which population this tool belongs to
    fn kind(&self) -> ToolKind {
        ToolKind::Builtin
    }

    /// Owning MCP server; `Some` iff `kind() == ToolKind::Mcp`
    fn server_name(&self) -> Option<&str> {
        None
    }

    /// Execute the tool with given arguments
    async fn invoke(&self, args: HashMap<String, Value>) -> Result<HashMap<String, Value>>;

    /// Manifest entry for this tool
    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            output_schema: self.output_schema(),
            kind: self.kind(),
            server_name: self.server_name().map(|s| s.to_string()),
        }
    }

    /// Convert to an LLM function definition
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.input_schema())
    }
}

/// Manifest entry describing one registered tool
///
/// This is what the planner feeds the LLM. `kind` and `server_name` are
/// exposed so the model sees both populations uniformly but can
/// disambiguate qualified names when it wants to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name as registered
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema of the arguments object
    pub input_schema: Value,
    /// JSON Schema of the output map
    pub output_schema: Value,
    /// Builtin or MCP
    #[serde(rename = "type")]
    pub kind: ToolKind,
    /// Owning server for MCP tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

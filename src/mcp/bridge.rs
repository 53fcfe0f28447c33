//! MCP-to-Tool bridge
//!
//! Adapts a discovered MCP tool into the `Tool` trait so it can live in
//! the `ToolRegistry` alongside built-in tools. Invocation routes
//! through the `McpExecutor` so per-tool statistics stay centralized.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::discovery::McpToolInfo;
use super::executor::McpExecutor;
use crate::error::Result;
use crate::tools::{Tool, ToolKind};

/// Bridge that wraps one discovered MCP tool as a registry `Tool`
pub struct McpToolBridge {
    executor: Arc<McpExecutor>,
    info: McpToolInfo,
    /// Name as registered - may be the collision-qualified `server.tool`
    registered_name: String,
}

impl McpToolBridge {
    /// Create a bridge registered under the given (possibly qualified) name
    pub fn new(executor: Arc<McpExecutor>, info: McpToolInfo, registered_name: String) -> Self {
        McpToolBridge {
            executor,
            info,
            registered_name,
        }
    }

    /// The discovery record this bridge wraps
    pub fn info(&self) -> &McpToolInfo {
        &self.info
    }
}

#[async_trait]
impl Tool for McpToolBridge {
    fn name(&self) -> &str {
        &self.registered_name
    }

    fn description(&self) -> &str {
        &self.info.description
    }

    fn input_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Mcp
    }

    fn server_name(&self) -> Option<&str> {
        Some(&self.info.server_name)
    }

    async fn invoke(&self, args: HashMap<String, Value>) -> Result<HashMap<String, Value>> {
        // Always call with the server's own (unqualified) tool name.
        self.executor
            .execute_tool(&self.info.server_name, &self.info.name, args)
            .await
    }
}

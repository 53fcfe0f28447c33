//! Tool registry - the unified name→tool mapping
//!
//! Shared and internally synchronized: writers (registration, MCP
//! refresh) take the write lock, readers (lookup, manifest) the read
//! lock, so a manifest is always a consistent pre- or post-refresh
//! snapshot. Tool invocation clones the `Arc` out of the map and awaits
//! outside the lock.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::ToolDefinition;
use serde_json::Value;

use super::traits::{Tool, ToolInfo, ToolKind};

/// Registry of available tools
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().expect("registry lock poisoned");
        if tools.contains_key(&name) {
            return Err(Error::Registry(format!(
                "tool '{}' is already registered",
                name
            )));
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Remove a tool by name. Fails if the name is unknown.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut tools = self.tools.write().expect("registry lock poisoned");
        if tools.remove(name).is_none() {
            return Err(Error::Registry(format!("tool '{}' is not registered", name)));
        }
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// List registered tool names
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Get the manifest the planner exposes to the LLM
    pub fn manifest(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self
            .tools
            .read()
            .expect("registry lock poisoned")
            .values()
            .map(|t| t.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Get all tools as LLM function definitions
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .expect("registry lock poisoned")
            .values()
            .map(|t| t.to_definition())
            .collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Invoke a named tool.
    ///
    /// Injects a `latency_ms` field into the output map. Unknown names
    /// and tool failures surface as errors for the executor to fold
    /// into an observation.
    pub async fn invoke(
        &self,
        name: &str,
        args: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::Registry(format!("tool '{}' is not registered", name)))?;

        let start = Instant::now();
        let result = tool.invoke(args).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(mut output) => {
                output.insert("latency_ms".to_string(), Value::from(latency_ms));
                Ok(output)
            }
            Err(e) => {
                debug!(tool = name, latency_ms, error = %e, "tool invocation failed");
                Err(e)
            }
        }
    }

    /// Bulk-register the MCP tool population.
    ///
    /// The given set is the discovery service's full current catalog:
    /// in one critical section every previously registered MCP tool is
    /// dropped and the new set installed, so concurrent readers observe
    /// either the pre-refresh or the post-refresh catalog, never a mix.
    /// Unlike `register`, a name collision is resolved by replacement.
    pub fn register_mcp_tools(&self, mcp_tools: Vec<Arc<dyn Tool>>) -> Result<()> {
        for tool in &mcp_tools {
            if tool.kind() != ToolKind::Mcp {
                return Err(Error::Registry(format!(
                    "tool '{}' is not an MCP tool",
                    tool.name()
                )));
            }
        }
        let mut tools = self.tools.write().expect("registry lock poisoned");
        tools.retain(|_, t| t.kind() != ToolKind::Mcp);
        for tool in mcp_tools {
            tools.insert(tool.name().to_string(), tool);
        }
        Ok(())
    }

    /// Remove every MCP tool owned by the given server
    pub fn unregister_mcp_tools(&self, server_name: &str) {
        let mut tools = self.tools.write().expect("registry lock poisoned");
        tools.retain(|_, t| t.server_name() != Some(server_name));
    }

    /// Get tool count
    pub fn len(&self) -> usize {
        self.tools.read().expect("registry lock poisoned").len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-wide default registry.
///
/// A convenience for the outermost layer only; components take an
/// explicit `Arc<ToolRegistry>` parameter.
pub fn default_registry() -> Arc<ToolRegistry> {
    static DEFAULT: OnceLock<Arc<ToolRegistry>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(ToolRegistry::new())).clone()
}

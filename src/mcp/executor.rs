//! MCP executor - routes tool invocations to their owning server
//!
//! Keeps a rolling statistic per (server, tool) key. Statistics exist
//! to support future ranking; they do not affect call routing.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::debug;

use super::transport::McpTransport;
use crate::error::{Error, Result};

/// Smoothing factor for the latency EWMA
const LATENCY_ALPHA: f64 = 0.3;

/// Rolling call statistics for one (server, tool) pair
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ToolStats {
    /// Total invocations
    pub total_calls: u64,
    /// Successful invocations
    pub successes: u64,
    /// Failed invocations
    pub failures: u64,
    /// Exponentially smoothed latency in milliseconds
    pub avg_latency_ms: f64,
    /// When the tool was last invoked
    pub last_called: Option<DateTime<Utc>>,
    /// The most recent error, if any
    pub last_error: Option<String>,
}

impl ToolStats {
    fn record(&mut self, latency_ms: u64, error: Option<&Error>) {
        self.total_calls += 1;
        self.last_called = Some(Utc::now());

        let latency = latency_ms as f64;
        self.avg_latency_ms = if self.total_calls == 1 {
            latency
        } else {
            LATENCY_ALPHA * latency + (1.0 - LATENCY_ALPHA) * self.avg_latency_ms
        };

        match error {
            Some(e) => {
                self.failures += 1;
                self.last_error = Some(e.to_string());
            }
            None => self.successes += 1,
        }
    }
}

/// Routes tool invocations to MCP servers and records statistics
pub struct McpExecutor {
    transports: HashMap<String, Arc<McpTransport>>,
    /// server → unqualified tool names, refreshed by discovery
    catalog: RwLock<HashMap<String, HashSet<String>>>,
    /// "server/tool" → rolling stats
    stats: RwLock<HashMap<String, ToolStats>>,
}

impl McpExecutor {
    /// Create an executor over the given transports
    pub fn new(transports: HashMap<String, Arc<McpTransport>>) -> Self {
        McpExecutor {
            transports,
            catalog: RwLock::new(HashMap::new()),
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the known tool set for a server (called on each
    /// discovery refresh)
    pub fn update_catalog(&self, server: &str, tools: HashSet<String>) {
        self.catalog
            .write()
            .expect("catalog lock poisoned")
            .insert(server.to_string(), tools);
    }

    /// Execute a tool on a specific server.
    ///
    /// Validates that the tool exists on that server, falling back to a
    /// `server.tool` qualified lookup before giving up.
    pub async fn execute_tool(
        &self,
        server: &str,
        tool: &str,
        args: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>> {
        let transport = self
            .transports
            .get(server)
            .ok_or_else(|| Error::Mcp(format!("unknown MCP server '{}'", server)))?;

        let resolved = self.resolve_tool_name(server, tool)?;

        let start = Instant::now();
        let result = transport
            .call_tool(&resolved, serde_json::to_value(&args)?)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        self.stats
            .write()
            .expect("stats lock poisoned")
            .entry(format!("{}/{}", server, resolved))
            .or_default()
            .record(latency_ms, result.as_ref().err());

        debug!(server, tool = %resolved, latency_ms, ok = result.is_ok(), "MCP tool call");
        result
    }

    /// Stats for one (server, tool) pair
    pub fn stats(&self, server: &str, tool: &str) -> Option<ToolStats> {
        self.stats
            .read()
            .expect("stats lock poisoned")
            .get(&format!("{}/{}", server, tool))
            .cloned()
    }

    /// Snapshot of all recorded stats
    pub fn all_stats(&self) -> HashMap<String, ToolStats> {
        self.stats.read().expect("stats lock poisoned").clone()
    }

    fn resolve_tool_name(&self, server: &str, tool: &str) -> Result<String> {
        let catalog = self.catalog.read().expect("catalog lock poisoned");
        let Some(known) = catalog.get(server) else {
            // No catalog yet (executor used before first discovery
            // pass); trust the caller.
            return Ok(tool.to_string());
        };

        if known.contains(tool) {
            return Ok(tool.to_string());
        }

        // Qualified name fallback: "server.tool" → "tool".
        if let Some(stripped) = tool.strip_prefix(&format!("{}.", server)) {
            if known.contains(stripped) {
                return Ok(stripped.to_string());
            }
        }

        Err(Error::Mcp(format!(
            "tool '{}' not found on server '{}'",
            tool, server
        )))
    }
}

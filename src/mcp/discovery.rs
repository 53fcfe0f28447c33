//! MCP discovery service
//!
//! Polls every configured server for its tool catalog, de-conflicts
//! names across servers, and publishes the unified catalog to the tool
//! registry so the planner sees one tool population.
//!
//! A failing server never aborts a refresh cycle: its tools simply drop
//! out of the next snapshot, and the next periodic cycle retries.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bridge::McpToolBridge;
use super::executor::McpExecutor;
use super::transport::McpTransport;
use crate::config::McpServerConfig;
use crate::error::Result;
use crate::tools::{Tool, ToolRegistry};

/// Discovery-side record for one remote tool
#[derive(Debug, Clone, serde::Serialize)]
pub struct McpToolInfo {
    /// Unqualified tool name as the server advertises it
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema of the arguments object
    pub input_schema: Value,
    /// Owning server
    pub server_name: String,
    /// Owning server's URL
    pub server_url: String,
    /// When this record was (re)built
    pub last_seen: DateTime<Utc>,
}

/// Configuration for the discovery service
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How often to rebuild the catalog
    pub refresh_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            refresh_interval: Duration::from_secs(300),
        }
    }
}

/// Polls MCP servers and maintains the unified tool catalog
pub struct DiscoveryService {
    transports: HashMap<String, Arc<McpTransport>>,
    executor: Arc<McpExecutor>,
    registry: Arc<ToolRegistry>,
    config: DiscoveryConfig,
    /// Global index; collision-qualified names
    by_name: RwLock<HashMap<String, McpToolInfo>>,
    /// Per-server index; unqualified names
    by_server: RwLock<HashMap<String, Vec<McpToolInfo>>>,
}

impl DiscoveryService {
    /// Build a discovery service (and its executor) for the configured servers
    pub fn new(
        servers: &HashMap<String, McpServerConfig>,
        registry: Arc<ToolRegistry>,
        config: DiscoveryConfig,
    ) -> Result<Self> {
        let mut transports = HashMap::new();
        for (name, server_config) in servers {
            transports.insert(
                name.clone(),
                Arc::new(McpTransport::new(name.clone(), server_config)?),
            );
        }

        let executor = Arc::new(McpExecutor::new(transports.clone()));

        Ok(DiscoveryService {
            transports,
            executor,
            registry,
            config,
            by_name: RwLock::new(HashMap::new()),
            by_server: RwLock::new(HashMap::new()),
        })
    }

    /// The executor that routes calls to these servers
    pub fn executor(&self) -> Arc<McpExecutor> {
        Arc::clone(&self.executor)
    }

    /// Run an initial discovery pass, then refresh periodically until
    /// the token is canceled.
    pub async fn start(self: Arc<Self>, token: CancellationToken) {
        self.refresh().await;

        let mut interval = tokio::time::interval(self.config.refresh_interval);
        // The first tick fires immediately; the initial refresh above
        // already covered it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("MCP discovery stopped");
                    return;
                }
                _ = interval.tick() => {
                    self.refresh().await;
                }
            }
        }
    }

    /// Poll every server in parallel and atomically rebuild both
    /// indexes, then publish the catalog to the registry.
    pub async fn refresh(&self) {
        let polls = self.transports.values().map(|transport| {
            let transport = Arc::clone(transport);
            async move {
                let tools = transport.list_tools().await;
                (transport, tools)
            }
        });

        let now = Utc::now();
        let mut per_server: HashMap<String, Vec<McpToolInfo>> = HashMap::new();

        for (transport, result) in join_all(polls).await {
            let server = transport.server_name().to_string();
            match result {
                Ok(tools) => {
                    let infos: Vec<McpToolInfo> = tools
                        .into_iter()
                        .map(|t| McpToolInfo {
                            name: t.name,
                            description: t.description,
                            input_schema: t.input_schema,
                            server_name: server.clone(),
                            server_url: transport.url().to_string(),
                            last_seen: now,
                        })
                        .collect();
                    debug!(server = %server, count = infos.len(), "discovered MCP tools");
                    per_server.insert(server, infos);
                }
                Err(e) => {
                    warn!(server = %server, error = %e, "MCP discovery failed; tools absent from this snapshot");
                }
            }
        }

        let global = Self::build_global_index(&per_server);

        // Keep the executor's validation view in step with the catalog.
        for (server, infos) in &per_server {
            self.executor
                .update_catalog(server, infos.iter().map(|i| i.name.clone()).collect());
        }
        for server in self.transports.keys() {
            if !per_server.contains_key(server) {
                self.executor.update_catalog(server, HashSet::new());
            }
        }

        {
            // Swap both indexes under write locks so readers see a
            // consistent pre- or post-refresh snapshot.
            let mut by_name = self.by_name.write().expect("catalog lock poisoned");
            let mut by_server = self.by_server.write().expect("catalog lock poisoned");
            *by_name = global.clone();
            *by_server = per_server;
        }

        self.publish(&global);

        info!(tools = global.len(), "MCP catalog refreshed");
    }

    /// Global-index construction with the collision rule: a name served
    /// by more than one server appears only as `server.tool`.
    fn build_global_index(
        per_server: &HashMap<String, Vec<McpToolInfo>>,
    ) -> HashMap<String, McpToolInfo> {
        let mut owners: HashMap<&str, usize> = HashMap::new();
        for infos in per_server.values() {
            for info in infos {
                *owners.entry(info.name.as_str()).or_default() += 1;
            }
        }

        let mut global = HashMap::new();
        for infos in per_server.values() {
            for info in infos {
                let key = if owners[info.name.as_str()] > 1 {
                    format!("{}.{}", info.server_name, info.name)
                } else {
                    info.name.clone()
                };
                global.insert(key, info.clone());
            }
        }
        global
    }

    /// Replace the registry's MCP population with the new catalog.
    ///
    /// The bulk registration is atomic, so vanished tools drop out in
    /// the same snapshot that introduces new ones.
    fn publish(&self, global: &HashMap<String, McpToolInfo>) {
        let bridges: Vec<Arc<dyn Tool>> = global
            .iter()
            .map(|(registered_name, info)| {
                Arc::new(McpToolBridge::new(
                    Arc::clone(&self.executor),
                    info.clone(),
                    registered_name.clone(),
                )) as Arc<dyn Tool>
            })
            .collect();

        if let Err(e) = self.registry.register_mcp_tools(bridges) {
            warn!(error = %e, "failed to publish MCP catalog to registry");
        }
    }

    /// Look up a tool in the global index
    pub fn tool(&self, name: &str) -> Option<McpToolInfo> {
        self.by_name
            .read()
            .expect("catalog lock poisoned")
            .get(name)
            .cloned()
    }

    /// Tools advertised by one server (unqualified names)
    pub fn tools_for_server(&self, server: &str) -> Vec<McpToolInfo> {
        self.by_server
            .read()
            .expect("catalog lock poisoned")
            .get(server)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the global catalog
    pub fn catalog(&self) -> Vec<McpToolInfo> {
        self.by_name
            .read()
            .expect("catalog lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

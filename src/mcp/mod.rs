//! Model Context Protocol subsystem
//!
//! Connects the agent to remote tool servers: a JSON-RPC transport
//! (HTTP or SSE), a discovery service that keeps a de-conflicted
//! catalog of every server's tools, an executor that routes calls and
//! tracks statistics, and a bridge that folds discovered tools into the
//! tool registry.

mod bridge;
mod discovery;
mod executor;
mod protocol;
mod transport;

pub use bridge::McpToolBridge;
pub use discovery::{DiscoveryConfig, DiscoveryService, McpToolInfo};
pub use executor::{McpExecutor, ToolStats};
pub use protocol::{McpContent, McpRequest, McpResponse, McpRpcError, McpTool, McpToolResult};
pub use transport::{McpTransport, TransportKind, CALL_TOOL_TIMEOUT, LIST_TOOLS_TIMEOUT};

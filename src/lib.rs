//! # Agentflow
//!
//! An LLM-driven agent runtime with MCP tool discovery and workflow
//! orchestration, built with Rust.
//!
//! ## Architecture
//!
//! Agentflow follows a modular, loosely-coupled architecture:
//!
//! - **Agent** (`agent`): the Plan-Act-Observe-Reflect loop, the
//!   execution trace with its budget, the planner, and the reflector
//! - **Tools** (`tools`): the tool trait, the unified registry, and
//!   the timeout/retry executor
//! - **MCP** (`mcp`): JSON-RPC transports, catalog discovery, call
//!   routing, and the registry bridge for remote tool servers
//! - **Flow** (`flow`): dependency-ordered multi-task workflows over
//!   pooled agents
//! - **LLM** (`llm`): the chat-model seam and an OpenAI-style client
//! - **Memory** (`memory`): working-set annotations and trace history
//!   compression
//! - **Storage** (`storage`): trace persistence backends
//! - **Configuration** (`config`): typed config with file and
//!   environment loading
//!
//! ## Design Principles
//!
//! 1. **Trait-based abstraction**: tools, models, and stores sit
//!    behind traits so the loop never cares who implements them
//! 2. **One loop, one trace**: a trace is exclusively owned by its
//!    loop; concurrency only appears between independent loops
//! 3. **Errors stay observable**: tool failures become observations
//!    the model can reason about, never silent aborts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agentflow::agent::Agent;
//! use agentflow::config::Config;
//! use agentflow::llm::OpenAiClient;
//! use agentflow::tools::ToolRegistry;
//! use agentflow::Result;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     let model = Arc::new(OpenAiClient::new(config.llm.clone())?);
//!     let registry = Arc::new(ToolRegistry::new());
//!
//!     let agent = Agent::new(model, registry, config.agent.clone());
//!     let answer = agent.run(&CancellationToken::new(), "what is 6x7?").await?;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```

// Agent control plane: loop, trace, planner, reflector
pub mod agent;

// Modular configuration
pub mod config;

// Error types
pub mod error;

// Flow engine for multi-task workflows
pub mod flow;

// LLM client layer
pub mod llm;

// MCP discovery and execution
pub mod mcp;

// Working-set memory and trace compression
pub mod memory;

// Trace persistence backends
pub mod storage;

// Tool trait, registry, and executor
pub mod tools;

// Re-export commonly used items
pub use error::{Error, Result};

pub use agent::{Action, Agent, Budget, Observation, Trace, TraceStatus};
pub use flow::{FlowEngine, FlowMode, SubTask, Workflow};
pub use llm::{ChatModel, OpenAiClient};
pub use tools::{Tool, ToolInfo, ToolRegistry};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

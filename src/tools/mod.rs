//! Tool system - trait, registry, and executor
//!
//! Tools sit behind a narrow capability set (name, description,
//! schemas, invoke) plus a kind/server discriminator used only for
//! display and unregistration. Built-in and MCP-discovered tools are
//! indistinguishable to the planner.

mod executor;
mod registry;
mod traits;

pub use executor::{ExecutorConfig, ToolExecutor};
pub use registry::{default_registry, ToolRegistry};
pub use traits::{Tool, ToolInfo, ToolKind};

//! Flow engine - multi-task workflow orchestration
//!
//! A workflow declares tasks, dependency edges, and a mode; the engine
//! validates it, resolves dependency levels, runs each task in its own
//! agent loop, and streams state-transition events.

mod engine;
mod resolver;
mod types;

pub use engine::FlowEngine;
pub use resolver::{resolve_levels, validate};
pub use types::{
    FlowConfig, FlowEvent, FlowEventKind, FlowExecution, FlowMode, FlowStatus, SubTask,
    TaskStatus, Workflow,
};

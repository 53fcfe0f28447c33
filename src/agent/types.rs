//! Type definitions for the agent control plane
//!
//! These are the records that make up an execution trace: the actions
//! the planner chooses, the observations the executor produces, and the
//! reflection results that steer the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Sentinel action name: the planner has the final answer in hand
pub const ACTION_DIRECT_ANSWER: &str = "direct_answer";

/// Sentinel action name: the planner wants to stop without an answer
pub const ACTION_STOP: &str = "stop";

/// An intent to invoke a tool by name, produced by planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Tool name (including the two sentinel names)
    pub name: String,
    /// Tool arguments
    #[serde(default)]
    pub args: HashMap<String, Value>,
    /// Why the planner chose this action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Action {
    /// Create a new action
    pub fn new(name: impl Into<String>, args: HashMap<String, Value>) -> Self {
        Action {
            name: name.into(),
            args,
            reason: None,
        }
    }

    /// Attach the planner's rationale
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Create a `direct_answer` sentinel action
    pub fn direct_answer(answer: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut args = HashMap::new();
        args.insert("answer".to_string(), Value::String(answer.into()));
        Action::new(ACTION_DIRECT_ANSWER, args).with_reason(reason)
    }

    /// Create a `stop` sentinel action
    pub fn stop(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut args = HashMap::new();
        args.insert("reason".to_string(), Value::String(reason.clone()));
        Action::new(ACTION_STOP, args).with_reason(reason)
    }

    /// Whether this is the `direct_answer` sentinel
    pub fn is_direct_answer(&self) -> bool {
        self.name == ACTION_DIRECT_ANSWER
    }

    /// Whether this is the `stop` sentinel
    pub fn is_stop(&self) -> bool {
        self.name == ACTION_STOP
    }

    /// Fetch a string argument by key
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// The result of executing one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Name of the tool that ran
    pub tool: String,
    /// Tool output (possibly empty for successful no-output tools)
    #[serde(default)]
    pub output: HashMap<String, Value>,
    /// Error message; presence marks failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    /// Wall-clock execution time in milliseconds
    pub latency_ms: u64,
}

impl Observation {
    /// Create a successful observation
    pub fn success(tool: impl Into<String>, output: HashMap<String, Value>, latency_ms: u64) -> Self {
        Observation {
            tool: tool.into(),
            output,
            err_msg: None,
            latency_ms,
        }
    }

    /// Create a failed observation
    pub fn failure(tool: impl Into<String>, err_msg: impl Into<String>, latency_ms: u64) -> Self {
        Observation {
            tool: tool.into(),
            output: HashMap::new(),
            err_msg: Some(err_msg.into()),
            latency_ms,
        }
    }

    /// Whether this observation records a failure
    pub fn is_error(&self) -> bool {
        self.err_msg.is_some()
    }
}

/// One entry in the trace: an action and (once acted) its observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Position in the trace; equals the step's index in `trace.steps`
    pub index: usize,
    /// The planned action
    pub action: Action,
    /// Attached after the act phase completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    /// Optional compressed one-line summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// When the step was planned
    pub timestamp: DateTime<Utc>,
}

impl Step {
    /// Whether the step completed without error
    pub fn succeeded(&self) -> bool {
        self.observation.as_ref().is_some_and(|o| !o.is_error())
    }

    /// Whether the step completed with an error
    pub fn failed(&self) -> bool {
        self.observation.as_ref().is_some_and(|o| o.is_error())
    }
}

/// Outcome of one reflection pass over the trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionResult {
    /// Whether the plan should be revised
    #[serde(default)]
    pub revise_plan: bool,
    /// Suggested direction for the next action
    #[serde(default)]
    pub next_action_hint: String,
    /// Whether execution should stop now
    #[serde(default)]
    pub should_stop: bool,
    /// Explanation for the decision
    #[serde(default)]
    pub reason: String,
    /// Confidence in the decision, in [0, 1]
    #[serde(default)]
    pub confidence: f64,
}

impl ReflectionResult {
    /// A "keep going" result
    pub fn proceed(hint: impl Into<String>, confidence: f64) -> Self {
        ReflectionResult {
            revise_plan: false,
            next_action_hint: hint.into(),
            should_stop: false,
            reason: String::new(),
            confidence,
        }
    }

    /// A "revise the plan" result
    pub fn revise(hint: impl Into<String>, reason: impl Into<String>) -> Self {
        ReflectionResult {
            revise_plan: true,
            next_action_hint: hint.into(),
            should_stop: false,
            reason: reason.into(),
            confidence: 0.8,
        }
    }

    /// A "stop now" result
    pub fn halt(reason: impl Into<String>) -> Self {
        ReflectionResult {
            revise_plan: false,
            next_action_hint: String::new(),
            should_stop: true,
            reason: reason.into(),
            confidence: 0.9,
        }
    }
}

/// A reflection result annotated with when it ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    /// Number of steps that existed when reflection ran
    pub step_index: usize,
    /// The reflection outcome
    pub result: ReflectionResult,
    /// When reflection ran
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle state of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    /// The loop is still driving this trace
    Running,
    /// The loop finished with an answer or stop reason
    Completed,
    /// The loop failed (planning error or budget exhaustion)
    Failed,
    /// External cancellation ended the loop
    Canceled,
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceStatus::Running => write!(f, "running"),
            TraceStatus::Completed => write!(f, "completed"),
            TraceStatus::Failed => write!(f, "failed"),
            TraceStatus::Canceled => write!(f, "canceled"),
        }
    }
}

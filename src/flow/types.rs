//! Workflow and flow-execution types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::agent::Trace;

/// Lifecycle state of one subtask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet scheduled
    Pending,
    /// An agent loop is driving it
    Running,
    /// Finished successfully
    Completed,
    /// The agent loop failed
    Failed,
    /// Canceled before finishing
    Canceled,
    /// Never started because the flow failed first
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

fn default_task_status() -> TaskStatus {
    TaskStatus::Pending
}

/// One node in a workflow; runs to completion in its own agent loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Unique task id within the workflow
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Agent pool key; tasks of one type share an agent instance
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    /// The natural-language goal for this task
    pub goal: String,
    /// Task-specific input, layered over the flow input
    #[serde(default)]
    pub input: HashMap<String, Value>,
    /// Packaged result, filled on completion
    #[serde(default)]
    pub output: HashMap<String, Value>,
    /// Ids of tasks that must complete first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Lifecycle state
    #[serde(default = "default_task_status")]
    pub status: TaskStatus,
    /// When the task started
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task finished
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Failure message, if any
    #[serde(default)]
    pub error: Option<String>,
    /// The task's execution trace
    #[serde(default)]
    pub trace: Option<Trace>,
}

fn default_agent_type() -> String {
    "default".to_string()
}

impl SubTask {
    /// Create a pending task
    pub fn new(id: impl Into<String>, goal: impl Into<String>) -> Self {
        let id = id.into();
        SubTask {
            name: id.clone(),
            id,
            agent_type: default_agent_type(),
            goal: goal.into(),
            input: HashMap::new(),
            output: HashMap::new(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            error: None,
            trace: None,
        }
    }

    /// Add a dependency edge
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Set the agent pool key
    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    /// Set task-specific input
    pub fn with_input(mut self, input: HashMap<String, Value>) -> Self {
        self.input = input;
        self
    }
}

/// How a workflow's tasks are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowMode {
    /// Declared order, stop on first failure
    Sequential,
    /// Dependency levels, tasks within a level run concurrently
    Parallel,
    /// Currently identical to Parallel; reserved for richer scheduling
    Dag,
}

impl std::fmt::Display for FlowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowMode::Sequential => write!(f, "sequential"),
            FlowMode::Parallel => write!(f, "parallel"),
            FlowMode::Dag => write!(f, "dag"),
        }
    }
}

/// Per-workflow engine knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Concurrent-task ceiling within one level
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    10
}

/// A declared set of tasks with dependencies and an execution mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// The task set
    pub tasks: Vec<SubTask>,
    /// Scheduling mode
    #[serde(default = "default_mode")]
    pub mode: FlowMode,
    /// Engine knobs
    #[serde(default)]
    pub config: FlowConfig,
}

fn default_mode() -> FlowMode {
    FlowMode::Sequential
}

/// Lifecycle state of a flow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    /// Accepted, not yet running
    Pending,
    /// Tasks are executing
    Running,
    /// All tasks completed
    Completed,
    /// A task failed (or validation-adjacent runtime failure)
    Failed,
    /// Canceled from the outside
    Canceled,
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlowStatus::Pending => "pending",
            FlowStatus::Running => "running",
            FlowStatus::Completed => "completed",
            FlowStatus::Failed => "failed",
            FlowStatus::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

/// What happened in a flow, as a stream of state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEventKind {
    FlowStarted,
    FlowCompleted,
    FlowFailed,
    FlowCanceled,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskSkipped,
}

/// One state-transition notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    /// What changed
    pub kind: FlowEventKind,
    /// Owning execution
    pub flow_id: String,
    /// Task involved, for task-level events
    #[serde(default)]
    pub task_id: Option<String>,
    /// Error text or other detail
    #[serde(default)]
    pub detail: Option<String>,
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
}

impl FlowEvent {
    pub(crate) fn flow(kind: FlowEventKind, flow_id: &str, detail: Option<String>) -> Self {
        FlowEvent {
            kind,
            flow_id: flow_id.to_string(),
            task_id: None,
            detail,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn task(
        kind: FlowEventKind,
        flow_id: &str,
        task_id: &str,
        detail: Option<String>,
    ) -> Self {
        FlowEvent {
            kind,
            flow_id: flow_id.to_string(),
            task_id: Some(task_id.to_string()),
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// Runtime state of one workflow execution
///
/// Exclusively owned by the flow engine; callers see snapshots through
/// `FlowEngine::get_execution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecution {
    /// Execution id
    pub id: String,
    /// The workflow, with task state mutated in place
    pub workflow: Workflow,
    /// Lifecycle state
    pub status: FlowStatus,
    /// Input passed to `execute`
    pub input: HashMap<String, Value>,
    /// Collected output, filled on success
    pub output: HashMap<String, Value>,
    /// Shared context visible to every task
    pub context: HashMap<String, Value>,
    /// Per-task result cache for downstream dependents
    pub task_results: HashMap<String, HashMap<String, Value>>,
    /// When execution started
    pub started_at: DateTime<Utc>,
    /// When execution finished
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message, if any
    #[serde(default)]
    pub error: Option<String>,
}

impl FlowExecution {
    pub(crate) fn new(workflow: Workflow, input: HashMap<String, Value>) -> Self {
        FlowExecution {
            id: uuid::Uuid::new_v4().to_string(),
            workflow,
            status: FlowStatus::Pending,
            input,
            output: HashMap::new(),
            context: HashMap::new(),
            task_results: HashMap::new(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Find a task by id
    pub fn task(&self, id: &str) -> Option<&SubTask> {
        self.workflow.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut SubTask> {
        self.workflow.tasks.iter_mut().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_deserializes_with_defaults() {
        let workflow: Workflow = serde_json::from_str(
            r#"{
                "id": "wf-1",
                "tasks": [
                    {"id": "t1", "goal": "do the first thing"},
                    {"id": "t2", "goal": "then this", "dependencies": ["t1"], "agent_type": "writer"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(workflow.mode, FlowMode::Sequential);
        assert_eq!(workflow.config.max_concurrency, 10);
        assert_eq!(workflow.tasks[0].status, TaskStatus::Pending);
        assert_eq!(workflow.tasks[0].agent_type, "default");
        assert_eq!(workflow.tasks[1].dependencies, vec!["t1"]);
        assert_eq!(workflow.tasks[1].agent_type, "writer");
    }

    #[test]
    fn test_subtask_builder() {
        let task = SubTask::new("t1", "goal")
            .depends_on("t0")
            .with_agent_type("researcher");
        assert_eq!(task.id, "t1");
        assert_eq!(task.name, "t1");
        assert_eq!(task.dependencies, vec!["t0"]);
        assert_eq!(task.agent_type, "researcher");
    }
}

//! Flow engine - composes agents into dependency-ordered workflows
//!
//! `execute` validates synchronously, then drives the workflow on a
//! background task. Observers poll `get_execution`, stream events via
//! `subscribe`, or fire `cancel_execution`. Each execution owns an
//! agent pool keyed by `agent_type`, a bounded event channel that drops
//! on overflow, and a cancellation token that reaches every in-flight
//! agent, tool, and transport call.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::resolver;
use super::types::{
    FlowEvent, FlowEventKind, FlowExecution, FlowMode, FlowStatus, TaskStatus, Workflow,
};
use crate::agent::{Agent, Trace};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::llm::ChatModel;
use crate::tools::ToolRegistry;

/// Event channel capacity; overflow drops events rather than blocking
const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
struct ExecutionHandle {
    execution: Arc<tokio::sync::RwLock<FlowExecution>>,
    events: broadcast::Sender<FlowEvent>,
    cancel: CancellationToken,
}

/// Orchestrates workflows over a shared model and tool registry
pub struct FlowEngine {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    agent_config: AgentConfig,
    executions: RwLock<HashMap<String, ExecutionHandle>>,
}

impl FlowEngine {
    /// Create an engine; agents it spawns share the model, registry,
    /// and loop configuration.
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        agent_config: AgentConfig,
    ) -> Self {
        FlowEngine {
            model,
            registry,
            agent_config,
            executions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a workflow asynchronously and return its execution id.
    ///
    /// Validation failures are returned synchronously and create no
    /// execution.
    pub fn execute(
        &self,
        workflow: Workflow,
        input: HashMap<String, Value>,
    ) -> Result<String> {
        resolver::validate(&workflow)?;
        let levels = resolver::resolve_levels(&workflow)?;

        let execution = FlowExecution::new(workflow, input);
        let id = execution.id.clone();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let handle = ExecutionHandle {
            execution: Arc::new(tokio::sync::RwLock::new(execution)),
            events,
            cancel: CancellationToken::new(),
        };

        self.executions
            .write()
            .expect("executions lock poisoned")
            .insert(id.clone(), handle.clone());

        let runner = FlowRunner {
            model: Arc::clone(&self.model),
            registry: Arc::clone(&self.registry),
            agent_config: self.agent_config.clone(),
            handle,
            agents: Mutex::new(HashMap::new()),
        };
        tokio::spawn(async move { runner.drive(levels).await });

        Ok(id)
    }

    /// Snapshot of an execution's current state
    pub async fn get_execution(&self, id: &str) -> Option<FlowExecution> {
        let handle = self
            .executions
            .read()
            .expect("executions lock poisoned")
            .get(id)
            .cloned()?;
        let snapshot = handle.execution.read().await.clone();
        Some(snapshot)
    }

    /// Subscribe to an execution's event stream
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<FlowEvent>> {
        self.executions
            .read()
            .expect("executions lock poisoned")
            .get(id)
            .map(|h| h.events.subscribe())
    }

    /// Cancel a running execution. Returns false for unknown ids.
    pub fn cancel_execution(&self, id: &str) -> bool {
        match self
            .executions
            .read()
            .expect("executions lock poisoned")
            .get(id)
        {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// How one execution ended
enum FlowOutcome {
    Completed,
    Failed(String),
    Canceled(String),
}

/// Drives one execution to completion on a background task
struct FlowRunner {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    agent_config: AgentConfig,
    handle: ExecutionHandle,
    /// Agent pool, keyed by agent_type, scoped to this execution
    agents: Mutex<HashMap<String, Arc<Agent>>>,
}

impl FlowRunner {
    async fn drive(&self, levels: Vec<Vec<String>>) {
        let (flow_id, mode, name) = {
            let mut execution = self.handle.execution.write().await;
            execution.status = FlowStatus::Running;
            (
                execution.id.clone(),
                execution.workflow.mode,
                execution.workflow.name.clone(),
            )
        };

        info!(flow_id = %flow_id, mode = %mode, "flow started");
        self.emit(FlowEvent::flow(FlowEventKind::FlowStarted, &flow_id, None));

        let outcome = match mode {
            FlowMode::Sequential => self.run_sequential(&flow_id).await,
            FlowMode::Parallel | FlowMode::Dag => self.run_leveled(&flow_id, levels).await,
        };

        self.skip_unstarted(&flow_id).await;

        let mut execution = self.handle.execution.write().await;
        execution.finished_at = Some(Utc::now());

        match outcome {
            FlowOutcome::Canceled(error) => {
                execution.status = FlowStatus::Canceled;
                execution.error = Some(error.clone());
                drop(execution);
                info!(flow_id = %flow_id, "flow canceled");
                self.emit(FlowEvent::flow(
                    FlowEventKind::FlowCanceled,
                    &flow_id,
                    Some(error),
                ));
            }
            FlowOutcome::Failed(error) => {
                execution.status = FlowStatus::Failed;
                execution.error = Some(error.clone());
                drop(execution);
                warn!(flow_id = %flow_id, error = %error, "flow failed");
                self.emit(FlowEvent::flow(
                    FlowEventKind::FlowFailed,
                    &flow_id,
                    Some(error),
                ));
            }
            FlowOutcome::Completed => {
                let output = collect_output(&execution, &name, mode);
                execution.output = output;
                execution.status = FlowStatus::Completed;
                drop(execution);
                info!(flow_id = %flow_id, "flow completed");
                self.emit(FlowEvent::flow(FlowEventKind::FlowCompleted, &flow_id, None));
            }
        }
    }

    /// Declared order, stop on first failure
    async fn run_sequential(&self, flow_id: &str) -> FlowOutcome {
        let task_ids: Vec<String> = {
            let execution = self.handle.execution.read().await;
            execution.workflow.tasks.iter().map(|t| t.id.clone()).collect()
        };

        for task_id in task_ids {
            if self.handle.cancel.is_cancelled() {
                return FlowOutcome::Canceled("execution canceled".to_string());
            }
            match self.run_task(flow_id, &task_id).await {
                Ok(()) => {}
                Err(Error::Canceled(msg)) => return FlowOutcome::Canceled(msg),
                Err(e) => return FlowOutcome::Failed(e.to_string()),
            }
        }
        FlowOutcome::Completed
    }

    /// Level by level; tasks within a level run concurrently, bounded
    /// by the semaphore. Any task error cancels the execution context;
    /// later levels never start.
    async fn run_leveled(&self, flow_id: &str, levels: Vec<Vec<String>>) -> FlowOutcome {
        let max_concurrency = {
            let execution = self.handle.execution.read().await;
            execution.workflow.config.max_concurrency.max(1)
        };
        let semaphore = Arc::new(Semaphore::new(max_concurrency));

        for level in levels {
            if self.handle.cancel.is_cancelled() {
                return FlowOutcome::Canceled("execution canceled".to_string());
            }

            let results = futures::future::join_all(level.iter().map(|task_id| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    self.run_task(flow_id, task_id).await
                }
            }))
            .await;

            let mut failure: Option<String> = None;
            let mut cancellation: Option<String> = None;
            for result in results {
                match result {
                    Ok(()) => {}
                    Err(Error::Canceled(msg)) => {
                        cancellation.get_or_insert(msg);
                    }
                    Err(e) => {
                        // Cancel siblings and everything downstream.
                        self.handle.cancel.cancel();
                        failure.get_or_insert(e.to_string());
                    }
                }
            }
            // A real failure outranks cancellations it caused itself.
            if let Some(error) = failure {
                return FlowOutcome::Failed(error);
            }
            if let Some(msg) = cancellation {
                return FlowOutcome::Canceled(msg);
            }
        }
        FlowOutcome::Completed
    }

    /// Run one task in its pooled agent
    async fn run_task(&self, flow_id: &str, task_id: &str) -> Result<()> {
        let (goal, agent_type, task_name, layered_input) = {
            let mut execution = self.handle.execution.write().await;

            // Layer the task input: flow input, then shared context,
            // then the task's own input, then dependency outputs.
            let mut layered = execution.input.clone();
            layered.extend(execution.context.clone());

            let task = execution
                .task(task_id)
                .ok_or_else(|| Error::Task(format!("task '{}' disappeared", task_id)))?;
            let goal = task.goal.clone();
            let agent_type = task.agent_type.clone();
            let task_name = task.name.clone();
            layered.extend(task.input.clone());
            let dependencies = task.dependencies.clone();
            for dep in &dependencies {
                if let Some(result) = execution.task_results.get(dep) {
                    layered.insert(
                        format!("dep_{}", dep),
                        serde_json::to_value(result).unwrap_or(Value::Null),
                    );
                }
            }

            let task = execution.task_mut(task_id).expect("task exists");
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());

            (goal, agent_type, task_name, layered)
        };

        self.emit(FlowEvent::task(
            FlowEventKind::TaskStarted,
            flow_id,
            task_id,
            None,
        ));

        let goal = if layered_input.is_empty() {
            goal
        } else {
            format!(
                "{}\n\nAvailable input data:\n{}",
                goal,
                serde_json::to_string_pretty(&layered_input).unwrap_or_default()
            )
        };

        let agent = self.agent_for(&agent_type);
        let (result, trace) = agent.run_traced(&self.handle.cancel, &goal).await;
        let steps = trace.len();

        let mut execution = self.handle.execution.write().await;
        let finished_at = Utc::now();

        match result {
            Ok(answer) => {
                let packaged: HashMap<String, Value> = HashMap::from([
                    ("result".to_string(), Value::String(answer)),
                    ("task_id".to_string(), Value::String(task_id.to_string())),
                    ("task_name".to_string(), Value::String(task_name)),
                    (
                        "timestamp".to_string(),
                        Value::String(finished_at.to_rfc3339()),
                    ),
                    ("steps".to_string(), Value::from(steps)),
                ]);
                execution
                    .task_results
                    .insert(task_id.to_string(), packaged.clone());

                let task = execution.task_mut(task_id).expect("task exists");
                task.status = TaskStatus::Completed;
                task.finished_at = Some(finished_at);
                task.duration_ms = task
                    .started_at
                    .map(|s| (finished_at - s).num_milliseconds().max(0) as u64);
                task.output = packaged;
                task.trace = Some(trace);
                drop(execution);

                self.emit(FlowEvent::task(
                    FlowEventKind::TaskCompleted,
                    flow_id,
                    task_id,
                    None,
                ));
                Ok(())
            }
            Err(e) => {
                let was_canceled = matches!(e, Error::Canceled(_));
                let task = execution.task_mut(task_id).expect("task exists");
                task.status = if was_canceled {
                    TaskStatus::Canceled
                } else {
                    TaskStatus::Failed
                };
                task.finished_at = Some(finished_at);
                task.duration_ms = task
                    .started_at
                    .map(|s| (finished_at - s).num_milliseconds().max(0) as u64);
                task.error = Some(e.to_string());
                task.trace = Some(trace);
                drop(execution);

                self.emit(FlowEvent::task(
                    FlowEventKind::TaskFailed,
                    flow_id,
                    task_id,
                    Some(e.to_string()),
                ));
                if was_canceled {
                    // Preserve the cancellation cause so the flow ends
                    // Canceled rather than Failed.
                    Err(e)
                } else {
                    Err(Error::Task(format!("task '{}' failed: {}", task_id, e)))
                }
            }
        }
    }

    /// Mark never-started tasks Skipped after a failure or cancel
    async fn skip_unstarted(&self, flow_id: &str) {
        let mut skipped = Vec::new();
        {
            let mut execution = self.handle.execution.write().await;
            for task in &mut execution.workflow.tasks {
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::Skipped;
                    skipped.push(task.id.clone());
                }
            }
        }
        for task_id in skipped {
            self.emit(FlowEvent::task(
                FlowEventKind::TaskSkipped,
                flow_id,
                &task_id,
                None,
            ));
        }
    }

    fn agent_for(&self, agent_type: &str) -> Arc<Agent> {
        let mut agents = self.agents.lock().expect("agent pool lock poisoned");
        Arc::clone(agents.entry(agent_type.to_string()).or_insert_with(|| {
            Arc::new(Agent::new(
                Arc::clone(&self.model),
                Arc::clone(&self.registry),
                self.agent_config.clone(),
            ))
        }))
    }

    fn emit(&self, event: FlowEvent) {
        // No receivers (or a full buffer) is fine; the authoritative
        // state lives in the execution itself.
        let _ = self.handle.events.send(event);
    }
}

/// Flow output assembled on success
fn collect_output(
    execution: &FlowExecution,
    workflow_name: &str,
    mode: FlowMode,
) -> HashMap<String, Value> {
    let tasks = &execution.workflow.tasks;
    let total = tasks.len();
    let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
    let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();
    let skipped = tasks.iter().filter(|t| t.status == TaskStatus::Skipped).count();
    let total_steps: usize = tasks
        .iter()
        .filter_map(|t| t.trace.as_ref().map(Trace::len))
        .sum();
    let success_rate = if total > 0 {
        completed as f64 / total as f64
    } else {
        0.0
    };
    let total_duration_ms = (Utc::now() - execution.started_at).num_milliseconds().max(0);

    let task_outputs: HashMap<String, Value> = tasks
        .iter()
        .map(|t| {
            (
                t.id.clone(),
                serde_json::to_value(&t.output).unwrap_or(Value::Null),
            )
        })
        .collect();

    HashMap::from([
        (
            "tasks".to_string(),
            serde_json::to_value(task_outputs).unwrap_or(Value::Null),
        ),
        (
            "stats".to_string(),
            serde_json::json!({
                "total": total,
                "completed": completed,
                "failed": failed,
                "skipped": skipped,
                "total_steps": total_steps,
                "success_rate": success_rate,
                "total_duration_ms": total_duration_ms,
            }),
        ),
        ("flow_id".to_string(), Value::String(execution.id.clone())),
        (
            "workflow_name".to_string(),
            Value::String(workflow_name.to_string()),
        ),
        (
            "execution_mode".to_string(),
            Value::String(mode.to_string()),
        ),
        (
            "completed_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::types::{FlowConfig, SubTask};
    use crate::llm::{ChatResponse, MockChatModel};
    use std::time::Duration;

    fn answer(text: &str) -> ChatResponse {
        MockChatModel::tool_call_response("direct_answer", serde_json::json!({"answer": text}))
    }

    fn engine_with(responses: Vec<ChatResponse>) -> FlowEngine {
        FlowEngine::new(
            Arc::new(MockChatModel::new(responses)),
            Arc::new(ToolRegistry::new()),
            AgentConfig {
                max_steps: 5,
                reflection_steps: 0,
                ..Default::default()
            },
        )
    }

    fn diamond_workflow(mode: FlowMode) -> Workflow {
        Workflow {
            id: "wf-diamond".to_string(),
            name: "diamond".to_string(),
            tasks: vec![
                SubTask::new("t1", "produce the base value"),
                SubTask::new("t2", "refine one side").depends_on("t1"),
                SubTask::new("t3", "refine the other side").depends_on("t1"),
                SubTask::new("t4", "combine the sides")
                    .depends_on("t2")
                    .depends_on("t3"),
            ],
            mode,
            config: FlowConfig::default(),
        }
    }

    async fn wait_for_finish(engine: &FlowEngine, id: &str) -> FlowExecution {
        for _ in 0..200 {
            if let Some(execution) = engine.get_execution(id).await {
                if execution.status != FlowStatus::Running
                    && execution.status != FlowStatus::Pending
                {
                    return execution;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("flow did not finish in time");
    }

    /// DAG flow: levels respected, all tasks complete, stats are right.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_dag_flow_ordering_and_stats() {
        let engine = engine_with((0..4).map(|i| answer(&format!("r{}", i))).collect());
        let id = engine
            .execute(diamond_workflow(FlowMode::Parallel), HashMap::new())
            .unwrap();

        let execution = wait_for_finish(&engine, &id).await;
        assert_eq!(execution.status, FlowStatus::Completed);

        let t1 = execution.task("t1").unwrap();
        let t2 = execution.task("t2").unwrap();
        let t3 = execution.task("t3").unwrap();
        let t4 = execution.task("t4").unwrap();

        for task in [t1, t2, t3, t4] {
            assert_eq!(task.status, TaskStatus::Completed);
        }

        // Dependents start only after their dependencies end.
        assert!(t2.started_at.unwrap() >= t1.finished_at.unwrap());
        assert!(t3.started_at.unwrap() >= t1.finished_at.unwrap());
        assert!(t4.started_at.unwrap() >= t2.finished_at.unwrap());
        assert!(t4.started_at.unwrap() >= t3.finished_at.unwrap());

        let stats = &execution.output["stats"];
        assert_eq!(stats["total"], 4);
        assert_eq!(stats["completed"], 4);
        assert!((stats["success_rate"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(stats["total_steps"], 4);
        assert_eq!(execution.output["execution_mode"], "parallel");
    }

    /// Cycles are rejected synchronously; no execution is created.
    #[tokio::test]
    async fn test_cycle_rejected_synchronously() {
        let engine = engine_with(vec![]);
        let workflow = Workflow {
            id: "wf-cycle".to_string(),
            name: "cycle".to_string(),
            tasks: vec![
                SubTask::new("a", "g").depends_on("c"),
                SubTask::new("b", "g").depends_on("a"),
                SubTask::new("c", "g").depends_on("b"),
            ],
            mode: FlowMode::Dag,
            config: FlowConfig::default(),
        };

        let err = engine.execute(workflow, HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Workflow(_)));
        assert!(engine.executions.read().unwrap().is_empty());
    }

    /// Sequential mode aborts on first failure and skips the rest.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_sequential_stops_on_failure() {
        // First task answers; second task's planning call has no
        // response programmed, so it fails; third never starts.
        let engine = engine_with(vec![answer("ok")]);
        let workflow = Workflow {
            id: "wf-seq".to_string(),
            name: "seq".to_string(),
            tasks: vec![
                SubTask::new("first", "g"),
                SubTask::new("second", "g"),
                SubTask::new("third", "g"),
            ],
            mode: FlowMode::Sequential,
            config: FlowConfig::default(),
        };

        let id = engine.execute(workflow, HashMap::new()).unwrap();
        let execution = wait_for_finish(&engine, &id).await;

        assert_eq!(execution.status, FlowStatus::Failed);
        assert_eq!(execution.task("first").unwrap().status, TaskStatus::Completed);
        assert_eq!(execution.task("second").unwrap().status, TaskStatus::Failed);
        assert_eq!(execution.task("third").unwrap().status, TaskStatus::Skipped);
    }

    /// A failing task in parallel mode fails the flow; later levels
    /// never start.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_parallel_failure_cancels_downstream() {
        // t1 fails (no responses at all), t2 depends on it.
        let engine = engine_with(vec![]);
        let workflow = Workflow {
            id: "wf-fail".to_string(),
            name: "fail".to_string(),
            tasks: vec![
                SubTask::new("t1", "g"),
                SubTask::new("t2", "g").depends_on("t1"),
            ],
            mode: FlowMode::Dag,
            config: FlowConfig::default(),
        };

        let id = engine.execute(workflow, HashMap::new()).unwrap();
        let execution = wait_for_finish(&engine, &id).await;

        assert_eq!(execution.status, FlowStatus::Failed);
        assert_eq!(execution.task("t1").unwrap().status, TaskStatus::Failed);
        assert_eq!(execution.task("t2").unwrap().status, TaskStatus::Skipped);
    }

    /// One-task workflows behave identically under all three modes.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_task_mode_equivalence() {
        for mode in [FlowMode::Sequential, FlowMode::Parallel, FlowMode::Dag] {
            let engine = engine_with(vec![answer("only")]);
            let workflow = Workflow {
                id: format!("wf-{}", mode),
                name: "single".to_string(),
                tasks: vec![SubTask::new("only", "g")],
                mode,
                config: FlowConfig::default(),
            };

            let id = engine.execute(workflow, HashMap::new()).unwrap();
            let execution = wait_for_finish(&engine, &id).await;

            assert_eq!(execution.status, FlowStatus::Completed, "mode {}", mode);
            let task = execution.task("only").unwrap();
            assert_eq!(task.status, TaskStatus::Completed);
            assert_eq!(task.output["result"], "only");
        }
    }

    /// Dependency outputs are layered into downstream task input.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_dependency_outputs_flow_downstream() {
        let model = Arc::new(MockChatModel::new(vec![
            answer("upstream says 7"),
            answer("done"),
        ]));
        let engine = FlowEngine::new(
            Arc::clone(&model) as Arc<dyn ChatModel>,
            Arc::new(ToolRegistry::new()),
            AgentConfig {
                max_steps: 5,
                reflection_steps: 0,
                ..Default::default()
            },
        );

        let workflow = Workflow {
            id: "wf-dep".to_string(),
            name: "dep".to_string(),
            tasks: vec![
                SubTask::new("up", "produce a number"),
                SubTask::new("down", "use the number").depends_on("up"),
            ],
            mode: FlowMode::Sequential,
            config: FlowConfig::default(),
        };

        let id = engine
            .execute(
                workflow,
                HashMap::from([("shared".to_string(), Value::from("flow-wide"))]),
            )
            .unwrap();
        wait_for_finish(&engine, &id).await;

        // The downstream planning prompt carries the flow input and the
        // packaged dependency output.
        let prompt = model.prompt_for_call(1).unwrap();
        assert!(prompt.contains("Available input data"));
        assert!(prompt.contains("flow-wide"));
        assert!(prompt.contains("dep_up"));
        assert!(prompt.contains("upstream says 7"));
    }

    /// Events stream the lifecycle; subscribers see start and end.
    /// Current-thread flavor so the subscription lands before the
    /// spawned driver emits its first event.
    #[tokio::test]
    async fn test_event_stream() {
        let engine = engine_with(vec![answer("ok")]);
        let workflow = Workflow {
            id: "wf-events".to_string(),
            name: "events".to_string(),
            tasks: vec![SubTask::new("only", "g")],
            mode: FlowMode::Sequential,
            config: FlowConfig::default(),
        };

        let id = engine.execute(workflow, HashMap::new()).unwrap();
        let mut events = engine.subscribe(&id).unwrap();
        wait_for_finish(&engine, &id).await;

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.flow_id, id);
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&FlowEventKind::FlowStarted));
        assert!(kinds.contains(&FlowEventKind::TaskStarted));
        assert!(kinds.contains(&FlowEventKind::TaskCompleted));
        assert!(kinds.contains(&FlowEventKind::FlowCompleted));
    }

    /// Cancellation marks the execution canceled.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_execution() {
        // A slow tool keeps the first task busy until cancel arrives.
        use crate::tools::Tool;
        use async_trait::async_trait;

        struct Stall;

        #[async_trait]
        impl Tool for Stall {
            fn name(&self) -> &str {
                "stall"
            }
            fn description(&self) -> &str {
                "sleeps"
            }
            fn input_schema(&self) -> Value {
                serde_json::json!({"type": "object", "properties": {}})
            }
            async fn invoke(
                &self,
                _args: HashMap<String, Value>,
            ) -> Result<HashMap<String, Value>> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(HashMap::new())
            }
        }

        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(Stall)).unwrap();
        let engine = FlowEngine::new(
            Arc::new(MockChatModel::new(vec![MockChatModel::tool_call_response(
                "stall",
                serde_json::json!({}),
            )])),
            registry,
            AgentConfig {
                max_steps: 5,
                reflection_steps: 0,
                ..Default::default()
            },
        );

        let workflow = Workflow {
            id: "wf-cancel".to_string(),
            name: "cancel".to_string(),
            tasks: vec![SubTask::new("slow", "g")],
            mode: FlowMode::Sequential,
            config: FlowConfig::default(),
        };

        let id = engine.execute(workflow, HashMap::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.cancel_execution(&id));

        let execution = wait_for_finish(&engine, &id).await;
        assert_eq!(execution.status, FlowStatus::Canceled);

        assert!(!engine.cancel_execution("no-such-id"));
    }
}

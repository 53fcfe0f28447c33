//! The agent loop - Plan, Act, Observe, Reflect
//!
//! One `Agent` drives one goal at a time to completion. The loop owns
//! its trace exclusively; concurrency only ever appears between
//! independent agents under the flow engine.

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::planner::Planner;
use super::reflector::Reflector;
use super::trace::{Budget, Trace};
use super::types::TraceStatus;
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::llm::ChatModel;
use crate::memory::Memory;
use crate::tools::{ExecutorConfig, ToolExecutor, ToolRegistry};

/// Step count past which history compression kicks in
const COMPRESS_THRESHOLD: usize = 20;

/// Compression cadence once past the threshold
const COMPRESS_EVERY: usize = 10;

/// Materialized steps kept by each compression pass
const COMPRESS_KEEP: usize = 15;

/// Drives the Plan-Act-Observe-Reflect cycle for one goal at a time
pub struct Agent {
    planner: Planner,
    reflector: Reflector,
    executor: ToolExecutor,
    registry: Arc<ToolRegistry>,
    memory: Memory,
    config: AgentConfig,
    /// Last finished trace, for post-mortem inspection
    last_trace: Mutex<Option<Trace>>,
}

impl Agent {
    /// Create an agent over a chat model and a tool registry
    pub fn new(model: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        let executor = ToolExecutor::new(
            Arc::clone(&registry),
            ExecutorConfig {
                timeout: config.tool_timeout,
                max_retries: config.max_retries,
                retry_backoff: config.retry_backoff,
            },
        );

        Agent {
            planner: Planner::new(Arc::clone(&model)),
            reflector: Reflector::new(model),
            executor,
            registry,
            memory: Memory::new(),
            config,
            last_trace: Mutex::new(None),
        }
    }

    /// The trace of the most recently finished run
    pub fn trace(&self) -> Option<Trace> {
        self.last_trace.lock().expect("trace lock poisoned").clone()
    }

    /// Run a goal to completion and return the final answer.
    ///
    /// The returned string is always non-empty: the direct answer, the
    /// stop reason, a budget message, or a synthesized summary. Fatal
    /// planning errors and cancellation surface as errors; the trace is
    /// still stored for post-mortem either way.
    pub async fn run(&self, token: &CancellationToken, goal: &str) -> Result<String> {
        let (result, trace) = self.run_traced(token, goal).await;
        *self.last_trace.lock().expect("trace lock poisoned") = Some(trace);
        result
    }

    /// Like [`Agent::run`], but hands the trace back to the caller
    /// instead of only storing it. Used by the flow engine, where one
    /// pooled agent may serve concurrent tasks.
    pub async fn run_traced(&self, token: &CancellationToken, goal: &str) -> (Result<String>, Trace) {
        let budget = Budget::new(
            self.config.max_steps,
            self.config.max_tokens,
            self.config.max_duration,
        );
        let mut trace = Trace::new(goal, budget);
        info!(goal, max_steps = self.config.max_steps, "agent loop started");

        let result = self.drive(token, goal, &mut trace).await;

        match &result {
            Ok(answer) => info!(status = %trace.status, answer_len = answer.len(), "agent loop finished"),
            Err(e) => warn!(status = %trace.status, error = %e, "agent loop aborted"),
        }

        (result, trace)
    }

    async fn drive(
        &self,
        token: &CancellationToken,
        goal: &str,
        trace: &mut Trace,
    ) -> Result<String> {
        let mut final_result = String::new();

        while !self.should_stop(trace) {
            // Honor cancellation between iterations.
            if token.is_cancelled() {
                trace.status = TraceStatus::Canceled;
                return Err(Error::Canceled(format!("goal '{}' was canceled", goal)));
            }

            // Plan, racing the call against cancellation. A planning
            // failure is fatal: the loop cannot proceed without a
            // decision.
            let plan_result = tokio::select! {
                _ = token.cancelled() => None,
                planned = self.planner.plan(goal, trace, &self.registry) => Some(planned),
            };
            let planned = match plan_result {
                None => {
                    trace.status = TraceStatus::Canceled;
                    return Err(Error::Canceled(format!("goal '{}' was canceled", goal)));
                }
                Some(Err(e)) => {
                    trace.status = TraceStatus::Failed;
                    return Err(e);
                }
                Some(Ok(planned)) => planned,
            };
            if let Some(usage) = planned.usage {
                trace.add_token_usage(usage.total_tokens as u64);
            }

            let action = planned.action;
            trace.add_step(action.clone());

            // Sentinels terminate in-line so their payload is captured
            // before any further checking.
            if action.is_direct_answer() {
                final_result = action.arg_str("answer").unwrap_or_default().to_string();
                trace.status = TraceStatus::Completed;
                break;
            }
            if action.is_stop() {
                final_result = action.arg_str("reason").unwrap_or_default().to_string();
                trace.status = TraceStatus::Completed;
                break;
            }

            // Act. The executor always yields a well-formed
            // observation; tool failures stay inside the trace.
            let observation = self.executor.execute_with_retry(token, &action).await;
            self.memory.note_outcome(&action, observation.err_msg.as_deref());
            trace.update_observation(observation);

            // Reflect every N steps.
            if self.config.reflection_steps > 0
                && trace.len() % self.config.reflection_steps == 0
            {
                let reflection = tokio::select! {
                    _ = token.cancelled() => None,
                    reflection = self.reflector.reflect(trace) => Some(reflection),
                };
                let Some(reflection) = reflection else {
                    trace.status = TraceStatus::Canceled;
                    return Err(Error::Canceled(format!("goal '{}' was canceled", goal)));
                };
                if let Some(usage) = reflection.usage {
                    trace.add_token_usage(usage.total_tokens as u64);
                }
                let should_stop = reflection.result.should_stop;
                let reason = reflection.result.reason.clone();
                trace.add_reflection(reflection.result);

                if should_stop {
                    final_result = reason;
                    trace.status = TraceStatus::Completed;
                    break;
                }
            }

            // Compress old history on a slower cadence.
            if trace.len() > COMPRESS_THRESHOLD && trace.len() % COMPRESS_EVERY == 0 {
                self.memory.compress(trace, COMPRESS_KEEP);
            }

            if trace.is_exceeded_budget() {
                trace.status = TraceStatus::Failed;
                final_result = "stopped due to budget limits".to_string();
                break;
            }
        }

        // Exited from the loop condition itself: the budget is spent.
        if trace.status == TraceStatus::Running {
            trace.status = TraceStatus::Failed;
            if final_result.is_empty() {
                final_result = "stopped due to budget limits".to_string();
            }
        }

        if final_result.is_empty() {
            final_result = synthesize_summary(goal, trace);
        }

        Ok(final_result)
    }

    /// The loop's only budget gate. Step exhaustion is checked against
    /// the raw ceiling so `max_steps = 0` stops before the first
    /// planning call.
    fn should_stop(&self, trace: &Trace) -> bool {
        trace.is_exceeded_budget() || trace.len() >= trace.budget.max_steps
    }
}

/// Fallback result when the loop ends without an explicit answer
fn synthesize_summary(goal: &str, trace: &Trace) -> String {
    let mut summary = format!(
        "Executed {} steps for goal '{}' (status: {}).",
        trace.len(),
        goal,
        trace.status
    );
    for step in &trace.steps {
        let outcome = match &step.observation {
            Some(obs) if obs.is_error() => "failed",
            Some(_) => "ok",
            None => "no result",
        };
        summary.push_str(&format!(" [{}] {}: {}.", step.index, step.action.name, outcome));
    }
    summary
}

//! Execution trace and budget
//!
//! The trace is the append-only record of one goal's execution. It is
//! exclusively owned by its agent loop: no internal locking, and the
//! loop is the only mutator. Readers get it back through
//! `Agent::trace()` once the loop returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use super::types::{
    Action, Observation, ReflectionRecord, ReflectionResult, Step, TraceStatus,
};

/// Resource ceilings for one trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Maximum number of steps; the loop refuses to start when 0
    pub max_steps: usize,
    /// Maximum total LLM tokens; 0 disables the limit
    pub max_tokens: u64,
    /// Maximum wall-clock duration; zero disables the limit
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
    /// Steps consumed so far (always equals the trace's step count)
    pub used_steps: usize,
    /// Tokens consumed so far; stays 0 when the provider omits usage
    pub used_tokens: u64,
    /// When the loop started
    pub start_time: DateTime<Utc>,
}

impl Budget {
    /// Create a budget starting now
    pub fn new(max_steps: usize, max_tokens: u64, max_duration: Duration) -> Self {
        Budget {
            max_steps,
            max_tokens,
            max_duration,
            used_steps: 0,
            used_tokens: 0,
            start_time: Utc::now(),
        }
    }

    /// True if any positive limit has been reached
    pub fn is_exceeded(&self) -> bool {
        if self.max_steps > 0 && self.used_steps >= self.max_steps {
            return true;
        }
        if self.max_tokens > 0 && self.used_tokens >= self.max_tokens {
            return true;
        }
        if !self.max_duration.is_zero() {
            let elapsed = Utc::now().signed_duration_since(self.start_time);
            if elapsed.to_std().unwrap_or(Duration::ZERO) >= self.max_duration {
                return true;
            }
        }
        false
    }
}

impl Default for Budget {
    fn default() -> Self {
        Budget::new(20, 0, Duration::from_secs(300))
    }
}

/// Append-only record of one goal's execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// The natural-language goal
    pub goal: String,
    /// Ordered steps; `steps[i].index == i`
    pub steps: Vec<Step>,
    /// Reflection history in creation order
    pub reflections: Vec<ReflectionRecord>,
    /// Free-form working state (compressed history, loop annotations)
    #[serde(default)]
    pub scratch: HashMap<String, Value>,
    /// Resource accounting
    pub budget: Budget,
    /// Lifecycle state
    pub status: TraceStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Trace {
    /// Create a running trace for a goal
    pub fn new(goal: impl Into<String>, budget: Budget) -> Self {
        let now = Utc::now();
        Trace {
            goal: goal.into(),
            steps: Vec::new(),
            reflections: Vec::new(),
            scratch: HashMap::new(),
            budget,
            status: TraceStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a step for the given action and return it.
    ///
    /// Assigns the next dense index and charges one step to the budget.
    pub fn add_step(&mut self, action: Action) -> &Step {
        let step = Step {
            index: self.steps.len(),
            action,
            observation: None,
            summary: None,
            timestamp: Utc::now(),
        };
        self.steps.push(step);
        self.budget.used_steps = self.steps.len();
        self.updated_at = Utc::now();
        self.steps.last().expect("step just pushed")
    }

    /// Attach an observation to the most recent step.
    ///
    /// An observation may be attached at most once; a second attempt for
    /// the same step is ignored.
    pub fn update_observation(&mut self, observation: Observation) {
        match self.steps.last_mut() {
            Some(step) if step.observation.is_none() => {
                step.observation = Some(observation);
                self.updated_at = Utc::now();
            }
            Some(step) => {
                warn!(
                    step = step.index,
                    tool = %observation.tool,
                    "observation already attached; ignoring update"
                );
            }
            None => {
                warn!(tool = %observation.tool, "no step to attach observation to");
            }
        }
    }

    /// Record a reflection result, stamped with the current step count
    pub fn add_reflection(&mut self, result: ReflectionResult) {
        self.reflections.push(ReflectionRecord {
            step_index: self.steps.len(),
            result,
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// The most recent reflection, if any
    pub fn latest_reflection(&self) -> Option<&ReflectionRecord> {
        self.reflections.last()
    }

    /// The most recent step, if any
    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Whether any budget limit has been reached
    pub fn is_exceeded_budget(&self) -> bool {
        self.budget.is_exceeded()
    }

    /// Charge LLM token usage against the budget
    pub fn add_token_usage(&mut self, tokens: u64) {
        self.budget.used_tokens += tokens;
        self.updated_at = Utc::now();
    }

    /// Number of steps recorded
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the trace has no steps yet
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

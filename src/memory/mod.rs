//! Working-set memory for one agent loop
//!
//! In-process and non-persistent: a short-term map for annotations the
//! loop records while executing (failure reasons, successful call
//! patterns), a long-term map for context that should survive
//! compression, and the trace compressor that folds old steps into a
//! summary under `scratch["compressed_history"]`.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::agent::{Action, Trace};

/// Scratch key holding the rolling compression summary
pub const COMPRESSED_HISTORY_KEY: &str = "compressed_history";

/// Maximum key outcomes retained in a compression summary
const MAX_KEY_OUTCOMES: usize = 5;

/// Working-set cache for one loop
#[derive(Debug, Default)]
pub struct Memory {
    short_term: RwLock<HashMap<String, Value>>,
    long_term: RwLock<HashMap<String, Value>>,
}

impl Memory {
    /// Create an empty memory
    pub fn new() -> Self {
        Memory::default()
    }

    /// Record a short-term annotation
    pub fn remember_short(&self, key: impl Into<String>, value: Value) {
        self.short_term
            .write()
            .expect("memory lock poisoned")
            .insert(key.into(), value);
    }

    /// Read a short-term annotation
    pub fn recall_short(&self, key: &str) -> Option<Value> {
        self.short_term
            .read()
            .expect("memory lock poisoned")
            .get(key)
            .cloned()
    }

    /// Record a long-term annotation
    pub fn remember_long(&self, key: impl Into<String>, value: Value) {
        self.long_term
            .write()
            .expect("memory lock poisoned")
            .insert(key.into(), value);
    }

    /// Read a long-term annotation
    pub fn recall_long(&self, key: &str) -> Option<Value> {
        self.long_term
            .read()
            .expect("memory lock poisoned")
            .get(key)
            .cloned()
    }

    /// Note the outcome of an executed action.
    ///
    /// Failures append their reason under `failed_<tool>_reasons`;
    /// successes record the argument shape under
    /// `successful_<tool>_pattern`.
    pub fn note_outcome(&self, action: &Action, err_msg: Option<&str>) {
        match err_msg {
            Some(reason) => {
                let key = format!("failed_{}_reasons", action.name);
                let mut reasons = self
                    .recall_short(&key)
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                reasons.push(Value::String(reason.to_string()));
                self.remember_short(key, Value::Array(reasons));
            }
            None => {
                let key = format!("successful_{}_pattern", action.name);
                self.remember_short(
                    key,
                    serde_json::to_value(&action.args).unwrap_or(Value::Null),
                );
            }
        }
    }

    /// Compress the trace, keeping the last `keep` steps materialized.
    ///
    /// Older steps lose their observation payload and gain a one-line
    /// summary; the aggregate (action counts, success rate, key
    /// outcomes) accumulates under `scratch["compressed_history"]`.
    /// The current step and the most recent success always stay
    /// materialized.
    pub fn compress(&self, trace: &mut Trace, keep: usize) {
        if trace.steps.len() <= keep {
            return;
        }

        let mut cut = trace.steps.len() - keep;

        // Never compress away the most recent success.
        if let Some(last_success) = trace.steps.iter().rposition(|s| s.succeeded()) {
            cut = cut.min(last_success);
        }
        if cut == 0 {
            return;
        }

        // Aggregate over the steps being compressed, merged with any
        // prior compression round.
        let prior = trace
            .scratch
            .get(COMPRESSED_HISTORY_KEY)
            .cloned()
            .unwrap_or(Value::Null);
        let mut action_counts: HashMap<String, u64> = prior
            .get("action_counts")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let mut total: u64 = prior.get("total_steps").and_then(Value::as_u64).unwrap_or(0);
        let mut successes: u64 = prior.get("successes").and_then(Value::as_u64).unwrap_or(0);
        let mut key_outcomes: Vec<String> = prior
            .get("key_outcomes")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        for step in &mut trace.steps[..cut] {
            if step.observation.is_none() && step.summary.is_some() {
                // Already compressed in an earlier round.
                continue;
            }

            total += 1;
            *action_counts.entry(step.action.name.clone()).or_default() += 1;

            let line = match &step.observation {
                Some(obs) if obs.is_error() => format!(
                    "{}: failed ({})",
                    step.action.name,
                    obs.err_msg.as_deref().unwrap_or("unknown")
                ),
                Some(_) => {
                    successes += 1;
                    format!("{}: ok", step.action.name)
                }
                None => format!("{}: no result", step.action.name),
            };

            if step.succeeded() {
                key_outcomes.push(line.clone());
            }
            step.observation = None;
            step.summary = Some(line);
        }

        if key_outcomes.len() > MAX_KEY_OUTCOMES {
            key_outcomes.drain(..key_outcomes.len() - MAX_KEY_OUTCOMES);
        }

        let success_rate = if total > 0 {
            successes as f64 / total as f64
        } else {
            0.0
        };

        trace.scratch.insert(
            COMPRESSED_HISTORY_KEY.to_string(),
            serde_json::json!({
                "total_steps": total,
                "successes": successes,
                "compressed_at": Utc::now().to_rfc3339(),
                "action_counts": action_counts,
                "success_rate": success_rate,
                "key_outcomes": key_outcomes,
            }),
        );

        debug!(compressed = cut, kept = trace.steps.len() - cut, "compressed trace history");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Budget, Observation};
    use std::time::Duration;

    fn trace_with(n: usize, fail_every: usize) -> Trace {
        let mut trace = Trace::new("goal", Budget::new(0, 0, Duration::ZERO));
        for i in 0..n {
            trace.add_step(Action::new(format!("tool{}", i % 3), HashMap::new()));
            let obs = if fail_every > 0 && i % fail_every == 0 {
                Observation::failure("t", "boom", 1)
            } else {
                Observation::success("t", HashMap::new(), 1)
            };
            trace.update_observation(obs);
        }
        trace
    }

    #[test]
    fn test_note_outcome_accumulates_failures() {
        let memory = Memory::new();
        let action = Action::new("fetch", HashMap::new());

        memory.note_outcome(&action, Some("timeout"));
        memory.note_outcome(&action, Some("dns"));

        let reasons = memory.recall_short("failed_fetch_reasons").unwrap();
        assert_eq!(reasons.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_note_outcome_records_success_pattern() {
        let memory = Memory::new();
        let action = Action::new(
            "fetch",
            HashMap::from([("url".to_string(), Value::from("http://x"))]),
        );
        memory.note_outcome(&action, None);

        let pattern = memory.recall_short("successful_fetch_pattern").unwrap();
        assert_eq!(pattern["url"], Value::from("http://x"));
    }

    #[test]
    fn test_compress_keeps_tail_materialized() {
        let memory = Memory::new();
        let mut trace = trace_with(25, 0);

        memory.compress(&mut trace, 15);

        // Step count and indexes are untouched.
        assert_eq!(trace.steps.len(), 25);
        assert_eq!(trace.budget.used_steps, 25);
        for (i, step) in trace.steps.iter().enumerate() {
            assert_eq!(step.index, i);
        }

        // Prefix lost its payloads, tail kept them.
        assert!(trace.steps[..10].iter().all(|s| s.observation.is_none()));
        assert!(trace.steps[..10].iter().all(|s| s.summary.is_some()));
        assert!(trace.steps[10..].iter().all(|s| s.observation.is_some()));

        let summary = trace.scratch.get(COMPRESSED_HISTORY_KEY).unwrap();
        assert_eq!(summary["total_steps"], 10);
        assert!(summary["success_rate"].as_f64().unwrap() > 0.99);
        assert!(summary["key_outcomes"].as_array().unwrap().len() <= MAX_KEY_OUTCOMES);
    }

    #[test]
    fn test_compress_never_discards_most_recent_success() {
        let memory = Memory::new();
        let mut trace = Trace::new("goal", Budget::new(0, 0, Duration::ZERO));
        // One early success, then a long run of failures.
        trace.add_step(Action::new("good", HashMap::new()));
        trace.update_observation(Observation::success("good", HashMap::new(), 1));
        for _ in 0..30 {
            trace.add_step(Action::new("bad", HashMap::new()));
            trace.update_observation(Observation::failure("bad", "boom", 1));
        }

        memory.compress(&mut trace, 15);

        // The lone success sits before the cut line but must survive.
        assert!(trace.steps[0].observation.is_some());
    }

    #[test]
    fn test_compress_below_threshold_is_noop() {
        let memory = Memory::new();
        let mut trace = trace_with(10, 0);
        memory.compress(&mut trace, 15);
        assert!(trace.scratch.get(COMPRESSED_HISTORY_KEY).is_none());
        assert!(trace.steps.iter().all(|s| s.observation.is_some()));
    }

    #[test]
    fn test_repeated_compression_accumulates() {
        let memory = Memory::new();
        let mut trace = trace_with(25, 0);
        memory.compress(&mut trace, 15);

        for _ in 0..10 {
            trace.add_step(Action::new("late", HashMap::new()));
            trace.update_observation(Observation::success("late", HashMap::new(), 1));
        }
        memory.compress(&mut trace, 15);

        let summary = trace.scratch.get(COMPRESSED_HISTORY_KEY).unwrap();
        assert_eq!(summary["total_steps"], 20);
    }
}

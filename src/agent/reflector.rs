//! Reflection phase - periodic critique of the trace
//!
//! Two modes: LLM reflection builds a statistics-and-patterns prompt
//! and asks the model for a structured verdict; quick reflection is a
//! heuristic escape hatch used when the LLM is unavailable.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::prompts::strip_code_fences;
use super::trace::Trace;
use super::types::ReflectionResult;
use crate::error::Result;
use crate::llm::{ChatModel, ChatRequest, Message, Usage};

/// Trailing failures that trigger a plan revision
const FAILURE_STREAK: usize = 3;

/// Uses of one action considered "repeated"
const REPEATED_USE_THRESHOLD: usize = 3;

/// A reflection result plus the token usage of the reflection call
#[derive(Debug)]
pub struct ReflectOutcome {
    /// The verdict
    pub result: ReflectionResult,
    /// Provider-reported usage; `None` for quick reflection
    pub usage: Option<Usage>,
}

/// Critiques a trace and decides continue / revise / stop
pub struct Reflector {
    model: Arc<dyn ChatModel>,
}

impl Reflector {
    /// Create a reflector over the given chat model
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Reflector { model }
    }

    /// Run LLM reflection, falling back to the quick heuristic when
    /// the call itself fails. Never errors: a reflection problem must
    /// not kill a loop the heuristics can still steer.
    pub async fn reflect(&self, trace: &Trace) -> ReflectOutcome {
        match self.reflect_with_llm(trace).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "LLM reflection failed, using quick reflection");
                ReflectOutcome {
                    result: Self::quick_reflect(trace),
                    usage: None,
                }
            }
        }
    }

    async fn reflect_with_llm(&self, trace: &Trace) -> Result<ReflectOutcome> {
        let prompt = Self::build_prompt(trace);

        let request = ChatRequest::new(
            "",
            vec![
                Message::system(
                    "You review an agent's execution trace and decide whether to \
                     continue, revise the plan, or stop. Respond ONLY with JSON: \
                     {\"revise_plan\": bool, \"next_action_hint\": string, \
                     \"should_stop\": bool, \"reason\": string, \"confidence\": number}",
                ),
                Message::user(prompt),
            ],
        )
        .with_temperature(0.2);

        let response = self.model.chat(request).await?;
        let usage = response.usage;
        let content = response.content().unwrap_or("").trim().to_string();

        let result = match serde_json::from_str::<ReflectionResult>(strip_code_fences(&content)) {
            Ok(mut result) => {
                result.confidence = result.confidence.clamp(0.0, 1.0);
                result
            }
            Err(e) => {
                // Unparseable but successful response: keep the text as
                // a hint and continue with low confidence.
                debug!(error = %e, "reflection response was not valid JSON");
                ReflectionResult {
                    revise_plan: false,
                    next_action_hint: content,
                    should_stop: false,
                    reason: "reflection response unparseable".to_string(),
                    confidence: 0.2,
                }
            }
        };

        Ok(ReflectOutcome {
            result,
            usage,
        })
    }

    /// Heuristic reflection: stop on exhausted budget, revise on a
    /// failure streak, else continue.
    pub fn quick_reflect(trace: &Trace) -> ReflectionResult {
        if trace.is_exceeded_budget() {
            return ReflectionResult::halt("budget exceeded");
        }
        if trailing_failures(trace) >= FAILURE_STREAK {
            return ReflectionResult::revise(
                "the last attempts all failed; try a different tool or arguments",
                format!("last {} steps failed", FAILURE_STREAK),
            );
        }
        ReflectionResult::proceed("progress looks normal", 0.6)
    }

    fn build_prompt(trace: &Trace) -> String {
        let total = trace.steps.len();
        let observed = trace
            .steps
            .iter()
            .filter(|s| s.observation.is_some())
            .count();
        let successes = trace.steps.iter().filter(|s| s.succeeded()).count();
        let success_rate = if observed > 0 {
            successes as f64 / observed as f64
        } else {
            0.0
        };

        let mut prompt = format!(
            "GOAL: {}\n\nTotal steps: {}\nSuccess rate: {:.2}\n",
            trace.goal, total, success_rate
        );

        let patterns = detect_patterns(trace);
        if !patterns.is_empty() {
            prompt.push_str("\nDETECTED PATTERNS:\n");
            for pattern in &patterns {
                prompt.push_str(&format!("- {}\n", pattern));
            }
        }

        if let Some(compressed) = trace.scratch.get("compressed_history") {
            prompt.push_str(&format!(
                "\nCOMPRESSED EARLIER HISTORY: {}\n",
                serde_json::to_string(compressed).unwrap_or_default()
            ));
        }

        prompt.push_str("\nRECENT STEPS:\n");
        let tail_start = total.saturating_sub(5);
        for step in &trace.steps[tail_start..] {
            let outcome = match &step.observation {
                Some(obs) if obs.is_error() => {
                    format!("FAILED: {}", obs.err_msg.as_deref().unwrap_or("unknown"))
                }
                Some(_) => "ok".to_string(),
                None => "pending".to_string(),
            };
            prompt.push_str(&format!("[{}] {} -> {}\n", step.index, step.action.name, outcome));
        }

        prompt
    }
}

/// Number of consecutive failures at the tail of the trace
fn trailing_failures(trace: &Trace) -> usize {
    trace
        .steps
        .iter()
        .rev()
        .take_while(|s| s.failed())
        .count()
}

/// Surface the heuristic patterns the reflection prompt mentions
fn detect_patterns(trace: &Trace) -> Vec<String> {
    let mut patterns = Vec::new();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for step in &trace.steps {
        *counts.entry(step.action.name.as_str()).or_default() += 1;
    }
    let mut repeated: Vec<(&str, usize)> = counts
        .into_iter()
        .filter(|(_, n)| *n > REPEATED_USE_THRESHOLD)
        .collect();
    repeated.sort();
    for (name, n) in repeated {
        patterns.push(format!("repeated use of '{}' ({} times)", name, n));
    }

    // A length-2 cycle in the last 4 actions (a, b, a, b).
    if trace.steps.len() >= 4 {
        let tail: Vec<&str> = trace.steps[trace.steps.len() - 4..]
            .iter()
            .map(|s| s.action.name.as_str())
            .collect();
        if tail[0] == tail[2] && tail[1] == tail[3] && tail[0] != tail[1] {
            patterns.push(format!(
                "potential loop: alternating '{}' and '{}'",
                tail[0], tail[1]
            ));
        }
    }

    let failures = trailing_failures(trace);
    if failures >= FAILURE_STREAK {
        patterns.push(format!("{} consecutive failures", failures));
    }

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::trace::Budget;
    use crate::agent::types::{Action, Observation};
    use crate::llm::MockChatModel;
    use std::time::Duration;

    fn trace_with_steps(outcomes: &[(&str, bool)]) -> Trace {
        let mut trace = Trace::new("goal", Budget::new(100, 0, Duration::ZERO));
        for (name, ok) in outcomes {
            trace.add_step(Action::new(*name, HashMap::new()));
            let obs = if *ok {
                Observation::success(*name, HashMap::new(), 1)
            } else {
                Observation::failure(*name, "failed", 1)
            };
            trace.update_observation(obs);
        }
        trace
    }

    #[test]
    fn test_quick_reflect_stops_on_budget() {
        let mut trace = Trace::new("goal", Budget::new(1, 0, Duration::ZERO));
        trace.add_step(Action::new("echo", HashMap::new()));
        let result = Reflector::quick_reflect(&trace);
        assert!(result.should_stop);
    }

    #[test]
    fn test_quick_reflect_revises_on_failure_streak() {
        let trace = trace_with_steps(&[("a", true), ("b", false), ("b", false), ("b", false)]);
        let result = Reflector::quick_reflect(&trace);
        assert!(result.revise_plan);
        assert!(!result.should_stop);
    }

    #[test]
    fn test_quick_reflect_continues_otherwise() {
        let trace = trace_with_steps(&[("a", true), ("b", true)]);
        let result = Reflector::quick_reflect(&trace);
        assert!(!result.revise_plan);
        assert!(!result.should_stop);
    }

    #[test]
    fn test_detect_repeated_use() {
        let trace = trace_with_steps(&[("a", true); 5]);
        let patterns = detect_patterns(&trace);
        assert!(patterns.iter().any(|p| p.contains("repeated use of 'a'")));
    }

    #[test]
    fn test_detect_two_cycle() {
        let trace = trace_with_steps(&[("a", true), ("b", true), ("a", true), ("b", true)]);
        let patterns = detect_patterns(&trace);
        assert!(patterns.iter().any(|p| p.contains("potential loop")));
    }

    #[test]
    fn test_no_cycle_for_same_action() {
        let trace = trace_with_steps(&[("a", true); 4]);
        let patterns = detect_patterns(&trace);
        assert!(!patterns.iter().any(|p| p.contains("potential loop")));
    }

    #[tokio::test]
    async fn test_llm_reflection_parses_json() {
        let mock = Arc::new(MockChatModel::new(vec![MockChatModel::content_response(
            r#"{"revise_plan": true, "next_action_hint": "try the other index", "should_stop": false, "reason": "stuck", "confidence": 0.75}"#,
        )]));
        let reflector = Reflector::new(mock);
        let trace = trace_with_steps(&[("a", false)]);

        let outcome = reflector.reflect(&trace).await;
        assert!(outcome.result.revise_plan);
        assert_eq!(outcome.result.next_action_hint, "try the other index");
        assert!((outcome.result.confidence - 0.75).abs() < 1e-9);
        assert!(outcome.usage.is_some());
    }

    #[tokio::test]
    async fn test_llm_reflection_strips_fences() {
        let mock = Arc::new(MockChatModel::new(vec![MockChatModel::content_response(
            "```json\n{\"should_stop\": true, \"reason\": \"answered\", \"confidence\": 1.5}\n```",
        )]));
        let reflector = Reflector::new(mock);
        let trace = trace_with_steps(&[("a", true)]);

        let outcome = reflector.reflect(&trace).await;
        assert!(outcome.result.should_stop);
        // Out-of-range confidence is clamped.
        assert!((outcome.result.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unparseable_response_becomes_low_confidence_continue() {
        let mock = Arc::new(MockChatModel::new(vec![MockChatModel::content_response(
            "Things are going fine, keep at it.",
        )]));
        let reflector = Reflector::new(mock);
        let trace = trace_with_steps(&[("a", true)]);

        let outcome = reflector.reflect(&trace).await;
        assert!(!outcome.result.should_stop);
        assert!(!outcome.result.revise_plan);
        assert_eq!(outcome.result.next_action_hint, "Things are going fine, keep at it.");
        assert!(outcome.result.confidence <= 0.2);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_quick() {
        // Empty mock: the call itself errors.
        let reflector = Reflector::new(Arc::new(MockChatModel::new(vec![])));
        let trace = trace_with_steps(&[("b", false), ("b", false), ("b", false)]);

        let outcome = reflector.reflect(&trace).await;
        assert!(outcome.result.revise_plan);
        assert!(outcome.usage.is_none());
    }
}

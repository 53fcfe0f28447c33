//! Prompt assembly for the planner and reflector
//!
//! Three planner sections - system rule, trace context, tool listing -
//! concatenate into a single user message. Long step outputs are
//! truncated, except the most recent successful output, which rides
//! along in full so the model never loses the answer to truncation.

use crate::agent::trace::Trace;
use crate::agent::types::{ACTION_DIRECT_ANSWER, ACTION_STOP};
use crate::tools::ToolInfo;

/// Maximum characters of a step result shown in the context section
pub const RESULT_TRUNCATE_LEN: usize = 200;

/// The planner's standing instructions
pub const PLANNER_SYSTEM_PROMPT: &str = "\
You are the planning module of an autonomous agent. On every turn you \
choose exactly one next action: call a tool, answer directly, or stop.

HIGHEST PRIORITY RULE: if the execution history already contains \
successful tool output that answers the goal, choose direct_answer \
immediately and put the answer in the `answer` argument. Do not call \
more tools to re-verify what you already know.

Decide using this grammar:
- To call a tool, emit a function call with its arguments.
- To finish with an answer, call direct_answer(answer).
- To give up or finish without an answer, call stop(reason).

If you respond with text instead of a function call, respond ONLY with \
a JSON object: {\"type\": \"USE_TOOL\" | \"DIRECT_ANSWER\" | \"STOP\" | \
\"ASK_CLARIFICATION\", \"content\": \"...\", \"reason\": \"...\", \
\"action\": {\"name\": \"...\", \"args\": {...}}}.";

/// Banner introducing the untruncated latest tool output
pub const LATEST_DATA_BANNER: &str = "LATEST TOOL DATA TO ANALYZE";

/// Truncate a result string for display in the step listing
pub fn truncate_result(s: &str) -> String {
    if s.chars().count() <= RESULT_TRUNCATE_LEN {
        s.to_string()
    } else {
        let cut: String = s.chars().take(RESULT_TRUNCATE_LEN).collect();
        format!("{}...", cut)
    }
}

/// Strip Markdown code fences from LLM output before JSON parsing
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Build the context section: goal, prior steps, latest reflection,
/// budget usage, and the full latest successful output when present.
pub fn context_prompt(goal: &str, trace: &Trace) -> String {
    let mut prompt = format!("GOAL: {}\n", goal);

    if let Some(compressed) = trace.scratch.get("compressed_history") {
        prompt.push_str(&format!(
            "\nCOMPRESSED EARLIER HISTORY: {}\n",
            serde_json::to_string(compressed).unwrap_or_default()
        ));
    }

    if trace.steps.is_empty() {
        prompt.push_str("\nNo steps executed yet.\n");
    } else {
        prompt.push_str("\nEXECUTION HISTORY:\n");
        for step in &trace.steps {
            let reason = step.action.reason.as_deref().unwrap_or("-");
            let outcome = match &step.observation {
                Some(obs) if obs.is_error() => format!(
                    "ERROR: {}",
                    truncate_result(obs.err_msg.as_deref().unwrap_or("unknown"))
                ),
                Some(obs) => {
                    truncate_result(&serde_json::to_string(&obs.output).unwrap_or_default())
                }
                None => "(pending)".to_string(),
            };
            prompt.push_str(&format!(
                "[{}] {} (reason: {}) -> {}\n",
                step.index, step.action.name, reason, outcome
            ));
        }
    }

    if let Some(record) = trace.latest_reflection() {
        prompt.push_str(&format!(
            "\nLATEST REFLECTION (after step {}): revise_plan={}, hint: {}\n",
            record.step_index, record.result.revise_plan, record.result.next_action_hint
        ));
    }

    prompt.push_str(&format!(
        "\nBUDGET: {}/{} steps used\n",
        trace.budget.used_steps, trace.budget.max_steps
    ));

    // The latest successful output rides along untruncated so the model
    // can extract a final answer from it.
    if let Some(step) = trace.last_step() {
        if let Some(obs) = &step.observation {
            if !obs.is_error() && !obs.output.is_empty() {
                prompt.push_str(&format!(
                    "\n{}:\n{}\n",
                    LATEST_DATA_BANNER,
                    serde_json::to_string_pretty(&obs.output).unwrap_or_default()
                ));
            }
        }
    }

    prompt
}

/// Build the tools section: every registered tool plus the sentinels
pub fn tools_prompt(manifest: &[ToolInfo]) -> String {
    let mut prompt = String::from("AVAILABLE TOOLS:\n");
    for info in manifest {
        prompt.push_str(&format!("- {}: {}\n", info.name, info.description));
    }
    prompt.push_str(&format!(
        "- {}: Finish with the final answer (args: answer)\n",
        ACTION_DIRECT_ANSWER
    ));
    prompt.push_str(&format!(
        "- {}: Stop without an answer (args: reason)\n",
        ACTION_STOP
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::trace::Budget;
    use crate::agent::types::{Action, Observation};
    use std::collections::HashMap;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_truncate_result_caps_length() {
        let long = "x".repeat(500);
        let truncated = truncate_result(&long);
        assert_eq!(truncated.chars().count(), RESULT_TRUNCATE_LEN + 3);
        assert!(truncated.ends_with("..."));

        assert_eq!(truncate_result("short"), "short");
    }

    #[test]
    fn test_context_includes_history_and_budget() {
        let mut trace = Trace::new(
            "find the answer",
            Budget::new(10, 0, std::time::Duration::ZERO),
        );
        trace.add_step(Action::new("search", HashMap::new()).with_reason("look it up"));
        trace.update_observation(Observation::failure("search", "network down", 5));

        let prompt = context_prompt("find the answer", &trace);
        assert!(prompt.contains("GOAL: find the answer"));
        assert!(prompt.contains("[0] search (reason: look it up) -> ERROR: network down"));
        assert!(prompt.contains("1/10 steps used"));
        // A failed last step gets no full-data banner.
        assert!(!prompt.contains(LATEST_DATA_BANNER));
    }

    #[test]
    fn test_latest_successful_output_included_in_full() {
        let mut trace = Trace::new("g", Budget::default());
        trace.add_step(Action::new("fetch", HashMap::new()));
        let big = "y".repeat(1000);
        trace.update_observation(Observation::success(
            "fetch",
            HashMap::from([("data".to_string(), serde_json::json!(big.clone()))]),
            5,
        ));

        let prompt = context_prompt("g", &trace);
        assert!(prompt.contains(LATEST_DATA_BANNER));
        // Full data present even though the listing line is truncated.
        assert!(prompt.contains(&big));
    }

    #[test]
    fn test_tools_prompt_always_lists_sentinels() {
        let prompt = tools_prompt(&[]);
        assert!(prompt.contains("direct_answer"));
        assert!(prompt.contains("stop"));
    }
}

//! Planning phase - chooses the next action
//!
//! Builds a three-part prompt from the goal, the trace, and the
//! registry manifest, calls the LLM with the tools also declared as
//! structured function definitions, and interprets the response in
//! strict precedence order: structured tool call, decision object,
//! raw content, planning error.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::prompts;
use super::trace::Trace;
use super::types::Action;
use crate::error::{Error, Result};
use crate::llm::{
    AssistantToolCall, ChatModel, ChatRequest, Message, ToolDefinition, Usage,
};
use crate::tools::ToolRegistry;

/// Planner sampling temperature; low for decision stability
const PLANNER_TEMPERATURE: f32 = 0.1;

/// A planned action plus the token usage of the planning call
#[derive(Debug)]
pub struct PlanOutcome {
    /// The chosen next action
    pub action: Action,
    /// Provider-reported usage, when available
    pub usage: Option<Usage>,
}

/// Text-mode decision object the model may return instead of a
/// function call
#[derive(Debug, Deserialize)]
struct Decision {
    #[serde(rename = "type")]
    decision_type: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    action: Option<DecisionAction>,
}

#[derive(Debug, Deserialize)]
struct DecisionAction {
    name: String,
    #[serde(default)]
    args: HashMap<String, Value>,
}

/// Stateless planner; all context lives in the trace
pub struct Planner {
    model: Arc<dyn ChatModel>,
}

impl Planner {
    /// Create a planner over the given chat model
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Planner { model }
    }

    /// Choose the next action for a goal given the current trace and
    /// the registry's tool population.
    pub async fn plan(
        &self,
        goal: &str,
        trace: &Trace,
        registry: &ToolRegistry,
    ) -> Result<PlanOutcome> {
        let manifest = registry.manifest();

        // All three sections ride in one user message; the tools are
        // additionally declared as structured function definitions.
        let user_prompt = format!(
            "{}\n\n{}\n\n{}",
            prompts::PLANNER_SYSTEM_PROMPT,
            prompts::context_prompt(goal, trace),
            prompts::tools_prompt(&manifest)
        );

        let mut definitions = registry.definitions();
        definitions.push(sentinel_direct_answer());
        definitions.push(sentinel_stop());

        let request = ChatRequest::new("", vec![Message::user(user_prompt)])
            .with_tools(definitions)
            .with_temperature(PLANNER_TEMPERATURE);

        let response = self
            .model
            .chat(request)
            .await
            .map_err(|e| Error::Planning(format!("LLM call failed: {}", e)))?;
        let usage = response.usage;

        let action = self.interpret(&response)?;
        debug!(action = %action.name, "planned next action");

        Ok(PlanOutcome { action, usage })
    }

    /// Response interpretation, in precedence order
    fn interpret(&self, response: &crate::llm::ChatResponse) -> Result<Action> {
        // 1. A structured tool call wins outright.
        if let Some(calls) = response.tool_calls() {
            if let Some(call) = calls.first() {
                return Ok(action_from_tool_call(call));
            }
        }

        let content = response.content().unwrap_or("").trim();

        // 2. Content that parses as a decision object.
        let stripped = prompts::strip_code_fences(content);
        if let Ok(decision) = serde_json::from_str::<Decision>(stripped) {
            return Ok(action_from_decision(decision));
        }

        // 3. Any other non-empty content is taken as the answer.
        if !content.is_empty() {
            return Ok(Action::direct_answer(content, "model answered in free text"));
        }

        // 4. Nothing extractable.
        Err(Error::Planning(
            "LLM response carried no tool call, decision object, or content".to_string(),
        ))
    }
}

fn sentinel_direct_answer() -> ToolDefinition {
    ToolDefinition::function(
        "direct_answer",
        "Finish the goal with the final answer",
        serde_json::json!({
            "type": "object",
            "properties": {"answer": {"type": "string", "description": "The final answer"}},
            "required": ["answer"]
        }),
    )
}

fn sentinel_stop() -> ToolDefinition {
    ToolDefinition::function(
        "stop",
        "Stop working on the goal without an answer",
        serde_json::json!({
            "type": "object",
            "properties": {"reason": {"type": "string", "description": "Why execution should stop"}},
            "required": ["reason"]
        }),
    )
}

fn action_from_tool_call(call: &AssistantToolCall) -> Action {
    let args: HashMap<String, Value> = match serde_json::from_str(&call.function.arguments) {
        Ok(args) => args,
        Err(e) => {
            warn!(
                tool = %call.function.name,
                error = %e,
                "failed to parse tool call arguments, using empty args"
            );
            HashMap::new()
        }
    };
    Action::new(&call.function.name, args)
}

fn action_from_decision(decision: Decision) -> Action {
    let content = decision.content.unwrap_or_default();
    let reason = decision.reason.unwrap_or_default();

    match decision.decision_type.as_str() {
        "DIRECT_ANSWER" => Action::direct_answer(content, reason),
        "STOP" => Action::stop(if reason.is_empty() { content } else { reason }),
        // A clarification question is itself the best answer we can
        // return to the caller.
        "ASK_CLARIFICATION" => Action::direct_answer(content, "needs clarification"),
        "USE_TOOL" => match decision.action {
            Some(embedded) => Action::new(embedded.name, embedded.args).with_reason(reason),
            None => Action::stop("planner chose USE_TOOL but specified no tool"),
        },
        other => {
            warn!(decision_type = other, "unknown decision type, treating content as answer");
            Action::direct_answer(content, reason)
        }
    }
}

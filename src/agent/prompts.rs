//! Prompt templates and engineering
//!
//! Hosts the generic Handlebars-backed [`PromptTemplate`]/[`PromptBuilder`]
//! helpers plus the free functions that assemble the orchestrator's
//! model-facing prompts: plan generation, evaluation, step repair, and
//! the deep-search agent/graph-evolution prompts.

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::domain::{DagAgentNode, ExecutionLog, Plan, ToolDescriptor};
use crate::error::{Error, Result};

/// A prompt template using Handlebars syntax
pub struct PromptTemplate {
    /// Template name
    name: String,
    /// Handlebars registry
    registry: Handlebars<'static>,
}

impl PromptTemplate {
    /// Create a new prompt template
    pub fn new(name: impl Into<String>, template: &str) -> Result<Self> {
        let name = name.into();
        let mut registry = Handlebars::new();

        registry
            .register_template_string(&name, template)
            .map_err(|e| Error::Internal(format!("Invalid template: {}", e)))?;

        Ok(PromptTemplate { name, registry })
    }

    /// Render the template with given data
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        self.registry
            .render(&self.name, data)
            .map_err(|e| Error::Internal(format!("Template render error: {}", e)))
    }
}

/// Prompt builder for constructing complex prompts
#[derive(Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        PromptBuilder { parts: Vec::new() }
    }

    /// Add a section with a header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.parts.push(format!("## {}\n{}", header, content));
        self
    }

    /// Add raw text
    pub fn text(mut self, text: &str) -> Self {
        self.parts.push(text.to_string());
        self
    }

    /// Add a code block
    pub fn code(mut self, language: &str, code: &str) -> Self {
        self.parts.push(format!("```{}\n{}\n```", language, code));
        self
    }

    /// Add a list of items
    pub fn list(mut self, items: &[&str]) -> Self {
        let list = items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n");
        self.parts.push(list);
        self
    }

    /// Add a numbered list
    pub fn numbered_list(mut self, items: &[&str]) -> Self {
        let list = items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {}", i + 1, item))
            .collect::<Vec<_>>()
            .join("\n");
        self.parts.push(list);
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        self.parts.join("\n\n")
    }
}

// ============================================================================
// Plan/Evaluate Loop prompts (§4.5)
// ============================================================================

/// System instructions shared by the planner and repair prompts: the JSON
/// shape a step must follow so the validator (§4.3) accepts it.
const STEP_AUTHORING_RULES: &str = "\
Each step is a single top-level callable written in the step-scripting \
language. Step 0 takes no required parameters. Every later step takes \
exactly one parameter, `previous_output`, and must open with \
`let updated_dict = previous_output.copy();` before reading or adding \
keys. Only import modules listed in the chosen tool's allowed_libraries \
or the safe standard modules (math, string, array, timestamp). Do not \
nest function definitions more than one level deep. Never call eval, \
exec, shell_exec, Command, or deserialize_unsafe.";

/// Build the prompt that asks the model to produce a [`Plan`] as JSON.
pub fn planner_prompt(goal: &str, history_summary: &str, catalog: &[ToolDescriptor]) -> String {
    let tools_json = json!(catalog.iter().map(|t| json!({
        "name": t.name,
        "allowed_libraries": t.allowed_libraries,
        "instructions": t.instructions,
        "code_example": t.code_example,
        "use_exact_example": t.use_exact_example,
    })).collect::<Vec<_>>());

    PromptBuilder::new()
        .section(
            "Task",
            &format!("Produce a plan that accomplishes the following request:\n{goal}"),
        )
        .section("Conversation so far", history_summary)
        .section("Available tools", &tools_json.to_string())
        .section("Step authoring rules", STEP_AUTHORING_RULES)
        .section(
            "Output format",
            "Respond with exactly one JSON object matching: \
             {\"main_task\": string, \"main_task_thought\": string, \"steps\": \
             [{\"name\": string, \"chosen_tool\": string, \"input_from\": string, \
             \"description\": string, \"imports\": [string], \"code\": string, \
             \"thought\": string}]}. No prose outside the JSON object.",
        )
        .build()
}

/// Parse a model response into a [`Plan`], tolerating a surrounding code fence.
pub fn parse_plan_response(response: &str) -> Result<Plan> {
    let trimmed = strip_code_fence(response);
    serde_json::from_str(trimmed)
        .map_err(|e| Error::PlanShape(format!("could not parse plan JSON: {e}")))
}

/// Outcome the evaluator prompt asks the model to return.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct EvaluationOutcome {
    pub satisfactory: bool,
    pub thoughts: String,
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default)]
    pub new_json_plan: Option<Plan>,
    #[serde(default)]
    pub max_iterations_reached: bool,
}

/// Build the evaluator prompt: root request, current plan, iteration
/// counter and ceiling, and the trimmed execution log.
pub fn evaluator_prompt(
    root_request: &str,
    plan: &Plan,
    iteration: u32,
    max_iterations: u32,
    log: &ExecutionLog,
) -> String {
    let plan_json = serde_json::to_string(plan).unwrap_or_default();
    PromptBuilder::new()
        .section("Original request", root_request)
        .section("Current plan", &plan_json)
        .text(&format!(
            "Iteration {iteration} of a maximum of {max_iterations}."
        ))
        .section("Execution log", &log.rendered_for_evaluator())
        .section(
            "Output format",
            "Respond with exactly one JSON object matching: \
             {\"satisfactory\": bool, \"thoughts\": string, \
             \"final_answer\": string | null, \"new_json_plan\": <Plan> | null, \
             \"max_iterations_reached\": bool}. Set new_json_plan only when \
             satisfactory is false. No prose outside the JSON object.",
        )
        .build()
}

pub fn parse_evaluation_response(response: &str) -> Result<EvaluationOutcome> {
    let trimmed = strip_code_fence(response);
    serde_json::from_str(trimmed)
        .map_err(|e| Error::PlanShape(format!("could not parse evaluation JSON: {e}")))
}

/// A repaired step as returned by the repair prompt.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RepairedStep {
    pub reasoning: String,
    pub corrected_subtask: crate::domain::Step,
}

/// Build the repair prompt: root request, current plan, the failing step,
/// and the accumulated error text (validation or execution).
pub fn repair_prompt(root_request: &str, plan: &Plan, failing_step: &crate::domain::Step, errors: &str) -> String {
    let plan_json = serde_json::to_string(plan).unwrap_or_default();
    let step_json = serde_json::to_string(failing_step).unwrap_or_default();
    PromptBuilder::new()
        .section("Original request", root_request)
        .section("Current plan", &plan_json)
        .section("Failing step", &step_json)
        .section("Errors", errors)
        .section("Step authoring rules", STEP_AUTHORING_RULES)
        .section(
            "Output format",
            "Respond with exactly one JSON object matching: \
             {\"reasoning\": string, \"corrected_subtask\": <Step>}. \
             No prose outside the JSON object.",
        )
        .build()
}

pub fn parse_repair_response(response: &str) -> Result<RepairedStep> {
    let trimmed = strip_code_fence(response);
    serde_json::from_str(trimmed)
        .map_err(|e| Error::PlanShape(format!("could not parse repair JSON: {e}")))
}

// ============================================================================
// Deep-search planner prompts (§4.6)
// ============================================================================

/// Build the DAG-generation prompt, constrained by a depth-derived minimum
/// agent count.
pub fn dag_planner_prompt(goal: &str, min_agents: u32, interactive: bool) -> String {
    PromptBuilder::new()
        .section(
            "Task",
            &format!(
                "Design a DAG of at least {min_agents} sub-agents that together \
                 research and answer:\n{goal}"
            ),
        )
        .text(if interactive {
            "Sub-agents may ask the user clarifying questions via user_questions."
        } else {
            "This run is non-interactive: leave user_questions empty on every agent."
        })
        .section(
            "Output format",
            "Respond with a JSON array of agents, each matching: \
             {\"nickname\": string, \"llm_prompt\": string, \
             \"input_from_agents\": [string] (at most 2, each naming an earlier \
             functional agent), \"user_questions\": [string], \
             \"external_search_query\": string | null, \
             \"output_type\": \"functional\" | \"final\"}. No prose outside the JSON array.",
        )
        .build()
}

pub fn parse_dag_response(response: &str) -> Result<Vec<DagAgentNode>> {
    let trimmed = strip_code_fence(response);
    serde_json::from_str(trimmed)
        .map_err(|e| Error::PlanShape(format!("could not parse DAG JSON: {e}")))
}

/// Build a sub-agent's execution prompt from its own instructions plus the
/// observations of its (functional) predecessors.
pub fn sub_agent_prompt(node: &DagAgentNode, predecessor_observations: &[(&str, &str)], search_results: Option<&str>) -> String {
    let mut builder = PromptBuilder::new().section("Instructions", &node.llm_prompt);
    for (nickname, observation) in predecessor_observations {
        builder = builder.section(&format!("Observation from {nickname}"), observation);
    }
    if let Some(results) = search_results {
        builder = builder.section("External search results", results);
    }
    if !node.user_answers.is_empty() {
        builder = builder.section("User answers", &node.user_answers.join("\n"));
    }
    builder.build()
}

/// One materialized node emitted by the graph-evolution prompt, prior to
/// edge-endpoint resolution (see [`crate::domain::EdgeEndpointKind`]).
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct GraphEvolutionNode {
    pub name: String,
    pub entity_type: String,
    pub concept: String,
    pub thought: String,
    #[serde(default)]
    pub edge_to: Option<String>,
    #[serde(default)]
    pub edge_relation: Option<String>,
    #[serde(default)]
    pub edge_endpoint_kind: Option<crate::domain::EdgeEndpointKind>,
}

pub fn graph_evolution_prompt(agent_nickname: &str, observation: &str, existing_node_names: &[String]) -> String {
    PromptBuilder::new()
        .section("Agent", agent_nickname)
        .section("Observation", observation)
        .section("Existing graph node names", &existing_node_names.join(", "))
        .section(
            "Output format",
            "Respond with a JSON array of new knowledge-graph nodes, each matching: \
             {\"name\": string, \"entity_type\": string, \"concept\": string, \
             \"thought\": string, \"edge_to\": string | null, \
             \"edge_relation\": string | null, \
             \"edge_endpoint_kind\": \"new\" | \"existing\" | null}. \
             No prose outside the JSON array.",
        )
        .build()
}

pub fn parse_graph_evolution_response(response: &str) -> Result<Vec<GraphEvolutionNode>> {
    let trimmed = strip_code_fence(response);
    serde_json::from_str(trimmed)
        .map_err(|e| Error::PlanShape(format!("could not parse graph-evolution JSON: {e}")))
}

// ============================================================================
// RL meta-selector prompts (§4.8)
// ============================================================================

pub fn feature_extraction_prompt(query: &str) -> String {
    PromptBuilder::new()
        .section("Query", query)
        .section(
            "Output format",
            "Respond with exactly one JSON object matching: \
             {\"question_type\": \"factual\"|\"comparative\"|\"procedural\"|\"exploratory\"|\"opinion\", \
             \"domain\": \"general\"|\"technical\"|\"medical\"|\"legal\"|\"financial\"|\"scientific\", \
             \"has_entities\": bool, \"complexity\": number, \"ambiguity\": number, \
             \"specificity\": number, \"formality\": number, \"urgency\": number}. \
             Scalars are in [0,1]. No prose outside the JSON object.",
        )
        .build()
}

pub fn strategy_suggestion_prompt(query: &str, state: &crate::domain::RlState) -> String {
    PromptBuilder::new()
        .section("Query", query)
        .section("Extracted features", &serde_json::to_string(state).unwrap_or_default())
        .section(
            "Output format",
            "Respond with a single integer 0, 1, or 2 naming the retrieval \
             strategy to use. No other text.",
        )
        .build()
}

// ============================================================================
// Interactive browser agent prompts (§4.9)
// ============================================================================

/// Build the per-turn prompt for the vision model driving a browser
/// session. The current screenshot is attached separately via
/// [`crate::core::provider::GenerationOptions::image`]; this text carries
/// the goal and the running action history.
pub fn browser_turn_prompt(goal: &str, action_history: &[String]) -> String {
    let mut builder = PromptBuilder::new().section("Goal", goal);
    if !action_history.is_empty() {
        builder = builder.section("Actions taken so far", &action_history.join("\n"));
    }
    builder
        .section(
            "Output format",
            "Respond with exactly one JSON object. Either \
             {\"action\": {\"type\": \"click\"|\"double_click\", \"x\": number, \"y\": number}}, \
             {\"action\": {\"type\": \"scroll\", \"dx\": number, \"dy\": number}}, \
             {\"action\": {\"type\": \"keypress\", \"key\": string}}, \
             {\"action\": {\"type\": \"type\", \"text\": string}}, \
             {\"action\": {\"type\": \"wait\", \"ms\": number}}, \
             or {\"message\": string} when you need to ask the user something \
             before continuing. No prose outside the JSON object.",
        )
        .build()
}

/// One turn of the vision model's reply: either a browser action to apply,
/// or a message to forward to the user before continuing.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum BrowserTurn {
    Action { action: crate::domain::BrowserAction },
    Message { message: String },
}

pub fn parse_browser_turn(response: &str) -> Result<BrowserTurn> {
    let trimmed = strip_code_fence(response);
    serde_json::from_str(trimmed)
        .map_err(|e| Error::PlanShape(format!("could not parse browser turn JSON: {e}")))
}

/// Classify a user's follow-up reply, during a suspended browser session,
/// as either ending the session or continuing it with that reply folded
/// back in as the next instruction.
pub fn browser_followup_classification_prompt(reply: &str) -> String {
    PromptBuilder::new()
        .section("User reply", reply)
        .section(
            "Output format",
            "Respond with exactly one word: \"stop\" if the user is ending the \
             session, or \"continue\" if the reply is a further instruction.",
        )
        .build()
}

fn strip_code_fence(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_template() {
        let template = PromptTemplate::new("test", "Hello, {{name}}!").unwrap();
        let result = template.render(&json!({"name": "World"})).unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn test_prompt_builder() {
        let prompt = PromptBuilder::new()
            .section("Introduction", "This is a test")
            .code("python", "print('hello')")
            .list(&["Item 1", "Item 2"])
            .build();

        assert!(prompt.contains("## Introduction"));
        assert!(prompt.contains("```python"));
        assert!(prompt.contains("- Item 1"));
    }

    #[test]
    fn strips_json_code_fence() {
        let response = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_code_fence(response), "{\"a\":1}");
    }

    #[test]
    fn parses_plan_json_with_fence() {
        let response = "```json\n{\"main_task\":\"t\",\"main_task_thought\":\"\",\"steps\":[]}\n```";
        let plan = parse_plan_response(response).unwrap();
        assert_eq!(plan.main_task, "t");
    }

    #[test]
    fn rejects_malformed_evaluation_json() {
        assert!(parse_evaluation_response("not json").is_err());
    }

    #[test]
    fn parses_browser_click_action() {
        let response = r#"{"action": {"type": "click", "x": 12.0, "y": 34.0}}"#;
        let turn = parse_browser_turn(response).unwrap();
        match turn {
            BrowserTurn::Action { action } => {
                assert_eq!(action, crate::domain::BrowserAction::Click { x: 12.0, y: 34.0 })
            }
            BrowserTurn::Message { .. } => panic!("expected an action"),
        }
    }

    #[test]
    fn parses_browser_message_turn() {
        let response = r#"{"message": "Should I submit the form?"}"#;
        let turn = parse_browser_turn(response).unwrap();
        match turn {
            BrowserTurn::Message { message } => assert_eq!(message, "Should I submit the form?"),
            BrowserTurn::Action { .. } => panic!("expected a message"),
        }
    }
}

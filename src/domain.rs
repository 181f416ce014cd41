//! Core data model shared by the plan/evaluate loop, the validator, and the
//! step executor: tool descriptors, plans, steps, the carry dictionary, and
//! the execution log.
//!
//! Mirrors the shape of [`crate::core::types`] for conversational messages,
//! but these types are specific to the orchestrator's planning domain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a [`ToolDescriptor`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOrigin {
    Builtin,
    User,
    ExternalToolkitAdapter,
}

/// A normalized description of one callable tool, as handed to the planner
/// prompt and consulted by the step validator's import allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique identifier, snake_case.
    pub name: String,
    /// Module prefixes a step choosing this tool may import.
    pub allowed_libraries: Vec<String>,
    /// Free-text usage instructions shown to the planner model.
    pub instructions: String,
    /// Source text: either a template or an exact example, per `use_exact_example`.
    pub code_example: String,
    /// When true, the planner must reuse `code_example` verbatim rather than
    /// generate a new one from `instructions`.
    pub use_exact_example: bool,
    pub origin: ToolOrigin,
}

impl ToolDescriptor {
    /// Substitute `${var}`-style placeholders in every string field using
    /// `vars`. Unresolved placeholders are left intact rather than failing,
    /// so repeated substitution against the same table is idempotent.
    pub fn substitute_placeholders(&self, vars: &HashMap<String, String>) -> ToolDescriptor {
        let subst = |s: &str| -> String {
            let mut out = s.to_string();
            for (k, v) in vars {
                out = out.replace(&format!("${{{}}}", k), v);
            }
            out
        };
        ToolDescriptor {
            name: self.name.clone(),
            allowed_libraries: self.allowed_libraries.clone(),
            instructions: subst(&self.instructions),
            code_example: subst(&self.code_example),
            use_exact_example: self.use_exact_example,
            origin: self.origin,
        }
    }
}

/// One validated, executable unit of a [`Plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub chosen_tool: String,
    /// Name of the predecessor step whose carry output feeds this step, or
    /// empty for the first step in a plan.
    #[serde(default)]
    pub input_from: String,
    pub description: String,
    /// Subset of the chosen tool's `allowed_libraries` this step actually uses.
    pub imports: Vec<String>,
    /// Source text of a single top-level callable named after this step.
    pub code: String,
    pub thought: String,
}

/// An ordered sequence of steps plus the top-level task framing the
/// planner was given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub main_task: String,
    pub main_task_thought: String,
    pub steps: Vec<Step>,
}

impl Plan {
    /// Step names must be unique and every `input_from` must reference an
    /// earlier step or be empty. Returns the first violation found.
    pub fn validate_shape(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            if !seen.insert(step.name.as_str()) {
                return Err(format!("duplicate step name: {}", step.name));
            }
            if i == 0 {
                if !step.input_from.is_empty() {
                    return Err("first step must not declare input_from".into());
                }
                continue;
            }
            if step.input_from.is_empty() {
                return Err(format!("step {} must declare input_from", step.name));
            }
            if !self.steps[..i].iter().any(|s| s.name == step.input_from) {
                return Err(format!(
                    "step {} references unknown predecessor {}",
                    step.name, step.input_from
                ));
            }
        }
        Ok(())
    }
}

/// Mapping threaded from step i to step i+1 as `previous_output`. Every
/// later step must preserve all keys its predecessor produced, only
/// adding or overwriting, never silently dropping (tested by
/// [`CarryDict::preserves`]).
pub type CarryDict = serde_json::Map<String, serde_json::Value>;

/// Returns true if every key in `before` is present in `after` (§8 carry
/// invariant: `keys(C_{i-1}) ⊆ keys(C_i)`).
pub fn carry_preserves(before: &CarryDict, after: &CarryDict) -> bool {
    before.keys().all(|k| after.contains_key(k))
}

/// Flags on an [`ExecutionLogEntry`] controlling its visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFlags {
    /// Exclude this entry from the in-memory log fed to the evaluator.
    #[serde(default)]
    pub no_memory: bool,
    /// Exclude this entry from console output.
    #[serde(default)]
    pub no_print: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub level: LogLevel,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub text: String,
    #[serde(default)]
    pub flags: LogFlags,
}

/// Ordered log of everything a plan's execution produced. `[ERROR]` markers
/// appended after a step invocation trigger the execution-repair loop;
/// `no_memory=false` entries are the ground truth handed to the evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionLog {
    entries: Vec<ExecutionLogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, text: impl Into<String>, flags: LogFlags) {
        self.entries.push(ExecutionLogEntry {
            level,
            timestamp: chrono::Utc::now(),
            text: text.into(),
            flags,
        });
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Info, text, LogFlags::default());
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Error, format!("[ERROR] {}", text.into()), LogFlags::default());
    }

    /// Entries eligible for the evaluator prompt.
    pub fn memory_entries(&self) -> impl Iterator<Item = &ExecutionLogEntry> {
        self.entries.iter().filter(|e| !e.flags.no_memory)
    }

    /// Entries appended strictly after `mark` (used to scan for `[ERROR]`
    /// markers produced by a single step invocation).
    pub fn entries_since(&self, mark: usize) -> &[ExecutionLogEntry] {
        &self.entries[mark.min(self.entries.len())..]
    }

    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_error_since(&self, mark: usize) -> Option<String> {
        self.entries_since(mark)
            .iter()
            .find(|e| e.text.contains("[ERROR]"))
            .map(|e| e.text.clone())
    }

    pub fn rendered_for_evaluator(&self) -> String {
        self.memory_entries()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// State of a deep-search [`PlannerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerState {
    Idle,
    RunningChain,
    WaitingForUserAnswer,
    Completed,
}

/// Persisted, resumable state for one deep-search run. Reloaded every
/// incoming turn; written back whenever the DAG walk suspends or completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSession {
    pub session_id: String,
    pub user_id: Option<String>,
    pub chat_history: Vec<crate::core::types::Message>,
    pub state: PlannerState,
    pub json_chain: Vec<DagAgentNode>,
    pub step_index: usize,
    pub depth: u32,
    pub data_sources: Vec<String>,
    pub final_partials: Vec<String>,
    #[serde(default)]
    pub memory_logs: Vec<String>,
    pub final_answer: Option<String>,
}

impl PlannerSession {
    pub fn new(session_id: impl Into<String>, depth: u32) -> Self {
        PlannerSession {
            session_id: session_id.into(),
            user_id: None,
            chat_history: Vec::new(),
            state: PlannerState::Idle,
            json_chain: Vec::new(),
            step_index: 0,
            depth,
            data_sources: Vec::new(),
            final_partials: Vec::new(),
            memory_logs: Vec::new(),
            final_answer: None,
        }
    }
}

/// Whether a [`DagAgentNode`]'s observation feeds other agents or is
/// concatenated into the final user-facing answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOutputType {
    Functional,
    Final,
}

/// One node in the deep-search DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagAgentNode {
    pub nickname: String,
    pub llm_prompt: String,
    /// At most two predecessor agents, each required to be `Functional`.
    #[serde(default)]
    pub input_from_agents: Vec<String>,
    #[serde(default)]
    pub user_questions: Vec<String>,
    #[serde(default)]
    pub user_answers: Vec<String>,
    #[serde(default)]
    pub external_search_query: Option<String>,
    pub output_type: AgentOutputType,
    #[serde(default)]
    pub observation: Option<String>,
}

impl DagAgentNode {
    pub fn has_unanswered_questions(&self) -> bool {
        self.user_answers.len() < self.user_questions.len()
    }
}

/// Validates the DAG-ordering invariant: every `input_from_agents` entry
/// names an earlier, functional agent, and no agent names more than two.
pub fn dag_shape_is_valid(nodes: &[DagAgentNode]) -> bool {
    for (i, node) in nodes.iter().enumerate() {
        if node.input_from_agents.len() > 2 {
            return false;
        }
        for dep_name in &node.input_from_agents {
            let Some(dep_index) = nodes[..i].iter().position(|n| &n.nickname == dep_name) else {
                return false;
            };
            if nodes[dep_index].output_type != AgentOutputType::Functional {
                return false;
            }
        }
    }
    true
}

/// One node in the session-scoped knowledge graph persisted by deep-search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraphNode {
    pub node_id: String,
    pub agent_nickname: String,
    pub name: String,
    pub entity_type: String,
    pub concept: String,
    pub thought: String,
    #[serde(default)]
    pub edges: Vec<KnowledgeGraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraphEdge {
    pub to: String,
    pub relation: String,
}

/// Whether a new node's edge endpoint names a node materialized this pass
/// or an already-existing node resolved by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeEndpointKind {
    New,
    Existing,
}

/// Query features extracted for the RL meta-selector (§3, `RLState`). The
/// first two fields are one-hot categorical; the rest are scalar in `[0,1]`
/// (urgency/specificity/formality/ambiguity) or raw counts (`query_length`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlState {
    pub question_type: String,
    pub domain: String,
    pub has_entities: bool,
    pub complexity: f64,
    pub ambiguity: f64,
    pub query_length: u32,
    pub specificity: f64,
    pub formality: f64,
    pub urgency: f64,
}

impl RlState {
    /// Safe-default state used when feature extraction fails to parse: the
    /// first vocabulary entry for each categorical, zero/false elsewhere,
    /// and a real token count for `query_length`.
    pub fn fallback(query: &str) -> Self {
        RlState {
            question_type: "factual".to_string(),
            domain: "general".to_string(),
            has_entities: false,
            complexity: 0.0,
            ambiguity: 0.0,
            query_length: query.split_whitespace().count() as u32,
            specificity: 0.0,
            formality: 0.0,
            urgency: 0.0,
        }
    }

    /// Fixed-dimensionality feature vector: one-hot `question_type`
    /// (5-way), one-hot `domain` (6-way), then the boolean and six scalars.
    pub fn to_features(&self) -> Vec<f64> {
        const QUESTION_TYPES: [&str; 5] = ["factual", "comparative", "procedural", "exploratory", "opinion"];
        const DOMAINS: [&str; 6] = ["general", "technical", "medical", "legal", "financial", "scientific"];

        let mut v = Vec::with_capacity(QUESTION_TYPES.len() + DOMAINS.len() + 7);
        for t in QUESTION_TYPES {
            v.push(if self.question_type == t { 1.0 } else { 0.0 });
        }
        for d in DOMAINS {
            v.push(if self.domain == d { 1.0 } else { 0.0 });
        }
        v.push(if self.has_entities { 1.0 } else { 0.0 });
        v.push(self.complexity);
        v.push(self.ambiguity);
        v.push(self.query_length as f64);
        v.push(self.specificity);
        v.push(self.formality);
        v.push(self.urgency);
        v
    }
}

/// Pending reward-attribution record stored under `rl_update:<session_id>`
/// between `retrieve()` and the human rating that closes the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlRecord {
    pub state_features: RlState,
    pub action: u8,
    pub query: String,
}

/// A structured action the interactive browser agent can apply, as
/// returned by the vision model driving one turn of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserAction {
    Click { x: f64, y: f64 },
    DoubleClick { x: f64, y: f64 },
    Scroll { dx: f64, dy: f64 },
    Keypress { key: String },
    Type { text: String },
    Wait { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_preserves_requires_superset() {
        let mut before = CarryDict::new();
        before.insert("a".into(), serde_json::json!(1));
        let mut after = CarryDict::new();
        after.insert("a".into(), serde_json::json!(2));
        after.insert("b".into(), serde_json::json!(3));
        assert!(carry_preserves(&before, &after));

        let empty_after = CarryDict::new();
        assert!(!carry_preserves(&before, &empty_after));
    }

    #[test]
    fn plan_shape_rejects_forward_reference() {
        let plan = Plan {
            main_task: "t".into(),
            main_task_thought: "".into(),
            steps: vec![Step {
                name: "s0".into(),
                chosen_tool: "noop".into(),
                input_from: "s1".into(),
                description: "".into(),
                imports: vec![],
                code: "".into(),
                thought: "".into(),
            }],
        };
        assert!(plan.validate_shape().is_err());
    }

    #[test]
    fn placeholder_substitution_is_idempotent() {
        let desc = ToolDescriptor {
            name: "t".into(),
            allowed_libraries: vec![],
            instructions: "use ${model}".into(),
            code_example: "".into(),
            use_exact_example: false,
            origin: ToolOrigin::Builtin,
        };
        let mut vars = HashMap::new();
        vars.insert("model".into(), "gpt".into());
        let once = desc.substitute_placeholders(&vars);
        let twice = once.substitute_placeholders(&vars);
        assert_eq!(once.instructions, twice.instructions);
        assert_eq!(once.instructions, "use gpt");
    }

    #[test]
    fn unresolved_placeholder_left_intact() {
        let desc = ToolDescriptor {
            name: "t".into(),
            allowed_libraries: vec![],
            instructions: "use ${unknown}".into(),
            code_example: "".into(),
            use_exact_example: false,
            origin: ToolOrigin::Builtin,
        };
        let resolved = desc.substitute_placeholders(&HashMap::new());
        assert_eq!(resolved.instructions, "use ${unknown}");
    }

    #[test]
    fn log_error_marker_detected_since_mark() {
        let mut log = ExecutionLog::new();
        log.info("step ran");
        let mark = log.mark();
        log.error("boom");
        assert!(log.contains_error_since(mark).is_some());
        assert!(log.contains_error_since(log.mark()).is_none());
    }
}

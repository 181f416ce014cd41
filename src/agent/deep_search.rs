//! Deep-Search Planner (§4.6): drives a DAG of sub-agents to a final
//! answer, suspending at user-question boundaries and materializing a
//! session-scoped knowledge graph as agents report their observations.
//!
//! Distinct from [`crate::agent::AgenticLoop`]: the agentic loop drives one
//! plan of executable steps through validation and the sandbox, while this
//! module drives a DAG of prompt-only research agents, each optionally
//! backed by external search, with no code execution involved.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::agent::client::OrchestratorModelClient;
use crate::agent::prompts::{self, GraphEvolutionNode};
use crate::config::DeepSearchConfig;
use crate::core::provider::GenerationOptions;
use crate::core::storage::{StorageBackend, StorageBackendExt};
use crate::core::types::Message;
use crate::database::{graph_key, planner_key};
use crate::domain::{
    dag_shape_is_valid, AgentOutputType, DagAgentNode, EdgeEndpointKind, KnowledgeGraphEdge,
    KnowledgeGraphNode, PlannerSession, PlannerState,
};
use crate::error::{Error, Result};
use crate::memory::MemoryRetriever;
use crate::tools::Tool;

/// Outcome of a single `start`/`resume`/`answer_question` call.
#[derive(Debug, Clone)]
pub enum DeepSearchOutcome {
    /// The DAG walk reached the end; `final_answer` is the assembled,
    /// `<html><body>...</body></html>`-wrapped partial concatenation.
    Completed { final_answer: String },
    /// The walk suspended at `agent_nickname` awaiting one or more
    /// clarifying answers from the user.
    Suspended {
        agent_nickname: String,
        questions: Vec<String>,
    },
}

/// Drives one deep-search session: plans the DAG, walks it node by node,
/// and persists resumable state across suspension points.
pub struct DeepSearchPlanner<'a> {
    model_client: &'a OrchestratorModelClient,
    model: &'a str,
    session_store: &'a dyn StorageBackend,
    search_tool: Option<&'a dyn Tool>,
    retriever: Option<&'a MemoryRetriever>,
    config: &'a DeepSearchConfig,
}

impl<'a> DeepSearchPlanner<'a> {
    pub fn new(
        model_client: &'a OrchestratorModelClient,
        model: &'a str,
        session_store: &'a dyn StorageBackend,
        search_tool: Option<&'a dyn Tool>,
        retriever: Option<&'a MemoryRetriever>,
        config: &'a DeepSearchConfig,
    ) -> Self {
        DeepSearchPlanner {
            model_client,
            model,
            session_store,
            search_tool,
            retriever,
            config,
        }
    }

    /// Plan a fresh DAG for `goal` and start walking it.
    pub async fn start(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        goal: &str,
        min_agents: u32,
    ) -> Result<DeepSearchOutcome> {
        let prompt = prompts::dag_planner_prompt(goal, min_agents, self.config.interactive);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            response_format: Some(crate::core::provider::ResponseFormat::JsonObject),
            ..Default::default()
        };
        let response = self.model_client.chat(&history, self.model, &options).await?;
        let json_chain = prompts::parse_dag_response(&response)?;

        if !dag_shape_is_valid(&json_chain) {
            return Err(Error::PlanShape(
                "deep-search DAG has a cyclic or out-of-order dependency".to_string(),
            ));
        }

        let mut session = PlannerSession::new(session_id, 0);
        session.user_id = user_id.map(str::to_string);
        session.chat_history.push(Message::user(goal.to_string()));
        session.json_chain = json_chain;
        session.state = PlannerState::RunningChain;

        self.walk(session).await
    }

    /// Resume a suspended session from its persisted state.
    pub async fn resume(&self, session_id: &str) -> Result<DeepSearchOutcome> {
        let session: PlannerSession = self
            .session_store
            .get(&planner_key(session_id))
            .await?
            .ok_or_else(|| Error::SessionStore(format!("no planner session for {session_id}")))?;
        self.walk(session).await
    }

    /// Record a user's answer to the currently suspended node's next
    /// unanswered question, then resume walking.
    pub async fn answer_question(&self, session_id: &str, answer: &str) -> Result<DeepSearchOutcome> {
        let mut session: PlannerSession = self
            .session_store
            .get(&planner_key(session_id))
            .await?
            .ok_or_else(|| Error::SessionStore(format!("no planner session for {session_id}")))?;

        if session.state != PlannerState::WaitingForUserAnswer {
            return Err(Error::Internal(format!(
                "session {session_id} is not waiting for a user answer"
            )));
        }

        let node = session
            .json_chain
            .get_mut(session.step_index)
            .ok_or_else(|| Error::Internal(format!("session {session_id} step index out of range")))?;
        node.user_answers.push(answer.to_string());
        session.state = PlannerState::RunningChain;

        self.walk(session).await
    }

    /// Advance `session` from its current `step_index` until it either
    /// suspends on unanswered questions or runs out of nodes.
    async fn walk(&self, mut session: PlannerSession) -> Result<DeepSearchOutcome> {
        while session.step_index < session.json_chain.len() {
            let index = session.step_index;

            if session.json_chain[index].has_unanswered_questions() {
                session.state = PlannerState::WaitingForUserAnswer;
                let nickname = session.json_chain[index].nickname.clone();
                let questions = session.json_chain[index].user_questions.clone();
                self.persist(&session).await?;
                return Ok(DeepSearchOutcome::Suspended {
                    agent_nickname: nickname,
                    questions,
                });
            }

            self.run_node(&mut session, index).await?;
            session.step_index += 1;
            self.persist(&session).await?;
        }

        let final_answer = render_final_answer(&session.final_partials);
        session.final_answer = Some(final_answer.clone());
        session.state = PlannerState::Completed;
        self.persist(&session).await?;

        if self.config.purge_graph_on_completion {
            self.session_store.delete(&graph_key(&session.session_id)).await?;
        }

        Ok(DeepSearchOutcome::Completed { final_answer })
    }

    /// Run one DAG node: gather predecessor observations and optional
    /// external search results, prompt the model, record the observation,
    /// and fold any new knowledge-graph nodes into the session's graph.
    async fn run_node(&self, session: &mut PlannerSession, index: usize) -> Result<()> {
        let predecessor_observations = predecessor_observations(&session.json_chain, index);
        let predecessor_refs: Vec<(&str, &str)> = predecessor_observations
            .iter()
            .map(|(n, o)| (n.as_str(), o.as_str()))
            .collect();

        let search_results = self.gather_search_results(&session.json_chain[index]).await?;

        let prompt = prompts::sub_agent_prompt(
            &session.json_chain[index],
            &predecessor_refs,
            search_results.as_deref(),
        );
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            ..Default::default()
        };
        let observation = self.model_client.chat(&history, self.model, &options).await?;

        self.evolve_graph(session, index, &observation).await?;

        let node = &mut session.json_chain[index];
        node.observation = Some(observation.clone());
        if node.output_type == AgentOutputType::Final {
            session.final_partials.push(observation);
        }
        Ok(())
    }

    async fn gather_search_results(&self, node: &DagAgentNode) -> Result<Option<String>> {
        let mut sections = Vec::new();

        if self.config.websearch_enabled {
            if let (Some(query), Some(tool)) = (&node.external_search_query, self.search_tool) {
                let args = serde_json::json!({ "query": query });
                match tool.execute(args).await {
                    Ok(result) if result.success => {
                        if let Some(content) = result.content {
                            sections.push(content);
                        }
                    }
                    Ok(result) => {
                        tracing::warn!(error = ?result.error, "external search tool reported failure");
                    }
                    Err(e) => tracing::warn!(%e, "external search tool call failed"),
                }
            }
        }

        if self.config.rag_enabled {
            if let Some(retriever) = self.retriever {
                if let Ok(context) = retriever.retrieve("deep-search", &node.llm_prompt, 5).await {
                    if !context.is_empty() {
                        sections.push(context);
                    }
                }
            }
        }

        if sections.is_empty() {
            Ok(None)
        } else {
            Ok(Some(sections.join("\n\n")))
        }
    }

    /// Ask the model to extract knowledge-graph nodes from this
    /// observation, resolve each edge endpoint against the session's
    /// already-materialized graph, and persist the updated graph.
    async fn evolve_graph(&self, session: &PlannerSession, index: usize, observation: &str) -> Result<()> {
        let graph_key = graph_key(&session.session_id);
        let mut graph: Vec<KnowledgeGraphNode> = self.session_store.get(&graph_key).await?.unwrap_or_default();
        let existing_names: Vec<String> = graph.iter().map(|n| n.name.clone()).collect();

        let agent_nickname = &session.json_chain[index].nickname;
        let prompt = prompts::graph_evolution_prompt(agent_nickname, observation, &existing_names);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            response_format: Some(crate::core::provider::ResponseFormat::JsonObject),
            ..Default::default()
        };
        let response = self.model_client.chat(&history, self.model, &options).await?;
        let new_nodes = match prompts::parse_graph_evolution_response(&response) {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!(%e, "graph-evolution response did not parse, skipping this pass");
                return Ok(());
            }
        };

        let fresh_ids: std::collections::HashMap<String, String> = new_nodes
            .iter()
            .map(|n| (n.name.clone(), Uuid::new_v4().to_string()))
            .collect();

        for raw in new_nodes {
            let node_id = fresh_ids[&raw.name].clone();
            let edges = resolve_edge(&raw, &fresh_ids, &graph);
            graph.push(KnowledgeGraphNode {
                node_id,
                agent_nickname: agent_nickname.clone(),
                name: raw.name,
                entity_type: raw.entity_type,
                concept: raw.concept,
                thought: raw.thought,
                edges,
            });
        }

        self.session_store.set(&graph_key, &graph).await
    }

    async fn persist(&self, session: &PlannerSession) -> Result<()> {
        self.session_store.set(&planner_key(&session.session_id), session).await
    }
}

/// Collect `(nickname, observation)` for every functional predecessor of
/// the node at `index`. Predecessors are validated (`dag_shape_is_valid`)
/// to always be functional and earlier in the chain, so their observation
/// is always present by the time this runs.
fn predecessor_observations(nodes: &[DagAgentNode], index: usize) -> Vec<(String, String)> {
    nodes[index]
        .input_from_agents
        .iter()
        .filter_map(|dep_name| {
            nodes
                .iter()
                .find(|n| &n.nickname == dep_name)
                .and_then(|n| n.observation.clone().map(|obs| (n.nickname.clone(), obs)))
        })
        .collect()
}

fn resolve_edge(
    raw: &GraphEvolutionNode,
    fresh_ids: &std::collections::HashMap<String, String>,
    existing_graph: &[KnowledgeGraphNode],
) -> Vec<KnowledgeGraphEdge> {
    let (Some(to_name), Some(relation)) = (&raw.edge_to, &raw.edge_relation) else {
        return Vec::new();
    };

    let resolved_to = match raw.edge_endpoint_kind {
        Some(EdgeEndpointKind::New) | None => fresh_ids.get(to_name).cloned(),
        Some(EdgeEndpointKind::Existing) => existing_graph
            .iter()
            .find(|n| &n.name == to_name)
            .map(|n| n.node_id.clone()),
    };

    match resolved_to {
        Some(to) => vec![KnowledgeGraphEdge { to, relation: relation.clone() }],
        None => Vec::new(),
    }
}

fn html_body_tag() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)</?(html|body)[^>]*>").unwrap())
}

/// Strip any embedded `<html>`/`<body>` tags from text a partial might
/// already carry, case-insensitively.
fn remove_html_body_tags(text: &str) -> String {
    html_body_tag().replace_all(text, "").trim().to_string()
}

/// Wrap the final-output agents' observations into the assembled answer
/// surface (§4.6): partials concatenated in DAG order, with any embedded
/// `<html>`/`<body>` tags stripped, wrapped once in a single pair.
fn render_final_answer(partials: &[String]) -> String {
    let joined = partials.concat();
    format!("<html><body>{}</body></html>", remove_html_body_tags(&joined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentOutputType;

    fn node(nickname: &str, inputs: &[&str], output_type: AgentOutputType, observation: Option<&str>) -> DagAgentNode {
        DagAgentNode {
            nickname: nickname.to_string(),
            llm_prompt: "do work".to_string(),
            input_from_agents: inputs.iter().map(|s| s.to_string()).collect(),
            user_questions: Vec::new(),
            user_answers: Vec::new(),
            external_search_query: None,
            output_type,
            observation: observation.map(str::to_string),
        }
    }

    #[test]
    fn predecessor_observations_skips_nodes_without_an_observation_yet() {
        let nodes = vec![
            node("a", &[], AgentOutputType::Functional, Some("obs-a")),
            node("b", &["a"], AgentOutputType::Functional, None),
        ];
        let obs = predecessor_observations(&nodes, 1);
        assert_eq!(obs, vec![("a".to_string(), "obs-a".to_string())]);
    }

    #[test]
    fn render_final_answer_concatenates_partials_without_wrapping_each() {
        let answer = render_final_answer(&["first".to_string(), "second".to_string()]);
        assert_eq!(answer, "<html><body>firstsecond</body></html>");
    }

    #[test]
    fn render_final_answer_strips_embedded_html_body_tags() {
        let answer = render_final_answer(&[
            "<html><body>first</body></html>".to_string(),
            "<BODY>second</BODY>".to_string(),
        ]);
        assert_eq!(answer, "<html><body>firstsecond</body></html>");
    }

    #[test]
    fn render_final_answer_handles_no_partials() {
        assert_eq!(render_final_answer(&[]), "<html><body></body></html>");
    }
}

//! Orchestrator handle (§6.1): the in-process async trait the ambient
//! transport shim (`src/bin/gateway.rs`) dispatches onto. Exposes exactly
//! the three request kinds from the external-interfaces request surface
//! and nothing else -- session routing, channel plumbing, PDF rendering,
//! and static file serving stay genuinely out of scope.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::agent::{AgenticLoop, DeepSearchOutcome, DeepSearchPlanner, OrchestratorModelClient};
use crate::config::{DeepSearchConfig, OrchestratorConfig};
use crate::core::storage::{StorageBackend, StorageBackendExt};
use crate::database::followup_key;
use crate::domain::ToolDescriptor;
use crate::error::{Error, Result};
use crate::memory::MemoryRetriever;
use crate::sandbox::CodeExecutor;
use crate::tools::DuckDuckGoSearchTool;

use super::protocol::types::{
    AgentResponseEvent, DepthProfile, EvaluationAckEvent, FollowUpRequest, FollowUpRequestEvent,
    GatewayEvent, RunAgentRequest, SubmitEvaluationRequest,
};

/// Applies a human rating once `submit_evaluation` has validated its
/// shape. Kept separate from [`OrchestratorHandle`] so that whoever
/// constructs the long-lived `rl::RlSelector` also supplies it as the
/// sink that reaches this trait, rather than `OrchestratorService`
/// depending on `rl` directly.
#[async_trait]
pub trait EvaluationSink: Send + Sync {
    async fn submit(&self, session_id: &str, rating: u8) -> Result<()>;
}

/// Transport-agnostic request surface (§6): `run_agent`,
/// `follow_up_response`, `submit_evaluation`.
#[async_trait]
pub trait OrchestratorHandle: Send + Sync {
    async fn run_agent(&self, request: RunAgentRequest) -> Result<Vec<GatewayEvent>>;
    async fn follow_up_response(&self, request: FollowUpRequest) -> Result<()>;
    async fn submit_evaluation(&self, request: SubmitEvaluationRequest) -> Result<Vec<GatewayEvent>>;
}

/// Default [`OrchestratorHandle`], wiring both the plan/evaluate loop and
/// the deep-search DAG planner against a shared model client, executor, and
/// session store. `run_agent` dispatches on `request.deepsearch`.
pub struct OrchestratorService {
    pub model_client: Arc<OrchestratorModelClient>,
    pub model: String,
    pub executor: Arc<dyn CodeExecutor>,
    pub session_store: Arc<dyn StorageBackend>,
    pub orchestrator_config: OrchestratorConfig,
    pub deep_search_config: DeepSearchConfig,
    pub catalog: Vec<ToolDescriptor>,
    pub evaluation_sink: Option<Arc<dyn EvaluationSink>>,
    /// Deep-search's web-search and memory retrieval back-ends.
    pub search_tool: DuckDuckGoSearchTool,
    pub memory_retriever: MemoryRetriever,
}

#[async_trait]
impl OrchestratorHandle for OrchestratorService {
    async fn run_agent(&self, request: RunAgentRequest) -> Result<Vec<GatewayEvent>> {
        let history_summary = request
            .session_chat_history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let goal = request
            .session_chat_history
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if request.deepsearch == Some(true) {
            let profile = DepthProfile::for_depth(request.depth.unwrap_or(0));
            let min_agents = profile.min_final_agents + profile.min_functional_agents;
            let planner = DeepSearchPlanner::new(
                &self.model_client,
                &self.model,
                self.session_store.as_ref(),
                Some(&self.search_tool),
                Some(&self.memory_retriever),
                &self.deep_search_config,
            );
            let outcome = planner
                .start(&request.session_id, request.user_id.as_deref(), &goal, min_agents)
                .await?;
            return Ok(vec![deep_search_outcome_event(&request.session_id, outcome)]);
        }

        let loop_runner = AgenticLoop::new(
            &self.model_client,
            &self.model,
            self.executor.as_ref(),
            &self.orchestrator_config,
        );
        let output = loop_runner
            .run(&goal, &history_summary, &self.catalog, &request.session_id)
            .await?;

        Ok(vec![GatewayEvent::AgentResponse(AgentResponseEvent {
            session_id: request.session_id,
            assistant: output.final_answer,
            content_type: Some("text/html".to_string()),
        })])
    }

    async fn follow_up_response(&self, request: FollowUpRequest) -> Result<()> {
        self.session_store.set(&followup_key(&request.session_id), &request.message).await
    }

    async fn submit_evaluation(&self, request: SubmitEvaluationRequest) -> Result<Vec<GatewayEvent>> {
        if !(1..=5).contains(&request.rating) {
            return Err(Error::InvalidInput(format!(
                "rating must be in 1..=5, got {}",
                request.rating
            )));
        }

        let Some(sink) = self.evaluation_sink.as_ref() else {
            warn!(session_id = %request.session_id, "submit_evaluation called with no evaluation sink configured");
            return Ok(vec![GatewayEvent::EvaluationAck(EvaluationAckEvent {
                status: "ignored".to_string(),
                message: "no RL selector wired into this gateway instance".to_string(),
            })]);
        };

        sink.submit(&request.session_id, request.rating).await?;
        Ok(vec![GatewayEvent::EvaluationAck(EvaluationAckEvent {
            status: "ok".to_string(),
            message: "rating recorded".to_string(),
        })])
    }
}

fn deep_search_outcome_event(session_id: &str, outcome: DeepSearchOutcome) -> GatewayEvent {
    match outcome {
        DeepSearchOutcome::Completed { final_answer } => GatewayEvent::AgentResponse(AgentResponseEvent {
            session_id: session_id.to_string(),
            assistant: final_answer,
            content_type: Some("text/html".to_string()),
        }),
        DeepSearchOutcome::Suspended { agent_nickname, questions } => {
            let message = format!(
                "{agent_nickname} is waiting on: {}",
                questions.join("; ")
            );
            GatewayEvent::FollowUpRequest(FollowUpRequestEvent { message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingSink;

    #[async_trait]
    impl EvaluationSink for RejectingSink {
        async fn submit(&self, _session_id: &str, _rating: u8) -> Result<()> {
            Err(Error::Internal("boom".to_string()))
        }
    }

    #[test]
    fn evaluation_sink_is_object_safe() {
        let sink: Arc<dyn EvaluationSink> = Arc::new(RejectingSink);
        assert!(Arc::strong_count(&sink) >= 1);
    }
}

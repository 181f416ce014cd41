//! Gateway protocol types
//!
//! Request/response/event types for the orchestrator's transport-agnostic
//! request surface. Deliberately narrow: the out-of-scope HTTP/WebSocket
//! front door, session routing, and channel plumbing the teacher's gateway
//! used to carry are not part of this surface; only what drives a session
//! through `agent::AgenticLoop`/`agent::DeepSearchPlanner` is.

use serde::{Deserialize, Serialize};

use crate::core::types::Message;

// ============================================================================
// Requests
// ============================================================================

/// Start or resume a session. A session already `waiting_for_user_answer`
/// or paused mid-browser-turn is advanced from its persisted state;
/// `session_chat_history`/`deepsearch`/`depth` are only consulted when no
/// prior state exists for `session_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentRequest {
    pub session_id: String,
    #[serde(default)]
    pub session_chat_history: Vec<Message>,
    /// Route through the DAG-based deep-search planner instead of the
    /// single-plan agentic loop.
    #[serde(default)]
    pub deepsearch: Option<bool>,
    /// Deep-search depth profile (1..=5, clamped); ignored outside
    /// `deepsearch` mode.
    #[serde(default)]
    pub depth: Option<u32>,
    pub user_id: Option<String>,
}

/// Deliver an out-of-band reply into a session's follow-up slot, unblocking
/// a `waiting_for_user_answer` deep-search node or a suspended browser turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    pub session_id: String,
    pub message: String,
}

/// Record a human rating (1..=5) against a session's pending RL record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEvaluationRequest {
    pub session_id: String,
    pub rating: u8,
}

// ============================================================================
// Events (server -> client)
// ============================================================================

/// A rendered answer, partial or final, for the given session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponseEvent {
    pub session_id: String,
    pub assistant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// A session-scoped error, surfaced instead of crashing the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub session_id: String,
    pub error: String,
}

/// Free-form progress narration emitted mid-loop (plan generated, step
/// repaired, sub-agent observation recorded, and so on).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningUpdateEvent {
    pub message: String,
}

/// The orchestrator is waiting on a human reply before it can continue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequestEvent {
    pub message: String,
}

/// Invites the client to call `submit_evaluation` for this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvaluationEvent {
    pub session_id: String,
    pub assistant: String,
}

/// Acknowledges a `submit_evaluation` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationAckEvent {
    pub status: String,
    pub message: String,
}

/// One server-pushed event, tagged for `GatewayFrame::Event`/`EventFrame::data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    AgentResponse(AgentResponseEvent),
    Error(ErrorEvent),
    ReasoningUpdate(ReasoningUpdateEvent),
    FollowUpRequest(FollowUpRequestEvent),
    RequestEvaluation(RequestEvaluationEvent),
    EvaluationAck(EvaluationAckEvent),
}

/// Event names, mirrored onto `gateway::protocol::schema::EventFrame::event`
/// by the transport shim.
pub mod events {
    pub const AGENT_RESPONSE: &str = "agent_response";
    pub const ERROR: &str = "error";
    pub const REASONING_UPDATE: &str = "reasoning_update";
    pub const FOLLOW_UP_REQUEST: &str = "follow_up_request";
    pub const REQUEST_EVALUATION: &str = "request_evaluation";
    pub const EVALUATION_ACK: &str = "evaluation_ack";
}

/// Depth profile row (§6, external interfaces table): per-session minimums
/// and ceilings for the deep-search planner, keyed by the `depth` request
/// parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthProfile {
    pub min_final_agents: u32,
    pub min_functional_agents: u32,
    pub min_tokens_per_final: u32,
    pub max_web_results: u32,
    pub max_scrape_chars: u32,
}

impl DepthProfile {
    /// Resolve a `depth` request parameter (1..=5, clamped at both ends)
    /// to its documented profile row.
    pub fn for_depth(depth: u32) -> Self {
        match depth {
            0 | 1 => DepthProfile { min_final_agents: 1, min_functional_agents: 1, min_tokens_per_final: 3000, max_web_results: 1, max_scrape_chars: 60_000 },
            2 => DepthProfile { min_final_agents: 2, min_functional_agents: 2, min_tokens_per_final: 5000, max_web_results: 2, max_scrape_chars: 80_000 },
            3 => DepthProfile { min_final_agents: 3, min_functional_agents: 3, min_tokens_per_final: 7000, max_web_results: 3, max_scrape_chars: 100_000 },
            4 => DepthProfile { min_final_agents: 4, min_functional_agents: 4, min_tokens_per_final: 9000, max_web_results: 4, max_scrape_chars: 120_000 },
            _ => DepthProfile { min_final_agents: 5, min_functional_agents: 5, min_tokens_per_final: 11_000, max_web_results: 5, max_scrape_chars: 140_000 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_agent_request_round_trips() {
        let req = RunAgentRequest {
            session_id: "s1".to_string(),
            session_chat_history: vec![Message::user("hello")],
            deepsearch: Some(true),
            depth: Some(3),
            user_id: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: RunAgentRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, "s1");
        assert_eq!(back.depth, Some(3));
    }

    #[test]
    fn depth_profile_clamps_out_of_range_depths() {
        assert_eq!(DepthProfile::for_depth(0), DepthProfile::for_depth(1));
        assert_eq!(DepthProfile::for_depth(9), DepthProfile::for_depth(5));
        assert_eq!(DepthProfile::for_depth(3).min_tokens_per_final, 7000);
    }
}

//! Gateway module - thin transport shim over the orchestrator (§6.1)
//!
//! The out-of-scope HTTP/WebSocket front door is represented here only as
//! an in-process async trait (`OrchestratorHandle`) plus the wire types a
//! real transport would serialize. `src/bin/gateway.rs` layers a minimal
//! Axum router on top that deserializes JSON bodies into the three request
//! variants below and forwards them -- enough to exercise the plan/evaluate
//! loop end to end without re-implementing session routing, PDF rendering,
//! or static file serving.
//!
//! ## Request surface
//!
//! ```text
//! run_agent(session_id, session_chat_history, deepsearch?, depth?, user_id?)
//! follow_up_response(session_id, message)
//! submit_evaluation(session_id, rating)
//! ```

pub mod handle;
pub mod protocol;

pub use handle::{EvaluationSink, OrchestratorHandle, OrchestratorService};

pub use protocol::{schema::error_codes, GatewayFrame, ProtocolVersion, PROTOCOL_VERSION};

pub use protocol::types::{
    events, AgentResponseEvent, DepthProfile, EvaluationAckEvent, ErrorEvent,
    FollowUpRequest, FollowUpRequestEvent, GatewayEvent, ReasoningUpdateEvent,
    RequestEvaluationEvent, RunAgentRequest, SubmitEvaluationRequest,
};

//! Orchestrator configuration types
//!
//! Mirrors the shape of [`super::sandbox::SandboxConfig`]: plain structs
//! with `Deserialize`/`Default`, validated in `config::validation`.

use serde::{Deserialize, Serialize};

/// Plan/evaluate loop tuning: iteration ceiling, per-step repair budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum plan/execute/evaluate iterations before returning as-is.
    /// The loop body runs while `iteration <= max_iterations + 1`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Validation-repair attempts per step (V).
    #[serde(default = "default_repair_budget")]
    pub validation_repair_budget: u32,
    /// Execution-repair attempts per step (E).
    #[serde(default = "default_repair_budget")]
    pub execution_repair_budget: u32,
    /// Model-call retry budget for parse/shape failures.
    #[serde(default = "default_model_retries")]
    pub model_call_retries: u32,
    /// Directory answer-materialization moves `/tmp/...` files into.
    #[serde(default = "default_static_dir")]
    pub static_answer_dir: std::path::PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            max_iterations: default_max_iterations(),
            validation_repair_budget: default_repair_budget(),
            execution_repair_budget: default_repair_budget(),
            model_call_retries: default_model_retries(),
            static_answer_dir: default_static_dir(),
        }
    }
}

fn default_max_iterations() -> u32 {
    5
}

fn default_repair_budget() -> u32 {
    3
}

fn default_model_retries() -> u32 {
    3
}

fn default_static_dir() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|d| d.join("agentflow").join("answers"))
        .unwrap_or_else(|| std::path::PathBuf::from("./answers"))
}

/// Deep-search DAG planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSearchConfig {
    /// Whether a run may suspend on `waiting_for_user_answer`.
    #[serde(default = "default_true")]
    pub interactive: bool,
    /// Follow-up reply poll timeout, in seconds.
    #[serde(default = "default_followup_timeout")]
    pub followup_timeout_secs: u64,
    /// Whether external web search is enabled as a source.
    #[serde(default = "default_true")]
    pub websearch_enabled: bool,
    /// Whether the RAG retriever is enabled as a source.
    #[serde(default = "default_true")]
    pub rag_enabled: bool,
    /// Purge the session's knowledge-graph partition once the DAG completes.
    #[serde(default)]
    pub purge_graph_on_completion: bool,
    /// Timeout for one browser-agent command (screenshot + model turn +
    /// applied action), in seconds.
    #[serde(default = "default_browser_command_timeout")]
    pub browser_command_timeout_secs: u64,
}

impl Default for DeepSearchConfig {
    fn default() -> Self {
        DeepSearchConfig {
            interactive: true,
            followup_timeout_secs: default_followup_timeout(),
            websearch_enabled: true,
            rag_enabled: true,
            purge_graph_on_completion: false,
            browser_command_timeout_secs: default_browser_command_timeout(),
        }
    }
}

fn default_browser_command_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_followup_timeout() -> u64 {
    60
}

/// RL meta-selector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlConfig {
    /// Q-value estimator implementation.
    #[serde(default)]
    pub estimator: RlEstimatorMode,
    /// Minimum ring-buffer occupancy before exploiting the estimator.
    #[serde(default = "default_ring_buffer_min")]
    pub ring_buffer_min: usize,
    /// Ring-buffer mean-reward threshold above which the model is still
    /// consulted instead of the estimator.
    #[serde(default = "default_warmup_threshold")]
    pub warmup_threshold: f64,
    /// Exploration rate for epsilon-greedy selection.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Learning rate (alpha).
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Discount factor (gamma).
    #[serde(default = "default_discount")]
    pub discount: f64,
    /// Whether human ratings are solicited after `retrieve`.
    #[serde(default = "default_true")]
    pub human_rating_enabled: bool,
    /// Local path the ring buffer / Q-table are persisted to.
    #[serde(default = "default_state_path")]
    pub state_path: std::path::PathBuf,
}

impl Default for RlConfig {
    fn default() -> Self {
        RlConfig {
            estimator: RlEstimatorMode::default(),
            ring_buffer_min: default_ring_buffer_min(),
            warmup_threshold: default_warmup_threshold(),
            epsilon: default_epsilon(),
            learning_rate: default_learning_rate(),
            discount: default_discount(),
            human_rating_enabled: true,
            state_path: default_state_path(),
        }
    }
}

fn default_ring_buffer_min() -> usize {
    50
}

fn default_warmup_threshold() -> f64 {
    0.5
}

fn default_epsilon() -> f64 {
    0.1
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_discount() -> f64 {
    0.9
}

fn default_state_path() -> std::path::PathBuf {
    dirs::data_dir()
        .map(|d| d.join("agentflow").join("rl_state.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("./rl_state.json"))
}

/// Q-value estimator backing the RL meta-selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RlEstimatorMode {
    /// Hash-of-discretized-state table.
    #[default]
    Tabular,
    /// Small feed-forward network, one gradient step per update.
    Approximate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_config_default_matches_documented_ceiling() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.validation_repair_budget, 3);
    }

    #[test]
    fn rl_config_default_estimator_is_tabular() {
        assert_eq!(RlConfig::default().estimator, RlEstimatorMode::Tabular);
    }
}

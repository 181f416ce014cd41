//! RL meta-selector (§4.8): extracts query features, picks a retrieval
//! strategy by ε-greedy selection over a learned value function (or the
//! model directly while the ring buffer is cold), and learns from human
//! ratings submitted after the fact.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::agent::prompts;
use crate::agent::OrchestratorModelClient;
use crate::config::RlConfig;
use crate::core::provider::GenerationOptions;
use crate::core::storage::{StorageBackend, StorageBackendExt};
use crate::core::types::Message;
use crate::database::rl_update_key;
use crate::domain::{RlRecord, RlState};
use crate::error::{Error, Result};
use crate::memory::MemoryRetriever;
use crate::rl::estimator::{Estimator, QEstimator, ACTION_COUNT};
use crate::tools::Tool;

/// Maximum number of recent rewards kept for the warm-up gate. Bounds
/// memory use; the mean of the most recent window is what gates
/// exploiting the estimator, not the whole lifetime history.
const RING_BUFFER_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    estimator: Estimator,
    ring_buffer: VecDeque<f64>,
    episodes: u64,
}

impl PersistedState {
    fn new(mode: crate::config::RlEstimatorMode) -> Self {
        PersistedState {
            estimator: Estimator::new(mode),
            ring_buffer: VecDeque::new(),
            episodes: 0,
        }
    }
}

/// Partial view of the model's feature-extraction response; `query_length`
/// is computed locally rather than trusted from the model.
#[derive(Deserialize)]
struct ExtractedFeatures {
    question_type: String,
    domain: String,
    has_entities: bool,
    complexity: f64,
    ambiguity: f64,
    specificity: f64,
    formality: f64,
    urgency: f64,
}

/// One of the three retrieval back-ends the meta-selector chooses between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    Rag,
    WebSearch,
    Hybrid,
}

impl RetrievalStrategy {
    fn from_action(action: u8) -> Self {
        match action {
            0 => RetrievalStrategy::Rag,
            1 => RetrievalStrategy::WebSearch,
            _ => RetrievalStrategy::Hybrid,
        }
    }
}

/// Drives feature extraction, action selection, retrieval dispatch, and
/// reward application for one orchestrator instance. Holds the estimator
/// and ring buffer behind a single lock: every session's `retrieve` and
/// `submit_rating` calls share this global learning state.
///
/// Owns its dependencies by `Arc` rather than borrowing them so the whole
/// selector can itself be held behind an `Arc` and shared across requests
/// (and wired in as an [`crate::gateway::EvaluationSink`]) for the lifetime
/// of the process, rather than rebuilt per call.
pub struct RlSelector {
    model_client: Arc<OrchestratorModelClient>,
    model: String,
    session_store: Arc<dyn StorageBackend>,
    retriever: Option<Arc<MemoryRetriever>>,
    search_tool: Option<Arc<dyn Tool>>,
    config: RlConfig,
    state: RwLock<PersistedState>,
}

impl RlSelector {
    /// Load persisted estimator/ring-buffer state from `config.state_path`,
    /// or start fresh if no file exists yet.
    pub async fn load(
        model_client: Arc<OrchestratorModelClient>,
        model: impl Into<String>,
        session_store: Arc<dyn StorageBackend>,
        retriever: Option<Arc<MemoryRetriever>>,
        search_tool: Option<Arc<dyn Tool>>,
        config: RlConfig,
    ) -> Result<RlSelector> {
        let state = match tokio::fs::read(&config.state_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| PersistedState::new(config.estimator)),
            Err(_) => PersistedState::new(config.estimator),
        };

        Ok(RlSelector {
            model_client,
            model: model.into(),
            session_store,
            retriever,
            search_tool,
            config,
            state: RwLock::new(state),
        })
    }

    async fn persist(&self, state: &PersistedState) -> Result<()> {
        if let Some(parent) = self.config.state_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(state)?;
        tokio::fs::write(&self.config.state_path, bytes).await?;
        Ok(())
    }

    /// Extract §3's `RlState` features for `query`, falling back to safe
    /// defaults on a parse failure.
    pub async fn feature_extract(&self, query: &str) -> RlState {
        let prompt = prompts::feature_extraction_prompt(query);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            response_format: Some(crate::core::provider::ResponseFormat::JsonObject),
            ..Default::default()
        };

        let Ok(response) = self.model_client.chat(&history, &self.model, &options).await else {
            return RlState::fallback(query);
        };
        let Ok(extracted) = serde_json::from_str::<ExtractedFeatures>(&response) else {
            return RlState::fallback(query);
        };

        RlState {
            question_type: extracted.question_type,
            domain: extracted.domain,
            has_entities: extracted.has_entities,
            complexity: extracted.complexity,
            ambiguity: extracted.ambiguity,
            query_length: query.split_whitespace().count() as u32,
            specificity: extracted.specificity,
            formality: extracted.formality,
            urgency: extracted.urgency,
        }
    }

    /// Choose a retrieval action for `state`: the model's own suggestion
    /// while the ring buffer is cold or still noisy, otherwise ε-greedy
    /// over the learned Q values.
    async fn choose_action(&self, query: &str, state: &RlState) -> Result<u8> {
        let cold_or_noisy = {
            let guard = self.state.read().await;
            guard.ring_buffer.len() < self.config.ring_buffer_min
                || mean(&guard.ring_buffer) > self.config.warmup_threshold
        };

        if cold_or_noisy {
            return Ok(self.ask_model_for_strategy(query, state).await);
        }

        let mut rng = rand::rng();
        if rng.random::<f64>() < self.config.epsilon {
            return Ok(rng.random_range(0..ACTION_COUNT as u8));
        }

        let guard = self.state.read().await;
        let q_values = guard.estimator.get_q_values(state);
        Ok(argmax(&q_values))
    }

    async fn ask_model_for_strategy(&self, query: &str, state: &RlState) -> u8 {
        let prompt = prompts::strategy_suggestion_prompt(query, state);
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions {
            model: Some(self.model.to_string()),
            ..Default::default()
        };
        match self.model_client.chat(&history, &self.model, &options).await {
            Ok(response) => response.trim().parse::<u8>().unwrap_or(0).min(ACTION_COUNT as u8 - 1),
            Err(e) => {
                warn!(%e, "strategy-suggestion model call failed, defaulting to action 0");
                0
            }
        }
    }

    /// Choose an action, run the matching retrieval back-end, synthesize
    /// an answer, and (if human rating is enabled) persist a pending
    /// [`RlRecord`] under `rl_update:<session_id>` for later scoring.
    pub async fn retrieve(&self, session_id: &str, query: &str) -> Result<String> {
        let state = self.feature_extract(query).await;
        let action = self.choose_action(query, &state).await?;
        let strategy = RetrievalStrategy::from_action(action);

        let context = self.run_strategy(strategy, query).await?;
        let answer = self.synthesize_answer(query, &context).await?;

        if self.config.human_rating_enabled {
            let record = RlRecord { state_features: state, action, query: query.to_string() };
            self.session_store.set(&rl_update_key(session_id), &record).await?;
        }

        Ok(answer)
    }

    async fn run_strategy(&self, strategy: RetrievalStrategy, query: &str) -> Result<String> {
        let mut sections = Vec::new();

        if matches!(strategy, RetrievalStrategy::Rag | RetrievalStrategy::Hybrid) {
            if let Some(retriever) = self.retriever.as_ref() {
                if let Ok(context) = retriever.retrieve("rl-selector", query, 5).await {
                    if !context.is_empty() {
                        sections.push(context);
                    }
                }
            }
        }

        if matches!(strategy, RetrievalStrategy::WebSearch | RetrievalStrategy::Hybrid) {
            if let Some(tool) = self.search_tool.as_ref() {
                let args = serde_json::json!({ "query": query });
                if let Ok(result) = tool.execute(args).await {
                    if let Some(content) = result.content {
                        sections.push(content);
                    }
                }
            }
        }

        Ok(sections.join("\n\n"))
    }

    async fn synthesize_answer(&self, query: &str, context: &str) -> Result<String> {
        let prompt = format!(
            "Answer the following question using the retrieved context.\n\nQuestion: {query}\n\nContext:\n{context}"
        );
        let history = vec![Message::user(prompt)];
        let options = GenerationOptions { model: Some(self.model.to_string()), ..Default::default() };
        self.model_client.chat(&history, &self.model, &options).await
    }

    /// Apply a human rating (1..=5) to the session's pending RL record:
    /// update the estimator, push the normalized reward into the ring
    /// buffer, increment `episodes`, persist state, and clear the record.
    pub async fn submit_rating(&self, session_id: &str, rating: u8) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidInput(format!("rating must be in 1..=5, got {rating}")));
        }

        let key = rl_update_key(session_id);
        let record: RlRecord = self
            .session_store
            .get(&key)
            .await?
            .ok_or_else(|| Error::SessionStore(format!("no pending RL record for {session_id}")))?;

        let reward = (rating as f64 - 1.0) / 4.0;

        {
            let mut guard = self.state.write().await;
            guard.estimator.update(
                &record.state_features,
                record.action,
                reward,
                None,
                false,
                self.config.learning_rate,
                self.config.discount,
            );
            guard.ring_buffer.push_back(reward);
            while guard.ring_buffer.len() > RING_BUFFER_CAPACITY {
                guard.ring_buffer.pop_front();
            }
            guard.episodes += 1;
            self.persist(&guard).await?;
        }

        self.session_store.delete(&key).await
    }
}

#[async_trait]
impl crate::gateway::EvaluationSink for RlSelector {
    async fn submit(&self, session_id: &str, rating: u8) -> Result<()> {
        self.submit_rating(session_id, rating).await
    }
}

fn mean(buffer: &VecDeque<f64>) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    buffer.iter().sum::<f64>() / buffer.len() as f64
}

fn argmax(values: &[f64; ACTION_COUNT]) -> u8 {
    let mut best_index = 0;
    for i in 1..ACTION_COUNT {
        if values[i] > values[best_index] {
            best_index = i;
        }
    }
    best_index as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_empty_buffer_is_zero() {
        assert_eq!(mean(&VecDeque::new()), 0.0);
    }

    #[test]
    fn argmax_picks_highest_value_action() {
        assert_eq!(argmax(&[0.1, 0.9, 0.3]), 1);
    }

    #[test]
    fn retrieval_strategy_maps_actions_as_documented() {
        assert_eq!(RetrievalStrategy::from_action(0), RetrievalStrategy::Rag);
        assert_eq!(RetrievalStrategy::from_action(1), RetrievalStrategy::WebSearch);
        assert_eq!(RetrievalStrategy::from_action(2), RetrievalStrategy::Hybrid);
    }
}

//! Q-value estimators backing the RL meta-selector (§4.8): a tabular
//! hash-of-discretized-state table and a small linear approximator, both
//! sharing the same `get_q_values`/`update` surface so the selector never
//! needs to know which one is in play.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::RlState;

/// Number of retrieval strategies the meta-selector chooses between.
pub const ACTION_COUNT: usize = 3;

/// Shared Q-value surface for both estimator modes.
pub trait QEstimator {
    fn get_q_values(&self, state: &RlState) -> [f64; ACTION_COUNT];

    /// `Q <- Q + alpha * (target - Q)`, where `target` is `reward` alone
    /// when `bootstrap` is false, or `reward + discount * maxQ(next_state)`
    /// when `bootstrap` is true and `next_state` is given.
    fn update(
        &mut self,
        state: &RlState,
        action: u8,
        reward: f64,
        next_state: Option<&RlState>,
        bootstrap: bool,
        learning_rate: f64,
        discount: f64,
    );
}

/// Hash-of-discretized-state table. Scalars are bucketed to the nearest
/// tenth before hashing, so nearby states collide into the same row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabularEstimator {
    table: HashMap<u64, [f64; ACTION_COUNT]>,
}

impl TabularEstimator {
    fn row(&self, state: &RlState) -> [f64; ACTION_COUNT] {
        *self.table.get(&discretize(state)).unwrap_or(&[0.0; ACTION_COUNT])
    }
}

impl QEstimator for TabularEstimator {
    fn get_q_values(&self, state: &RlState) -> [f64; ACTION_COUNT] {
        self.row(state)
    }

    fn update(
        &mut self,
        state: &RlState,
        action: u8,
        reward: f64,
        next_state: Option<&RlState>,
        bootstrap: bool,
        learning_rate: f64,
        discount: f64,
    ) {
        let key = discretize(state);
        let mut row = self.row(state);
        let a = action as usize;
        let target = if bootstrap {
            let next_max = next_state
                .map(|s| self.row(s).iter().cloned().fold(f64::MIN, f64::max))
                .unwrap_or(0.0);
            reward + discount * next_max
        } else {
            reward
        };
        row[a] += learning_rate * (target - row[a]);
        self.table.insert(key, row);
    }
}

fn discretize(state: &RlState) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    state.question_type.hash(&mut hasher);
    state.domain.hash(&mut hasher);
    state.has_entities.hash(&mut hasher);
    bucket(state.complexity).hash(&mut hasher);
    bucket(state.ambiguity).hash(&mut hasher);
    bucket(state.specificity).hash(&mut hasher);
    bucket(state.formality).hash(&mut hasher);
    bucket(state.urgency).hash(&mut hasher);
    hasher.finish()
}

fn bucket(scalar: f64) -> i64 {
    (scalar * 10.0).round() as i64
}

/// Small linear approximator: one weight vector per action, updated with
/// a single gradient step toward the TD target each call. Stands in for
/// the "small feed-forward network" mode without needing a tensor crate
/// for what is, per state, a handful of scalar features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproximateEstimator {
    weights: [Vec<f64>; ACTION_COUNT],
    bias: [f64; ACTION_COUNT],
}

impl Default for ApproximateEstimator {
    fn default() -> Self {
        let dim = RlState::fallback("").to_features().len();
        ApproximateEstimator {
            weights: std::array::from_fn(|_| vec![0.0; dim]),
            bias: [0.0; ACTION_COUNT],
        }
    }
}

impl ApproximateEstimator {
    fn q_for_action(&self, features: &[f64], action: usize) -> f64 {
        self.bias[action]
            + self.weights[action]
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

impl QEstimator for ApproximateEstimator {
    fn get_q_values(&self, state: &RlState) -> [f64; ACTION_COUNT] {
        let features = state.to_features();
        std::array::from_fn(|a| self.q_for_action(&features, a))
    }

    fn update(
        &mut self,
        state: &RlState,
        action: u8,
        reward: f64,
        next_state: Option<&RlState>,
        bootstrap: bool,
        learning_rate: f64,
        discount: f64,
    ) {
        let features = state.to_features();
        let a = action as usize;
        let q = self.q_for_action(&features, a);
        let target = if bootstrap {
            let next_max = next_state
                .map(|s| self.get_q_values(s).iter().cloned().fold(f64::MIN, f64::max))
                .unwrap_or(0.0);
            reward + discount * next_max
        } else {
            reward
        };
        let error = target - q;
        for (w, x) in self.weights[a].iter_mut().zip(&features) {
            *w += learning_rate * error * x;
        }
        self.bias[a] += learning_rate * error;
    }
}

/// Tagged union over both estimator modes, serialized whole to the
/// configured state path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum Estimator {
    Tabular(TabularEstimator),
    Approximate(ApproximateEstimator),
}

impl Estimator {
    pub fn new(mode: crate::config::RlEstimatorMode) -> Self {
        match mode {
            crate::config::RlEstimatorMode::Tabular => Estimator::Tabular(TabularEstimator::default()),
            crate::config::RlEstimatorMode::Approximate => Estimator::Approximate(ApproximateEstimator::default()),
        }
    }
}

impl QEstimator for Estimator {
    fn get_q_values(&self, state: &RlState) -> [f64; ACTION_COUNT] {
        match self {
            Estimator::Tabular(e) => e.get_q_values(state),
            Estimator::Approximate(e) => e.get_q_values(state),
        }
    }

    fn update(
        &mut self,
        state: &RlState,
        action: u8,
        reward: f64,
        next_state: Option<&RlState>,
        bootstrap: bool,
        learning_rate: f64,
        discount: f64,
    ) {
        match self {
            Estimator::Tabular(e) => e.update(state, action, reward, next_state, bootstrap, learning_rate, discount),
            Estimator::Approximate(e) => e.update(state, action, reward, next_state, bootstrap, learning_rate, discount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> RlState {
        RlState::fallback("how does photosynthesis work")
    }

    #[test]
    fn tabular_update_moves_q_value_toward_reward() {
        let mut estimator = TabularEstimator::default();
        let state = sample_state();
        assert_eq!(estimator.get_q_values(&state)[0], 0.0);
        estimator.update(&state, 0, 1.0, None, false, 0.5, 0.9);
        assert_eq!(estimator.get_q_values(&state)[0], 0.5);
    }

    #[test]
    fn approximate_update_moves_q_value_toward_reward() {
        let mut estimator = ApproximateEstimator::default();
        let state = sample_state();
        let before = estimator.get_q_values(&state)[1];
        estimator.update(&state, 1, 1.0, None, false, 0.5, 0.9);
        let after = estimator.get_q_values(&state)[1];
        assert!(after > before);
    }
}

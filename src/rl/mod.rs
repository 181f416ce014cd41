//! RL meta-selector (§4.8): feature-extracts a query, chooses a retrieval
//! strategy via ε-greedy selection over a learned value function (or the
//! model directly while the value function is cold), and learns from
//! human ratings submitted after the fact.

pub mod estimator;
mod selector;

pub use estimator::{ApproximateEstimator, Estimator, QEstimator, TabularEstimator, ACTION_COUNT};
pub use selector::{RetrievalStrategy, RlSelector};

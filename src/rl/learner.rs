use std::hash::Hash;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::q_table::QTable;
use crate::error::ConfigError;
use crate::numeric::argmax_random_tie;

/// Q-learning hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerParams {
    /// Learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Exploration probability while training.
    pub epsilon: f64,
}

impl Default for LearnerParams {
    fn default() -> Self {
        LearnerParams {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: 0.1,
        }
    }
}

impl LearnerParams {
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("gamma", self.gamma),
            ("epsilon", self.epsilon),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{section}.{name} must be in [0, 1] (got {value})"
                )));
            }
        }
        Ok(())
    }
}

/// Epsilon-greedy tabular Q-learner over `A` actions.
pub struct QLearner<K, const A: usize> {
    table: QTable<K, A>,
    params: LearnerParams,
    testing: bool,
    rng: StdRng,
}

impl<K: Eq + Hash + Clone, const A: usize> QLearner<K, A> {
    pub fn new(params: LearnerParams, rng: StdRng) -> Self {
        QLearner {
            table: QTable::new(),
            params,
            testing: false,
            rng,
        }
    }

    /// Epsilon-greedy action. Greedy ties are broken uniformly at random;
    /// testing mode never explores.
    pub fn choose_action(&mut self, state: &K) -> usize {
        let epsilon = if self.testing { 0.0 } else { self.params.epsilon };
        if self.rng.random::<f64>() < epsilon {
            return self.rng.random_range(0..A);
        }
        let values = self.table.get(state);
        argmax_random_tie(&values, &mut self.rng).unwrap_or(0)
    }

    /// One-step Q-learning backup. `done` suppresses bootstrapping from
    /// `next`. No-op in testing mode.
    pub fn update(&mut self, state: &K, action: usize, reward: f64, next: &K, done: bool) {
        if self.testing {
            return;
        }
        let max_next = if done { 0.0 } else { self.table.max_value(next) };
        let LearnerParams { alpha, gamma, .. } = self.params;
        let q = &mut self.table.values_mut(state)[action];
        *q += alpha * (reward + gamma * max_next - *q);
    }

    pub fn q_values(&self, state: &K) -> [f64; A] {
        self.table.get(state)
    }

    pub fn table(&self) -> &QTable<K, A> {
        &self.table
    }

    pub fn replace_table(&mut self, table: QTable<K, A>) {
        self.table = table;
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn params(&self) -> LearnerParams {
        self.params
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.params.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.params.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn set_testing(&mut self, testing: bool) {
        self.testing = testing;
    }

    pub fn is_testing(&self) -> bool {
        self.testing
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

//! Grid-world lab: an agent walks from a start cell to a goal while avoiding
//! holes, learning either by tabular Q-learning or by value-iteration sweeps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::learner::{LearnerParams, QLearner};
use super::q_table::QTable;
use crate::engine::Engine;
use crate::error::{ConfigError, PersistenceError};
use crate::grid::{Direction, Grid, GridPos};
use crate::numeric::{argmax_first, seeded_rng};
use crate::training::metrics::{EpisodeSummary, SeriesWindow};

/// Store key for saved grid-world policies.
pub const POLICY_KEY: &str = "rl_policy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridWorldTerrain {
    Empty,
    Goal,
    Hole,
}

impl GridWorldTerrain {
    pub fn is_terminal(self) -> bool {
        self != GridWorldTerrain::Empty
    }
}

/// Learning method, chosen when the lab is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridWorldMethod {
    #[serde(rename = "qlearning")]
    QLearning,
    #[serde(rename = "valueiteration")]
    ValueIteration,
}

impl GridWorldMethod {
    pub fn name(self) -> &'static str {
        match self {
            GridWorldMethod::QLearning => "qlearning",
            GridWorldMethod::ValueIteration => "valueiteration",
        }
    }
}

impl fmt::Display for GridWorldMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GridWorldMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qlearning" | "q-learning" => Ok(GridWorldMethod::QLearning),
            "valueiteration" | "value-iteration" => Ok(GridWorldMethod::ValueIteration),
            _ => Err(format!(
                "unknown method '{s}' (expected qlearning or valueiteration)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridWorldRewards {
    pub step: f64,
    pub goal: f64,
    pub hole: f64,
}

impl Default for GridWorldRewards {
    fn default() -> Self {
        GridWorldRewards {
            step: -0.1,
            goal: 10.0,
            hole: -10.0,
        }
    }
}

impl GridWorldRewards {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("step", self.step), ("goal", self.goal), ("hole", self.hole)] {
            if !value.is_finite() {
                return Err(ConfigError::Validation(format!(
                    "gridworld.rewards.{name} must be finite (got {value})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridWorldConfig {
    pub cols: usize,
    pub rows: usize,
    pub start: GridPos,
    pub goal: GridPos,
    pub holes: Vec<GridPos>,
    pub rewards: GridWorldRewards,
    pub learner: LearnerParams,
    /// Step cap per episode.
    pub max_steps: usize,
    pub method: GridWorldMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GridWorldConfig {
    fn default() -> Self {
        GridWorldConfig {
            cols: 10,
            rows: 10,
            start: GridPos::new(0, 0),
            goal: GridPos::new(9, 9),
            holes: [(1, 2), (2, 2), (3, 2), (5, 5), (6, 5), (4, 8), (8, 1), (8, 2)]
                .into_iter()
                .map(|(c, r)| GridPos::new(c, r))
                .collect(),
            rewards: GridWorldRewards::default(),
            learner: LearnerParams::default(),
            max_steps: 100,
            method: GridWorldMethod::QLearning,
            seed: None,
        }
    }
}

impl GridWorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::Validation(
                "gridworld.cols and gridworld.rows must be > 0".into(),
            ));
        }
        let inside = |p: &GridPos| p.col < self.cols && p.row < self.rows;
        if !inside(&self.start) || !inside(&self.goal) || !self.holes.iter().all(inside) {
            return Err(ConfigError::Validation(
                "gridworld start, goal and holes must lie inside the grid".into(),
            ));
        }
        if self.start == self.goal || self.holes.contains(&self.start) {
            return Err(ConfigError::Validation(
                "gridworld.start must not be the goal or a hole".into(),
            ));
        }
        if self.holes.contains(&self.goal) {
            return Err(ConfigError::Validation(format!(
                "gridworld.goal {} is also listed in gridworld.holes",
                self.goal
            )));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Validation(
                "gridworld.max_steps must be >= 1".into(),
            ));
        }
        self.rewards.validate()?;
        self.learner.validate("gridworld.learner")
    }
}

/// What one lab step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridWorldStep {
    /// The agent moved (Q-learning, or greedy testing under value iteration).
    Moved {
        from: GridPos,
        action: Direction,
        to: GridPos,
        reward: f64,
        done: bool,
        /// Set when this move ended a counted training episode.
        episode: Option<EpisodeSummary>,
    },
    /// One value-iteration sweep; `delta` is the largest value change.
    Swept { delta: f64 },
}

/// Saved form of a grid-world policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridWorldSnapshot {
    pub q_table: BTreeMap<String, Vec<f64>>,
    pub v_table: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<GridWorldMethod>,
}

pub struct GridWorldLab {
    terrain: Grid<GridWorldTerrain>,
    config: GridWorldConfig,
    method: GridWorldMethod,
    learner: QLearner<GridPos, 4>,
    values: Grid<f64>,
    agent: GridPos,
    episode: u64,
    episode_reward: f64,
    steps: usize,
    testing: bool,
    rewards_history: SeriesWindow,
}

impl GridWorldLab {
    pub fn new(config: GridWorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut terrain = Grid::new(config.cols, config.rows, GridWorldTerrain::Empty)?;
        for &hole in &config.holes {
            terrain.set(hole, GridWorldTerrain::Hole);
        }
        terrain.set(config.goal, GridWorldTerrain::Goal);
        let values = Grid::new(config.cols, config.rows, 0.0)?;
        Ok(GridWorldLab {
            terrain,
            method: config.method,
            learner: QLearner::new(config.learner, seeded_rng(config.seed)),
            values,
            agent: config.start,
            episode: 0,
            episode_reward: 0.0,
            steps: 0,
            testing: false,
            rewards_history: SeriesWindow::new(),
            config,
        })
    }

    /// Clear both tables, the episode counter and the reward history.
    pub fn reset(&mut self) {
        self.learner.clear();
        self.learner.set_testing(false);
        self.values.fill(0.0);
        self.agent = self.config.start;
        self.episode = 0;
        self.episode_reward = 0.0;
        self.steps = 0;
        self.testing = false;
        self.rewards_history.clear();
    }

    /// Switch learning method. Resets the simulation.
    pub fn set_method(&mut self, method: GridWorldMethod) {
        self.method = method;
        self.reset();
        log::debug!("grid-world method set to {method}");
    }

    /// Enter or leave pure-evaluation mode. Entering puts the agent back on
    /// the start cell.
    pub fn set_testing(&mut self, testing: bool) {
        self.testing = testing;
        self.learner.set_testing(testing);
        if testing {
            self.agent = self.config.start;
            self.episode_reward = 0.0;
            self.steps = 0;
        }
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.learner.set_alpha(alpha);
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.learner.set_epsilon(epsilon);
    }

    fn reward_for(&self, pos: GridPos) -> f64 {
        let r = &self.config.rewards;
        match self.terrain.get(pos) {
            GridWorldTerrain::Hole => r.hole,
            GridWorldTerrain::Goal => r.goal,
            GridWorldTerrain::Empty => r.step,
        }
    }

    /// Advance by one step of the configured method.
    pub fn step(&mut self) -> GridWorldStep {
        match self.method {
            GridWorldMethod::QLearning => self.step_q_learning(),
            GridWorldMethod::ValueIteration => self.step_value_iteration(),
        }
    }

    fn step_q_learning(&mut self) -> GridWorldStep {
        let from = self.agent;
        let action_index = self.learner.choose_action(&from);
        let action = Direction::from_index(action_index).unwrap_or(Direction::Up);
        let to = self.terrain.step(from, action);
        let reward = self.reward_for(to);
        let done = self.terrain.get(to).is_terminal();

        self.learner.update(&from, action_index, reward, &to, done);

        self.agent = to;
        self.episode_reward += reward;
        self.steps += 1;
        let episode = self.finish_episode_if(done);
        GridWorldStep::Moved {
            from,
            action,
            to,
            reward,
            done,
            episode,
        }
    }

    fn finish_episode_if(&mut self, done: bool) -> Option<EpisodeSummary> {
        if !done && self.steps < self.config.max_steps {
            return None;
        }
        let summary = EpisodeSummary {
            episode: self.episode,
            total_reward: self.episode_reward,
            steps: self.steps,
            reached_goal: *self.terrain.get(self.agent) == GridWorldTerrain::Goal,
        };
        let counted = !self.testing;
        if counted {
            self.rewards_history.record(summary.total_reward);
            self.episode += 1;
            log::debug!(
                "episode {} finished: reward {:.2} in {} steps (goal: {})",
                summary.episode,
                summary.total_reward,
                summary.steps,
                summary.reached_goal
            );
        }
        self.agent = self.config.start;
        self.episode_reward = 0.0;
        self.steps = 0;
        counted.then_some(summary)
    }

    fn step_value_iteration(&mut self) -> GridWorldStep {
        if self.testing {
            return self.move_greedy();
        }
        GridWorldStep::Swept {
            delta: self.sweep_values(),
        }
    }

    /// One synchronous sweep; terminal cells are held at zero.
    pub fn sweep_values(&mut self) -> f64 {
        let previous = self.values.clone();
        let mut delta: f64 = 0.0;
        for pos in self.terrain.positions() {
            if self.terrain.get(pos).is_terminal() {
                self.values.set(pos, 0.0);
                continue;
            }
            let best = Direction::ALL
                .into_iter()
                .map(|d| self.lookahead(&previous, pos, d))
                .fold(f64::NEG_INFINITY, f64::max);
            delta = delta.max((best - previous.get(pos)).abs());
            self.values.set(pos, best);
        }
        delta
    }

    fn lookahead(&self, values: &Grid<f64>, pos: GridPos, action: Direction) -> f64 {
        let next = self.terrain.step(pos, action);
        self.reward_for(next) + self.config.learner.gamma * values.get(next)
    }

    fn move_greedy(&mut self) -> GridWorldStep {
        let from = self.agent;
        let scores: Vec<f64> = Direction::ALL
            .into_iter()
            .map(|d| self.lookahead(&self.values, from, d))
            .collect();
        let action = argmax_first(&scores)
            .and_then(Direction::from_index)
            .unwrap_or(Direction::Up);
        let to = self.terrain.step(from, action);
        let reward = self.reward_for(to);
        let done = self.terrain.get(to).is_terminal();
        self.agent = if done { self.config.start } else { to };
        GridWorldStep::Moved {
            from,
            action,
            to,
            reward,
            done,
            episode: None,
        }
    }

    /// Greedy action for display: argmax Q under Q-learning, best one-step
    /// lookahead under value iteration. Ties go to the first action.
    pub fn greedy_action(&self, pos: GridPos) -> Direction {
        let scores: Vec<f64> = match self.method {
            GridWorldMethod::QLearning => self.learner.q_values(&pos).to_vec(),
            GridWorldMethod::ValueIteration => Direction::ALL
                .into_iter()
                .map(|d| self.lookahead(&self.values, pos, d))
                .collect(),
        };
        argmax_first(&scores)
            .and_then(Direction::from_index)
            .unwrap_or(Direction::Up)
    }

    pub fn q_values(&self, pos: GridPos) -> [f64; 4] {
        self.learner.q_values(&pos)
    }

    pub fn v_value(&self, pos: GridPos) -> f64 {
        *self.values.get(pos)
    }

    pub fn terrain(&self, pos: GridPos) -> GridWorldTerrain {
        *self.terrain.get(pos)
    }

    pub fn agent(&self) -> GridPos {
        self.agent
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn episode_reward(&self) -> f64 {
        self.episode_reward
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_testing(&self) -> bool {
        self.testing
    }

    pub fn method(&self) -> GridWorldMethod {
        self.method
    }

    pub fn reward_history(&self) -> &SeriesWindow {
        &self.rewards_history
    }

    pub fn q_table(&self) -> &QTable<GridPos, 4> {
        self.learner.table()
    }

    pub fn config(&self) -> &GridWorldConfig {
        &self.config
    }

    pub fn snapshot(&self) -> GridWorldSnapshot {
        GridWorldSnapshot {
            q_table: self.learner.table().to_snapshot(),
            v_table: self
                .values
                .iter()
                .map(|(pos, &v)| (pos.to_string(), v))
                .collect(),
            method: Some(self.method),
        }
    }

    /// Replace both tables from a snapshot. Everything is validated before
    /// anything is replaced, so a failed restore leaves the lab untouched.
    /// The method and episode counters are kept.
    pub fn restore(&mut self, snapshot: &GridWorldSnapshot) -> Result<(), PersistenceError> {
        let q_table = QTable::<GridPos, 4>::from_snapshot(&snapshot.q_table)?;
        if let Some((pos, _)) = q_table.iter().find(|(pos, _)| !self.terrain.contains(**pos)) {
            return Err(PersistenceError::InvalidSnapshot(format!(
                "qTable state {pos} is outside the {}x{} grid",
                self.terrain.cols(),
                self.terrain.rows()
            )));
        }

        let mut values = self.values.clone();
        values.fill(0.0);
        for (key, &v) in &snapshot.v_table {
            let pos: GridPos = key.parse()?;
            if !values.contains(pos) {
                return Err(PersistenceError::InvalidSnapshot(format!(
                    "vTable state {pos} is outside the grid"
                )));
            }
            values.set(pos, v);
        }

        self.learner.replace_table(q_table);
        self.values = values;
        log::info!(
            "restored grid-world policy ({} Q states, {} V states)",
            self.learner.table().len(),
            snapshot.v_table.len()
        );
        Ok(())
    }
}

impl Engine for GridWorldLab {
    type Step = GridWorldStep;

    fn name(&self) -> &str {
        "GridWorld"
    }

    fn step(&mut self) -> GridWorldStep {
        GridWorldLab::step(self)
    }
}

//! Snake with a heading-invariant tabular Q-learner.
//!
//! The state is seven bits: danger straight/right/left relative to the
//! current heading, then whether food is left/right/up/down of the head.
//! Actions are relative turns, so the table has three columns.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::learner::{LearnerParams, QLearner};
use super::q_table::QTable;
use crate::engine::Engine;
use crate::error::{ConfigError, KeyParseError, PersistenceError};
use crate::grid::{Direction, Grid, GridPos};
use crate::numeric::seeded_rng;
use crate::training::metrics::SeriesWindow;

/// Store key for saved snake policies.
pub const POLICY_KEY: &str = "snake_rl_policy";

/// Turn relative to the current heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelativeAction {
    Straight,
    Right,
    Left,
}

impl RelativeAction {
    pub const ALL: [RelativeAction; 3] = [
        RelativeAction::Straight,
        RelativeAction::Right,
        RelativeAction::Left,
    ];

    pub fn index(self) -> usize {
        match self {
            RelativeAction::Straight => 0,
            RelativeAction::Right => 1,
            RelativeAction::Left => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<RelativeAction> {
        RelativeAction::ALL.get(index).copied()
    }

    pub fn apply(self, heading: Direction) -> Direction {
        match self {
            RelativeAction::Straight => heading,
            RelativeAction::Right => heading.turn_right(),
            RelativeAction::Left => heading.turn_left(),
        }
    }
}

/// The 7-bit state key. Displays and parses as a string of seven `0`/`1`
/// digits in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SnakeFeatures {
    pub danger_straight: bool,
    pub danger_right: bool,
    pub danger_left: bool,
    pub food_left: bool,
    pub food_right: bool,
    pub food_up: bool,
    pub food_down: bool,
}

impl SnakeFeatures {
    fn bits(&self) -> [bool; 7] {
        [
            self.danger_straight,
            self.danger_right,
            self.danger_left,
            self.food_left,
            self.food_right,
            self.food_up,
            self.food_down,
        ]
    }
}

impl fmt::Display for SnakeFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for SnakeFeatures {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Some(false),
                '1' => Some(true),
                _ => None,
            })
            .collect::<Option<Vec<bool>>>()
            .filter(|b| b.len() == 7)
            .ok_or_else(|| KeyParseError::SnakeFeatures(s.to_string()))?;
        Ok(SnakeFeatures {
            danger_straight: bits[0],
            danger_right: bits[1],
            danger_left: bits[2],
            food_left: bits[3],
            food_right: bits[4],
            food_up: bits[5],
            food_down: bits[6],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnakeRewards {
    pub food: f64,
    pub death: f64,
    /// Reward for an ordinary move.
    pub step: f64,
}

impl Default for SnakeRewards {
    fn default() -> Self {
        SnakeRewards {
            food: 10.0,
            death: -10.0,
            step: -0.1,
        }
    }
}

impl SnakeRewards {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("food", self.food), ("death", self.death), ("step", self.step)] {
            if !value.is_finite() {
                return Err(ConfigError::Validation(format!(
                    "snake.rewards.{name} must be finite (got {value})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnakeConfig {
    pub cols: usize,
    pub rows: usize,
    pub rewards: SnakeRewards,
    pub learner: LearnerParams,
    /// Ends an episode without a death penalty after this many moves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_episode_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SnakeConfig {
    fn default() -> Self {
        SnakeConfig {
            cols: 20,
            rows: 20,
            rewards: SnakeRewards::default(),
            learner: LearnerParams::default(),
            max_episode_steps: None,
            seed: None,
        }
    }
}

impl SnakeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The starting body spans (cols/2 - 2 ..= cols/2, rows/2).
        if self.cols < 4 || self.rows < 1 {
            return Err(ConfigError::Validation(
                "snake board must be at least 4 columns by 1 row".into(),
            ));
        }
        if self.max_episode_steps == Some(0) {
            return Err(ConfigError::Validation(
                "snake.max_episode_steps must be >= 1 when set".into(),
            ));
        }
        self.rewards.validate()?;
        self.learner.validate("snake.learner")
    }
}

/// Summary of a finished snake episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnakeEpisode {
    pub episode: u64,
    pub total_reward: f64,
    pub score: u32,
    pub steps: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnakeStep {
    /// A move was made and learned from.
    Moved {
        state: SnakeFeatures,
        action: RelativeAction,
        reward: f64,
        ate: bool,
        died: bool,
    },
    /// The previous move ended the game; it was recorded and the board reset.
    Restarted(SnakeEpisode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnakeSnapshot {
    pub q_table: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub episode: u64,
    #[serde(default)]
    pub high_score: u32,
}

pub struct SnakeLab {
    bounds: Grid<()>,
    config: SnakeConfig,
    learner: QLearner<SnakeFeatures, 3>,
    /// Head first.
    body: VecDeque<GridPos>,
    heading: Direction,
    food: Option<GridPos>,
    score: u32,
    high_score: u32,
    episode: u64,
    episode_reward: f64,
    steps: usize,
    game_over: bool,
    rewards_history: SeriesWindow,
}

impl SnakeLab {
    pub fn new(config: SnakeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bounds = Grid::new(config.cols, config.rows, ())?;
        let mut lab = SnakeLab {
            bounds,
            learner: QLearner::new(config.learner, seeded_rng(config.seed)),
            body: VecDeque::new(),
            heading: Direction::Right,
            food: None,
            score: 0,
            high_score: 0,
            episode: 0,
            episode_reward: 0.0,
            steps: 0,
            game_over: false,
            rewards_history: SeriesWindow::new(),
            config,
        };
        lab.reset_game();
        Ok(lab)
    }

    /// New board: three-segment snake in the middle heading right, fresh food.
    pub fn reset_game(&mut self) {
        let (mid_col, mid_row) = (self.bounds.cols() / 2, self.bounds.rows() / 2);
        self.body = (0..3)
            .map(|i| GridPos::new(mid_col - i, mid_row))
            .collect();
        self.heading = Direction::Right;
        self.score = 0;
        self.episode_reward = 0.0;
        self.steps = 0;
        self.game_over = false;
        self.spawn_food();
    }

    /// Forget everything learned: table, episode counter and history.
    pub fn reset(&mut self) {
        self.learner.clear();
        self.episode = 0;
        self.high_score = 0;
        self.rewards_history.clear();
        self.reset_game();
    }

    fn spawn_food(&mut self) {
        let free: Vec<GridPos> = self
            .bounds
            .positions()
            .filter(|p| !self.body.contains(p))
            .collect();
        self.food = if free.is_empty() {
            None
        } else {
            let i = self.learner.rng_mut().random_range(0..free.len());
            Some(free[i])
        };
    }

    /// True if `pos` is off the board or on a body segment other than the
    /// tail, which moves away on the next step.
    fn is_danger(&self, pos: Option<GridPos>) -> bool {
        match pos {
            None => true,
            Some(p) => self.body.iter().take(self.body.len().saturating_sub(1)).any(|&b| b == p),
        }
    }

    pub fn features(&self) -> SnakeFeatures {
        let head = self.head();
        let look = |d: Direction| self.is_danger(self.bounds.offset(head, d.delta()));
        let (food_left, food_right, food_up, food_down) = match self.food {
            Some(f) => (f.col < head.col, f.col > head.col, f.row < head.row, f.row > head.row),
            None => (false, false, false, false),
        };
        SnakeFeatures {
            danger_straight: look(self.heading),
            danger_right: look(self.heading.turn_right()),
            danger_left: look(self.heading.turn_left()),
            food_left,
            food_right,
            food_up,
            food_down,
        }
    }

    pub fn step(&mut self) -> SnakeStep {
        if self.game_over {
            return SnakeStep::Restarted(self.finish_episode());
        }

        let state = self.features();
        let action =
            RelativeAction::from_index(self.learner.choose_action(&state)).unwrap_or(RelativeAction::Straight);
        self.heading = action.apply(self.heading);

        let rewards = self.config.rewards;
        let next_head = self.bounds.offset(self.head(), self.heading.delta());
        let (reward, ate, died) = match next_head {
            Some(p) if !self.body.contains(&p) => {
                self.body.push_front(p);
                if Some(p) == self.food {
                    self.score += 1;
                    self.high_score = self.high_score.max(self.score);
                    self.spawn_food();
                    (rewards.food, true, false)
                } else {
                    self.body.pop_back();
                    (rewards.step, false, false)
                }
            }
            _ => (rewards.death, false, true),
        };

        self.episode_reward += reward;
        self.steps += 1;
        if died {
            self.game_over = true;
            self.learner.update(&state, action.index(), reward, &state, true);
        } else {
            let next_state = self.features();
            self.learner.update(&state, action.index(), reward, &next_state, false);
            if self.config.max_episode_steps.is_some_and(|cap| self.steps >= cap) {
                self.game_over = true;
            }
        }

        SnakeStep::Moved {
            state,
            action,
            reward,
            ate,
            died,
        }
    }

    fn finish_episode(&mut self) -> SnakeEpisode {
        let summary = SnakeEpisode {
            episode: self.episode,
            total_reward: self.episode_reward,
            score: self.score,
            steps: self.steps,
        };
        self.episode += 1;
        self.rewards_history.record(summary.total_reward);
        log::debug!(
            "snake episode {} ended: score {}, reward {:.1}, {} moves",
            summary.episode,
            summary.score,
            summary.total_reward,
            summary.steps
        );
        self.reset_game();
        summary
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.learner.set_epsilon(epsilon);
    }

    pub fn head(&self) -> GridPos {
        self.body[0]
    }

    pub fn body(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.body.iter().copied()
    }

    /// Number of body segments.
    pub fn length(&self) -> usize {
        self.body.len()
    }

    pub fn heading(&self) -> Direction {
        self.heading
    }

    pub fn food(&self) -> Option<GridPos> {
        self.food
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn reward_history(&self) -> &SeriesWindow {
        &self.rewards_history
    }

    pub fn q_values(&self, state: &SnakeFeatures) -> [f64; 3] {
        self.learner.q_values(state)
    }

    pub fn q_table(&self) -> &QTable<SnakeFeatures, 3> {
        self.learner.table()
    }

    pub fn snapshot(&self) -> SnakeSnapshot {
        SnakeSnapshot {
            q_table: self.learner.table().to_snapshot(),
            episode: self.episode,
            high_score: self.high_score,
        }
    }

    /// Replace the table, episode counter and high score. Nothing changes if
    /// the snapshot is invalid.
    pub fn restore(&mut self, snapshot: &SnakeSnapshot) -> Result<(), PersistenceError> {
        let table = QTable::<SnakeFeatures, 3>::from_snapshot(&snapshot.q_table)?;
        self.learner.replace_table(table);
        self.episode = snapshot.episode;
        self.high_score = snapshot.high_score;
        log::info!(
            "restored snake policy ({} states, episode {}, high score {})",
            snapshot.q_table.len(),
            self.episode,
            self.high_score
        );
        Ok(())
    }

    #[cfg(test)]
    fn place(&mut self, body: &[GridPos], heading: Direction, food: Option<GridPos>) {
        self.body = body.iter().copied().collect();
        self.heading = heading;
        self.food = food;
    }
}

impl Engine for SnakeLab {
    type Step = SnakeStep;

    fn name(&self) -> &str {
        "Snake"
    }

    fn step(&mut self) -> SnakeStep {
        SnakeLab::step(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lab() -> SnakeLab {
        SnakeLab::new(SnakeConfig {
            seed: Some(9),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_initial_board() {
        let lab = lab();
        let body: Vec<GridPos> = lab.body().collect();
        assert_eq!(
            body,
            vec![GridPos::new(10, 10), GridPos::new(9, 10), GridPos::new(8, 10)]
        );
        assert_eq!(lab.heading(), Direction::Right);
        let food = lab.food().unwrap();
        assert!(!body.contains(&food));
    }

    #[test]
    fn test_feature_key_roundtrip() {
        let f = SnakeFeatures {
            danger_straight: true,
            food_right: true,
            food_down: true,
            ..Default::default()
        };
        assert_eq!(f.to_string(), "1000101");
        assert_eq!("1000101".parse::<SnakeFeatures>().unwrap(), f);
        assert!("100010".parse::<SnakeFeatures>().is_err());
        assert!("10001012".parse::<SnakeFeatures>().is_err());
        assert!("1000x01".parse::<SnakeFeatures>().is_err());
    }

    #[test]
    fn test_wall_ahead_is_danger() {
        let mut lab = lab();
        lab.place(
            &[GridPos::new(19, 5), GridPos::new(18, 5), GridPos::new(17, 5)],
            Direction::Right,
            Some(GridPos::new(0, 0)),
        );
        let f = lab.features();
        assert!(f.danger_straight);
        assert!(!f.danger_right);
        assert!(!f.danger_left);
        assert!(f.food_left && f.food_up);
        assert!(!f.food_right && !f.food_down);
    }

    #[test]
    fn test_tail_is_not_danger() {
        let mut lab = lab();
        // Head at (5,5) heading up, tail directly to its right.
        lab.place(
            &[
                GridPos::new(5, 5),
                GridPos::new(5, 6),
                GridPos::new(6, 6),
                GridPos::new(6, 5),
            ],
            Direction::Up,
            Some(GridPos::new(0, 0)),
        );
        assert!(!lab.features().danger_right);
    }

    #[test]
    fn test_relative_turns() {
        assert_eq!(RelativeAction::Right.apply(Direction::Right), Direction::Down);
        assert_eq!(RelativeAction::Left.apply(Direction::Right), Direction::Up);
        assert_eq!(RelativeAction::Straight.apply(Direction::Left), Direction::Left);
    }

    #[test]
    fn test_death_then_restart() {
        let mut lab = SnakeLab::new(SnakeConfig {
            cols: 4,
            rows: 1,
            seed: Some(2),
            ..Default::default()
        })
        .unwrap();
        // On a 4x1 board every turn leaves the board; only straight survives once.
        let mut died = false;
        for _ in 0..10 {
            if let SnakeStep::Moved { died: true, reward, .. } = lab.step() {
                assert_eq!(reward, -10.0);
                died = true;
                break;
            }
        }
        assert!(died);
        assert!(lab.is_game_over());
        match lab.step() {
            SnakeStep::Restarted(ep) => assert_eq!(ep.episode, 0),
            other => panic!("expected restart, got {other:?}"),
        }
        assert_eq!(lab.episode(), 1);
        assert!(!lab.is_game_over());
        assert_eq!(lab.length(), 3);
    }

    #[test]
    fn test_eating_grows_and_scores() {
        let mut lab = SnakeLab::new(SnakeConfig {
            seed: Some(4),
            learner: LearnerParams {
                epsilon: 0.0,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        lab.place(
            &[GridPos::new(10, 10), GridPos::new(9, 10), GridPos::new(8, 10)],
            Direction::Right,
            Some(GridPos::new(11, 10)),
        );
        // Make straight the clear greedy choice for this state.
        let state = lab.features();
        lab.learner.replace_table({
            let mut t = QTable::new();
            t.values_mut(&state)[0] = 1.0;
            t
        });
        match lab.step() {
            SnakeStep::Moved { ate, reward, .. } => {
                assert!(ate);
                assert_eq!(reward, 10.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(lab.length(), 4);
        assert_eq!(lab.score(), 1);
        assert_eq!(lab.high_score(), 1);
        assert_ne!(lab.food(), Some(GridPos::new(11, 10)));
    }

    #[test]
    fn test_step_cap_ends_episode_without_penalty() {
        let mut lab = SnakeLab::new(SnakeConfig {
            max_episode_steps: Some(1),
            seed: Some(6),
            ..Default::default()
        })
        .unwrap();
        lab.step();
        assert!(lab.is_game_over());
        assert!(matches!(lab.step(), SnakeStep::Restarted(_)));
    }

    #[test]
    fn test_restore_defaults_missing_counters() {
        let snapshot: SnakeSnapshot =
            serde_json::from_str(r#"{"qTable": {"0000101": [0.5, 0.0, -1.0]}}"#).unwrap();
        assert_eq!(snapshot.episode, 0);
        let mut lab = lab();
        lab.restore(&snapshot).unwrap();
        assert_eq!(lab.q_values(&"0000101".parse().unwrap()), [0.5, 0.0, -1.0]);
    }

    #[test]
    fn test_non_finite_reward_rejected() {
        let config = SnakeConfig {
            rewards: SnakeRewards {
                death: f64::NEG_INFINITY,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(SnakeLab::new(config).is_err());
    }

    #[test]
    fn test_restore_rejects_short_rows() {
        let snapshot: SnakeSnapshot =
            serde_json::from_str(r#"{"qTable": {"0000101": [0.5]}, "episode": 4}"#).unwrap();
        let mut lab = lab();
        assert!(lab.restore(&snapshot).is_err());
        assert_eq!(lab.episode(), 0);
    }

    #[test]
    fn test_missing_q_table_fails_to_parse() {
        let result: Result<SnakeSnapshot, _> = serde_json::from_str(r#"{"episode": 3}"#);
        assert!(result.is_err());
    }
}

//! Tabular reinforcement learning: a generic Q-table and epsilon-greedy
//! learner, plus the grid-world and Snake labs built on them.

pub mod gridworld;
pub mod learner;
pub mod q_table;
pub mod snake;

pub use gridworld::{GridWorldConfig, GridWorldLab, GridWorldMethod, GridWorldSnapshot};
pub use learner::{LearnerParams, QLearner};
pub use q_table::QTable;
pub use snake::{SnakeConfig, SnakeFeatures, SnakeLab, SnakeSnapshot};

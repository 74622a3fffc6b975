//! # Algorithm Lab
//!
//! Independent, steppable engines for classic algorithms, each owning its
//! state and advancing by one bounded unit of work per call. Rendering and
//! timing are left to the caller.
//!
//! ## Modules
//!
//! - [`search`]: BFS, DFS, uniform-cost and A* over a weighted grid
//! - [`mdp`]: value iteration on a slippery grid, plus policy rollouts
//! - [`rl`]: tabular Q-learning: the grid-world lab and a Snake agent
//! - [`neural`]: a small feed-forward network and its training playground
//! - [`supervised`]: online polynomial and logistic regression
//! - [`clustering`]: k-means with point presets
//! - [`engine`]: the shared `Engine` trait
//! - [`persistence`]: JSON policy snapshots on disk
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

pub mod clustering;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod grid;
pub mod mdp;
pub mod neural;
pub mod numeric;
pub mod persistence;
pub mod rl;
pub mod search;
pub mod supervised;
pub mod training;

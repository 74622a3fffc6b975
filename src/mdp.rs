//! Value iteration over a grid MDP with slippery ice.
//!
//! Sweeps are synchronous: every new value is computed from the previous
//! sweep's values. Fire and gold are terminal; their value is pinned to their
//! reward and they are skipped by the sweep, but a terminal successor
//! contributes only its reward to a Q-value (never reward plus value).

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::ConfigError;
use crate::grid::{Direction, Grid, GridPos};
use crate::numeric::seeded_rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MdpTerrain {
    Empty,
    Ice,
    Fire,
    Gold,
}

impl MdpTerrain {
    pub fn is_terminal(self) -> bool {
        matches!(self, MdpTerrain::Fire | MdpTerrain::Gold)
    }

    pub fn is_slippery(self) -> bool {
        self == MdpTerrain::Ice
    }
}

/// Reward for entering a cell of each terrain type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdpRewards {
    pub step: f64,
    pub fire: f64,
    pub gold: f64,
}

impl Default for MdpRewards {
    fn default() -> Self {
        MdpRewards {
            step: -1.0,
            fire: -50.0,
            gold: 50.0,
        }
    }
}

impl MdpRewards {
    pub fn for_terrain(&self, terrain: MdpTerrain) -> f64 {
        match terrain {
            MdpTerrain::Fire => self.fire,
            MdpTerrain::Gold => self.gold,
            MdpTerrain::Empty | MdpTerrain::Ice => self.step,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MdpConfig {
    pub cols: usize,
    pub rows: usize,
    pub gamma: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub rewards: MdpRewards,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for MdpConfig {
    fn default() -> Self {
        MdpConfig {
            cols: 8,
            rows: 6,
            gamma: 0.9,
            max_iterations: 100,
            tolerance: 0.001,
            rewards: MdpRewards::default(),
            seed: None,
        }
    }
}

impl MdpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::Validation(
                "mdp.cols and mdp.rows must be > 0".into(),
            ));
        }
        validate_gamma(self.gamma)?;
        if self.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "mdp.max_iterations must be >= 1".into(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(ConfigError::Validation("mdp.tolerance must be > 0".into()));
        }
        Ok(())
    }
}

fn validate_gamma(gamma: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&gamma) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "mdp.gamma must be in [0, 1] (got {gamma})"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MdpCell {
    pub terrain: MdpTerrain,
    /// State value estimate.
    pub v: f64,
    /// Best action from the last sweep; `None` for terminals and before solving.
    pub policy: Option<Direction>,
}

impl MdpCell {
    fn new(terrain: MdpTerrain) -> Self {
        MdpCell {
            terrain,
            v: 0.0,
            policy: None,
        }
    }
}

/// One possible outcome of taking an action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub direction: Direction,
    pub probability: f64,
    pub successor: GridPos,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepReport {
    pub iteration: usize,
    /// Largest value change among non-terminal cells.
    pub delta: f64,
    pub converged: bool,
}

/// Result of moving the rollout agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub position: GridPos,
    pub slipped: bool,
    pub bumped: bool,
    /// Set when the agent landed on a terminal cell.
    pub terminal_reward: Option<f64>,
}

pub struct MdpSolver {
    cells: Grid<MdpCell>,
    config: MdpConfig,
    iterations: usize,
    last_delta: f64,
    converged: bool,
    agent: Option<GridPos>,
    rng: StdRng,
}

impl MdpSolver {
    /// Empty grid with zeroed values.
    pub fn new(config: MdpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cells = Grid::new(config.cols, config.rows, MdpCell::new(MdpTerrain::Empty))?;
        Ok(MdpSolver {
            cells,
            iterations: 0,
            last_delta: f64::INFINITY,
            converged: false,
            agent: None,
            rng: seeded_rng(config.seed),
            config,
        })
    }

    /// Gold in the top-right corner, fire just below it, one ice cell at
    /// (2,2), solved.
    pub fn with_default_scenario(config: MdpConfig) -> Result<Self, ConfigError> {
        let mut solver = MdpSolver::new(config)?;
        let last = solver.cells.cols() - 1;
        solver.set_terrain(GridPos::new(last, 0), MdpTerrain::Gold);
        solver.set_terrain(GridPos::new(last, 1), MdpTerrain::Fire);
        solver.set_terrain(GridPos::new(2, 2), MdpTerrain::Ice);
        solver.solve();
        Ok(solver)
    }

    /// Replace the whole terrain layout. Values are reset, not solved.
    pub fn load_terrain(&mut self, terrain: &Grid<MdpTerrain>) -> Result<(), ConfigError> {
        let mut cells = Grid::new(terrain.cols(), terrain.rows(), MdpCell::new(MdpTerrain::Empty))?;
        for (pos, &t) in terrain.iter() {
            cells.set(pos, MdpCell::new(t));
        }
        self.cells = cells;
        self.config.cols = terrain.cols();
        self.config.rows = terrain.rows();
        self.agent = None;
        self.reset_values();
        Ok(())
    }

    /// Change one cell's terrain. Out-of-grid positions are ignored.
    pub fn set_terrain(&mut self, pos: GridPos, terrain: MdpTerrain) -> bool {
        if !self.cells.contains(pos) {
            return false;
        }
        self.cells.get_mut(pos).terrain = terrain;
        self.reset_values();
        true
    }

    pub fn set_gamma(&mut self, gamma: f64) -> Result<(), ConfigError> {
        validate_gamma(gamma)?;
        self.config.gamma = gamma;
        self.reset_values();
        Ok(())
    }

    /// Terminal values to their reward, everything else to zero.
    pub fn reset_values(&mut self) {
        let rewards = self.config.rewards;
        for pos in self.cells.positions() {
            let cell = self.cells.get_mut(pos);
            cell.policy = None;
            cell.v = if cell.terrain.is_terminal() {
                rewards.for_terrain(cell.terrain)
            } else {
                0.0
            };
        }
        self.iterations = 0;
        self.last_delta = f64::INFINITY;
        self.converged = false;
    }

    pub fn reward(&self, pos: GridPos) -> f64 {
        self.config.rewards.for_terrain(self.cells.get(pos).terrain)
    }

    /// Successors of taking `action` from `pos`. Ice splits the move into the
    /// intended direction (0.5) and the two perpendicular ones (0.25 each).
    pub fn transitions(&self, pos: GridPos, action: Direction) -> Vec<Transition> {
        let outcomes: &[(Direction, f64)] = if self.cells.get(pos).terrain.is_slippery() {
            &[
                (action, 0.5),
                (action.turn_right(), 0.25),
                (action.turn_left(), 0.25),
            ]
        } else {
            &[(action, 1.0)]
        };
        outcomes
            .iter()
            .map(|&(direction, probability)| Transition {
                direction,
                probability,
                successor: self.cells.step(pos, direction),
            })
            .collect()
    }

    /// Expected return of taking `action` in `pos` under the current values.
    pub fn calculate_q(&self, pos: GridPos, action: Direction) -> f64 {
        self.q_from(&self.cells, pos, action)
    }

    fn q_from(&self, values: &Grid<MdpCell>, pos: GridPos, action: Direction) -> f64 {
        self.transitions(pos, action)
            .iter()
            .map(|t| {
                let next = values.get(t.successor);
                let target = if next.terrain.is_terminal() { 0.0 } else { next.v };
                t.probability * (self.config.rewards.for_terrain(next.terrain) + self.config.gamma * target)
            })
            .sum()
    }

    /// One synchronous Bellman sweep.
    pub fn sweep(&mut self) -> SweepReport {
        let previous = self.cells.clone();
        let mut delta: f64 = 0.0;

        for pos in previous.positions() {
            if previous.get(pos).terrain.is_terminal() {
                continue;
            }
            let mut best_value = f64::NEG_INFINITY;
            let mut best_action = None;
            for action in Direction::ALL {
                let q = self.q_from(&previous, pos, action);
                if q > best_value {
                    best_value = q;
                    best_action = Some(action);
                }
            }
            delta = delta.max((previous.get(pos).v - best_value).abs());
            let cell = self.cells.get_mut(pos);
            cell.v = best_value;
            cell.policy = best_action;
        }

        self.iterations += 1;
        self.last_delta = delta;
        self.converged = delta < self.config.tolerance;
        SweepReport {
            iteration: self.iterations,
            delta,
            converged: self.converged,
        }
    }

    /// Reset values, then sweep until converged or the iteration cap.
    pub fn solve(&mut self) -> SweepReport {
        self.reset_values();
        let mut report = SweepReport {
            iteration: 0,
            delta: f64::INFINITY,
            converged: false,
        };
        while self.iterations < self.config.max_iterations {
            report = self.sweep();
            if report.converged {
                break;
            }
        }
        if report.converged {
            log::info!(
                "value iteration converged after {} sweeps (delta {:.6})",
                report.iteration,
                report.delta
            );
        } else {
            log::info!(
                "value iteration stopped at the {}-sweep cap (delta {:.6})",
                self.config.max_iterations,
                report.delta
            );
        }
        report
    }

    /// Put the rollout agent on the bottom-left cell.
    pub fn start_agent(&mut self) -> GridPos {
        let start = GridPos::new(0, self.cells.rows() - 1);
        self.agent = Some(start);
        start
    }

    pub fn place_agent(&mut self, pos: GridPos) -> bool {
        if !self.cells.contains(pos) {
            return false;
        }
        self.agent = Some(pos);
        true
    }

    pub fn stop_agent(&mut self) {
        self.agent = None;
    }

    pub fn agent(&self) -> Option<GridPos> {
        self.agent
    }

    /// Move the agent, sampling a slip when it stands on ice. Returns `None`
    /// when there is no agent.
    pub fn execute_action(&mut self, action: Direction) -> Option<MoveOutcome> {
        let from = self.agent?;
        let mut actual = action;
        let mut slipped = false;
        if self.cells.get(from).terrain.is_slippery() {
            let r: f64 = self.rng.random();
            if r >= 0.75 {
                actual = action.turn_left();
                slipped = true;
            } else if r >= 0.5 {
                actual = action.turn_right();
                slipped = true;
            }
        }
        let (position, bumped) = match self.cells.offset(from, actual.delta()) {
            Some(next) => (next, false),
            None => (from, true),
        };
        self.agent = Some(position);
        let landed = self.cells.get(position).terrain;
        let terminal_reward = landed
            .is_terminal()
            .then(|| self.config.rewards.for_terrain(landed));
        log::debug!("agent {from} -> {position} via {} (slipped: {slipped}, bumped: {bumped})", actual.name());
        Some(MoveOutcome {
            position,
            slipped,
            bumped,
            terminal_reward,
        })
    }

    /// Follow the current policy for one move. Returns `None` without an
    /// agent, on a terminal cell, or when the cell has no policy yet.
    pub fn policy_step(&mut self) -> Option<MoveOutcome> {
        let at = self.agent?;
        let cell = self.cells.get(at);
        if cell.terrain.is_terminal() {
            return None;
        }
        let action = cell.policy?;
        self.execute_action(action)
    }

    pub fn cell(&self, pos: GridPos) -> &MdpCell {
        self.cells.get(pos)
    }

    pub fn cells(&self) -> &Grid<MdpCell> {
        &self.cells
    }

    pub fn value(&self, pos: GridPos) -> f64 {
        self.cells.get(pos).v
    }

    pub fn policy(&self, pos: GridPos) -> Option<Direction> {
        self.cells.get(pos).policy
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn config(&self) -> &MdpConfig {
        &self.config
    }
}

impl Engine for MdpSolver {
    type Step = SweepReport;

    fn name(&self) -> &str {
        "ValueIteration"
    }

    fn step(&mut self) -> SweepReport {
        self.sweep()
    }

    fn is_finished(&self) -> bool {
        self.converged || self.iterations >= self.config.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(cols: usize, rows: usize) -> MdpSolver {
        MdpSolver::new(MdpConfig {
            cols,
            rows,
            seed: Some(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_gamma_rejected() {
        let config = MdpConfig {
            gamma: 1.5,
            ..Default::default()
        };
        assert!(MdpSolver::new(config).is_err());
    }

    #[test]
    fn test_ice_transitions_split_probability() {
        let mut s = small(3, 3);
        s.set_terrain(GridPos::new(1, 1), MdpTerrain::Ice);
        let t = s.transitions(GridPos::new(1, 1), Direction::Up);
        assert_eq!(t.len(), 3);
        let total: f64 = t.iter().map(|t| t.probability).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(t[0].successor, GridPos::new(1, 0));
        assert_eq!(t[1].successor, GridPos::new(2, 1));
        assert_eq!(t[2].successor, GridPos::new(0, 1));
    }

    #[test]
    fn test_off_grid_move_bounces() {
        let s = small(2, 2);
        let t = s.transitions(GridPos::new(0, 0), Direction::Left);
        assert_eq!(t[0].successor, GridPos::new(0, 0));
    }

    #[test]
    fn test_terminal_successor_counts_reward_only() {
        let mut s = small(2, 1);
        s.set_terrain(GridPos::new(1, 0), MdpTerrain::Gold);
        assert_eq!(s.value(GridPos::new(1, 0)), 50.0);
        assert_eq!(s.calculate_q(GridPos::new(0, 0), Direction::Right), 50.0);
    }

    #[test]
    fn test_terminals_pinned_through_solve() {
        let mut s = MdpSolver::with_default_scenario(MdpConfig::default()).unwrap();
        assert_eq!(s.value(GridPos::new(7, 0)), 50.0);
        assert_eq!(s.value(GridPos::new(7, 1)), -50.0);
        assert_eq!(s.policy(GridPos::new(7, 0)), None);
        let report = s.solve();
        assert!(report.converged);
        assert_eq!(s.value(GridPos::new(7, 0)), 50.0);
    }

    #[test]
    fn test_policy_next_to_gold_points_at_it() {
        let s = MdpSolver::with_default_scenario(MdpConfig::default()).unwrap();
        assert_eq!(s.policy(GridPos::new(6, 0)), Some(Direction::Right));
        assert_eq!(s.value(GridPos::new(6, 0)), 50.0);
    }

    #[test]
    fn test_sweep_is_synchronous() {
        // Corridor E E G: after one sweep only the cell adjacent to gold moves.
        let mut s = small(3, 1);
        s.set_terrain(GridPos::new(2, 0), MdpTerrain::Gold);
        s.sweep();
        assert_eq!(s.value(GridPos::new(1, 0)), 50.0);
        assert_eq!(s.value(GridPos::new(0, 0)), -1.0);
    }

    #[test]
    fn test_tie_breaks_by_action_order() {
        // Single open cell: every action bounces, all Q-values equal.
        let mut s = small(1, 1);
        s.sweep();
        assert_eq!(s.policy(GridPos::new(0, 0)), Some(Direction::Up));
    }

    #[test]
    fn test_rollout_reaches_gold_without_ice() {
        let mut s = small(4, 3);
        s.set_terrain(GridPos::new(3, 0), MdpTerrain::Gold);
        s.solve();
        s.start_agent();
        let mut last = None;
        for _ in 0..20 {
            match s.policy_step() {
                Some(outcome) => last = Some(outcome),
                None => break,
            }
        }
        let last = last.unwrap();
        assert_eq!(last.position, GridPos::new(3, 0));
        assert_eq!(last.terminal_reward, Some(50.0));
        assert!(!last.slipped);
    }

    #[test]
    fn test_bump_reported_at_edge() {
        let mut s = small(2, 2);
        s.start_agent();
        let outcome = s.execute_action(Direction::Down).unwrap();
        assert!(outcome.bumped);
        assert_eq!(outcome.position, GridPos::new(0, 1));
    }

    #[test]
    fn test_no_agent_means_no_move() {
        let mut s = small(2, 2);
        assert_eq!(s.execute_action(Direction::Up), None);
        assert_eq!(s.policy_step(), None);
    }
}

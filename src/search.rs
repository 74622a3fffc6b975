//! Stepwise BFS / DFS / UCS / A* over a weighted 4-connected grid.
//!
//! The engine keeps one frontier list for every algorithm and only the
//! selection rule differs: front for BFS, back for DFS, lowest `f` for UCS and
//! A* (first inserted wins ties). The goal test happens when a node is popped,
//! so the reported path reflects actual visitation order.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::ConfigError;
use crate::grid::{Grid, GridPos};
use crate::numeric::seeded_rng;

/// Terrain types for the search grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTerrain {
    Empty,
    Wall,
    Mud,
    Water,
}

impl SearchTerrain {
    /// Cost of entering a cell; `None` for walls.
    pub fn cost(self) -> Option<f64> {
        match self {
            SearchTerrain::Empty => Some(1.0),
            SearchTerrain::Mud => Some(5.0),
            SearchTerrain::Water => Some(10.0),
            SearchTerrain::Wall => None,
        }
    }

    pub fn is_passable(self) -> bool {
        self != SearchTerrain::Wall
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchAlgorithm {
    Bfs,
    Dfs,
    Ucs,
    #[serde(rename = "astar")]
    AStar,
}

impl SearchAlgorithm {
    pub const ALL: [SearchAlgorithm; 4] = [
        SearchAlgorithm::Bfs,
        SearchAlgorithm::Dfs,
        SearchAlgorithm::Ucs,
        SearchAlgorithm::AStar,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SearchAlgorithm::Bfs => "bfs",
            SearchAlgorithm::Dfs => "dfs",
            SearchAlgorithm::Ucs => "ucs",
            SearchAlgorithm::AStar => "astar",
        }
    }
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchAlgorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown search algorithm '{s}' (expected bfs, dfs, ucs or astar)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Running,
    Found,
    Unreachable,
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub cols: usize,
    pub rows: usize,
    pub start: GridPos,
    pub goal: GridPos,
    pub algorithm: SearchAlgorithm,
    pub wall_probability: f64,
    pub map_attempts: usize,
    pub position_attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            cols: 20,
            rows: 15,
            start: GridPos::new(2, 7),
            goal: GridPos::new(17, 7),
            algorithm: SearchAlgorithm::Bfs,
            wall_probability: 0.3,
            map_attempts: 10,
            position_attempts: 100,
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::Validation(
                "search.cols and search.rows must be > 0".into(),
            ));
        }
        let inside = |p: GridPos| p.col < self.cols && p.row < self.rows;
        if !inside(self.start) || !inside(self.goal) {
            return Err(ConfigError::Validation(
                "search.start and search.goal must lie inside the grid".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.wall_probability) {
            return Err(ConfigError::Validation(
                "search.wall_probability must be in [0, 1]".into(),
            ));
        }
        if self.map_attempts == 0 || self.position_attempts == 0 {
            return Err(ConfigError::Validation(
                "search.map_attempts and search.position_attempts must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unseen,
    Frontier,
    Closed,
}

/// A grid cell: terrain plus per-search scratch. The scratch fields are reset
/// at the start of every search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchCell {
    pub terrain: SearchTerrain,
    /// Cost from the start.
    pub g: f64,
    /// Priority score.
    pub f: f64,
    /// Back-pointer used for path reconstruction.
    pub parent: Option<GridPos>,
    state: NodeState,
}

impl SearchCell {
    fn new(terrain: SearchTerrain) -> Self {
        SearchCell {
            terrain,
            g: f64::INFINITY,
            f: f64::INFINITY,
            parent: None,
            state: NodeState::Unseen,
        }
    }

    fn clear_scratch(&mut self) {
        *self = SearchCell::new(self.terrain);
    }
}

/// Stepwise grid search engine.
pub struct GridSearchEngine {
    cells: Grid<SearchCell>,
    start: GridPos,
    goal: GridPos,
    algorithm: SearchAlgorithm,
    frontier: Vec<GridPos>,
    visited: Vec<GridPos>,
    path: Vec<GridPos>,
    path_cost: f64,
    status: SearchStatus,
    config: SearchConfig,
    rng: StdRng,
}

impl GridSearchEngine {
    /// Build an empty-terrain grid from `config` with a search ready to run.
    pub fn new(config: SearchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cells = Grid::new(config.cols, config.rows, SearchCell::new(SearchTerrain::Empty))?;
        let mut engine = GridSearchEngine {
            cells,
            start: config.start,
            goal: config.goal,
            algorithm: config.algorithm,
            frontier: Vec::new(),
            visited: Vec::new(),
            path: Vec::new(),
            path_cost: 0.0,
            status: SearchStatus::Running,
            rng: seeded_rng(config.seed),
            config,
        };
        engine.begin();
        Ok(engine)
    }

    /// Replace the terrain and endpoints, then start a fresh search.
    pub fn reset(
        &mut self,
        terrain: &Grid<SearchTerrain>,
        start: GridPos,
        goal: GridPos,
    ) -> Result<(), ConfigError> {
        if !terrain.contains(start) || !terrain.contains(goal) {
            return Err(ConfigError::Validation(format!(
                "start {start} and goal {goal} must lie inside the {}x{} grid",
                terrain.cols(),
                terrain.rows()
            )));
        }
        let mut cells = Grid::new(
            terrain.cols(),
            terrain.rows(),
            SearchCell::new(SearchTerrain::Empty),
        )?;
        for (pos, &t) in terrain.iter() {
            cells.set(pos, SearchCell::new(t));
        }
        self.cells = cells;
        self.start = start;
        self.goal = goal;
        self.begin();
        Ok(())
    }

    pub fn set_algorithm(&mut self, algorithm: SearchAlgorithm) {
        self.algorithm = algorithm;
        self.begin();
    }

    /// Clear scratch state and seed the frontier with the start node.
    pub fn begin(&mut self) {
        self.clear_path();
        let h = self.priority(self.start, 0.0);
        let start = self.cells.get_mut(self.start);
        start.g = 0.0;
        start.f = h;
        start.state = NodeState::Frontier;
        self.frontier.push(self.start);
        self.status = SearchStatus::Running;
    }

    /// Reset scratch fields and statistics without touching terrain.
    pub fn clear_path(&mut self) {
        for pos in self.cells.positions() {
            self.cells.get_mut(pos).clear_scratch();
        }
        self.frontier.clear();
        self.visited.clear();
        self.path.clear();
        self.path_cost = 0.0;
        self.status = SearchStatus::Running;
    }

    fn heuristic(&self, pos: GridPos) -> f64 {
        pos.manhattan(self.goal) as f64
    }

    fn priority(&self, pos: GridPos, g: f64) -> f64 {
        match self.algorithm {
            SearchAlgorithm::AStar => g + self.heuristic(pos),
            SearchAlgorithm::Ucs => g,
            SearchAlgorithm::Bfs | SearchAlgorithm::Dfs => 0.0,
        }
    }

    fn select_index(&self) -> usize {
        match self.algorithm {
            SearchAlgorithm::Bfs => 0,
            SearchAlgorithm::Dfs => self.frontier.len() - 1,
            SearchAlgorithm::Ucs | SearchAlgorithm::AStar => {
                let mut lowest = 0;
                for (i, pos) in self.frontier.iter().enumerate() {
                    if self.cells.get(*pos).f < self.cells.get(self.frontier[lowest]).f {
                        lowest = i;
                    }
                }
                lowest
            }
        }
    }

    /// Pop one node, test it against the goal, and relax its neighbors.
    pub fn step(&mut self) -> SearchStatus {
        if self.status != SearchStatus::Running {
            return self.status;
        }
        if self.frontier.is_empty() {
            log::debug!("{}: frontier exhausted, goal unreachable", self.algorithm);
            self.status = SearchStatus::Unreachable;
            return self.status;
        }

        let current = self.frontier.remove(self.select_index());
        if current == self.goal {
            self.status = SearchStatus::Found;
            self.reconstruct_path();
            log::debug!(
                "{}: goal found after {} visits, cost {}",
                self.algorithm,
                self.visited.len(),
                self.path_cost
            );
            return self.status;
        }

        self.cells.get_mut(current).state = NodeState::Closed;
        self.visited.push(current);
        let current_g = self.cells.get(current).g;

        let neighbors: Vec<GridPos> = self.cells.neighbors(current).collect();
        for next in neighbors {
            let cell = *self.cells.get(next);
            if cell.state == NodeState::Closed {
                continue;
            }
            let Some(step_cost) = cell.terrain.cost() else {
                continue;
            };
            let tentative = current_g + step_cost;
            let improved = match cell.state {
                NodeState::Frontier => tentative < cell.g,
                _ => {
                    self.frontier.push(next);
                    true
                }
            };
            if improved {
                let f = self.priority(next, tentative);
                let cell = self.cells.get_mut(next);
                cell.g = tentative;
                cell.f = f;
                cell.parent = Some(current);
                cell.state = NodeState::Frontier;
            }
        }

        SearchStatus::Running
    }

    /// Run until the search terminates or `max_steps` pops have been made.
    pub fn run(&mut self, max_steps: usize) -> SearchStatus {
        for _ in 0..max_steps {
            if self.step() != SearchStatus::Running {
                break;
            }
        }
        self.status
    }

    /// Walk parent links from the goal back to the start. The cost sums the
    /// terrain cost of every path node except the start.
    pub fn reconstruct_path(&mut self) -> &[GridPos] {
        self.path.clear();
        self.path_cost = 0.0;
        let mut node = self.goal;
        self.path.push(node);
        while let Some(parent) = self.cells.get(node).parent {
            self.path_cost += self.cells.get(node).terrain.cost().unwrap_or(1.0);
            self.path.push(parent);
            node = parent;
        }
        self.path.reverse();
        &self.path
    }

    /// Paint terrain. The start and goal cells are never overwritten.
    pub fn paint(&mut self, pos: GridPos, terrain: SearchTerrain) -> bool {
        if !self.cells.contains(pos) || pos == self.start || pos == self.goal {
            return false;
        }
        self.cells.get_mut(pos).terrain = terrain;
        true
    }

    /// Move the start. Refuses walls and the goal cell.
    pub fn set_start(&mut self, pos: GridPos) -> bool {
        if !self.endpoint_allowed(pos, self.goal) {
            return false;
        }
        self.start = pos;
        self.begin();
        true
    }

    /// Move the goal. Refuses walls and the start cell.
    pub fn set_goal(&mut self, pos: GridPos) -> bool {
        if !self.endpoint_allowed(pos, self.start) {
            return false;
        }
        self.goal = pos;
        self.begin();
        true
    }

    fn endpoint_allowed(&self, pos: GridPos, other: GridPos) -> bool {
        self.cells.contains(pos) && pos != other && self.cells.get(pos).terrain.is_passable()
    }

    /// Cells reachable from `from`, ignoring costs; walls are impassable.
    pub fn reachable_from(&self, from: GridPos) -> Vec<GridPos> {
        let mut reachable = Vec::new();
        if !self.cells.contains(from) {
            return reachable;
        }
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            reachable.push(current);
            for next in self.cells.neighbors(current) {
                if self.cells.get(next).terrain.is_passable() && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        reachable
    }

    /// Plain reachability check from start to goal.
    pub fn is_solvable(&self) -> bool {
        let mut seen = HashSet::from([self.start]);
        let mut queue = VecDeque::from([self.start]);
        while let Some(current) = queue.pop_front() {
            if current == self.goal {
                return true;
            }
            for next in self.cells.neighbors(current) {
                if self.cells.get(next).terrain.is_passable() && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Scatter walls over every non-endpoint cell, retrying until the map is
    /// solvable. Returns false when every attempt was unsolvable; the last map
    /// is kept in that case.
    pub fn randomize_map(&mut self) -> bool {
        for attempt in 1..=self.config.map_attempts {
            for pos in self.cells.positions() {
                let terrain = if pos != self.start
                    && pos != self.goal
                    && self.rng.random::<f64>() < self.config.wall_probability
                {
                    SearchTerrain::Wall
                } else {
                    SearchTerrain::Empty
                };
                self.cells.set(pos, SearchCell::new(terrain));
            }
            if self.is_solvable() {
                log::debug!("random map solvable after {attempt} attempt(s)");
                self.begin();
                return true;
            }
        }
        log::warn!(
            "could not generate a solvable map in {} attempts",
            self.config.map_attempts
        );
        self.begin();
        false
    }

    /// Pick a random passable start and a random goal reachable from it.
    /// Endpoints are unchanged when no pair is found.
    pub fn randomize_positions(&mut self) -> bool {
        let (cols, rows) = (self.cells.cols(), self.cells.rows());
        for _ in 0..self.config.position_attempts {
            let start = GridPos::new(self.rng.random_range(0..cols), self.rng.random_range(0..rows));
            if !self.cells.get(start).terrain.is_passable() {
                continue;
            }
            let ends: Vec<GridPos> = self
                .reachable_from(start)
                .into_iter()
                .filter(|&p| p != start)
                .collect();
            if ends.is_empty() {
                continue;
            }
            self.start = start;
            self.goal = ends[self.rng.random_range(0..ends.len())];
            self.begin();
            return true;
        }
        log::warn!(
            "could not find a valid start/goal pair after {} attempts",
            self.config.position_attempts
        );
        false
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn algorithm(&self) -> SearchAlgorithm {
        self.algorithm
    }

    pub fn start(&self) -> GridPos {
        self.start
    }

    pub fn goal(&self) -> GridPos {
        self.goal
    }

    pub fn cell(&self, pos: GridPos) -> &SearchCell {
        self.cells.get(pos)
    }

    pub fn terrain(&self, pos: GridPos) -> SearchTerrain {
        self.cells.get(pos).terrain
    }

    pub fn cols(&self) -> usize {
        self.cells.cols()
    }

    pub fn rows(&self) -> usize {
        self.cells.rows()
    }

    /// Nodes waiting to be expanded, in insertion order.
    pub fn frontier(&self) -> &[GridPos] {
        &self.frontier
    }

    /// Expanded nodes in expansion order.
    pub fn visited(&self) -> &[GridPos] {
        &self.visited
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// The found path, start first. Empty until the goal is found.
    pub fn path(&self) -> &[GridPos] {
        &self.path
    }

    pub fn path_cost(&self) -> f64 {
        self.path_cost
    }
}

impl Engine for GridSearchEngine {
    type Step = SearchStatus;

    fn name(&self) -> &str {
        "GridSearch"
    }

    fn step(&mut self) -> SearchStatus {
        GridSearchEngine::step(self)
    }

    fn is_finished(&self) -> bool {
        self.status != SearchStatus::Running
    }
}

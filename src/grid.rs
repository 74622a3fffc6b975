//! Fixed-size 2D grids addressed by `(col, row)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, KeyParseError};

/// A cell coordinate. Displays and parses as `"col,row"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub col: usize,
    pub row: usize,
}

impl GridPos {
    pub const fn new(col: usize, row: usize) -> Self {
        GridPos { col, row }
    }

    pub fn manhattan(self, other: GridPos) -> usize {
        self.col.abs_diff(other.col) + self.row.abs_diff(other.row)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.col, self.row)
    }
}

impl FromStr for GridPos {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || KeyParseError::GridPos(s.to_string());
        let (col, row) = s.split_once(',').ok_or_else(err)?;
        let col = col.trim().parse().map_err(|_| err())?;
        let row = row.trim().parse().map_err(|_| err())?;
        Ok(GridPos { col, row })
    }
}

/// Absolute movement direction. Row 0 is the top of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    /// Enumeration order used for action indices and tie-breaking.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Direction> {
        Direction::ALL.get(index).copied()
    }

    /// 90° clockwise turn.
    pub fn turn_right(self) -> Direction {
        match self {
            Direction::Up => Direction::Right,
            Direction::Right => Direction::Down,
            Direction::Down => Direction::Left,
            Direction::Left => Direction::Up,
        }
    }

    /// 90° counter-clockwise turn.
    pub fn turn_left(self) -> Direction {
        match self {
            Direction::Up => Direction::Left,
            Direction::Left => Direction::Down,
            Direction::Down => Direction::Right,
            Direction::Right => Direction::Up,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Right => "right",
            Direction::Down => "down",
            Direction::Left => "left",
        }
    }
}

/// Row-major cell storage. Cells are allocated once at construction; only
/// their contents change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    cols: usize,
    rows: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Create a grid filled with `fill`. Zero-sized grids are rejected.
    pub fn new(cols: usize, rows: usize, fill: T) -> Result<Self, ConfigError> {
        if cols == 0 || rows == 0 {
            return Err(ConfigError::Validation(format!(
                "grid dimensions must be > 0 (got {cols}x{rows})"
            )));
        }
        Ok(Grid {
            cols,
            rows,
            cells: vec![fill; cols * rows],
        })
    }

    /// Reset every cell to `value`.
    pub fn fill(&mut self, value: T) {
        for cell in &mut self.cells {
            *cell = value.clone();
        }
    }
}

impl<T> Grid<T> {
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.col < self.cols && pos.row < self.rows
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        self.contains(pos).then(|| pos.row * self.cols + pos.col)
    }

    fn index_or_panic(&self, pos: GridPos) -> usize {
        match self.index(pos) {
            Some(i) => i,
            None => panic!("position {pos} outside {}x{} grid", self.cols, self.rows),
        }
    }

    /// The cell at `pos`, or `None` outside the grid.
    pub fn try_get(&self, pos: GridPos) -> Option<&T> {
        self.index(pos).map(|i| &self.cells[i])
    }

    pub fn try_get_mut(&mut self, pos: GridPos) -> Option<&mut T> {
        let i = self.index(pos)?;
        Some(&mut self.cells[i])
    }

    /// The cell at `pos`.
    ///
    /// # Panics
    ///
    /// If `pos` is outside the grid. Use [`Grid::try_get`] for positions
    /// that have not been checked with [`Grid::contains`].
    pub fn get(&self, pos: GridPos) -> &T {
        &self.cells[self.index_or_panic(pos)]
    }

    /// # Panics
    ///
    /// If `pos` is outside the grid.
    pub fn get_mut(&mut self, pos: GridPos) -> &mut T {
        let i = self.index_or_panic(pos);
        &mut self.cells[i]
    }

    /// # Panics
    ///
    /// If `pos` is outside the grid.
    pub fn set(&mut self, pos: GridPos, value: T) {
        let i = self.index_or_panic(pos);
        self.cells[i] = value;
    }

    /// The cell `(dc, dr)` away from `pos`, or `None` if that leaves the grid.
    pub fn offset(&self, pos: GridPos, (dc, dr): (isize, isize)) -> Option<GridPos> {
        let col = pos.col.checked_add_signed(dc)?;
        let row = pos.row.checked_add_signed(dr)?;
        let next = GridPos { col, row };
        self.contains(next).then_some(next)
    }

    /// Move one step; leaving the grid bounces back to `pos`.
    pub fn step(&self, pos: GridPos, direction: Direction) -> GridPos {
        self.offset(pos, direction.delta()).unwrap_or(pos)
    }

    /// In-grid 4-connected neighbors in search order: down, right, up, left.
    pub fn neighbors(&self, pos: GridPos) -> impl Iterator<Item = GridPos> + '_ {
        const ORDER: [(isize, isize); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
        ORDER.into_iter().filter_map(move |d| self.offset(pos, d))
    }

    /// All positions, column by column.
    pub fn positions(&self) -> impl Iterator<Item = GridPos> {
        let (cols, rows) = (self.cols, self.rows);
        (0..cols).flat_map(move |col| (0..rows).map(move |row| GridPos { col, row }))
    }

    pub fn iter(&self) -> impl Iterator<Item = (GridPos, &T)> + '_ {
        self.positions().map(move |p| (p, self.get(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_grid_rejected() {
        assert!(Grid::new(0, 5, 0u8).is_err());
        assert!(Grid::new(5, 0, 0u8).is_err());
    }

    #[test]
    fn test_grid_pos_roundtrips_through_string() {
        let pos = GridPos::new(12, 3);
        assert_eq!(pos.to_string(), "12,3");
        assert_eq!("12,3".parse::<GridPos>().unwrap(), pos);
        assert!("12".parse::<GridPos>().is_err());
        assert!("a,b".parse::<GridPos>().is_err());
        assert!("-1,2".parse::<GridPos>().is_err());
    }

    #[test]
    fn test_try_get_outside_grid_is_none() {
        let mut grid = Grid::new(3, 2, 7u8).unwrap();
        assert_eq!(grid.try_get(GridPos::new(2, 1)), Some(&7));
        assert_eq!(grid.try_get(GridPos::new(3, 0)), None);
        assert_eq!(grid.try_get(GridPos::new(0, 2)), None);
        assert!(grid.try_get_mut(GridPos::new(9, 9)).is_none());
        if let Some(cell) = grid.try_get_mut(GridPos::new(1, 1)) {
            *cell = 4;
        }
        assert_eq!(*grid.get(GridPos::new(1, 1)), 4);
    }

    #[test]
    #[should_panic(expected = "outside 3x2 grid")]
    fn test_get_outside_grid_panics() {
        let grid = Grid::new(3, 2, 0u8).unwrap();
        grid.get(GridPos::new(3, 0));
    }

    #[test]
    fn test_step_bounces_at_edges() {
        let grid = Grid::new(3, 2, ()).unwrap();
        let corner = GridPos::new(0, 0);
        assert_eq!(grid.step(corner, Direction::Up), corner);
        assert_eq!(grid.step(corner, Direction::Left), corner);
        assert_eq!(grid.step(corner, Direction::Right), GridPos::new(1, 0));
        let far = GridPos::new(2, 1);
        assert_eq!(grid.step(far, Direction::Down), far);
        assert_eq!(grid.step(far, Direction::Right), far);
    }

    #[test]
    fn test_neighbors_stay_in_bounds() {
        let grid = Grid::new(2, 2, ()).unwrap();
        let n: Vec<GridPos> = grid.neighbors(GridPos::new(0, 0)).collect();
        assert_eq!(n, vec![GridPos::new(0, 1), GridPos::new(1, 0)]);
    }

    #[test]
    fn test_turns_are_inverse() {
        for d in Direction::ALL {
            assert_eq!(d.turn_right().turn_left(), d);
            assert_eq!(Direction::from_index(d.index()), Some(d));
        }
        assert_eq!(Direction::Right.turn_right(), Direction::Down);
        assert_eq!(Direction::Right.turn_left(), Direction::Up);
    }

    #[test]
    fn test_positions_cover_grid_column_major() {
        let grid = Grid::new(2, 3, 0).unwrap();
        let all: Vec<GridPos> = grid.positions().collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], GridPos::new(0, 0));
        assert_eq!(all[1], GridPos::new(0, 1));
        assert_eq!(all[3], GridPos::new(1, 0));
    }
}

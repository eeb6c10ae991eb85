//! A propositional minesweeper agent.
//!
//! The [`KnowledgeBase`] ingests `(cell, neighbouring-mine-count)` observations,
//! turns each one into a [`Sentence`] and runs a deduction fixpoint over the
//! whole sentence set. When nothing can be proven safe, the [`Estimator`]
//! enumerates every assignment consistent with the live sentences and ranks
//! the remaining cells by exact mine probability.
//!
//! The [`game`] module is the collaborator that owns the real mine layout and
//! hands out observations; the agent never looks inside it.

pub mod error;
pub mod estimate;
pub mod game;
pub mod knowledge;
pub mod sat;
pub mod sentence;

pub use error::{KnowledgeError, Result};
pub use estimate::{Estimator, Marginals, Tally};
pub use game::{Game, GameState, Tile};
pub use knowledge::KnowledgeBase;
pub use sentence::Sentence;

use std::fmt;

/// A coordinate on the board. Ordering is row-major.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Cell { row, col }
    }
}

impl From<(usize, usize)> for Cell {
    fn from((row, col): (usize, usize)) -> Self {
        Cell { row, col }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Grid dimensions. Every cell handed to the agent must lie inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    pub height: usize,
    pub width: usize,
}

impl Bounds {
    pub const fn new(height: usize, width: usize) -> Self {
        Bounds { height, width }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.height && cell.col < self.width
    }

    pub fn area(&self) -> usize {
        self.height * self.width
    }

    /// Every cell of the grid, row by row.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + use<> {
        let width = self.width;
        (0..self.height).flat_map(move |row| (0..width).map(move |col| Cell { row, col }))
    }

    /// The in-bounds cells at Chebyshev distance 1 from `cell`, row-major.
    /// Handles edges and corners by dropping out-of-range offsets.
    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + use<> {
        let Bounds { height, width } = *self;

        (-1isize..=1).flat_map(move |dr| {
            (-1isize..=1).filter_map(move |dc| {
                if dr == 0 && dc == 0 {
                    return None;
                }

                let row = cell.row as isize + dr;
                let col = cell.col as isize + dc;

                if row >= 0 && row < height as isize && col >= 0 && col < width as isize {
                    Some(Cell {
                        row: row as usize,
                        col: col as usize,
                    })
                } else {
                    None
                }
            })
        })
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors() {
        let bounds = Bounds::new(3, 3);

        // Corner has 3 neighbours, edge 5, centre 8
        assert_eq!(bounds.neighbors(Cell::new(0, 0)).count(), 3);
        assert_eq!(bounds.neighbors(Cell::new(0, 1)).count(), 5);
        assert_eq!(bounds.neighbors(Cell::new(1, 1)).count(), 8);

        let corner: Vec<Cell> = bounds.neighbors(Cell::new(2, 2)).collect();
        assert_eq!(
            corner,
            vec![Cell::new(1, 1), Cell::new(1, 2), Cell::new(2, 1)]
        );
    }

    #[test]
    fn test_neighbors_exclude_self() {
        let bounds = Bounds::new(1, 1);
        assert_eq!(bounds.neighbors(Cell::new(0, 0)).count(), 0);
    }

    #[test]
    fn test_cells_row_major() {
        let bounds = Bounds::new(2, 3);
        let cells: Vec<Cell> = bounds.cells().collect();
        assert_eq!(cells.len(), bounds.area());
        assert_eq!(cells[0], Cell::new(0, 0));
        assert_eq!(cells[3], Cell::new(1, 0));
        assert!(cells.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_contains() {
        let bounds = Bounds::new(2, 4);
        assert!(bounds.contains(Cell::new(1, 3)));
        assert!(!bounds.contains(Cell::new(2, 0)));
        assert!(!bounds.contains(Cell::new(0, 4)));
    }
}

use crate::{Cell, KnowledgeError, Result};
use std::collections::BTreeSet;
use std::fmt;

/// A logical statement about the board: exactly `count` of `cells` are mines.
///
/// A live sentence always satisfies `count <= cells.len()`. Both mutators check
/// that bound and report a [`KnowledgeError`] instead of going out of range.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Sentence {
    cells: BTreeSet<Cell>,
    count: usize,
}

impl Sentence {
    pub fn new(cells: impl IntoIterator<Item = Cell>, count: usize) -> Result<Self> {
        let sentence = Sentence {
            cells: cells.into_iter().collect(),
            count,
        };
        sentence.check()?;
        Ok(sentence)
    }

    pub fn cells(&self) -> &BTreeSet<Cell> {
        &self.cells
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: &Cell) -> bool {
        self.cells.contains(cell)
    }

    /// Every cell if all of them must be mines, otherwise nothing.
    pub fn known_mines(&self) -> BTreeSet<Cell> {
        if self.count == self.cells.len() {
            self.cells.clone()
        } else {
            BTreeSet::new()
        }
    }

    /// Every cell if none of them can be a mine, otherwise nothing.
    pub fn known_safes(&self) -> BTreeSet<Cell> {
        if self.count == 0 {
            self.cells.clone()
        } else {
            BTreeSet::new()
        }
    }

    /// Removes a cell known to be a mine, lowering the count to match.
    /// Returns whether the sentence changed.
    pub fn mark_mine(&mut self, cell: Cell) -> Result<bool> {
        if !self.cells.contains(&cell) {
            return Ok(false);
        }
        if self.count == 0 {
            return Err(KnowledgeError::NegativeCount { cell });
        }
        self.cells.remove(&cell);
        self.count -= 1;
        Ok(true)
    }

    /// Removes a cell known to be safe. Returns whether the sentence changed.
    pub fn mark_safe(&mut self, cell: Cell) -> Result<bool> {
        if !self.cells.remove(&cell) {
            return Ok(false);
        }
        self.check()?;
        Ok(true)
    }

    pub fn is_proper_subset(&self, other: &Sentence) -> bool {
        self.cells.len() < other.cells.len() && self.cells.is_subset(&other.cells)
    }

    /// Subset resolution: if `subset` holds `subset.count` of our mines, the
    /// cells it does not share hold the rest.
    pub(crate) fn subtract(&mut self, subset: &Sentence) -> Result<()> {
        debug_assert!(subset.is_proper_subset(self));

        let count = self
            .count
            .checked_sub(subset.count)
            .ok_or(KnowledgeError::SubsetExceeds {
                subset: subset.count,
                superset: self.count,
            })?;
        self.cells = &self.cells - &subset.cells;
        self.count = count;
        self.check()
    }

    fn check(&self) -> Result<()> {
        if self.count > self.cells.len() {
            return Err(KnowledgeError::Overfull {
                count: self.count,
                cells: self.cells.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", cell)?;
        }
        write!(f, "}} = {}", self.count)
    }
}

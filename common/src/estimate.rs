//! Exact marginal mine probabilities over a set of live sentences.
//!
//! The estimator picks the last sentence, tries every way of placing its
//! mines, applies each choice to an independent copy of the remaining
//! sentences and recurses. Every branch that reaches an empty sentence list is
//! one consistent assignment. Counting how many of those place a mine on each
//! cell gives the exact marginals.
//!
//! This is exponential in the worst case. Results are memoised per call on the
//! sorted sentence list, and an optional branch limit turns a runaway
//! enumeration into [`KnowledgeError::BudgetExhausted`].

use crate::{Cell, KnowledgeError, Result, Sentence};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Weighted mine counts over every consistent completion of a sentence list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    /// For each cell, the number of completions in which it is a mine.
    pub weights: BTreeMap<Cell, u128>,
    /// The number of consistent completions.
    pub total: u128,
}

impl Tally {
    /// The tally of an empty sentence list: one (empty) assignment.
    pub fn unit() -> Self {
        Tally {
            weights: BTreeMap::new(),
            total: 1,
        }
    }
}

/// Per-cell mine probabilities, normalised over all consistent assignments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Marginals {
    pub probabilities: BTreeMap<Cell, f64>,
    pub assignments: u128,
}

impl Marginals {
    pub fn probability(&self, cell: Cell) -> Option<f64> {
        self.probabilities.get(&cell).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// The cell with the lowest mine probability. Ties go to the cell that
    /// comes first in row-major order.
    pub fn safest(&self) -> Option<(Cell, f64)> {
        self.probabilities
            .iter()
            .fold(None, |best: Option<(Cell, f64)>, (&cell, &p)| match best {
                Some((_, best_p)) if best_p <= p => best,
                _ => Some((cell, p)),
            })
    }
}

#[derive(Debug, Default)]
pub struct Estimator {
    branch_limit: Option<usize>,
    branches: usize,
    memo: HashMap<Vec<Sentence>, Tally>,
}

impl Estimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of enumeration branches explored by one call.
    pub fn with_branch_limit(mut self, limit: usize) -> Self {
        self.branch_limit = Some(limit);
        self
    }

    /// Computes the exact mine probability of every cell mentioned by
    /// `sentences`. Returns empty marginals if no assignment satisfies them all.
    pub fn marginals(&mut self, sentences: &[Sentence]) -> Result<Marginals> {
        let tally = self.tally(sentences)?;
        if tally.total == 0 {
            tracing::debug!(sentences = sentences.len(), "no consistent assignment");
            return Ok(Marginals::default());
        }

        let total = tally.total as f64;
        let probabilities: BTreeMap<Cell, f64> = sentences
            .iter()
            .flat_map(|s| s.cells().iter().copied())
            .map(|cell| {
                let weight = tally.weights.get(&cell).copied().unwrap_or(0);
                (cell, weight as f64 / total)
            })
            .collect();

        tracing::debug!(
            assignments = %tally.total,
            cells = probabilities.len(),
            branches = self.branches,
            "estimated marginals"
        );

        Ok(Marginals {
            probabilities,
            assignments: tally.total,
        })
    }

    /// Counts consistent assignments of `sentences` and, per cell, how many of
    /// them make it a mine.
    pub fn tally(&mut self, sentences: &[Sentence]) -> Result<Tally> {
        for s in sentences {
            if s.count() > s.len() {
                return Err(KnowledgeError::Overfull {
                    count: s.count(),
                    cells: s.len(),
                });
            }
        }

        self.branches = 0;
        self.memo.clear();
        self.enumerate(sentences.to_vec())
    }

    fn enumerate(&mut self, mut sentences: Vec<Sentence>) -> Result<Tally> {
        if sentences.is_empty() {
            return Ok(Tally::unit());
        }

        let mut key = sentences.clone();
        key.sort();
        if let Some(tally) = self.memo.get(&key) {
            return Ok(tally.clone());
        }

        self.branches += 1;
        if let Some(limit) = self.branch_limit {
            if self.branches > limit {
                return Err(KnowledgeError::BudgetExhausted { limit });
            }
        }

        let Some(chosen) = sentences.pop() else {
            return Ok(Tally::unit());
        };
        let cells: Vec<Cell> = chosen.cells().iter().copied().collect();

        let mut tally = Tally::default();
        for mines in cells.iter().copied().combinations(chosen.count()) {
            let mines: BTreeSet<Cell> = mines.into_iter().collect();
            let Some(snapshot) = assume(&sentences, &cells, &mines) else {
                continue;
            };

            let sub = self.enumerate(snapshot)?;
            if sub.total == 0 {
                continue;
            }

            for &cell in &mines {
                *tally.weights.entry(cell).or_default() += sub.total;
            }
            for (cell, weight) in sub.weights {
                *tally.weights.entry(cell).or_default() += weight;
            }
            tally.total += sub.total;
        }

        self.memo.insert(key, tally.clone());
        Ok(tally)
    }
}

/// Applies one placement of mines over `cells` to a copy of `rest`.
///
/// Zero-count sentences are dropped after their cells are marked safe in the
/// rest of the copy. Returns `None` if the placement contradicts any sentence.
fn assume(rest: &[Sentence], cells: &[Cell], mines: &BTreeSet<Cell>) -> Option<Vec<Sentence>> {
    let mut snapshot = rest.to_vec();
    for sentence in snapshot.iter_mut() {
        for &cell in cells {
            let applied = if mines.contains(&cell) {
                sentence.mark_mine(cell)
            } else {
                sentence.mark_safe(cell)
            };
            applied.ok()?;
        }
    }

    let safes: BTreeSet<Cell> = snapshot
        .iter()
        .filter(|s| s.count() == 0)
        .flat_map(|s| s.cells().iter().copied())
        .collect();
    snapshot.retain(|s| s.count() > 0);

    // Marking safe never lowers a count, so one sweep is enough.
    for sentence in snapshot.iter_mut() {
        for &cell in &safes {
            sentence.mark_safe(cell).ok()?;
        }
    }

    Some(snapshot)
}

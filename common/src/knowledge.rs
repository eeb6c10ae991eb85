use crate::{Bounds, Cell, Estimator, KnowledgeError, Marginals, Result, Sentence};
use std::collections::{BTreeSet, HashSet};

/// Everything the agent has learned during one game.
///
/// The three certainty sets only ever grow. Sentences shrink as cells become
/// certain and are dropped once they mention no cells.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    bounds: Bounds,
    moves_made: BTreeSet<Cell>,
    known_safe: BTreeSet<Cell>,
    known_mine: BTreeSet<Cell>,
    sentences: Vec<Sentence>,
    branch_limit: Option<usize>,
}

impl KnowledgeBase {
    pub fn new(height: usize, width: usize) -> Self {
        KnowledgeBase {
            bounds: Bounds::new(height, width),
            moves_made: BTreeSet::new(),
            known_safe: BTreeSet::new(),
            known_mine: BTreeSet::new(),
            sentences: Vec::new(),
            branch_limit: None,
        }
    }

    /// Bounds the work `propose_best_guess` may spend on exact enumeration.
    pub fn with_branch_limit(mut self, limit: usize) -> Self {
        self.branch_limit = Some(limit);
        self
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn moves_made(&self) -> &BTreeSet<Cell> {
        &self.moves_made
    }

    pub fn known_safe(&self) -> &BTreeSet<Cell> {
        &self.known_safe
    }

    pub fn known_mine(&self) -> &BTreeSet<Cell> {
        &self.known_mine
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Records an externally known mine (e.g. a flag) in every sentence.
    /// Does not run inference.
    pub fn mark_mine(&mut self, cell: Cell) -> Result<()> {
        self.check_bounds(cell)?;
        self.record_mine(cell)?;
        Ok(())
    }

    /// Records an externally known safe cell in every sentence.
    /// Does not run inference.
    pub fn mark_safe(&mut self, cell: Cell) -> Result<()> {
        self.check_bounds(cell)?;
        self.record_safe(cell)?;
        Ok(())
    }

    /// Appends an arbitrary fact about the board. Cells already known are
    /// folded out first. Does not run inference.
    pub fn add_sentence(&mut self, sentence: Sentence) -> Result<()> {
        let mut remaining = sentence.count();
        let mut unknown = Vec::with_capacity(sentence.len());

        for &cell in sentence.cells() {
            self.check_bounds(cell)?;
            if self.known_mine.contains(&cell) {
                remaining = remaining
                    .checked_sub(1)
                    .ok_or(KnowledgeError::NegativeCount { cell })?;
            } else if !self.known_safe.contains(&cell) {
                unknown.push(cell);
            }
        }

        let folded = Sentence::new(unknown, remaining)?;
        if !folded.is_empty() {
            self.sentences.push(folded);
        }
        Ok(())
    }

    /// Ingests a revealed cell and the number of mines among its neighbours,
    /// then runs inference to a fixpoint.
    pub fn add_observation(&mut self, cell: Cell, count: usize) -> Result<()> {
        self.check_bounds(cell)?;
        if self.known_mine.contains(&cell) {
            return Err(KnowledgeError::Contradiction { cell });
        }

        self.moves_made.insert(cell);

        // A revealed cell is not a mine.
        if !self.known_safe.contains(&cell) {
            self.sentences.push(Sentence::new([cell], 0)?);
        }

        let neighbors: Vec<Cell> = self.bounds.neighbors(cell).collect();
        let invalid = KnowledgeError::InvalidObservation {
            cell,
            count,
            neighbors: neighbors.len(),
        };

        let mut remaining = count;
        let mut unknown = Vec::with_capacity(neighbors.len());
        for &neighbor in &neighbors {
            if self.known_mine.contains(&neighbor) {
                remaining = remaining.checked_sub(1).ok_or_else(|| invalid.clone())?;
            } else if !self.known_safe.contains(&neighbor) {
                unknown.push(neighbor);
            }
        }
        if remaining > unknown.len() {
            return Err(invalid);
        }

        tracing::debug!(%cell, count, unknown = unknown.len(), remaining, "observation");

        if !unknown.is_empty() {
            self.sentences.push(Sentence::new(unknown, remaining)?);
        }

        self.infer()?;
        Ok(())
    }

    /// Runs the deduction fixpoint. Returns whether anything changed.
    ///
    /// Each pass resolves subset pairs until none remain, folds every cell
    /// some sentence proves safe or mined into the certainty sets, and drops
    /// empty or duplicate sentences. The loop stops after a pass that does
    /// none of these.
    pub fn infer(&mut self) -> Result<bool> {
        let mut passes = 0;
        loop {
            let mut changed = self.resolve_subsets()?;
            changed |= self.extract_certainties()?;
            changed |= self.collect_garbage();

            if !changed {
                break;
            }
            passes += 1;
        }

        tracing::debug!(
            passes,
            sentences = self.sentences.len(),
            safe = self.known_safe.len(),
            mines = self.known_mine.len(),
            "inference settled"
        );
        Ok(passes > 0)
    }

    /// A known-safe cell that has not been played yet, if there is one.
    pub fn propose_safe_move(&self) -> Option<Cell> {
        self.known_safe.difference(&self.moves_made).next().copied()
    }

    /// The least risky unplayed cell when no safe move is known.
    ///
    /// A cell no sentence mentions is returned first, since nothing is known
    /// about it. Otherwise the estimator ranks every constrained cell and the
    /// lowest probability wins, ties going to the first cell in row-major
    /// order. Returns `None` only when no candidate is left.
    pub fn propose_best_guess(&self) -> Result<Option<Cell>> {
        let constrained: BTreeSet<Cell> = self
            .sentences
            .iter()
            .flat_map(|s| s.cells().iter().copied())
            .collect();

        let unconstrained = self.bounds.cells().find(|cell| {
            !constrained.contains(cell)
                && !self.moves_made.contains(cell)
                && !self.known_mine.contains(cell)
        });
        if unconstrained.is_some() {
            return Ok(unconstrained);
        }

        let guess = self.marginals()?.safest();
        if let Some((cell, p)) = guess {
            tracing::debug!(%cell, probability = p, "best guess");
        }
        Ok(guess.map(|(cell, _)| cell))
    }

    /// A safe move if one is known, otherwise the best guess.
    pub fn propose_move(&self) -> Result<Option<Cell>> {
        match self.propose_safe_move() {
            Some(cell) => Ok(Some(cell)),
            None => self.propose_best_guess(),
        }
    }

    /// Exact mine probabilities for every cell a live sentence mentions.
    pub fn marginals(&self) -> Result<Marginals> {
        let mut estimator = Estimator::new();
        if let Some(limit) = self.branch_limit {
            estimator = estimator.with_branch_limit(limit);
        }
        estimator.marginals(&self.sentences)
    }

    /// Checks every structural invariant of the knowledge base.
    pub fn verify(&self) -> Result<()> {
        if let Some(&cell) = self.known_safe.intersection(&self.known_mine).next() {
            return Err(KnowledgeError::Contradiction { cell });
        }
        for sentence in &self.sentences {
            if sentence.count() > sentence.len() {
                return Err(KnowledgeError::Overfull {
                    count: sentence.count(),
                    cells: sentence.len(),
                });
            }
            let known = sentence
                .cells()
                .iter()
                .find(|c| self.known_safe.contains(c) || self.known_mine.contains(c));
            if let Some(&cell) = known {
                return Err(KnowledgeError::Contradiction { cell });
            }
        }
        Ok(())
    }

    fn check_bounds(&self, cell: Cell) -> Result<()> {
        if self.bounds.contains(cell) {
            Ok(())
        } else {
            Err(KnowledgeError::OutOfBounds {
                cell,
                bounds: self.bounds,
            })
        }
    }

    fn record_mine(&mut self, cell: Cell) -> Result<bool> {
        if self.known_safe.contains(&cell) {
            return Err(KnowledgeError::Contradiction { cell });
        }
        let mut changed = self.known_mine.insert(cell);
        for sentence in self.sentences.iter_mut() {
            changed |= sentence.mark_mine(cell)?;
        }
        Ok(changed)
    }

    fn record_safe(&mut self, cell: Cell) -> Result<bool> {
        if self.known_mine.contains(&cell) {
            return Err(KnowledgeError::Contradiction { cell });
        }
        let mut changed = self.known_safe.insert(cell);
        for sentence in self.sentences.iter_mut() {
            changed |= sentence.mark_safe(cell)?;
        }
        Ok(changed)
    }

    /// If `a` is a proper subset of `b`, replace `b` with `b - a`. Repeats
    /// until no pair qualifies; every step strictly shrinks some sentence.
    fn resolve_subsets(&mut self) -> Result<bool> {
        let mut changed = false;
        loop {
            let mut progress = false;
            for i in 0..self.sentences.len() {
                for j in 0..self.sentences.len() {
                    if i == j || self.sentences[i].is_empty() {
                        continue;
                    }
                    if self.sentences[i].is_proper_subset(&self.sentences[j]) {
                        let subset = self.sentences[i].clone();
                        self.sentences[j].subtract(&subset)?;
                        tracing::trace!(%subset, resolved = %self.sentences[j], "subset resolution");
                        progress = true;
                    }
                }
            }
            if !progress {
                return Ok(changed);
            }
            changed = true;
        }
    }

    fn extract_certainties(&mut self) -> Result<bool> {
        let mut safes = BTreeSet::new();
        let mut mines = BTreeSet::new();
        for sentence in &self.sentences {
            safes.extend(sentence.known_safes());
            mines.extend(sentence.known_mines());
        }
        if let Some(&cell) = safes.intersection(&mines).next() {
            return Err(KnowledgeError::Contradiction { cell });
        }

        let mut changed = false;
        for cell in safes {
            if self.record_safe(cell)? {
                tracing::trace!(%cell, "safe");
                changed = true;
            }
        }
        for cell in mines {
            if self.record_mine(cell)? {
                tracing::trace!(%cell, "mine");
                changed = true;
            }
        }
        Ok(changed)
    }

    fn collect_garbage(&mut self) -> bool {
        let before = self.sentences.len();
        let mut seen = HashSet::new();
        self.sentences
            .retain(|s| !s.is_empty() && seen.insert(s.clone()));
        self.sentences.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(coords: &[(usize, usize)], count: usize) -> Sentence {
        Sentence::new(coords.iter().map(|&c| Cell::from(c)), count).unwrap()
    }

    #[test]
    fn test_zero_observation_clears_neighbours() {
        let mut kb = KnowledgeBase::new(3, 3);
        kb.add_observation(Cell::new(1, 1), 0).unwrap();

        assert_eq!(kb.known_safe().len(), 9);
        assert!(kb.known_mine().is_empty());
        assert!(kb.sentences().is_empty());
        assert_eq!(kb.moves_made().len(), 1);
    }

    #[test]
    fn test_known_safe_member_exposes_mine() {
        let mut kb = KnowledgeBase::new(1, 2);
        kb.add_sentence(sentence(&[(0, 0), (0, 1)], 1)).unwrap();
        kb.mark_safe(Cell::new(0, 0)).unwrap();

        assert!(kb.infer().unwrap());
        assert!(kb.known_mine().contains(&Cell::new(0, 1)));
        assert!(kb.sentences().is_empty());
    }

    #[test]
    fn test_full_sentence_folds_in() {
        let mut kb = KnowledgeBase::new(1, 3);
        kb.add_sentence(sentence(&[(0, 0), (0, 1), (0, 2)], 3))
            .unwrap();

        assert_eq!(kb.sentences()[0].known_mines().len(), 3);
        kb.infer().unwrap();

        assert_eq!(kb.known_mine().len(), 3);
        assert!(kb.sentences().is_empty());
    }

    #[test]
    fn test_subset_resolution_chains() {
        // {A,B}=1 ⊂ {A,B,C}=1 gives {C}=0; {C} ⊂ {C,D}=1 then gives {D}=1
        let mut kb = KnowledgeBase::new(1, 4);
        kb.add_sentence(sentence(&[(0, 0), (0, 1)], 1)).unwrap();
        kb.add_sentence(sentence(&[(0, 0), (0, 1), (0, 2)], 1))
            .unwrap();
        kb.add_sentence(sentence(&[(0, 2), (0, 3)], 1)).unwrap();
        kb.infer().unwrap();

        assert!(kb.known_safe().contains(&Cell::new(0, 2)));
        assert!(kb.known_mine().contains(&Cell::new(0, 3)));
        assert_eq!(kb.sentences(), &[sentence(&[(0, 0), (0, 1)], 1)]);
    }

    #[test]
    fn test_observation_excludes_known_cells() {
        let mut kb = KnowledgeBase::new(3, 3);
        kb.mark_mine(Cell::new(0, 0)).unwrap();
        kb.mark_safe(Cell::new(0, 1)).unwrap();
        kb.add_observation(Cell::new(1, 1), 2).unwrap();

        // 8 neighbours, minus one known mine, minus one known safe
        let s = &kb.sentences()[0];
        assert_eq!(s.len(), 6);
        assert_eq!(s.count(), 1);
        assert!(!s.contains(&Cell::new(0, 0)));
        assert!(!s.contains(&Cell::new(0, 1)));
        assert!(kb.known_safe().contains(&Cell::new(1, 1)));
    }

    #[test]
    fn test_corner_observation() {
        // (0,0) sees three neighbours, all mines
        let mut kb = KnowledgeBase::new(3, 3);
        kb.add_observation(Cell::new(0, 0), 3).unwrap();

        let expected: BTreeSet<Cell> = [(0, 1), (1, 0), (1, 1)]
            .into_iter()
            .map(Cell::from)
            .collect();
        assert_eq!(kb.known_mine(), &expected);
    }

    #[test]
    fn test_observation_too_large() {
        let mut kb = KnowledgeBase::new(3, 3);
        let err = kb.add_observation(Cell::new(0, 0), 4).unwrap_err();
        assert_eq!(
            err,
            KnowledgeError::InvalidObservation {
                cell: Cell::new(0, 0),
                count: 4,
                neighbors: 3
            }
        );
    }

    #[test]
    fn test_observation_of_known_mine() {
        let mut kb = KnowledgeBase::new(3, 3);
        kb.mark_mine(Cell::new(1, 1)).unwrap();
        assert_eq!(
            kb.add_observation(Cell::new(1, 1), 0),
            Err(KnowledgeError::Contradiction {
                cell: Cell::new(1, 1)
            })
        );
    }

    #[test]
    fn test_out_of_bounds() {
        let mut kb = KnowledgeBase::new(2, 2);
        assert!(matches!(
            kb.add_observation(Cell::new(2, 0), 0),
            Err(KnowledgeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            kb.mark_mine(Cell::new(0, 5)),
            Err(KnowledgeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_contradictory_observations() {
        // Two cells at the edge of a 1x3 strip disagree about the middle
        let mut kb = KnowledgeBase::new(1, 3);
        kb.add_observation(Cell::new(0, 0), 1).unwrap();
        assert!(kb.known_mine().contains(&Cell::new(0, 1)));

        assert!(kb.add_observation(Cell::new(0, 2), 0).is_err());
    }

    #[test]
    fn test_mark_is_idempotent() {
        let mut kb = KnowledgeBase::new(2, 2);
        kb.add_sentence(sentence(&[(0, 0), (0, 1), (1, 0)], 1))
            .unwrap();

        kb.mark_safe(Cell::new(0, 0)).unwrap();
        let once = (kb.known_safe().clone(), kb.sentences().to_vec());
        kb.mark_safe(Cell::new(0, 0)).unwrap();
        assert_eq!(once, (kb.known_safe().clone(), kb.sentences().to_vec()));

        kb.mark_mine(Cell::new(0, 1)).unwrap();
        let once = (kb.known_mine().clone(), kb.sentences().to_vec());
        kb.mark_mine(Cell::new(0, 1)).unwrap();
        assert_eq!(once, (kb.known_mine().clone(), kb.sentences().to_vec()));
    }

    #[test]
    fn test_safe_and_mine_collide() {
        let mut kb = KnowledgeBase::new(2, 2);
        kb.mark_safe(Cell::new(0, 0)).unwrap();
        assert_eq!(
            kb.mark_mine(Cell::new(0, 0)),
            Err(KnowledgeError::Contradiction {
                cell: Cell::new(0, 0)
            })
        );
    }

    #[test]
    fn test_fixpoint_is_closed() {
        let mut kb = KnowledgeBase::new(4, 4);
        kb.add_observation(Cell::new(0, 0), 1).unwrap();
        kb.add_observation(Cell::new(0, 1), 1).unwrap();
        kb.add_observation(Cell::new(3, 3), 1).unwrap();

        let sentences = kb.sentences().to_vec();
        assert!(!kb.infer().unwrap());
        assert_eq!(kb.sentences(), sentences.as_slice());
        kb.verify().unwrap();
    }

    #[test]
    fn test_propose_safe_move() {
        let mut kb = KnowledgeBase::new(3, 3);
        assert_eq!(kb.propose_safe_move(), None);

        kb.add_observation(Cell::new(0, 0), 0).unwrap();
        let cell = kb.propose_safe_move().unwrap();
        assert!(kb.known_safe().contains(&cell));
        assert!(!kb.moves_made().contains(&cell));
    }

    #[test]
    fn test_best_guess_prefers_unconstrained_cell() {
        let mut kb = KnowledgeBase::new(3, 3);
        kb.add_observation(Cell::new(0, 0), 1).unwrap();

        // (0,0)'s three neighbours are constrained; (0,2) is the first free cell
        assert_eq!(kb.propose_best_guess().unwrap(), Some(Cell::new(0, 2)));
    }

    #[test]
    fn test_best_guess_uses_probabilities() {
        let mut kb = KnowledgeBase::new(2, 2);
        kb.add_observation(Cell::new(0, 0), 1).unwrap();

        // Three hidden cells share one mine; none is free, all tie at 1/3.
        assert_eq!(kb.propose_safe_move(), None);
        assert_eq!(kb.propose_best_guess().unwrap(), Some(Cell::new(0, 1)));

        let marginals = kb.marginals().unwrap();
        assert_eq!(marginals.assignments, 3);
    }

    #[test]
    fn test_best_guess_none_when_board_resolved() {
        let mut kb = KnowledgeBase::new(1, 2);
        kb.add_observation(Cell::new(0, 0), 1).unwrap();

        assert_eq!(kb.propose_safe_move(), None);
        assert_eq!(kb.propose_best_guess().unwrap(), None);
        assert_eq!(kb.propose_move().unwrap(), None);
    }
}

//! SAT audit of a sentence set.
//!
//! Encodes every sentence as an "exactly k" CNF constraint and asks varisat
//! which cells are forced either way. This is independent of the subset
//! resolution in [`crate::KnowledgeBase`], so the two can check each other.

use crate::{Cell, Sentence};
use itertools::Itertools;
use std::collections::BTreeMap;
use varisat::{CnfFormula, ExtendFormula, Lit, Solver, Var};

/// What every satisfying assignment agrees on for a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeducedState {
    ForcedMine,
    ForcedSafe,
    Undetermined,
}

#[derive(Debug, Clone)]
pub struct Audit {
    /// The deduced state for every cell a sentence mentions.
    pub deductions: BTreeMap<Cell, DeducedState>,
    /// One assignment satisfying every sentence.
    pub sample_assignment: BTreeMap<Cell, bool>,
}

impl Audit {
    pub fn state(&self, cell: Cell) -> Option<DeducedState> {
        self.deductions.get(&cell).copied()
    }
}

struct Encoded {
    solver: Solver<'static>,
    vars: BTreeMap<Cell, Var>,
}

fn encode(sentences: &[Sentence]) -> Encoded {
    let mut solver = Solver::new();
    let mut vars = BTreeMap::new();
    for sentence in sentences {
        for &cell in sentence.cells() {
            vars.entry(cell).or_insert_with(|| solver.new_var());
        }
    }

    let mut formula = CnfFormula::new();
    for sentence in sentences {
        let lits: Vec<Lit> = sentence
            .cells()
            .iter()
            .map(|cell| Lit::from_var(vars[cell], true))
            .collect();
        encode_exactly_k(&mut formula, &lits, sentence.count());
    }
    solver.add_formula(&formula);

    Encoded { solver, vars }
}

/// Whether some assignment satisfies every sentence at once.
pub fn is_satisfiable(sentences: &[Sentence]) -> anyhow::Result<bool> {
    let Encoded { mut solver, .. } = encode(sentences);
    Ok(solver.solve()?)
}

/// Finds, for every mentioned cell, whether it is forced safe, forced mine,
/// or could go either way. Fails if the sentences are unsatisfiable.
pub fn audit(sentences: &[Sentence]) -> anyhow::Result<Audit> {
    let Encoded { mut solver, vars } = encode(sentences);

    if !solver.solve()? {
        anyhow::bail!("unsatisfiable sentence set");
    }

    let model = solver
        .model()
        .ok_or_else(|| anyhow::anyhow!("solver returned no model"))?;
    let sample_assignment = vars
        .iter()
        .map(|(&cell, &var)| (cell, model.contains(&Lit::from_var(var, true))))
        .collect();

    let mut deductions = BTreeMap::new();
    for (&cell, &var) in &vars {
        let mine_possible = solve_assuming(&mut solver, Lit::from_var(var, true))?;
        let safe_possible = solve_assuming(&mut solver, Lit::from_var(var, false))?;

        let state = match (mine_possible, safe_possible) {
            (true, true) => DeducedState::Undetermined,
            (true, false) => DeducedState::ForcedMine,
            (false, true) => DeducedState::ForcedSafe,
            (false, false) => anyhow::bail!("cell {cell} can be neither mine nor safe"),
        };
        deductions.insert(cell, state);
    }

    Ok(Audit {
        deductions,
        sample_assignment,
    })
}

fn solve_assuming(solver: &mut Solver, lit: Lit) -> anyhow::Result<bool> {
    solver.assume(&[lit]);
    let result = solver.solve();
    solver.assume(&[]);
    Ok(result?)
}

/// Sentences mention at most eight cells, so the naive binomial encoding
/// stays small.
fn encode_exactly_k(formula: &mut CnfFormula, lits: &[Lit], k: usize) {
    // At most k: among any k+1 cells, one is safe.
    if k < lits.len() {
        for combo in lits.iter().copied().combinations(k + 1) {
            let clause: Vec<Lit> = combo.iter().map(|&lit| !lit).collect();
            formula.add_clause(&clause);
        }
    }

    // At least k: among any n-k+1 cells, one is a mine.
    if k > lits.len() {
        formula.add_clause(&[]);
    } else if k > 0 {
        for combo in lits.iter().copied().combinations(lits.len() - k + 1) {
            formula.add_clause(&combo);
        }
    }
}

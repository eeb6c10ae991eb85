use crate::{Bounds, Cell};
use thiserror::Error;

/// Internal-consistency faults raised by the knowledge base.
///
/// Any of these means the agent was fed observations that cannot all be true
/// at once. The session that produced one should be abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KnowledgeError {
    #[error("cell {cell} lies outside the {bounds} grid")]
    OutOfBounds { cell: Cell, bounds: Bounds },

    #[error("cell {cell} is both known safe and known mine")]
    Contradiction { cell: Cell },

    #[error("marking {cell} as a mine drives a sentence count below zero")]
    NegativeCount { cell: Cell },

    #[error("sentence claims {count} mines among {cells} cells")]
    Overfull { count: usize, cells: usize },

    #[error("subset sentence claims {subset} mines but its superset only {superset}")]
    SubsetExceeds { subset: usize, superset: usize },

    #[error("observation at {cell} reports {count} mines, inconsistent with its {neighbors} neighbours")]
    InvalidObservation {
        cell: Cell,
        count: usize,
        neighbors: usize,
    },

    #[error("probability estimate exceeded its budget of {limit} branches")]
    BudgetExhausted { limit: usize },
}

pub type Result<T, E = KnowledgeError> = std::result::Result<T, E>;

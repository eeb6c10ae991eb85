//! The board the agent plays against.
//!
//! `Game` owns the real mine layout and hands the agent nothing but
//! `(cell, neighbouring-mine-count)` observations. Mines are placed lazily on
//! the first reveal so the opening click is always safe.

use crate::{Bounds, Cell};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// The visible state of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Tile {
    Hidden,
    Flagged,
    Revealed(u8), // Number of adjacent mines.
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GameState {
    Playing,
    Won,
    Lost,
}

/// What a reveal uncovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exploded,
    /// Every cell revealed by the move, with its neighbouring mine count.
    /// More than one when a zero cascades.
    Revealed(Vec<(Cell, u8)>),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Game {
    pub bounds: Bounds,
    /// The visible board, indexed `[row][col]`.
    pub board: Vec<Vec<Tile>>,
    pub total_mines: usize,
    pub game_state: GameState,
    /// Placed on the first reveal.
    mines: Option<BTreeSet<Cell>>,
    seed: u64,
}

impl Game {
    pub fn new(height: usize, width: usize, total_mines: usize, seed: u64) -> anyhow::Result<Self> {
        if total_mines >= height * width {
            anyhow::bail!("total mines must be less than the number of cells on the board");
        }
        Ok(Game {
            bounds: Bounds::new(height, width),
            board: vec![vec![Tile::Hidden; width]; height],
            total_mines,
            game_state: GameState::Playing,
            mines: None,
            seed,
        })
    }

    /// A game with a fixed mine layout.
    pub fn with_mines(
        height: usize,
        width: usize,
        mines: impl IntoIterator<Item = Cell>,
    ) -> anyhow::Result<Self> {
        let bounds = Bounds::new(height, width);
        let mines: BTreeSet<Cell> = mines.into_iter().collect();
        if let Some(cell) = mines.iter().find(|&&c| !bounds.contains(c)) {
            anyhow::bail!("mine {cell} lies outside the {bounds} board");
        }

        let mut game = Game::new(height, width, mines.len(), 0)?;
        game.mines = Some(mines);
        Ok(game)
    }

    pub fn deserialize(bts: &[u8]) -> anyhow::Result<Self> {
        Ok(bcs::from_bytes(bts)?)
    }

    pub fn serialize(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    pub fn tile(&self, cell: Cell) -> Tile {
        self.board[cell.row][cell.col]
    }

    pub fn is_mine(&self, cell: Cell) -> bool {
        self.mines.as_ref().is_some_and(|mines| mines.contains(&cell))
    }

    /// Reveals a cell, cascading through zeros.
    pub fn reveal_cell(&mut self, at: Cell) -> anyhow::Result<Outcome> {
        if self.game_state != GameState::Playing {
            anyhow::bail!("game_ended");
        }
        if !self.bounds.contains(at) {
            anyhow::bail!("cell {at} lies outside the {} board", self.bounds);
        }
        match self.tile(at) {
            Tile::Revealed(_) => return Ok(Outcome::Revealed(Vec::new())),
            Tile::Flagged => anyhow::bail!("cell_flagged"),
            Tile::Hidden => {}
        }

        if self.mines.is_none() {
            self.place_mines(at);
        }

        if self.is_mine(at) {
            self.game_state = GameState::Lost;
            return Ok(Outcome::Exploded);
        }

        let revealed = self.flood_fill_reveal(at);

        if self.check_win_condition() {
            self.game_state = GameState::Won;
        }

        Ok(Outcome::Revealed(revealed))
    }

    /// Flags or unflags a hidden cell.
    pub fn toggle_flag(&mut self, at: Cell) -> anyhow::Result<()> {
        if !self.bounds.contains(at) {
            anyhow::bail!("cell {at} lies outside the {} board", self.bounds);
        }
        let tile = &mut self.board[at.row][at.col];
        *tile = match *tile {
            Tile::Hidden => Tile::Flagged,
            Tile::Flagged => Tile::Hidden,
            Tile::Revealed(_) => anyhow::bail!("cell_revealed"),
        };
        Ok(())
    }

    /// The game is won once every cell that is not a mine has been revealed.
    pub fn check_win_condition(&self) -> bool {
        let revealed = self
            .board
            .iter()
            .flatten()
            .filter(|t| matches!(t, Tile::Revealed(_)))
            .count();
        self.mines.is_some() && revealed == self.bounds.area() - self.total_mines
    }

    /// Places mines away from the first click. Its neighbours are kept clear
    /// too when the board has room, so the opening reveals a zero.
    fn place_mines(&mut self, first: Cell) {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut clear: HashSet<Cell> = self.bounds.neighbors(first).collect();
        clear.insert(first);
        if self.bounds.area() - clear.len() < self.total_mines {
            clear = HashSet::from([first]);
        }

        let mines = self
            .bounds
            .cells()
            .filter(|cell| !clear.contains(cell))
            .choose_multiple(&mut rng, self.total_mines);

        tracing::debug!(mines = mines.len(), %first, "placed mines");
        self.mines = Some(mines.into_iter().collect());
    }

    fn count_adjacent_mines(&self, cell: Cell) -> u8 {
        self.bounds
            .neighbors(cell)
            .filter(|&n| self.is_mine(n))
            .count() as u8
    }

    fn flood_fill_reveal(&mut self, start: Cell) -> Vec<(Cell, u8)> {
        let mut revealed = Vec::new();
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);

        while let Some(cell) = queue.pop_front() {
            if self.tile(cell) != Tile::Hidden {
                continue;
            }

            let mine_count = self.count_adjacent_mines(cell);
            self.board[cell.row][cell.col] = Tile::Revealed(mine_count);
            revealed.push((cell, mine_count));

            if mine_count == 0 {
                for neighbor in self.bounds.neighbors(cell) {
                    if self.tile(neighbor) == Tile::Hidden && visited.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        revealed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_initialization() {
        let game = Game::new(5, 5, 3, 7).unwrap();
        assert_eq!(game.bounds, Bounds::new(5, 5));
        assert_eq!(game.total_mines, 3);
        assert_eq!(game.game_state, GameState::Playing);
        assert!(game.board.iter().flatten().all(|t| *t == Tile::Hidden));
    }

    #[test]
    fn test_game_initialization_too_many_mines() {
        assert!(Game::new(3, 3, 9, 0).is_err());
    }

    #[test]
    fn test_first_move_always_safe() {
        for seed in 0..20 {
            let mut game = Game::new(5, 5, 10, seed).unwrap();
            let outcome = game.reveal_cell(Cell::new(2, 2)).unwrap();

            assert!(matches!(outcome, Outcome::Revealed(_)));
            assert_eq!(game.tile(Cell::new(2, 2)), Tile::Revealed(0));
        }
    }

    #[test]
    fn test_first_move_safe_on_crowded_board() {
        // 8 mines in 9 cells leaves only the click itself clear
        let mut game = Game::new(3, 3, 8, 1).unwrap();
        let outcome = game.reveal_cell(Cell::new(1, 1)).unwrap();

        assert_eq!(outcome, Outcome::Revealed(vec![(Cell::new(1, 1), 8)]));
        assert_eq!(game.game_state, GameState::Won);
    }

    #[test]
    fn test_cascade_reports_every_revealed_cell() {
        // Single mine in the corner of a 3x3 board
        let mut game = Game::with_mines(3, 3, [Cell::new(0, 0)]).unwrap();
        let Outcome::Revealed(revealed) = game.reveal_cell(Cell::new(2, 2)).unwrap() else {
            panic!("expected a safe reveal");
        };

        assert_eq!(revealed.len(), 8);
        assert!(revealed.contains(&(Cell::new(1, 1), 1)));
        assert!(revealed.contains(&(Cell::new(2, 2), 0)));
        assert_eq!(game.game_state, GameState::Won);
    }

    #[test]
    fn test_hitting_mine() {
        let mut game = Game::with_mines(2, 2, [Cell::new(0, 0)]).unwrap();
        assert_eq!(game.reveal_cell(Cell::new(0, 0)).unwrap(), Outcome::Exploded);
        assert_eq!(game.game_state, GameState::Lost);
        assert!(game.reveal_cell(Cell::new(1, 1)).is_err());
    }

    #[test]
    fn test_flags() {
        let mut game = Game::with_mines(2, 2, [Cell::new(0, 0)]).unwrap();
        game.toggle_flag(Cell::new(0, 0)).unwrap();
        assert_eq!(game.tile(Cell::new(0, 0)), Tile::Flagged);
        assert!(game.reveal_cell(Cell::new(0, 0)).is_err());

        game.toggle_flag(Cell::new(0, 0)).unwrap();
        assert_eq!(game.tile(Cell::new(0, 0)), Tile::Hidden);
    }

    #[test]
    fn test_serialization_preserves_layout() {
        let mut game = Game::new(6, 6, 5, 42).unwrap();
        game.reveal_cell(Cell::new(0, 0)).unwrap();

        let restored = Game::deserialize(&game.serialize().unwrap()).unwrap();
        assert_eq!(restored.board, game.board);
        assert!(game.bounds.cells().all(|c| restored.is_mine(c) == game.is_mine(c)));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let mut a = Game::new(8, 8, 10, 99).unwrap();
        let mut b = Game::new(8, 8, 10, 99).unwrap();
        a.reveal_cell(Cell::new(4, 4)).unwrap();
        b.reveal_cell(Cell::new(4, 4)).unwrap();
        assert_eq!(a.board, b.board);
    }
}

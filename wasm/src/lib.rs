use minesweeper_ai as ms;
use minesweeper_ai::game::Outcome;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn create_game(size: u8, mines: u8) -> Result<Vec<u8>, String> {
    console_error_panic_hook::set_once();

    let game = ms::Game::new(size as usize, size as usize, mines as usize, rand::random())
        .map_err(|e| e.to_string())?;
    game.serialize().map_err(|e| e.to_string())
}

#[wasm_bindgen]
pub fn validate(bts: Vec<u8>) -> Result<bool, String> {
    console_error_panic_hook::set_once();

    let game = ms::Game::deserialize(&bts).map_err(|e| e.to_string())?;
    Ok(game.check_win_condition())
}

/// Reveals a cell. The returned game bytes carry one trailing byte: 0 if the
/// cell was safe, 1 if it was a mine.
#[wasm_bindgen]
pub fn choose_cell(bts: Vec<u8>, row: usize, col: usize) -> Result<Vec<u8>, String> {
    console_error_panic_hook::set_once();

    let mut game = ms::Game::deserialize(&bts).map_err(|e| e.to_string())?;
    let outcome = game
        .reveal_cell(ms::Cell::new(row, col))
        .map_err(|e| e.to_string())?;
    let mut xs = game.serialize().map_err(|e| e.to_string())?;
    xs.push(match outcome {
        Outcome::Exploded => 1,
        Outcome::Revealed(_) => 0,
    });
    Ok(xs)
}

/// The visible board, row-major: -1 hidden, -2 flagged, otherwise the count.
#[wasm_bindgen]
pub fn get_cells(bts: Vec<u8>) -> Result<Vec<i8>, String> {
    console_error_panic_hook::set_once();

    let game = ms::Game::deserialize(&bts).map_err(|e| e.to_string())?;
    Ok(game
        .board
        .into_iter()
        .flatten()
        .map(|tile| match tile {
            ms::Tile::Hidden => -1,
            ms::Tile::Flagged => -2,
            ms::Tile::Revealed(n) => n as i8,
        })
        .collect())
}

/// A hint engine for one game, fed the same observations the player sees.
#[wasm_bindgen]
pub struct Agent {
    kb: ms::KnowledgeBase,
}

#[wasm_bindgen]
impl Agent {
    #[wasm_bindgen(constructor)]
    pub fn new(height: usize, width: usize) -> Agent {
        console_error_panic_hook::set_once();
        Agent {
            kb: ms::KnowledgeBase::new(height, width),
        }
    }

    pub fn observe(&mut self, row: usize, col: usize, count: usize) -> Result<(), String> {
        self.kb
            .add_observation(ms::Cell::new(row, col), count)
            .map_err(|e| e.to_string())
    }

    pub fn flag(&mut self, row: usize, col: usize) -> Result<(), String> {
        self.kb
            .mark_mine(ms::Cell::new(row, col))
            .map_err(|e| e.to_string())
    }

    /// `[row, col]` of a proven-safe cell, or empty.
    pub fn safe_move(&self) -> Vec<u32> {
        self.kb
            .propose_safe_move()
            .map(|c| vec![c.row as u32, c.col as u32])
            .unwrap_or_default()
    }

    /// `[row, col]` of the least risky cell, or empty.
    pub fn best_guess(&self) -> Result<Vec<u32>, String> {
        let guess = self.kb.propose_best_guess().map_err(|e| e.to_string())?;
        Ok(guess.map(|c| vec![c.row as u32, c.col as u32]).unwrap_or_default())
    }

    /// Mine probability of a constrained cell, or -1 if it is unconstrained.
    pub fn probability(&self, row: usize, col: usize) -> Result<f64, String> {
        let marginals = self.kb.marginals().map_err(|e| e.to_string())?;
        Ok(marginals
            .probability(ms::Cell::new(row, col))
            .unwrap_or(-1.0))
    }
}

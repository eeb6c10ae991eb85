use anyhow::Context;
use clap::Parser;
use minesweeper_ai::game::Outcome;
use minesweeper_ai::sat::{self, DeducedState};
use minesweeper_ai::*;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Autonomous minesweeper bot.
///
/// Plays proven-safe cells first and falls back to the cell with the lowest
/// exact mine probability when logic runs out.
#[derive(Parser, Debug)]
#[command(name = "minesweeper-ai")]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value_t = 10)]
    height: usize,

    #[arg(long, default_value_t = 10)]
    width: usize,

    #[arg(short, long, default_value_t = 15)]
    mines: usize,

    /// Seed for mine placement; random when omitted
    #[arg(short, long)]
    seed: Option<u64>,

    /// Pause between moves, in milliseconds
    #[arg(short, long, default_value_t = 500)]
    delay_ms: u64,

    /// Cap on estimator branches per guess
    #[arg(long)]
    branch_limit: Option<usize>,

    /// Cross-check every deduction with the SAT audit
    #[arg(long)]
    audit: bool,

    /// Only print the final result
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    // MINESWEEPER_LOG_FORMAT=json switches to machine-parseable logs.
    let log_format =
        std::env::var("MINESWEEPER_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "minesweeper_ai=info".into());

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let seed = cli.seed.unwrap_or_else(rand::random);
    let mut game = Game::new(cli.height, cli.width, cli.mines, seed)?;
    let mut kb = KnowledgeBase::new(cli.height, cli.width);
    if let Some(limit) = cli.branch_limit {
        kb = kb.with_branch_limit(limit);
    }

    tracing::info!(
        height = cli.height,
        width = cli.width,
        mines = cli.mines,
        seed,
        "starting game"
    );
    if !cli.quiet {
        println!("--- Autonomous Minesweeper Bot ---");
        print_board(&game);
    }

    let mut move_count = 0;
    while game.game_state == GameState::Playing {
        move_count += 1;

        let (cell, certain) = match kb.propose_safe_move() {
            Some(cell) => (cell, true),
            None => match kb.propose_best_guess()? {
                Some(cell) => (cell, false),
                None => {
                    tracing::warn!("no candidate cells left");
                    break;
                }
            },
        };

        if !cli.quiet {
            let how = if certain { "safe" } else { "guess" };
            println!("\n--- Move #{} ---", move_count);
            println!("Bot reveals {} ({})", cell, how);
        }

        match game.reveal_cell(cell)? {
            Outcome::Exploded => {
                tracing::info!(%cell, certain, "hit a mine");
                anyhow::ensure!(!certain, "a cell proven safe was a mine: {cell}");
            }
            Outcome::Revealed(observations) => {
                for (revealed, count) in observations {
                    kb.add_observation(revealed, count as usize)
                        .with_context(|| format!("observing {revealed} = {count}"))?;
                }
            }
        }

        for &mine in kb.known_mine() {
            if game.tile(mine) == Tile::Hidden {
                game.toggle_flag(mine)?;
            }
        }

        if cli.audit {
            audit(&kb)?;
        }

        if !cli.quiet {
            print_board(&game);
            thread::sleep(Duration::from_millis(cli.delay_ms));
        }
    }

    println!("\n--- Game Over after {} moves ---", move_count);
    match game.game_state {
        GameState::Won => println!("Result: The bot won!"),
        GameState::Lost => println!("Result: The bot hit a mine and lost."),
        GameState::Playing => println!("Result: The game ended unexpectedly."),
    }

    Ok(())
}

/// Compares the live sentences against the SAT audit. Unsatisfiable
/// knowledge is fatal; cells the solver forces but subset resolution missed
/// are only reported.
fn audit(kb: &KnowledgeBase) -> anyhow::Result<()> {
    kb.verify()?;
    let audit = sat::audit(kb.sentences()).context("knowledge base is inconsistent")?;

    let missed = audit
        .deductions
        .values()
        .filter(|&&state| state != DeducedState::Undetermined)
        .count();
    if missed > 0 {
        tracing::info!(missed, "SAT audit forces cells that subset resolution left open");
    }
    Ok(())
}

fn print_board(game: &Game) {
    print!("   ");
    for col in 0..game.bounds.width {
        print!("{:^3}", col);
    }
    println!("\n  +{}", "---".repeat(game.bounds.width));

    for (row, tiles) in game.board.iter().enumerate() {
        print!("{:^2}|", row);
        for tile in tiles {
            let display = match tile {
                Tile::Hidden => " ■ ".to_string(),
                Tile::Flagged => " ⚑ ".to_string(),
                Tile::Revealed(0) => " · ".to_string(),
                Tile::Revealed(n) => format!(" {} ", n),
            };
            print!("{}", display);
        }
        println!();
    }
    println!();
}

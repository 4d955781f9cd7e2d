use chess::board::Board;
use clap::Parser;
use cli::Command;

pub mod cli;

const DEFAULT_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Simbelmyne, a UCI compliant chess engine.
///
/// Running without a subcommand starts the UCI loop on stdin/stdout. The
/// `bench` and `perft` subcommands are standalone diagnostics that don't
/// speak UCI.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(command) => command.run()?,

        None => {
            let board: Board = DEFAULT_FEN.parse().unwrap();
            engine::uci::SearchController::new(board).run()?;
        }
    }

    Ok(())
}

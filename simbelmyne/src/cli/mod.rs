use clap::Subcommand;

use self::bench::run_bench;
use self::perft::run_perft;

pub mod bench;
pub mod perft;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a fixed-depth search on one or more positions and report timing
    /// and node-count statistics.
    Bench {
        /// Set the search depth
        #[arg(short, long, value_name = "DEPTH", default_value = "10")]
        depth: usize,

        /// A FEN string to run the bench on. Defaults to the starting
        /// position.
        #[arg(short, long, value_name = "FEN")]
        fen: Option<String>,
    },

    /// Run a legal move-generation perft, either on a single FEN or the
    /// bundled regression suite.
    Perft {
        /// The desired search depth, in ply (half-turns)
        #[arg(short, long, default_value = "5")]
        depth: usize,

        #[arg(short, long, value_name = "FEN")]
        fen: Option<String>,

        /// Run the full perft regression suite instead of a single position
        #[arg(long)]
        all: bool,
    },
}

impl Command {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            Command::Bench { depth, fen } => run_bench(depth, fen),
            Command::Perft { depth, fen, all } => run_perft(depth, fen, all)?,
        };

        Ok(())
    }
}

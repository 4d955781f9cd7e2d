use std::sync::atomic::AtomicU32;

use colored::Colorize;
use engine::position::Position;
use engine::search::thread_marker::ThreadMarker;
use engine::search::NodeCounter;
use engine::search::SearchRunner;
use engine::time_control::TimeController;
use engine::transpositions::TTable;
use uci::time_control::TimeControl;

const DEBUG: bool = false;
const THREAD_MARKER_SLOTS: usize = 1 << 12;

const DEFAULT_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub fn run_bench(depth: usize, fen: Option<String>) {
    let fen = fen.unwrap_or_else(|| DEFAULT_FEN.to_string());
    run_single(&fen, depth);
}

pub fn run_single(fen: &str, depth: usize) {
    let board = fen.parse().unwrap();
    let position = Position::new(board);

    let tt = TTable::with_capacity(64);
    let markers = ThreadMarker::with_capacity(THREAD_MARKER_SLOTS);
    let global_nodes = AtomicU32::new(0);
    let nodes = NodeCounter::new(&global_nodes);
    let mut runner = SearchRunner::new(0, &tt, &markers, nodes);

    let (tc, _handle) = TimeController::new(TimeControl::Depth(depth), board.current);
    let report = runner.search::<DEBUG>(position, tc);

    println!("{board}");
    println!("{:17} {}", "FEN:".green(), fen);
    println!("{:17} {}", "Depth:".green(), depth);
    println!();

    println!("{:17} {}", "Best move:".bright_cyan(), report.pv[0]);
    println!("{:17} {}", "Score:".bright_cyan(), report.score);

    let nodes_visited = report.nodes;
    println!("{:17} {}", "Nodes visited:".blue(), nodes_visited);

    let time_spent = report.duration.as_millis();
    println!("{:17} {}ms", "Duration:".red(), time_spent);

    let knps = nodes_visited as u128 / if time_spent > 0 { time_spent } else { 1 };
    println!("{:17} {}knps", "knps:".red(), knps);

    println!("{:17} {}%", "TT occupancy".purple(), tt.occupancy());

    println!("\n");
}

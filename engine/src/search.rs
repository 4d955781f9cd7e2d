//! The search logic for Simbelmyne
//!
//! This is really the meat and bones of the engine, and along with the 
//! Evaluation, it's one of the two main pillars of any chess engine.
//!
//! The main search function performs an Iterative Deepening (ID) search.
//! That is, we search up to incrementally increasing depths, until we run out
//! of time. This sounds wasteful, because we're re-doing all the previously
//! searched nodes on every iteration. But, as it turns out, we can be smart 
//! about using that previous work to make the next iterations _much_ faster, 
//! making it a net win.
//!
//! Each search proceeds as a Negamax search with alpha-beta pruning, where we
//! try and be smart about which branches of the search tree aren't even worth
//! exploring, because we're guaranteed a worse result than what we already
//! have.
//!
//! Lastly, when we hit the moximum desired depth for our iteration, we perform 
//! a Quiescence search: We keep going a bit deeper until we're sure there's no
//! more captures to be had. This is to avoid any misjudgements caused by the
//! search cutting off abruptly. (What if you think you're ahead, but in the 
//! next turn, your queen gets captured?)
//!
use std::io::IsTerminal;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;
use crate::evaluate::kp_cache::KingPawnCache;
use crate::evaluate::ScoreExt;
use crate::history_tables::pv::PVTable;
use crate::history_tables::History;
use crate::search::params::MAX_DEPTH;
use crate::transpositions::TTable;
use crate::time_control::TimeController;
use crate::position::Position;
use crate::evaluate::Score;
use chess::movegen::moves::Move;
use chess::piece::Color;
use uci::search_info::SearchInfo;
use uci::search_info::Score as UciScore;
use uci::time_control::TimeControl;
use uci::wdl::WDL_MODEL;

pub mod params;
pub mod thread_marker;
pub mod skill;
mod zero_window;
mod negamax;
mod quiescence;
mod aspiration;

use thread_marker::ThreadMarker;
use skill::Skill;

const KP_CACHE_SIZE: usize = 2;

pub struct SearchRunner<'a> {
    pub id: usize,
    pub depth: usize,
    pub seldepth: usize,
    pub tt: &'a TTable,
    pub markers: &'a ThreadMarker,
    pub history: Box<History>,
    pub kp_cache: KingPawnCache,
    pub nodes: NodeCounter<'a>,
    pub tc: TimeController,
    stack: [SearchStackEntry; MAX_DEPTH],
    aborted: bool,

    /// Per-side ply threshold below which null-move pruning is disabled
    /// because a verification search is still pending for that side. Indexed
    /// by `Color`.
    nmp_min_ply: [u8; 2],

    /// Number of PV lines to search and report, per the `MultiPV` option.
    multipv: usize,

    /// Root moves already reported as a PV line within the current depth
    /// iteration. The root move loop in `negamax` skips these so later PV
    /// lines surface a different move.
    root_excludes: Vec<Move>,

    /// Skill level in `0..=20`, or `None` to always play the engine's true
    /// best move. Mirrors Stockfish's `Skill Level` UCI option.
    skill_level: Option<u8>,
}

impl<'a> SearchRunner<'a> {
    pub fn new(
        id: usize,
        tt: &'a TTable,
        markers: &'a ThreadMarker,
        nodes: NodeCounter<'a>,
    ) -> Self {
        // Just a placeholder TC. TC will get populated when search() is called.
        let (tc, _) = TimeController::new(TimeControl::Infinite, Color::White);

        Self {
            id,
            depth: 1,
            seldepth: 1,
            tt,
            markers,
            history: History::boxed(),
            kp_cache: KingPawnCache::with_capacity(KP_CACHE_SIZE),
            nodes,
            stack: [SearchStackEntry::default(); MAX_DEPTH],
            tc,
            aborted: false,
            nmp_min_ply: [0, 0],
            multipv: 1,
            root_excludes: Vec::new(),
            skill_level: None,
        }
    }

    pub fn reinit(&mut self) {
        self.depth = 1;
        self.seldepth = 1;
        self.nodes.clear_local();
        self.stack = [SearchStackEntry::default(); MAX_DEPTH];
        self.aborted = false;
        self.nmp_min_ply = [0, 0];
        self.root_excludes.clear();
        self.history.clear_nodes();
    }

    pub fn set_multipv(&mut self, multipv: usize) {
        self.multipv = multipv.max(1);
    }

    pub fn set_skill_level(&mut self, skill_level: Option<u8>) {
        self.skill_level = skill_level.map(|lvl| lvl.min(20));
    }
}

////////////////////////////////////////////////////////////////////////////////
//
// Iterative deepening search
//
////////////////////////////////////////////////////////////////////////////////

impl<'a> SearchRunner<'a> {
    pub fn search<const DEBUG: bool>(
        &mut self,
        mut pos: Position,
        tc: TimeController,
    ) -> SearchReport {
        let mut latest_report = SearchReport::default();
        let mut prev_best_move = None;
        let mut best_move_stability = 0;
        let mut previous_score = 0;
        let mut score_stability = 0;
        self.reinit(); // Clear previous search data
        self.tc = tc;

        // If there is only one legal move, notify the the time controller that
        // we don't want to waste any more time here.
        let root_move_count = pos.board.legal_moves::<true>().len();
        if root_move_count == 1 {
            self.tc.stop_early();
        }

        // MultiPV can't ask for more lines than there are legal root moves.
        let multipv = self.multipv.min(root_move_count.max(1));
        let mut pv_lines: Vec<PVTable> = (0..multipv).map(|_| PVTable::new()).collect();
        let mut pv_reports: Vec<SearchReport> = vec![SearchReport::default(); multipv];

        while self.depth <= MAX_DEPTH && self.tc.should_start_search(self.depth) {
            self.history.clear_all_killers();
            self.root_excludes.clear();

            ////////////////////////////////////////////////////////////////////
            //
            // Search each requested PV line in turn, excluding root moves
            // already claimed by an earlier line at this depth.
            //
            ////////////////////////////////////////////////////////////////////

            for pv_num in 0..multipv {
                pv_lines[pv_num].clear();

                let guess = pv_reports[pv_num].score;
                let score = self.aspiration_search(&mut pos, guess, &mut pv_lines[pv_num]);

                // If we got interrupted in the search, don't store the
                // half-completed search state. Just break and return the
                // previous iteration's search.
                if self.aborted {
                    break;
                }

                let mut report = SearchReport::new(&self, score, &pv_lines[pv_num]);
                report.multipv = (pv_num + 1) as u8;
                pv_reports[pv_num] = report;

                if let Some(mv) = pv_lines[pv_num].moves().first().copied() {
                    self.root_excludes.push(mv);
                }

                if DEBUG && self.id == 0 {
                    self.print_report(&pv_reports[pv_num], &pos);
                }
            }

            if self.aborted {
                break;
            }

            latest_report = pv_reports[0].clone();
            let score = latest_report.score;
            let best_move = pv_lines[0].pv_move();

            ////////////////////////////////////////////////////////////////////
            //
            // Update the time controller with gathered search statistics
            //
            ////////////////////////////////////////////////////////////////////

            if self.id == 0 {
                // Best move stability
                if prev_best_move == Some(best_move) {
                    best_move_stability += 1;
                } else {
                    best_move_stability = 0;
                }
                prev_best_move = Some(best_move);

                if score >= previous_score - 10 && score <= previous_score + 10 {
                    score_stability += 1;
                } else {
                    score_stability = 0;
                }
                previous_score = score;

                // Calculate the fraction of nodes spent on the current best move
                let bm_nodes = self.history.get_nodes(best_move);
                let node_frac = bm_nodes as f64 / self.nodes.local() as f64;

                self.tc.update(best_move_stability, node_frac, score_stability);
            }

            self.depth += 1;
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Skill level: rather than always reporting the true best line, weight
        // a pick among the searched MultiPV lines by how weak the configured
        // skill level is.
        //
        ////////////////////////////////////////////////////////////////////////

        if let Some(level) = self.skill_level {
            let searched: Vec<SearchReport> = pv_reports
                .into_iter()
                .filter(|report| !report.pv.is_empty())
                .collect();

            if !searched.is_empty() {
                let seed = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0)
                    ^ (self.id as u64).wrapping_mul(0x9E3779B97F4A7C15);

                let best_move = Skill::new(level, seed).pick_best(&searched);

                if let Some(report) = searched.iter().find(|report| report.pv[0] == best_move) {
                    latest_report = report.clone();
                }
            }
        }

        latest_report
    }

    fn print_report(&self, report: &SearchReport, pos: &Position) {
        let wdl_params = WDL_MODEL.params(&pos.board);
        let info = SearchInfo::from(report);

        // When the output is a terminal, we pretty-print the output
        // and include WDL stats.
        if std::io::stdout().is_terminal() {
            println!("{}", info.to_pretty(&pos.board, wdl_params));
        }

        // If we're talking to another process, _and we're not in wdl
        // mode_, we print UCI compliant output, but with the eval
        // rescaled according to the WDL model.
        else if !cfg!(feature = "wdl") {
            println!("info {}", info.to_uci(wdl_params));
        }

        // If we're talking to a process, _and_ we're in WDL mode, we
        // output the score in internal, unscaled, values.
        else {
            println!("info {info}");
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
//
// Search Reports
//
////////////////////////////////////////////////////////////////////////////////

/// Aggregated data concerning the search, used for reporting in various places
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// The nominal depth of the search
    pub depth: u8,

    /// The maximum depth searched to (in, e.g., QSearch)
    pub seldepth: u8,

    /// The number of nodes searched.
    pub nodes: u32,

    /// The total duration of the search
    pub duration: Duration,

    /// The best score found in the search
    pub score: Score,

    /// The principal variation compiled by the search
    pub pv: Vec<Move>,

    /// The occupancy of the tranpsosition table, as a per mille value.
    pub hashfull: u32,

    /// Which MultiPV line this report covers (1-indexed).
    pub multipv: u8,
}

impl SearchReport {
    pub fn new(thread: &SearchRunner, score: Score, pv: &PVTable) -> Self {
        Self {
            score,
            depth: thread.depth as u8,
            seldepth: thread.seldepth as u8,
            nodes: thread.nodes.global(),
            duration: thread.tc.elapsed(),
            pv: Vec::from(pv.moves()),
            hashfull: (1000.0 * thread.tt.occupancy()) as u32,
            multipv: 1,
        }
    }

    pub fn default() -> Self {
        Self {
            depth: 0,
            seldepth: 0,
            nodes: 0,
            duration: Duration::ZERO,
            score: 0,
            pv: Vec::new(),
            hashfull: 0,
            multipv: 1,
        }
    }
}

impl From<&SearchReport> for SearchInfo {
    fn from(report: &SearchReport) -> Self {
        let nps = (1_000_000 * report.nodes as u64)
            .checked_div(report.duration.as_micros() as u64)
            .unwrap_or_default();

        Self {
            depth: Some(report.depth),
            seldepth: Some(report.seldepth),
            time: Some(report.duration.as_millis() as u64),
            nodes: Some(report.nodes),
            score: Some(report.score.to_uci()),
            pv: report.pv.clone(),
            hashfull: Some(report.hashfull),
            nps: Some(nps),
            currmove: None,
            currmovenumber: None,
            multipv: (report.multipv > 1).then_some(report.multipv),
        }
    }
}

trait ScoreUciExt {
    fn to_uci(self) -> UciScore;
}

impl ScoreUciExt for Score {
    fn to_uci(self) -> UciScore {
        if self.is_mate() {
            UciScore::Mate(self.signum() * (self.mate_distance() + 1) / 2)
        } else {
            UciScore::Cp(self)
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
//
// Search Stack Entry
//
// Keep track of search information about a given ply that we want to share
// between plies.
//
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Copy, Clone, Default)]
struct SearchStackEntry {
    /// The eval for the last position in this ply
    pub eval: Score,

    /// A move to be excluded from the search at this ply (used for singular
    /// extensions
    pub excluded: Option<Move>,

    pub double_exts: u8
}

////////////////////////////////////////////////////////////////////////////////
//
// Node counter
//
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone)]
pub struct NodeCounter<'a> {
    local: u32,
    buffer: u32,
    global: &'a AtomicU32,
}

impl<'a> NodeCounter<'a> {
    const INTERVAL: u32 = 2048;
    pub fn new(global: &'a AtomicU32) -> Self {
        Self {
            global,
            local: global.load(Ordering::Relaxed),
            buffer: 0,
        }
    }

    pub fn increment(&mut self) {
        self.local += 1;
        self.buffer += 1;

        if self.buffer >= Self::INTERVAL {
            self.global.fetch_add(self.buffer, Ordering::Relaxed);
            self.buffer = 0;
        }
    }

    pub fn clear_global(&self) {
        self.global.store(0, Ordering::Relaxed);
    }

    pub fn clear_local(&mut self) {
        self.local = 0;
        self.buffer = 0;
    }

    pub fn local(&self) -> u32 {
        self.local
    }

    pub fn global(&self) -> u32 {
        self.global.load(Ordering::Relaxed)
    }
}

////////////////////////////////////////////////////////////////////////////////
//
// End-to-end search scenarios
//
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpositions::TTable;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn run_search(fen: &str, tc: TimeControl) -> (SearchRunner<'static>, SearchReport) {
        let board = fen.parse().unwrap();
        let position = Position::new(board);

        let tt = Box::leak(Box::new(TTable::with_capacity(16)));
        let markers = Box::leak(Box::new(ThreadMarker::with_capacity(1 << 10)));
        let global_nodes = Box::leak(Box::new(AtomicU32::new(0)));
        let nodes = NodeCounter::new(global_nodes);
        let mut runner = SearchRunner::new(0, tt, markers, nodes);

        let (tc, _handle) = TimeController::new(tc, board.current);
        let report = runner.search::<false>(position, tc);

        (runner, report)
    }

    fn run_multipv_search(fen: &str, tc: TimeControl, multipv: usize) -> SearchReport {
        let board = fen.parse().unwrap();
        let position = Position::new(board);

        let tt = TTable::with_capacity(16);
        let markers = ThreadMarker::with_capacity(1 << 10);
        let global_nodes = AtomicU32::new(0);
        let nodes = NodeCounter::new(&global_nodes);
        let mut runner = SearchRunner::new(0, &tt, &markers, nodes);
        runner.set_multipv(multipv);

        let (tc, _handle) = TimeController::new(tc, board.current);
        runner.search::<false>(position, tc)
    }

    #[test]
    fn startup_position_depth_six() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let (_, report) = run_search(fen, TimeControl::Depth(6));

        let opening_moves = ["e2e4", "d2d4", "g1f3", "c2c4"];
        let best_move = report.pv[0].to_string();

        assert!(
            opening_moves.contains(&best_move.as_str()),
            "expected a standard opening move, got {best_move}"
        );
        assert!(report.score.abs() <= 100);
        assert!(report.nodes > 50_000);
    }

    #[test]
    fn mate_in_two_is_found() {
        let fen = "k7/8/1Q6/8/8/8/8/K7 w - - 0 1";
        let (_, report) = run_search(fen, TimeControl::Depth(6));

        assert!(report.score.is_mate());
        assert_eq!(report.score.mate_distance(), 3);
    }

    #[test]
    fn kvk_is_a_dead_draw() {
        let fen = "k7/8/K7/8/8/8/8/8 b - - 0 1";
        let (_, report) = run_search(fen, TimeControl::Depth(10));

        assert_eq!(report.score, 0);
    }

    #[test]
    fn balanced_pawn_endgame_stays_near_zero() {
        let fen = "6k1/5ppp/8/8/8/8/5PPP/6K1 w - - 0 1";
        let (_, first) = run_search(fen, TimeControl::Depth(15));
        let (_, second) = run_search(fen, TimeControl::Depth(15));

        assert!(first.score.abs() < 100);
        assert_eq!(first.score, second.score);
    }

    #[test]
    fn deep_middlegame_returns_a_stable_pv() {
        let fen = "2kr3r/ppp1qppp/2n1bn2/3pp3/3PP3/2N1BN2/PPPQBPPP/2KR3R w - - 0 1";
        let (_, report) = run_search(fen, TimeControl::Depth(12));

        assert!(report.pv.len() >= 4);
    }

    #[test]
    fn multipv_reports_a_stable_pv() {
        let fen = "2kr3r/ppp1qppp/2n1bn2/3pp3/3PP3/2N1BN2/PPPQBPPP/2KR3R w - - 0 1";
        let report = run_multipv_search(fen, TimeControl::Depth(8), 3);

        assert!(report.pv.len() >= 4);
        assert_eq!(report.multipv, 1);
    }

    #[test]
    fn multipv_clamps_to_legal_move_count() {
        // A bare king-and-pawn ending has far fewer than 5 legal root moves;
        // asking for 5 PV lines shouldn't panic or stall.
        let fen = "7k/8/6KP/8/8/8/8/8 w - - 0 1";
        let report = run_multipv_search(fen, TimeControl::Depth(4), 5);

        assert!(!report.pv.is_empty());
    }

    #[test]
    fn external_stop_halts_within_time_budget() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let board = fen.parse().unwrap();
        let position = Position::new(board);

        let tt = TTable::with_capacity(16);
        let markers = ThreadMarker::with_capacity(1 << 10);
        let global_nodes = AtomicU32::new(0);
        let nodes = NodeCounter::new(&global_nodes);
        let mut runner = SearchRunner::new(0, &tt, &markers, nodes);

        let (tc, handle) = TimeController::new(TimeControl::Infinite, board.current);

        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_secs(1));
                handle.stop();
            });

            let start = std::time::Instant::now();
            let report = runner.search::<false>(position, tc);
            let elapsed = start.elapsed();

            assert!(!report.pv.is_empty());
            assert!(elapsed < Duration::from_millis(1300));
        });
    }
}

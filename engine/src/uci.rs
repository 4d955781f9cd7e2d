//! Simbelmyne's UCI interface.
//!
//! Utilities for creating a UCI "listener" that spins up a search thread
//! and communicates with it over a channel.
//!
//! Only the basic UCI commands needed for typical play are supported, no
//! extra features (hash table size, etc...) just yet.

use crate::evaluate::pretty_print::print_eval;
use crate::position::Position;
use crate::search::params::DEFAULT_TT_SIZE;
use crate::search::thread_marker::ThreadMarker;
use crate::search::NodeCounter;
use crate::search::SearchReport;
use crate::search::SearchRunner;
use crate::time_control::TimeControlHandle;
use crate::time_control::TimeController;
use crate::transpositions::TTable;
use chess::board::Board;
use colored::Colorize;
use std::io::stdout;
use std::io::BufRead;
use std::io::Write;
use std::sync::atomic::AtomicU32;
use std::sync::Mutex;
use uci::client::UciClientMessage;
use uci::engine::UciEngineMessage;
use uci::options::OptionType;
use uci::options::UciOption;

const DEBUG: bool = true;

/// Number of slots in the shared thread-collision table. Sized well above
/// any realistic thread count times node rate so collisions stay rare.
const THREAD_MARKER_SLOTS: usize = 1 << 16;

const BANNER: &str = r"
 ,-.          .       .
(   ` o       |       |
 `-.  . ;-.-. |-. ,-. | ;-.-. . . ;-. ,-.
.   ) | | | | | | |-' | | | | | | | | |-'
 `-'  ' ' ' ' `-' `-' ' ' ' ' `-| ' ' `-'
                               `-'        ";

const NAME: &str = "Simbelmyne";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
const WEBSITE: &str = "https://www.samroelants.com";
const REPOSITORY: &str = env!("CARGO_PKG_REPOSITORY");

/// Maximum number of legal moves reachable from any chess position, used as
/// the upper bound for the `MultiPV` option.
const MAX_LEGAL_MOVES: i32 = 218;

const UCI_OPTIONS: [UciOption; 4] = [
    UciOption {
        name: "Hash",
        option_type: OptionType::Spin {
            min: 4,
            max: 1024,
            default: DEFAULT_TT_SIZE as i32,
            step: 1,
        },
    },
    UciOption {
        name: "Threads",
        option_type: OptionType::Spin {
            min: 1,
            max: 512,
            default: 1,
            step: 1,
        },
    },
    UciOption {
        name: "MultiPV",
        option_type: OptionType::Spin {
            min: 1,
            max: MAX_LEGAL_MOVES,
            default: 1,
            step: 1,
        },
    },
    UciOption {
        name: "Skill Level",
        option_type: OptionType::Spin {
            min: 0,
            max: 20,
            default: 20,
            step: 1,
        },
    },
];

/// A wrapper that spins up a search thread and wires up the stdin/stdout of the
/// process to the search thread.
pub struct SearchController {
    position: Position,
    debug: bool,
    tc_handle: Option<TimeControlHandle>,
    search_thread: SearchThread,
}

impl SearchController {
    /// Create a new UCI listener
    pub fn new(board: Board) -> Self {
        Self {
            position: Position::new(board),
            debug: false,
            tc_handle: None,
            search_thread: SearchThread::new(),
        }
    }

    /// Start listening on stdin and transmit any valid UCI messages to the
    /// search thread
    pub fn run(&mut self) -> anyhow::Result<()> {
        let stdin = std::io::stdin().lock();

        eprintln!("{}", BANNER.blue());
        eprintln!(
            "                            {} {}",
            "Version".blue(),
            VERSION.blue()
        );
        eprintln!();
        eprintln!("{}: {NAME} {VERSION}", "Engine".blue());
        eprintln!("{}: {AUTHOR}", "Author".blue());
        eprintln!("{}: {WEBSITE}", "Website".blue());
        eprintln!("{}: {REPOSITORY}", "Source".blue());
        eprintln!();

        for input in stdin.lines() {
            let input = input.unwrap();

            match input.trim().parse::<UciClientMessage>() {
                Ok(command) => {
                    match command {
                        // Print identifying information
                        UciClientMessage::Uci => {
                            println!("id name {NAME} {VERSION}");
                            println!("id author {AUTHOR}");

                            for option in UCI_OPTIONS {
                                println!("option {option}");
                            }

                            #[cfg(feature = "spsa")]
                            {
                                use crate::search::params::SPSA_UCI_OPTIONS;
                                for option in SPSA_UCI_OPTIONS {
                                    println!("option {option}");
                                }
                            }

                            println!("uciok");
                        }

                        // Let the client know we're ready
                        UciClientMessage::IsReady => println!("readyok"),

                        // Reset the search state
                        UciClientMessage::UciNewGame => {
                            self.position = Position::new(Board::default());
                            self.tc_handle = None;
                            self.search_thread.clear_tables();
                        }

                        // Print additional debug information
                        UciClientMessage::Debug(debug) => self.debug = debug,

                        // Set up the provided position by applying the moves to
                        // the provided board state.
                        UciClientMessage::Position(board, moves) => {
                            let mut position = Position::new(board);

                            for mv in moves {
                                position = position.play_bare_move(mv);
                            }

                            self.position = position;
                        }

                        // Start a search on the current board position, with
                        // the requested time control
                        UciClientMessage::Go(tc) => {
                            let (tc, tc_handle) =
                                TimeController::new(tc, self.position.board.current);
                            self.tc_handle = Some(tc_handle);
                            self.search_thread.search(self.position.clone(), tc);
                        }

                        // Abort the currently running search
                        UciClientMessage::Stop => {
                            if let Some(tc_handle) = &self.tc_handle {
                                tc_handle.stop();
                            }
                        }

                        // Set an option
                        UciClientMessage::SetOption(name, value) => match name.as_str() {
                            // Advertized options
                            "Hash" => {
                                let size = value.parse()?;
                                self.search_thread.resize_tt(size);
                            }

                            "Threads" => {
                                let num_threads = value.parse()?;
                                self.search_thread.set_threads(num_threads);
                            }

                            // Our own `setoption` parser drops whitespace
                            // from option names, so "Skill Level" arrives as
                            // "SkillLevel".
                            "SkillLevel" => {
                                let level: u8 = value.parse()?;
                                self.search_thread.set_skill_level((level < 20).then_some(level));
                            }

                            "MultiPV" => {
                                let multipv = value.parse()?;
                                self.search_thread.set_multipv(multipv);
                            }

                            // Treat any other options as search params
                            // for SPSA purposes.
                            _ => {
                                if let Ok(_value) = value.parse::<i32>() {
                                    #[cfg(feature = "spsa")]
                                    {
                                        use crate::search::params::set_param;
                                        set_param(&name, _value);
                                    }
                                } else {
                                    eprintln!("Invalid value {value}");
                                }
                            }
                        },

                        UciClientMessage::Quit => {
                            break;
                        }
                    }
                }

                Err(err) => println!("{err}: {input}"),
            };

            stdout().flush()?;
        }

        Ok(())
    }

    /// Print the static evaluation of the current position to stdout.
    pub fn print_eval(&self) {
        println!("{}", print_eval(&self.position.board));
    }

    /// Print the current board position to stdout.
    pub fn print_board(&self) {
        println!("{}", self.position.board);
    }
}

/// A handle to a long-running thread that's in charge of searching for the best
/// move, given a position and time control.
struct SearchThread {
    tx: std::sync::mpsc::Sender<SearchCommand>,
}

impl SearchThread {
    /// Spawn a new search thread, and return a handle to it as a SearchThread
    /// struct.
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel::<SearchCommand>();

        std::thread::spawn(move || {
            let mut num_threads = 1;
            let mut tt_size = DEFAULT_TT_SIZE;
            let mut multipv = 1;
            let mut skill_level = None;
            let mut tt = TTable::with_capacity(tt_size);
            let markers = ThreadMarker::with_capacity(THREAD_MARKER_SLOTS);
            let global_nodes = AtomicU32::new(0);
            let nodes = NodeCounter::new(&global_nodes);
            let mut runners = (0..num_threads)
                .map(|i| SearchRunner::new(i, &tt, &markers, nodes.clone()))
                .collect::<Vec<_>>();

            for runner in runners.iter_mut() {
                runner.set_multipv(multipv);
                runner.set_skill_level(skill_level);
            }

            for msg in rx.iter() {
                match msg {
                    SearchCommand::Search(pos, tc) => {
                        tt.increment_age();
                        nodes.clear_global();

                        let reports: Mutex<Vec<Option<SearchReport>>> =
                            Mutex::new(vec![None; runners.len()]);

                        std::thread::scope(|s| {
                            for runner in runners.iter_mut() {
                                s.spawn(|| {
                                    let id = runner.id;
                                    let report = runner.search::<DEBUG>(pos.clone(), tc.clone());

                                    if id == 0 {
                                        tc.stop();
                                    }

                                    reports.lock().unwrap()[id] = Some(report);
                                });
                            }
                        });

                        let reports = reports.into_inner().unwrap();

                        if let Some(best) = select_best_thread(&reports) {
                            let ponder = best.pv.get(1).copied();
                            println!("{}", UciEngineMessage::BestMove(best.pv[0], ponder));
                        }
                    }

                    SearchCommand::Clear => {
                        tt = TTable::with_capacity(tt_size);

                        runners = (0..num_threads)
                            .map(|i| SearchRunner::new(i, &tt, &markers, nodes.clone()))
                            .collect::<Vec<_>>();

                        for runner in runners.iter_mut() {
                            runner.set_multipv(multipv);
                            runner.set_skill_level(skill_level);
                        }
                    }

                    SearchCommand::ResizeTT(size) => {
                        tt_size = size;
                        tt.resize(size);

                        runners = (0..num_threads)
                            .map(|i| SearchRunner::new(i, &tt, &markers, nodes.clone()))
                            .collect::<Vec<_>>();

                        for runner in runners.iter_mut() {
                            runner.set_multipv(multipv);
                            runner.set_skill_level(skill_level);
                        }
                    }

                    SearchCommand::SetThreads(n) => {
                        num_threads = n;

                        runners = (0..num_threads)
                            .map(|i| SearchRunner::new(i, &tt, &markers, nodes.clone()))
                            .collect();

                        for runner in runners.iter_mut() {
                            runner.set_multipv(multipv);
                            runner.set_skill_level(skill_level);
                        }
                    }

                    SearchCommand::SetMultiPv(n) => {
                        multipv = n;

                        for runner in runners.iter_mut() {
                            runner.set_multipv(multipv);
                        }
                    }

                    SearchCommand::SetSkillLevel(level) => {
                        skill_level = level;

                        for runner in runners.iter_mut() {
                            runner.set_skill_level(skill_level);
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Initiate a new search on this thread
    pub fn search(&self, position: Position, tc: TimeController) {
        self.tx.send(SearchCommand::Search(position, tc)).unwrap();
    }

    /// Clear the history and transposition tables for this search thread
    pub fn clear_tables(&self) {
        self.tx.send(SearchCommand::Clear).unwrap();
    }

    pub fn resize_tt(&self, size: usize) {
        self.tx.send(SearchCommand::ResizeTT(size)).unwrap();
    }

    pub fn set_threads(&self, num_threads: usize) {
        self.tx.send(SearchCommand::SetThreads(num_threads)).unwrap();
    }

    pub fn set_multipv(&self, multipv: usize) {
        self.tx.send(SearchCommand::SetMultiPv(multipv)).unwrap();
    }

    pub fn set_skill_level(&self, level: Option<u8>) {
        self.tx.send(SearchCommand::SetSkillLevel(level)).unwrap();
    }
}

/// Commands that can be sent from the UCI listener thread to the SearchThread
enum SearchCommand {
    Search(Position, TimeController),
    Clear,
    ResizeTT(usize),
    SetThreads(usize),
    SetMultiPv(usize),
    SetSkillLevel(Option<u8>),
}

/// Pick which search thread's result to report as the engine's move.
///
/// All threads search the same position; the one that got furthest is
/// usually most trustworthy, but a deeper thread that disagrees with the
/// majority on a losing score is often just an outlier that dove into a
/// bad line. We break ties on depth first, then prefer the thread most of
/// the others agree with.
fn select_best_thread(reports: &[Option<SearchReport>]) -> Option<&SearchReport> {
    let reports: Vec<&SearchReport> = reports.iter().flatten().collect();
    let main = *reports.first()?;

    reports
        .iter()
        .copied()
        .max_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| {
                    let agrees = |r: &SearchReport| r.pv.first() == main.pv.first();
                    agrees(a).cmp(&agrees(b))
                })
                .then_with(|| a.score.cmp(&b.score))
        })
}

//! Skill-level weighted tie-break among the searched MultiPV lines.
//!
//! When `Skill Level` is below its maximum, the engine doesn't always play
//! its true best move. Instead it nudges each candidate's score by a random,
//! weakness-scaled amount and plays whichever candidate comes out on top.
//! Lower skill levels apply more weakness, both in how much they discount a
//! line's lead over the alternatives and in how much randomness gets mixed
//! in, so weaker settings pick suboptimal moves more often without ever
//! blundering outright.
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use chess::movegen::moves::Move;
use crate::evaluate::Score;
use crate::search::SearchReport;
use crate::search::params::pawn_value;

pub struct Skill {
    level: u8,
    rng: SmallRng,
}

impl Skill {
    pub fn new(level: u8, seed: u64) -> Self {
        Self {
            level: level.min(20),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Pick a move among `candidates`, which must be sorted best-first (as
    /// MultiPV lines are).
    pub fn pick_best(&mut self, candidates: &[SearchReport]) -> Move {
        let top_score = candidates[0].score;
        let worst_score = candidates.last().unwrap().score;
        let delta = (top_score - worst_score).min(pawn_value());
        let weakness = 120 - 2 * self.level as i32;

        let mut max_score = Score::MINUS_INF;
        let mut best_move = candidates[0].pv[0];

        for report in candidates {
            let push = (weakness * (top_score - report.score)
                + delta * (self.rng.gen_range(0..weakness as u32) as i32))
                / 128;

            if report.score + push >= max_score {
                max_score = report.score + push;
                best_move = report.pv[0];
            }
        }

        best_move
    }
}

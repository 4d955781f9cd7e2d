//! Small extension traits filling in gaps between what the search/eval code
//! wants to ask of a [`Move`](chess::movegen::moves::Move) and what the
//! `chess` crate exposes directly.

use chess::board::Board;
use chess::movegen::moves::Move;
use chess::piece::Color;
use chess::square::Square;

/// Extra move queries used throughout search, eval and history bookkeeping.
pub trait MoveExt {
    /// The square a move captures on, accounting for en passant (where the
    /// captured pawn doesn't sit on the move's target square).
    fn capture_square(self, mover: Color) -> Square;

    /// A move is "tactical" if it changes material on the board: captures
    /// and promotions. Used to split the move list into tacticals and
    /// quiets during move ordering.
    fn is_tactical(self) -> bool;
}

impl MoveExt for Move {
    fn capture_square(self, mover: Color) -> Square {
        if self.is_en_passant() {
            self.tgt()
                .backward(mover)
                .expect("en passant target has a square behind it")
        } else {
            self.tgt()
        }
    }

    fn is_tactical(self) -> bool {
        self.is_capture() || self.is_promotion()
    }
}

/// Extra board queries used by move ordering.
pub trait BoardExt {
    /// Whether `mv` is among the legal moves for the current side to move.
    ///
    /// Used to validate a transposition table move before playing it, since
    /// the table can't distinguish a hash collision from a genuine hit.
    fn is_legal(&self, mv: Move) -> bool;
}

impl BoardExt for Board {
    fn is_legal(&self, mv: Move) -> bool {
        self.legal_moves::<true>().contains(&mv)
    }
}

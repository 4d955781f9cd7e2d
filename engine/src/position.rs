//! Most of the core logic concerning `Position`s lives in this module
//!
//! A `Position` is a wrapper around a `Board` that keeps track of some
//! additional game data the chess backend doesn't have any knowledge of:
//! Zobrist hashing and repetition history. Everything board-local (pin
//! rays, checkers, threats) is already maintained incrementally by
//! [`Board::play_move`](chess::movegen::play_move), so `Position` only
//! has to carry the hashes alongside it.

use arrayvec::ArrayVec;
use chess::board::Board;
use chess::movegen::castling::CastleType;
use chess::movegen::moves::{BareMove, Move};
use chess::piece::{Color, Piece, PieceType};

use crate::zobrist::ZHash;

// We don't ever expect to exceed 100 entries, because that would be a draw.
const HIST_SIZE: usize = 100;

/// Wrapper around a `Board` that stores additional metadata that is not tied
/// to the board itself, but rather to the search and evaluation algorithms.
#[derive(Debug, Clone)]
pub struct Position {
    /// The board associated with the position.
    pub board: Board,

    /// The Zobrist hash of the current board
    pub hash: ZHash,

    /// The Zobrist hash of the current pawn structure. Used for indexing
    /// the pawn cache, as well as pawn-based correction history.
    pub pawn_hash: ZHash,

    /// The Zobrist hash over pawns and kings. Used for indexing the
    /// king-pawn evaluation cache.
    pub kp_hash: ZHash,

    /// The Zobrist hash for non-pawn material. Used for non-pawn
    /// correction history.
    pub nonpawn_hashes: [ZHash; 2],

    /// A Zobrist-like key that keeps track of material count. Used for
    /// material-based correction history.
    pub material_hash: ZHash,

    /// A Zobrist-like key that keeps track of the minor piece structure.
    /// Used for minor-piece correction history.
    pub minor_hash: ZHash,

    /// A history of Zobrist hashes going back to the last half-move
    /// counter reset.
    pub history: ArrayVec<ZHash, HIST_SIZE>,
}

impl Position {
    /// Create a new `Position` from a `Board`.
    pub fn new(board: Board) -> Self {
        use Color::*;

        Position {
            board,
            hash: ZHash::from_board(&board),
            pawn_hash: ZHash::pawn_hash(&board),
            kp_hash: ZHash::kp_hash(&board),
            nonpawn_hashes: [
                ZHash::nonpawn_hash(&board, White),
                ZHash::nonpawn_hash(&board, Black),
            ],
            material_hash: ZHash::material_hash(&board),
            minor_hash: ZHash::minor_hash(&board),
            history: ArrayVec::new(),
        }
    }

    /// Check whether the current board state is a repetition by going
    /// through the history list. The history list tends to be fairly
    /// short, so it's not as expensive as it sounds.
    pub fn is_repetition(&self) -> bool {
        self.history
            .iter()
            // Look through the history backwards
            .rev()
            // Skip the position the opponent just played
            .skip(1)
            // Every other position can't be a repetition, since the side
            // to move differs.
            .step_by(2)
            .any(|&historic| historic == self.hash)
    }

    /// Play a move and update the board and hashes accordingly.
    pub fn play_move(&self, mv: Move) -> Self {
        use PieceType::*;
        assert!(mv != Move::NULL, "Tried processing a null move in `Position::play_move`");

        let us = self.board.current;
        let source = mv.src();
        let target = mv.tgt();

        let new_board = self.board.play_move(mv);

        let mut new_hash = self.hash;
        let mut new_pawn_hash = self.pawn_hash;
        let mut new_kp_hash = self.kp_hash;
        let mut new_nonpawn_hashes = self.nonpawn_hashes;
        let mut new_material_hash = self.material_hash;
        let mut new_minor_hash = self.minor_hash;

        ////////////////////////////////////////////////////////////////////////
        //
        // Capture
        //
        ////////////////////////////////////////////////////////////////////////

        let capture_sq = if mv.is_en_passant() {
            target.backward(us).expect("en passant target has a square behind it")
        } else {
            target
        };

        let mut material_changed = false;

        if let Some(captured) = self.board.get_at(capture_sq) {
            new_hash.toggle_piece(captured, capture_sq);

            if captured.is_pawn() {
                new_pawn_hash.toggle_piece(captured, capture_sq);
                new_kp_hash.toggle_piece(captured, capture_sq);
            } else {
                new_nonpawn_hashes[!us].toggle_piece(captured, capture_sq);

                if matches!(captured.piece_type(), Knight | Bishop) {
                    new_minor_hash.toggle_piece(captured, capture_sq);
                }
            }

            material_changed = true;
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Move piece
        //
        ////////////////////////////////////////////////////////////////////////

        let old_piece = self.board.get_at(source).expect("source square has a piece");
        new_hash.toggle_piece(old_piece, source);

        let new_piece = if mv.is_promotion() {
            Piece::new(mv.get_promo_type().unwrap(), us)
        } else {
            old_piece
        };
        new_hash.toggle_piece(new_piece, target);

        if old_piece.is_pawn() {
            new_pawn_hash.toggle_piece(old_piece, source);
            new_kp_hash.toggle_piece(old_piece, source);
        } else {
            new_nonpawn_hashes[us].toggle_piece(old_piece, source);

            if matches!(old_piece.piece_type(), Knight | Bishop) {
                new_minor_hash.toggle_piece(old_piece, source);
            }

            if old_piece.is_king() {
                new_kp_hash.toggle_piece(old_piece, source);
            }
        }

        if new_piece.is_pawn() {
            new_pawn_hash.toggle_piece(new_piece, target);
            new_kp_hash.toggle_piece(new_piece, target);
        } else {
            new_nonpawn_hashes[us].toggle_piece(new_piece, target);

            if matches!(new_piece.piece_type(), Knight | Bishop) {
                new_minor_hash.toggle_piece(new_piece, target);
            }

            if new_piece.is_king() {
                new_kp_hash.toggle_piece(new_piece, target);
            }
        }

        if mv.is_promotion() {
            material_changed = true;
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Castling
        //
        ////////////////////////////////////////////////////////////////////////

        if mv.is_castle() {
            let ctype = CastleType::from_move(mv).unwrap();
            let rook_move = ctype.rook_move();
            let rook = Piece::new(PieceType::Rook, us);

            new_hash.toggle_piece(rook, rook_move.src());
            new_hash.toggle_piece(rook, rook_move.tgt());

            new_nonpawn_hashes[us].toggle_piece(rook, rook_move.src());
            new_nonpawn_hashes[us].toggle_piece(rook, rook_move.tgt());
        }

        // Invalidate the previous castling rights, even if the move wasn't
        // a castle: `new_board` already reflects any changes, so comparing
        // the two states accounts for rook moves/captures and king moves
        // alike.
        new_hash.toggle_castling(self.board.castling_rights);
        new_hash.toggle_castling(new_board.castling_rights);

        ////////////////////////////////////////////////////////////////////////
        //
        // En passant
        //
        ////////////////////////////////////////////////////////////////////////

        if let Some(ep_sq) = self.board.en_passant {
            new_hash.toggle_ep(ep_sq);
        }

        if let Some(ep_sq) = new_board.en_passant {
            new_hash.toggle_ep(ep_sq);
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Side to move and material hash
        //
        ////////////////////////////////////////////////////////////////////////

        new_hash.toggle_side();

        if material_changed {
            new_material_hash = ZHash::material_hash(&new_board);
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Repetition history
        //
        ////////////////////////////////////////////////////////////////////////

        let new_history = if old_piece.is_pawn() || mv.is_capture() {
            ArrayVec::new()
        } else {
            let mut history = self.history.clone();
            history.push(self.hash);
            history
        };

        Self {
            board: new_board,
            hash: new_hash,
            pawn_hash: new_pawn_hash,
            kp_hash: new_kp_hash,
            nonpawn_hashes: new_nonpawn_hashes,
            material_hash: new_material_hash,
            minor_hash: new_minor_hash,
            history: new_history,
        }
    }

    /// Play a null move: pass the turn without moving a piece. Used by
    /// null-move pruning.
    pub fn play_null_move(&self) -> Self {
        let new_board = self.board.play_move(Move::NULL);

        let mut new_hash = self.hash;
        new_hash.toggle_side();

        if let Some(ep_sq) = self.board.en_passant {
            new_hash.toggle_ep(ep_sq);
        }

        Self {
            board: new_board,
            hash: new_hash,
            pawn_hash: self.pawn_hash,
            kp_hash: self.kp_hash,
            nonpawn_hashes: self.nonpawn_hashes,
            material_hash: self.material_hash,
            minor_hash: self.minor_hash,
            history: ArrayVec::new(),
        }
    }

    /// Play a bare move.
    ///
    /// Given a bare move, try and find a legal move that corresponds to
    /// it, and play it. Panics if the bare move didn't correspond to a
    /// legal move!
    pub fn play_bare_move(&self, bare: BareMove) -> Self {
        let mv = self.board.find_move(bare).expect("Not a legal move");

        self.play_move(mv)
    }

    /// Return a first approximation of the Zobrist hash after playing the
    /// provided move.
    ///
    /// This method tries to be fast over correct, so the hash will not
    /// match in certain situations. In particular, castling rights are
    /// not updated whatsoever. Used to prefetch transposition table
    /// entries before a move is actually played.
    pub fn approx_hash_after(&self, mv: Move) -> ZHash {
        let mut new_hash = self.hash;

        new_hash.toggle_side();

        let old_piece = self.board.get_at(mv.src())
            .expect("The source square of a move has a piece");

        new_hash.toggle_piece(old_piece, mv.src());

        if let Some(promo_type) = mv.get_promo_type() {
            let new_piece = Piece::new(promo_type, self.board.current);
            new_hash.toggle_piece(new_piece, mv.tgt());
        } else {
            new_hash.toggle_piece(old_piece, mv.tgt());
        }

        if mv.is_capture() {
            let capture_sq = if mv.is_en_passant() {
                mv.tgt().backward(self.board.current).unwrap()
            } else {
                mv.tgt()
            };

            if let Some(captured) = self.board.get_at(capture_sq) {
                new_hash.toggle_piece(captured, capture_sq);
            }
        }

        if let Some(ep_sq) = self.board.en_passant {
            new_hash.toggle_ep(ep_sq)
        }

        if mv.is_double_push() {
            if let Some(ep_sq) = mv.tgt().backward(self.board.current) {
                new_hash.toggle_ep(ep_sq)
            }
        }

        new_hash
    }
}

////////////////////////////////////////////////////////////////////////////////
//
// Tests
//
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use chess::movegen::moves::MoveType::*;
    use chess::square::Square::*;
    use colored::Colorize;

    use crate::tests::TEST_POSITIONS;
    use crate::zobrist::ZobristExt;

    #[test]
    fn test_hash_updates() {
        let initial_pos: Position = Position::new(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
                .parse()
                .unwrap(),
        );

        let mut final_pos = initial_pos.clone();

        let expected: Position = Position::new(
            "r1bqkbnr/pppp1ppp/2n5/4p1B1/3P4/8/PPP1PPPP/RN1QKBNR w KQkq - 2 3"
                .parse()
                .unwrap(),
        );

        let moves = vec![
            Move::new(D2, D4, DoublePush),
            Move::new(E7, E5, DoublePush),
            Move::new(C1, G5, Quiet),
            Move::new(B8, C6, Quiet),
        ];

        for mv in moves {
            final_pos = final_pos.play_move(mv);
        }

        assert_eq!(final_pos.hash, final_pos.board.hash());
        assert_eq!(final_pos.hash, expected.hash);
    }

    /// For all of the test suite, playing every single legal move and
    /// incrementally updating the hash yields the same result as hashing
    /// the resulting board from scratch.
    #[test]
    fn incremental_hashing() {
        let mut results: Vec<bool> = Vec::new();

        for fen in TEST_POSITIONS {
            let board: Board = fen.parse().unwrap();
            let position = Position::new(board);

            let all_match = board
                .legal_moves::<true>()
                .into_iter()
                .map(|mv| position.play_move(mv))
                .all(|new_pos| new_pos.hash == new_pos.board.hash());

            if all_match {
                println!("{}", fen.green());
            } else {
                println!("{}", fen.red());
            }

            results.push(all_match);
        }

        let all = TEST_POSITIONS.len();
        let passed = results.into_iter().filter(|&passed| passed).count();
        let failed = all - passed;

        assert_eq!(
            passed, all,
            "{} hashes came out different when updating incrementally",
            failed,
        );
    }

    #[test]
    fn test_repetitions() {
        let board: Board = "3k4/8/8/8/8/8/8/3K3P w - - 0 1".parse().unwrap();
        let mut position = Position::new(board);

        position = position.play_bare_move("d1e1".parse().unwrap());
        position = position.play_bare_move("d8e8".parse().unwrap());
        position = position.play_bare_move("e1d1".parse().unwrap());
        position = position.play_bare_move("e8d8".parse().unwrap());
        assert!(position.is_repetition());
        assert!(position.history.len() == 4);

        position = position.play_bare_move("h1h2".parse().unwrap());
        assert!(position.history.is_empty());
    }

    #[test]
    fn test_pawn_hash() {
        let pos1 = Position::new(
            "rnbqkbnr/ppp1pppp/3p4/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
                .parse()
                .unwrap(),
        );
        let pos2 = Position::new(
            "r1bqkbnr/ppp1pppp/2np4/8/2B1P3/8/PPPP1PPP/RNBQK1NR w KQkq - 2 3"
                .parse()
                .unwrap(),
        );

        assert_eq!(pos1.pawn_hash, pos2.pawn_hash);
    }

    #[test]
    fn test_incremental_pawn_hash() {
        let initial = Position::new(
            "rnbqkbnr/ppp1pppp/3p4/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
                .parse()
                .unwrap(),
        );
        let terminal = Position::new(
            "rnbqkb1r/ppp1pppp/3p1n2/8/4P3/3P4/PPP2PPP/RNBQKBNR w KQkq - 1 3"
                .parse()
                .unwrap(),
        );

        let terminal_inc = initial
            .play_move(Move::new(D2, D3, Quiet))
            .play_move(Move::new(G8, F6, Quiet));

        assert_eq!(terminal_inc.pawn_hash, terminal.pawn_hash);
    }
}

//! Assign a static score to a given board position.
//!
//! The evaluation terms fall into two categories:
//!
//! 1. Incremental terms, updated as pieces are added/removed/moved so the
//!    search doesn't recompute the whole position every node.
//! 2. Volatile terms (mobility, threats, king safety...) that can't be
//!    cheaply updated incrementally, since one piece moving can affect the
//!    contribution of every other piece. These are recomputed on every call
//!    to [`Eval::total`].
//!
//! Every term is tapered: each corresponds to a midgame and an endgame value
//! ([`S`]), interpolated by [`S::lerp`] according to the remaining material.

mod lookups;
pub mod params;
pub mod tuner;
pub mod kp_structure;
pub mod pretty_print;
pub mod terms;
pub mod kp_cache;
pub mod util;

use crate::chess_ext::MoveExt;
use crate::history_tables::history::HistoryIndex;
use crate::s;
use crate::zobrist::ZHash;

use chess::bitboard::Bitboard;
use chess::board::Board;
use chess::constants::DARK_SQUARES;
use chess::movegen::castling::CastleType;
use chess::movegen::moves::Move;
use chess::piece::Piece;
use chess::square::Square;
use chess::piece::PieceType;
use chess::piece::Color;
use lookups::KINGSIDE;
use lookups::QUEENSIDE;
use params::PARAMS;
use kp_cache::KingPawnCache;
use kp_cache::KingPawnCacheEntry;
use tuner::EvalTrace;
use tuner::NullTracer;
use tuner::Tracer;
use self::kp_structure::KingPawnStructure;
pub use util::*;

const WHITE: bool = true;
const BLACK: bool = false;

////////////////////////////////////////////////////////////////////////////////
//
// Evaluation logic
//
////////////////////////////////////////////////////////////////////////////////

/// Granular, incrementally-maintained score breakdown for a position.
///
/// All terms are stored relative to White; [`Eval::total`] converts to the
/// side-to-move's perspective.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Eval {
    /// Between 0 (endgame) and 24 (full material, midgame).
    game_phase: u8,
    material: S,
    psqt: S,
    kp_structure: KingPawnStructure,
    bishop_pair: S,
    rook_open_file: S,
    rook_semiopen_file: S,
    major_on_seventh: S,
    queen_open_file: S,
    queen_semiopen_file: S,
    knight_outposts: S,
    bishop_outposts: S,
    knight_shelter: S,
    bishop_shelter: S,
    bad_bishops: S,
}

impl Eval {
    /// Draw score baseline. Negative: we'd rather not draw.
    const CONTEMPT: S = s!(-50, -10);

    /// Compute the full incremental breakdown for a position from scratch.
    pub fn new(board: &Board, trace: &mut impl Tracer<EvalTrace>) -> Self {
        let mut eval = Self::default();

        for (sq_idx, piece) in board.piece_list.into_iter().enumerate() {
            if let Some(piece) = piece {
                let sq = Square::from(sq_idx);
                eval.game_phase += Self::phase_value(piece);
                eval.material += eval.material(piece, trace);
                eval.psqt += eval.psqt(piece, sq, trace);
            }
        }

        eval.kp_structure       = KingPawnStructure::new(board, trace);
        eval.knight_outposts     = eval.knight_outposts::<WHITE>(board, trace);
        eval.knight_outposts    -= eval.knight_outposts::<BLACK>(board, trace);
        eval.bishop_outposts     = eval.bishop_outposts::<WHITE>(board, trace);
        eval.bishop_outposts    -= eval.bishop_outposts::<BLACK>(board, trace);
        eval.bishop_pair         = eval.bishop_pair::<WHITE>(board, trace);
        eval.bishop_pair        -= eval.bishop_pair::<BLACK>(board, trace);
        eval.rook_open_file      = eval.rook_open_file::<WHITE>(board, trace);
        eval.rook_open_file     -= eval.rook_open_file::<BLACK>(board, trace);
        eval.rook_semiopen_file  = eval.rook_semiopen_file::<WHITE>(board, trace);
        eval.rook_semiopen_file -= eval.rook_semiopen_file::<BLACK>(board, trace);
        eval.queen_open_file     = eval.queen_open_file::<WHITE>(board, trace);
        eval.queen_open_file    -= eval.queen_open_file::<BLACK>(board, trace);
        eval.queen_semiopen_file = eval.queen_semiopen_file::<WHITE>(board, trace);
        eval.queen_semiopen_file-= eval.queen_semiopen_file::<BLACK>(board, trace);
        eval.major_on_seventh    = eval.major_on_seventh::<WHITE>(board, trace);
        eval.major_on_seventh   -= eval.major_on_seventh::<BLACK>(board, trace);
        eval.knight_shelter      = eval.knight_shelter::<WHITE>(board, trace);
        eval.knight_shelter     -= eval.knight_shelter::<BLACK>(board, trace);
        eval.bishop_shelter      = eval.bishop_shelter::<WHITE>(board, trace);
        eval.bishop_shelter     -= eval.bishop_shelter::<BLACK>(board, trace);
        eval.bad_bishops         = eval.bad_bishops::<WHITE>(board, trace);
        eval.bad_bishops        -= eval.bad_bishops::<BLACK>(board, trace);

        eval
    }

    /// Total tapered score, relative to the side to move.
    pub fn total(&mut self, board: &Board, trace: &mut impl Tracer<EvalTrace>) -> Score {
        // Shares expensive per-call information (king zones, attack maps)
        // between the volatile terms below, so they don't each recompute it.
        let mut ctx = EvalContext::new(board);

        let mut total = self.material;
        total += self.psqt;
        total += self.kp_structure.score();
        total += self.knight_outposts;
        total += self.bishop_outposts;
        total += self.knight_shelter;
        total += self.bishop_shelter;
        total += self.bishop_pair;
        total += self.rook_open_file;
        total += self.rook_semiopen_file;
        total += self.queen_open_file;
        total += self.queen_semiopen_file;
        total += self.major_on_seventh;
        total += self.bad_bishops;

        total += self.connected_rooks::<WHITE>(board, trace);
        total -= self.connected_rooks::<BLACK>(board, trace);
        total += self.mobility::<WHITE>(board, &mut ctx, trace);
        total -= self.mobility::<BLACK>(board, &mut ctx, trace);
        total += self.virtual_mobility::<WHITE>(board, trace);
        total -= self.virtual_mobility::<BLACK>(board, trace);
        total += self.king_zone::<WHITE>(&mut ctx, trace);
        total -= self.king_zone::<BLACK>(&mut ctx, trace);
        total += self.threats::<WHITE>(board, &ctx, trace);
        total -= self.threats::<BLACK>(board, &ctx, trace);
        total += self.checks::<WHITE>(board, &ctx, trace);
        total -= self.checks::<BLACK>(board, &ctx, trace);
        total += self.volatile_passers::<WHITE>(board, &ctx, trace);
        total -= self.volatile_passers::<BLACK>(board, &ctx, trace);
        total += self.push_threats::<WHITE>(board, &ctx, trace);
        total -= self.push_threats::<BLACK>(board, &ctx, trace);

        let perspective = if board.current.is_white() { 1 } else { -1 };
        total += PARAMS.tempo * perspective;
        trace.add(|t| t.tempo += perspective);

        let eg_scaling = endgame_scaling(board, total.eg());
        let total = S::new(total.mg(), total.eg() * eg_scaling / 128);
        trace.add(|t| t.eg_scaling = eg_scaling);

        let score = total.lerp(self.game_phase);

        perspective * score
    }

    pub fn play_move(
        &self,
        idx: HistoryIndex,
        board: &Board,
        kp_hash: ZHash,
        kp_cache: &mut KingPawnCache,
    ) -> Self {
        let mut new_score = *self;
        let HistoryIndex { moved, captured, mv } = idx;
        let us = moved.color();

        if mv == Move::NULL {
            return new_score;
        }

        if let Some(captured) = captured {
            new_score.remove(captured, mv.capture_square(us), board, kp_hash, kp_cache);
        }

        if idx.mv.is_promotion() {
            new_score.remove(moved, mv.src(), board, kp_hash, kp_cache);

            let promo_piece = Piece::new(mv.get_promo_type().unwrap(), us);
            new_score.add(promo_piece, mv.tgt(), board, kp_hash, kp_cache);
        } else {
            new_score.update(moved, mv.src(), mv.tgt(), board, kp_hash, kp_cache);
        }

        if mv.is_castle() {
            let ctype = CastleType::from_move(mv).unwrap();
            let rook_move = ctype.rook_move();
            let rook = Piece::new(PieceType::Rook, us);
            new_score.update(rook, rook_move.src(), rook_move.tgt(), board, kp_hash, kp_cache);
        }

        new_score
    }

    /// Add a piece to the running score.
    pub fn add(&mut self, piece: Piece, sq: Square, board: &Board, kp_hash: ZHash, kp_cache: &mut KingPawnCache) {
        self.game_phase += Self::phase_value(piece);
        self.material += self.material(piece, &mut NullTracer);
        self.psqt += self.psqt(piece, sq, &mut NullTracer);
        self.update_incremental_terms(piece, board, kp_hash, kp_cache);
    }

    /// Remove a piece from the running score.
    pub fn remove(&mut self, piece: Piece, sq: Square, board: &Board, kp_hash: ZHash, kp_cache: &mut KingPawnCache) {
        self.game_phase -= Self::phase_value(piece);
        self.material -= self.material(piece, &mut NullTracer);
        self.psqt -= self.psqt(piece, sq, &mut NullTracer);
        self.update_incremental_terms(piece, board, kp_hash, kp_cache);
    }

    /// Move a piece from one square to another; cheaper than remove+add.
    pub fn update(&mut self, piece: Piece, from: Square, to: Square, board: &Board, kp_hash: ZHash, kp_cache: &mut KingPawnCache) {
        self.psqt -= self.psqt(piece, from, &mut NullTracer);
        self.psqt += self.psqt(piece, to, &mut NullTracer);
        self.update_incremental_terms(piece, board, kp_hash, kp_cache);
    }

    /// Recompute only the incremental terms that depend on the moved piece's
    /// type. A bishop move never needs to touch rook-file terms, etc.
    fn update_incremental_terms(&mut self, piece: Piece, board: &Board, kp_hash: ZHash, kp_cache: &mut KingPawnCache) {
        use PieceType::*;

        match piece.piece_type() {
            Pawn => {
                self.kp_structure = if let Some(entry) = kp_cache.probe(kp_hash) {
                    entry.into()
                } else {
                    let kp_structure = KingPawnStructure::new(board, &mut NullTracer);
                    kp_cache.insert(KingPawnCacheEntry::new(kp_hash, kp_structure));
                    kp_structure
                };

                self.knight_outposts      = self.knight_outposts::<WHITE>(board, &mut NullTracer);
                self.knight_outposts     -= self.knight_outposts::<BLACK>(board, &mut NullTracer);
                self.bishop_outposts      = self.bishop_outposts::<WHITE>(board, &mut NullTracer);
                self.bishop_outposts     -= self.bishop_outposts::<BLACK>(board, &mut NullTracer);
                self.knight_shelter       = self.knight_shelter::<WHITE>(board, &mut NullTracer);
                self.knight_shelter      -= self.knight_shelter::<BLACK>(board, &mut NullTracer);
                self.bishop_shelter       = self.bishop_shelter::<WHITE>(board, &mut NullTracer);
                self.bishop_shelter      -= self.bishop_shelter::<BLACK>(board, &mut NullTracer);
                self.rook_open_file       = self.rook_open_file::<WHITE>(board, &mut NullTracer);
                self.rook_open_file      -= self.rook_open_file::<BLACK>(board, &mut NullTracer);
                self.rook_semiopen_file   = self.rook_semiopen_file::<WHITE>(board, &mut NullTracer);
                self.rook_semiopen_file  -= self.rook_semiopen_file::<BLACK>(board, &mut NullTracer);
                self.queen_open_file      = self.queen_open_file::<WHITE>(board, &mut NullTracer);
                self.queen_open_file     -= self.queen_open_file::<BLACK>(board, &mut NullTracer);
                self.queen_semiopen_file  = self.queen_semiopen_file::<WHITE>(board, &mut NullTracer);
                self.queen_semiopen_file -= self.queen_semiopen_file::<BLACK>(board, &mut NullTracer);
                self.major_on_seventh     = self.major_on_seventh::<WHITE>(board, &mut NullTracer);
                self.major_on_seventh    -= self.major_on_seventh::<BLACK>(board, &mut NullTracer);
                self.bad_bishops          = self.bad_bishops::<WHITE>(board, &mut NullTracer);
                self.bad_bishops         -= self.bad_bishops::<BLACK>(board, &mut NullTracer);
            },

            Knight => {
                self.knight_outposts  = self.knight_outposts::<WHITE>(board, &mut NullTracer);
                self.knight_outposts -= self.knight_outposts::<BLACK>(board, &mut NullTracer);
                self.knight_shelter   = self.knight_shelter::<WHITE>(board, &mut NullTracer);
                self.knight_shelter  -= self.knight_shelter::<BLACK>(board, &mut NullTracer);
            },

            Bishop => {
                self.bishop_pair      = self.bishop_pair::<WHITE>(board, &mut NullTracer);
                self.bishop_pair     -= self.bishop_pair::<BLACK>(board, &mut NullTracer);
                self.bishop_outposts  = self.bishop_outposts::<WHITE>(board, &mut NullTracer);
                self.bishop_outposts -= self.bishop_outposts::<BLACK>(board, &mut NullTracer);
                self.bishop_shelter   = self.bishop_shelter::<WHITE>(board, &mut NullTracer);
                self.bishop_shelter  -= self.bishop_shelter::<BLACK>(board, &mut NullTracer);
                self.bad_bishops      = self.bad_bishops::<WHITE>(board, &mut NullTracer);
                self.bad_bishops     -= self.bad_bishops::<BLACK>(board, &mut NullTracer);
            },

            Rook => {
                self.rook_open_file     = self.rook_open_file::<WHITE>(board, &mut NullTracer);
                self.rook_open_file    -= self.rook_open_file::<BLACK>(board, &mut NullTracer);
                self.rook_semiopen_file = self.rook_semiopen_file::<WHITE>(board, &mut NullTracer);
                self.rook_semiopen_file-= self.rook_semiopen_file::<BLACK>(board, &mut NullTracer);
                self.major_on_seventh   = self.major_on_seventh::<WHITE>(board, &mut NullTracer);
                self.major_on_seventh  -= self.major_on_seventh::<BLACK>(board, &mut NullTracer);
            },

            Queen => {
                self.queen_open_file      = self.queen_open_file::<WHITE>(board, &mut NullTracer);
                self.queen_open_file     -= self.queen_open_file::<BLACK>(board, &mut NullTracer);
                self.queen_semiopen_file  = self.queen_semiopen_file::<WHITE>(board, &mut NullTracer);
                self.queen_semiopen_file -= self.queen_semiopen_file::<BLACK>(board, &mut NullTracer);
                self.major_on_seventh     = self.major_on_seventh::<WHITE>(board, &mut NullTracer);
                self.major_on_seventh    -= self.major_on_seventh::<BLACK>(board, &mut NullTracer);
            },

            King => {
                self.kp_structure = if let Some(entry) = kp_cache.probe(kp_hash) {
                    entry.into()
                } else {
                    let kp_structure = KingPawnStructure::new(board, &mut NullTracer);
                    kp_cache.insert(KingPawnCacheEntry::new(kp_hash, kp_structure));
                    kp_structure
                };

                self.major_on_seventh  = self.major_on_seventh::<WHITE>(board, &mut NullTracer);
                self.major_on_seventh -= self.major_on_seventh::<BLACK>(board, &mut NullTracer);
            },
        }
    }

    const GAME_PHASE_VALUES: [u8; PieceType::COUNT] = [0, 1, 1, 2, 4, 0];

    fn phase_value(piece: Piece) -> u8 {
        Self::GAME_PHASE_VALUES[piece.piece_type()]
    }

    /// Draw score, relative to the side to move at the root, with a small
    /// node-parity jitter so repeated positions don't all collapse to the
    /// exact same value.
    pub fn draw_score(self, ply: usize, nodes: u32) -> Score {
        let random = nodes as Score & 0b11 - 2;

        if ply % 2 == 0 {
            Self::CONTEMPT.lerp(self.game_phase) + random
        } else {
            -(Self::CONTEMPT.lerp(self.game_phase) + random)
        }
    }
}

/// Information gathered once per [`Eval::total`] call and shared between the
/// volatile eval terms, so they don't each recompute it.
pub struct EvalContext {
    king_zones: [Bitboard; Color::COUNT],
    king_attacks: [u32; Color::COUNT],
    threats: [Bitboard; Color::COUNT],
    attacked_by: [[Bitboard; PieceType::COUNT]; Color::COUNT],
}

impl EvalContext {
    pub fn new(board: &Board) -> Self {
        let white_king = board.kings(Color::White).first();
        let black_king = board.kings(Color::Black).first();

        let white_king_zone = white_king.king_squares();
        let black_king_zone = black_king.king_squares();

        Self {
            king_zones: [white_king_zone, black_king_zone],
            king_attacks: [0, 0],
            threats: [Bitboard::EMPTY; Color::COUNT],
            attacked_by: [[Bitboard::EMPTY; PieceType::COUNT]; Color::COUNT],
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
//
// Endgame scaling
//
////////////////////////////////////////////////////////////////////////////////

/// Downscale the endgame score in drawish material configurations (few pawns,
/// all on one wing, opposite-colored bishops).
pub fn endgame_scaling(board: &Board, eg_score: i32) -> i32 {
    use Color::*;
    use PieceType::*;

    let strong = if eg_score > 0 { White } else { Black };
    let weak = !strong;

    let strong_pawns = board.pawns(strong);
    let pawns_missing = 8 - strong_pawns.count() as i32;
    let mut pawn_scale = 128 - pawns_missing * pawns_missing;

    let on_one_side = (strong_pawns & QUEENSIDE).is_empty()
        || (strong_pawns & KINGSIDE).is_empty();

    if on_one_side {
        pawn_scale -= 20;
    }

    let strong_nonpawn = (board.occupied_by(strong) & !board.pawns(strong)).count();
    let weak_nonpawn = (board.occupied_by(weak) & !board.pawns(weak)).count();

    let opp_bishops =
        strong_nonpawn <= 2 &&
        weak_nonpawn <= 2 &&
        strong_nonpawn == weak_nonpawn &&
        board.bishops(strong).count() == 1 &&
        board.bishops(weak).count() == 1 &&
        (board.piece_bbs[Bishop] & DARK_SQUARES).count() == 1;

    if opp_bishops {
        let scale = if strong_nonpawn == 1 { 64 } else { 96 };
        pawn_scale = pawn_scale.min(scale);
    }

    pawn_scale
}

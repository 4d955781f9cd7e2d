use chess::movegen::moves::Move;
use chess::movegen::moves::MoveType;

use crate::evaluate::tuner::NullTracer;
use crate::evaluate::Eval;
use crate::evaluate::Score;
use crate::evaluate::ScoreExt;
use crate::history_tables::history::HistoryScore;
use crate::history_tables::pv::PVTable;
use crate::move_picker::MovePicker;
use crate::move_picker::Stage;
use crate::position::Position;
use crate::transpositions::NodeType;
use crate::transpositions::TTEntry;

use super::params::*;
use super::SearchRunner;

const ALL_MOVES: bool = true;

impl<'a> SearchRunner<'a> {
    /// The main negamax function of the search routine.
    pub fn negamax<const PV: bool>(
        &mut self,
        pos: &Position,
        ply: usize,
        mut depth: usize,
        alpha: Score,
        beta: Score,
        pv: &mut PVTable,
        mut eval_state: Eval,
        try_null: bool,
        cutnode: bool,
    ) -> Score {
        if self.aborted {
            return Score::MINUS_INF;
        }

        let us = pos.board.current;
        let in_root = ply == 0;
        let excluded = self.stack[ply].excluded;

        // Carry over the current count of double extensions
        if ply > 0 {
            self.stack[ply].double_exts = self.stack[ply - 1].double_exts;
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Check extension:
        //
        // If we're in check, make sure we always search at least one extra ply
        //
        ////////////////////////////////////////////////////////////////////////

        let in_check = pos.board.in_check();

        if in_check {
            depth += 1;
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Quiescence search:
        //
        // If we're in a leaf node, extend with a quiescence search
        //
        ////////////////////////////////////////////////////////////////////////

        if depth == 0 || ply >= MAX_DEPTH {
            return self.quiescence_search::<PV>(pos, ply, alpha, beta, eval_state);
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Start processing node
        //
        ////////////////////////////////////////////////////////////////////////

        self.nodes.increment();
        self.seldepth = self.seldepth.max(ply);

        // Has another thread already claimed this node? If so, give our next
        // sibling move a small extra LMR bump rather than redoing its work.
        let thread_collision = self.markers.mark(pos.hash.0, ply, self.id);

        // Rule-based draw?
        // Don't return early when in the root node, because we won't have a PV
        // move to play.
        if !in_root && (pos.board.is_rule_draw() || pos.is_repetition()) {
            return eval_state.draw_score(ply, self.nodes.local());
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Mate-distance pruning
        //
        // No line starting here can be better than mating on the very next
        // move, or worse than getting mated right now. Tightening alpha/beta
        // against those bounds can trigger a cutoff before we even probe the
        // TT, in positions close enough to the root.
        //
        ////////////////////////////////////////////////////////////////////////

        let alpha = alpha.max(-Score::MATE + ply as Score);
        let beta = beta.min(Score::MATE - ply as Score - 1);

        if alpha >= beta {
            return alpha;
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // TT cutoffs
        //
        ////////////////////////////////////////////////////////////////////////

        let tt_entry = if excluded.is_none() {
            self.tt.probe(pos.hash)
        } else {
            None
        };

        let tt_move = tt_entry.and_then(|entry| entry.get_move());
        let ttpv = PV || tt_entry.is_some_and(|entry| entry.get_ttpv());

        if !PV && !in_root && excluded.is_none() {
            if let Some(entry) = tt_entry {
                if let Some(score) = entry.try_score(depth, alpha, beta, ply) {
                    return score;
                }
            }
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Compute the static evaluation
        //
        ////////////////////////////////////////////////////////////////////////

        let raw_eval = if excluded.is_some() {
            // In singular search, we're not going to be using/storing the raw
            // eval, so we can use whatever.
            Score::MINUS_INF
        } else if let Some(entry) = tt_entry {
            entry.get_eval()
        } else {
            let eval = eval_state.total(&pos.board, &mut NullTracer);

            self.tt.insert(TTEntry::new(
                pos.hash,
                Move::NULL,
                Score::NO_SCORE,
                eval,
                0,
                NodeType::Upper,
                self.tt.get_age(),
                ttpv,
                ply,
            ));

            eval
        };

        let static_eval = if excluded.is_some() {
            self.stack[ply].eval
        } else if in_check {
            -Score::MATE + ply as Score
        } else {
            raw_eval + self.history.eval_correction(pos, ply)
        };

        // Store the eval in the search stack
        self.stack[ply].eval = static_eval;

        ////////////////////////////////////////////////////////////////////////
        //
        // Razoring
        //
        // At the very edge of the search, if the static eval is hopelessly
        // below alpha, don't bother with a full search: drop straight to
        // quiescence and trust its verdict.
        //
        ////////////////////////////////////////////////////////////////////////

        if !PV
            && !in_root
            && !in_check
            && excluded.is_none()
            && depth == 1
            && static_eval + razor_margin() <= alpha
        {
            return self.quiescence_search::<false>(pos, ply, alpha, beta, eval_state);
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Clear the next ply's killers table
        //
        ////////////////////////////////////////////////////////////////////////

        self.history.clear_killers(ply + 1);

        ////////////////////////////////////////////////////////////////////////
        //
        // Improving heuristic
        //
        ////////////////////////////////////////////////////////////////////////

        let improving = !in_check && ply >= 2 && self.stack[ply - 2].eval < static_eval;

        ////////////////////////////////////////////////////////////////////////
        //
        // Reverse futility pruning
        //
        ////////////////////////////////////////////////////////////////////////

        let futility =
            rfp_margin() * depth as Score + rfp_improving_margin() * !improving as Score;

        if !PV
            && !in_root
            && !in_check
            && excluded.is_none()
            && depth <= rfp_threshold()
            && static_eval - futility >= beta
        {
            return (static_eval + beta) / 2;
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Null move pruning
        //
        // Pretend to play a NULL move and search at reduced depth with a
        // narrow window. If we still get a beta cutoff, the position was so
        // good we shouldn't bother searching it any further.
        //
        // We only trust this blindly once per side per branch: after a
        // successful prune, the next attempt at or above `nmp_min_ply[us]`
        // gets a verification search (the reduced-depth search re-run with
        // null move pruning disabled) before we accept the cutoff, guarding
        // against zugzwang positions `zugzwang_unlikely` didn't catch.
        //
        ////////////////////////////////////////////////////////////////////////

        let nmp_margin = nmp_base_margin()
            + nmp_margin_factor() * depth as Score
            + nmp_improving_margin() * improving as Score;

        let should_null_prune = try_null
            && !PV
            && !in_root
            && !in_check
            && excluded.is_none()
            && static_eval + nmp_margin >= beta
            && pos.board.zugzwang_unlikely();

        if should_null_prune {
            let reduction = (nmp_base_reduction() + depth / nmp_reduction_factor()).min(depth);
            let verify = ply >= self.nmp_min_ply[us] as usize;

            self.history.push_null_mv();

            let score = -self.zero_window(
                &pos.play_null_move(),
                ply + 1,
                depth - reduction,
                -beta + 1,
                &mut PVTable::new(),
                eval_state,
                false,
                !cutnode,
            );

            self.history.pop_mv();

            if score >= beta {
                if !verify || depth < nmp_verify_threshold() {
                    return score;
                }

                // Verification search: re-search at the reduced depth with
                // null move pruning switched off for this side until we
                // clear the threshold again.
                self.nmp_min_ply[us] = (ply + 3 * (depth - reduction) / 4) as u8;

                let verified = self.zero_window(
                    pos,
                    ply,
                    depth - reduction,
                    beta,
                    &mut PVTable::new(),
                    eval_state,
                    false,
                    cutnode,
                );

                // The guard only exists to stop the verification subtree
                // above from recursing into a nested verification of its
                // own; it's not meant to survive past it. Clearing it here,
                // regardless of the verification's outcome, is intentional:
                // a sibling move explored afterwards at this same ply is
                // free to attempt NMP (and earn its own verification) again.
                self.nmp_min_ply[us] = 0;

                if verified >= beta {
                    return verified;
                }
            }
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Internal Iterative Reduction
        //
        ////////////////////////////////////////////////////////////////////////

        if tt_move.is_none() && (PV || cutnode) && depth >= iir_threshold() {
            depth -= iir_reduction();
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // ProbCut
        //
        // If a shallow, reduced-depth search on just the tacticals already
        // clears a raised beta by a wide margin, the position is almost
        // certainly going to cause a cutoff at full depth too. Verify the
        // cheap qsearch hint with a real zero-window search before trusting
        // it.
        //
        ////////////////////////////////////////////////////////////////////////

        let probcut_beta = beta + probcut_margin();

        if !PV
            && !in_root
            && !in_check
            && excluded.is_none()
            && depth >= probcut_min_depth()
            && !beta.is_mate()
            && !tt_entry.is_some_and(|entry| {
                entry.get_depth() + probcut_depth_reduction() >= depth
                    && entry.get_score() < probcut_beta
            })
        {
            let mut probcut_picker = MovePicker::new::<false>(pos, tt_move, ply);

            while let Some(mv) = probcut_picker.next(&self.history) {
                if Some(mv) == excluded {
                    continue;
                }

                if !pos.board.see(mv, probcut_beta - static_eval) {
                    continue;
                }

                self.history.push_mv(mv, &pos.board);
                self.tt.prefetch(pos.approx_hash_after(mv));

                let next_position = pos.play_move(mv);
                let next_eval = eval_state.play_move(
                    self.history.indices[ply],
                    &next_position.board,
                    next_position.kp_hash,
                    &mut self.kp_cache,
                );

                let mut score = -self.quiescence_search::<false>(
                    &next_position,
                    ply + 1,
                    -probcut_beta,
                    -probcut_beta + 1,
                    next_eval,
                );

                if score >= probcut_beta {
                    score = -self.zero_window(
                        &next_position,
                        ply + 1,
                        depth - probcut_depth_reduction(),
                        -probcut_beta + 1,
                        &mut PVTable::new(),
                        next_eval,
                        true,
                        !cutnode,
                    );
                }

                self.history.pop_mv();

                if self.aborted {
                    return Score::MINUS_INF;
                }

                if score >= probcut_beta {
                    self.tt.insert(TTEntry::new(
                        pos.hash,
                        mv,
                        score,
                        raw_eval,
                        depth - probcut_depth_reduction() + 1,
                        NodeType::Lower,
                        self.tt.get_age(),
                        ttpv,
                        ply,
                    ));

                    return score;
                }
            }
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Generate the legal moves
        //
        ////////////////////////////////////////////////////////////////////////

        let mut legal_moves = MovePicker::new::<ALL_MOVES>(pos, tt_move, ply);

        ////////////////////////////////////////////////////////////////////////
        //
        // Singular extensions (Part 1)
        //
        ////////////////////////////////////////////////////////////////////////

        let se_candidate = tt_entry
            .filter(|entry| {
                depth >= se_threshold()
                    && !in_root
                    && excluded.is_none()
                    && entry.get_type() != NodeType::Upper
                    && entry.get_depth() + se_tt_delta() >= depth
                    && !entry.get_score().is_mate()
            })
            .and_then(|entry| entry.get_move());

        ////////////////////////////////////////////////////////////////////////
        //
        // Iterate over the remaining moves
        //
        ////////////////////////////////////////////////////////////////////////

        let mut move_count = 0;
        let mut quiets_tried: Vec<Move> = Vec::new();
        let mut tacticals_tried: Vec<Move> = Vec::new();
        let mut best_move = tt_move;
        let mut best_score = Score::MINUS_INF;
        let mut node_type = NodeType::Upper;
        let mut alpha = alpha;
        let mut local_pv = PVTable::new();

        while let Some(mv) = legal_moves.next(&self.history) {
            if Some(mv) == excluded {
                continue;
            }

            // MultiPV: moves already reported as a PV at this depth iteration
            // are skipped so the next line can surface a different root move.
            if in_root && self.root_excludes.contains(&mv) {
                continue;
            }

            local_pv.clear();

            if !self.tc.should_continue(self.nodes.local()) {
                self.aborted = true;
                return Score::MINUS_INF;
            }

            let lmr_depth = depth.saturating_sub(lmr_reduction(depth, move_count));

            ////////////////////////////////////////////////////////////////////
            //
            // Futility pruning
            //
            ////////////////////////////////////////////////////////////////////

            let futility =
                fp_base() + fp_margin() * (lmr_depth as Score) + 100 * improving as Score;

            if move_count > 0
                && !PV
                && !in_check
                && lmr_depth <= fp_threshold()
                && static_eval + futility < alpha
            {
                legal_moves.only_good_tacticals = true;
                continue;
            }

            ////////////////////////////////////////////////////////////////////
            //
            // SEE pruning
            //
            ////////////////////////////////////////////////////////////////////

            if legal_moves.stage() > Stage::GoodTacticals
                && move_count > 0
                && !in_root
                && !best_score.is_mate()
            {
                let margin = if mv.get_type() == MoveType::Quiet {
                    -see_quiet_margin() * depth as Score
                } else {
                    -see_tactical_margin() * depth as Score
                };

                if !pos.board.see(mv, margin) {
                    continue;
                }
            }

            ////////////////////////////////////////////////////////////////////
            //
            // Late move pruning
            //
            ////////////////////////////////////////////////////////////////////

            let lmp_moves =
                (lmp_base() + lmp_factor() * depth * depth) / (1 + !improving as usize);

            if depth <= lmp_threshold() && !PV && !in_check && move_count >= lmp_moves {
                legal_moves.only_good_tacticals = true;
            }

            ////////////////////////////////////////////////////////////////////
            //
            // History pruning
            //
            ////////////////////////////////////////////////////////////////////

            let hp_margin = if mv.is_tactical() {
                tactical_hp_offset() + tactical_hp_margin() * depth as i32
            } else {
                quiet_hp_offset() + quiet_hp_margin() * depth as i32
            };

            if !in_check
                && !PV
                && !best_score.is_mate()
                && depth <= hp_threshold()
                && legal_moves.current_score() <= hp_margin
            {
                if !mv.is_tactical() {
                    legal_moves.skip_quiets();
                }
                continue;
            }

            ////////////////////////////////////////////////////////////////////
            //
            // Singular extensions (Part 2) + multicut / negative extensions
            //
            ////////////////////////////////////////////////////////////////////

            let mut extension: i16 = 0;

            if se_candidate == Some(mv) {
                let mut se_pv = PVTable::new();
                let tt_score = tt_entry.unwrap().get_score();

                let se_depth = (depth - 1) / 2;
                let se_beta = Score::max(tt_score - se_margin() * depth as Score, -Score::MATE);

                self.stack[ply].excluded = se_candidate;
                let value = self.zero_window(
                    pos,
                    ply,
                    se_depth,
                    se_beta,
                    &mut se_pv,
                    eval_state,
                    try_null,
                    cutnode,
                );
                self.stack[ply].excluded = None;

                if value < se_beta {
                    extension += 1;

                    if !PV
                        && value + double_ext_margin() < se_beta
                        && self.stack[ply].double_exts <= double_ext_max()
                    {
                        extension += 1;
                        self.stack[ply].double_exts += 1;

                        if !mv.is_tactical() && value < se_beta - triple_ext_margin() {
                            extension += 1;
                        }
                    }
                } else if se_beta >= beta {
                    return se_beta;
                } else if tt_score >= beta {
                    extension -= 1;
                }
            }

            ////////////////////////////////////////////////////////////////////
            //
            // Late move reductions, and the actual recursive search
            //
            ////////////////////////////////////////////////////////////////////

            let mut score;
            self.history.push_mv(mv, &pos.board);
            let nodes_before = self.nodes.local();

            self.tt.prefetch(pos.approx_hash_after(mv));

            let next_position = pos.play_move(mv);

            let next_eval = eval_state.play_move(
                self.history.indices[ply],
                &next_position.board,
                next_position.kp_hash,
                &mut self.kp_cache,
            );

            // PV Move
            if move_count == 0 {
                score = -self.negamax::<PV>(
                    &next_position,
                    ply + 1,
                    (depth as i16 + extension - 1).max(0) as usize,
                    -beta,
                    -alpha,
                    &mut local_pv,
                    next_eval,
                    false,
                    !(PV || cutnode),
                );
            } else {
                let mut reduction: i16 = 0;

                if depth >= lmr_min_depth() && move_count >= lmr_threshold() + PV as usize {
                    reduction = lmr_reduction(depth, move_count) as i16;

                    reduction += (legal_moves.stage() > Stage::GoodTacticals) as i16;
                    reduction += (legal_moves.stage() > Stage::Quiets) as i16;
                    reduction += tt_move.is_some_and(|mv| mv.is_tactical()) as i16;
                    reduction += cutnode as i16;
                    reduction += thread_collision as i16;
                    reduction -= PV as i16;
                    reduction -= in_check as i16;
                    reduction -= next_position.board.in_check() as i16;

                    if !mv.is_tactical() {
                        reduction -=
                            (legal_moves.current_score() / hist_lmr_divisor()) as i16;
                    }

                    reduction = reduction.clamp(0, depth as i16 - 1);
                }

                score = -self.zero_window(
                    &next_position,
                    ply + 1,
                    (depth as i16 - 1 + extension - reduction).max(0) as usize,
                    -alpha,
                    &mut local_pv,
                    next_eval,
                    true,
                    true,
                );

                if score > alpha && reduction > 0 {
                    score = -self.zero_window(
                        &next_position,
                        ply + 1,
                        (depth as i16 + extension - 1).max(0) as usize,
                        -alpha,
                        &mut local_pv,
                        next_eval,
                        true,
                        !cutnode,
                    );
                }

                if score > alpha && score < beta {
                    score = -self.negamax::<PV>(
                        &next_position,
                        ply + 1,
                        (depth as i16 + extension - 1).max(0) as usize,
                        -beta,
                        -alpha,
                        &mut local_pv,
                        next_eval,
                        false,
                        !(PV || cutnode),
                    );
                }
            }

            self.history.pop_mv();
            move_count += 1;

            if in_root {
                self.history.add_nodes(mv, self.nodes.local() - nodes_before);
            }

            if score > best_score {
                best_score = score;
            }

            if score >= beta {
                node_type = NodeType::Lower;
                best_move = Some(mv);
                break;
            }

            if score > alpha {
                alpha = score;
                node_type = NodeType::Exact;
                best_move = Some(mv);
                pv.add_to_front(mv, &local_pv);
            }

            if score < alpha && !mv.is_tactical() {
                quiets_tried.push(mv);
            }

            if mv.is_tactical() {
                tacticals_tried.push(mv);
            }

            if self.aborted {
                return Score::MINUS_INF;
            }
        }

        // Checkmate / stalemate / singular search dead end?
        if move_count == 0 && excluded.is_some() {
            return alpha;
        }

        if move_count == 0 && in_check {
            return -Score::MATE + ply as Score;
        }

        if move_count == 0 && !in_check {
            return eval_state.draw_score(ply, self.nodes.local());
        }

        ////////////////////////////////////////////////////////////////////////
        //
        // Update the History tables
        //
        ////////////////////////////////////////////////////////////////////////

        if node_type == NodeType::Lower {
            let best_move = best_move.unwrap();
            let bonus = HistoryScore::bonus(depth);

            if !best_move.is_tactical() {
                self.history.add_hist_bonus(best_move, &pos.board, bonus);
                self.history.add_killer(ply, best_move);
                self.history.add_countermove(best_move);

                for mv in quiets_tried {
                    self.history.add_hist_bonus(mv, &pos.board, -bonus);
                }
            } else {
                self.history.add_hist_bonus(best_move, &pos.board, bonus);
            }

            for mv in tacticals_tried {
                self.history.add_hist_bonus(mv, &pos.board, -bonus);
            }
        }

        if excluded.is_none() {
            ////////////////////////////////////////////////////////////////////
            //
            // Update the correction history
            //
            ////////////////////////////////////////////////////////////////////

            if !in_check
                && !best_move.is_some_and(|mv| mv.is_tactical())
                && !(node_type == NodeType::Lower && best_score <= static_eval)
                && !(node_type == NodeType::Upper && best_score >= static_eval)
            {
                self.history
                    .update_corrhist(pos, ply, depth, best_score - static_eval);
            }

            ////////////////////////////////////////////////////////////////////
            //
            // Update the TT
            //
            ////////////////////////////////////////////////////////////////////

            self.tt.insert(TTEntry::new(
                pos.hash,
                best_move.unwrap_or(Move::NULL),
                best_score,
                raw_eval,
                depth,
                node_type,
                self.tt.get_age(),
                ttpv,
                ply,
            ));
        }

        best_score
    }
}

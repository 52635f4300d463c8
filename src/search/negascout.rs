use shakmaty::{Position, Square};

use super::{SearchResult, SearchSession};
use crate::constants::*;
use crate::movegen::{self, passed_pawn_push, related_moves};
use crate::moves::{PackedMove, select_best, select_hash_move};
use crate::tt::Bound;

const RAZOR_MARGIN: i32 = 250;

fn futility_margin(depth: i32) -> i32 {
    if depth <= PLY_SCALE {
        61
    } else if depth <= 2 * PLY_SCALE {
        144
    } else if depth <= 3 * PLY_SCALE {
        268
    } else {
        334
    }
}

/// Reduction for an otherwise reducible move at `move_index`. The first three
/// candidates are always searched at full depth. `lmr_count` counts the moves
/// reduced so far at this node.
fn late_move_reduction(depth: i32, move_index: usize, lmr_count: &mut u32, is_capture: bool) -> i32 {
    if depth < 3 * PLY_SCALE || move_index < 3 {
        return 0;
    }
    *lmr_count += 1;
    if *lmr_count > 3 && depth > 5 * PLY_SCALE && !is_capture {
        2 * PLY_SCALE
    } else {
        PLY_SCALE
    }
}

impl SearchSession {
    /// Principal variation search of the current position.
    ///
    /// `depth` is in 1/[`PLY_SCALE`] plies. `recapture_square` is the square
    /// of an even exchange on the previous ply; recapturing there is
    /// extended. `in_check` must tell whether the side to move is in check.
    pub fn negascout(
        &mut self,
        mut alpha: i32,
        beta: i32,
        ply: usize,
        depth: i32,
        recapture_square: Option<Square>,
        in_check: bool,
    ) -> SearchResult<i32> {
        self.check_budget()?;
        self.count_node(ply, depth);
        let iply = ply as i32;
        self.sti[ply].node_idx = self.total_nodes;
        self.sti[ply].best_move = PackedMove::NONE;
        log::trace!("negascout ply={ply} depth={depth} alpha={alpha} beta={beta} node={}", self.total_nodes);

        if ply + 1 >= MAX_SEARCH_PLY {
            return Ok(self.eval.eval_pos(self.pos.chess()));
        }

        let h_key = self.pos.history_hash();

        if self.pos.can_claim_draw_50() {
            if self.pos.is_check() && movegen::check_evasions(self.pos.chess()).is_empty() {
                return Ok(-(MATE0 - (iply + 1)));
            }
            return Ok(0);
        }
        // A mate would have been found the first time the position came up.
        if self.pos.can_claim_draw_rep(self.first_new) {
            return Ok(0);
        }

        let mut eval_score = UNKNOWN_SCORE;
        let mut hash_move = PackedMove::NONE;
        let ent = self.tt.probe(h_key);
        if ent.bound != Bound::Empty {
            let score = ent.score(iply);
            eval_score = i32::from(ent.eval_score);
            hash_move = ent.mv();
            let ply_to_mate = MATE0 - score.abs();
            let e_depth = ent.depth();
            if beta == alpha + 1 && (e_depth >= depth || e_depth >= ply_to_mate * PLY_SCALE) {
                let cutoff = match ent.bound {
                    Bound::Exact => true,
                    Bound::Lower => score >= beta,
                    Bound::Upper => score <= alpha,
                    Bound::Empty => false,
                };
                if cutoff {
                    let board = self.pos.chess().board();
                    if score >= beta && !hash_move.is_none() && board.piece_at(hash_move.to_square()).is_none() {
                        self.kt.add_killer(ply, hash_move);
                    }
                    return Ok(score);
                }
            }
        }
        let pos_extend = if in_check { PLY_SCALE } else { 0 };

        if depth + pos_extend <= 0 {
            self.q0_eval = eval_score;
            let score = self.quiesce(alpha, beta, ply, 0, in_check);
            let bound = if score <= alpha {
                Bound::Upper
            } else if score >= beta {
                Bound::Lower
            } else {
                Bound::Exact
            };
            self.tt.insert(h_key, PackedMove::NONE, bound, iply, depth, score, self.q0_eval);
            return Ok(score);
        }

        self.sti[ply].current_move = PackedMove::NONE;
        if depth >= 3 * PLY_SCALE
            && !in_check
            && self.sti[ply].allow_null_move
            && beta.abs() <= MATE0 / 2
            && self.pos.non_pawn_material(self.pos.turn()) > 0
        {
            let r = if depth > 6 * PLY_SCALE { 4 * PLY_SCALE } else { 3 * PLY_SCALE };
            if let Some(undo) = self.pos.make_null_move() {
                self.sti[ply + 1].allow_null_move = false;
                let result = self.negascout(-beta, -(beta - 1), ply + 1, depth - r, None, false);
                self.sti[ply + 1].allow_null_move = true;
                self.pos.unmake_null_move(undo);
                let mut score = -result?;
                if score >= beta {
                    if score > MATE0 / 2 {
                        score = beta;
                    }
                    self.tt.insert(h_key, PackedMove::NONE, Bound::Lower, iply, depth, score, eval_score);
                    return Ok(score);
                }
                // The threat found by the null move search may only exist
                // because the previous move was reduced. Failing low here
                // makes the parent search it again at full depth.
                if ply > 0 && self.sti[ply - 1].lmr > 0 && depth < 5 * PLY_SCALE {
                    let m1 = self.sti[ply - 1].current_move;
                    let m2 = self.sti[ply + 1].best_move;
                    if related_moves(m1, m2) {
                        return Ok(alpha);
                    }
                }
            }
        }

        if alpha.abs() <= MATE0 / 2 && depth < 2 * PLY_SCALE && beta == alpha + 1 {
            if eval_score == UNKNOWN_SCORE {
                eval_score = self.eval.eval_pos(self.pos.chess());
            }
            if eval_score < beta - RAZOR_MARGIN {
                self.q0_eval = eval_score;
                let score = self.quiesce(alpha - RAZOR_MARGIN, beta - RAZOR_MARGIN, ply, 0, in_check);
                if score <= alpha - RAZOR_MARGIN {
                    self.tt.insert(h_key, PackedMove::NONE, Bound::Upper, iply, depth, score, self.q0_eval);
                    return Ok(score);
                }
            }
        }

        let mut futility_prune = false;
        let mut futility_score = alpha;
        if !in_check && depth < 5 * PLY_SCALE && alpha.abs() <= MATE0 / 2 && beta.abs() <= MATE0 / 2 {
            if eval_score == UNKNOWN_SCORE {
                eval_score = self.eval.eval_pos(self.pos.chess());
            }
            futility_score = eval_score + futility_margin(depth);
            futility_prune = futility_score <= alpha;
        }

        // Internal iterative deepening, only to find a move to try first.
        if depth > 4 * PLY_SCALE && hash_move.is_none() {
            let is_pv = beta > alpha + 1;
            if is_pv || depth > 8 * PLY_SCALE {
                let saved_node_idx = self.sti[ply].node_idx;
                let new_depth = if is_pv { depth - 2 * PLY_SCALE } else { depth * 3 / 8 };
                self.negascout(alpha, beta, ply, new_depth, None, in_check)?;
                self.sti[ply].node_idx = saved_node_idx;
                let ent = self.tt.probe(h_key);
                if ent.bound != Bound::Empty {
                    hash_move = ent.mv();
                }
            }
        }
        self.sti[ply].hash_move = hash_move;

        let mut moves = if in_check {
            movegen::check_evasions(self.pos.chess())
        } else {
            movegen::legal_moves(self.pos.chess())
        };
        let hash_move_selected = select_hash_move(&mut moves, hash_move);
        let mut scored = false;
        if !hash_move_selected {
            self.score_move_list(&mut moves, ply, 0);
            scored = true;
        }

        let illegal_score = -(MATE0 - (iply + 1));
        let mut b = beta;
        let mut best_score = illegal_score;
        let mut best_move = None;
        let mut lmr_count = 0u32;
        let mut have_legal_moves = false;
        for mi in 0..moves.len() {
            if mi == 1 && !scored {
                self.score_move_list(&mut moves, ply, 1);
                scored = true;
            }
            if mi > 0 || !hash_move_selected {
                select_best(&mut moves, mi);
            }
            let m = moves[mi].mv.clone();
            let move_score = moves[mi].score;
            if self.weak && have_legal_moves && self.weak_play_skip_move(&m, ply) {
                continue;
            }
            let chess = self.pos.chess();
            let is_capture = m.is_capture();
            let is_promotion = m.is_promotion();
            let may_reduce = move_score < 53 && (!is_capture || move_score < 0) && !is_promotion;
            let gives_check = movegen::gives_check(chess, &m);
            let quiet_push = !gives_check && !passed_pawn_push(chess, &m);

            let score = if futility_prune && may_reduce && have_legal_moves && quiet_push {
                futility_score
            } else {
                let mut see_val = None;
                let mut move_extend = 0;
                if pos_extend == 0 {
                    if Some(m.to()) == recapture_square {
                        let sv = self.see.evaluate(chess, &m);
                        see_val = Some(sv);
                        if sv > self.pos.value_at(m.to()) - PAWN_VALUE / 2 {
                            move_extend = PLY_SCALE;
                        }
                    }
                    let pawns = self.pos.pawn_material(shakmaty::Color::White)
                        + self.pos.pawn_material(shakmaty::Color::Black);
                    if move_extend < PLY_SCALE && is_capture && pawns > PAWN_VALUE {
                        // Capturing the last piece into a pawn ending.
                        let us = self.pos.turn();
                        let cap_val = self.pos.value_at(m.to());
                        if self.pos.non_pawn_material(us) == 0 && self.pos.non_pawn_material(!us) == cap_val {
                            move_extend = PLY_SCALE;
                        }
                    }
                }
                let extend = pos_extend.max(move_extend);
                let lmr = if may_reduce && extend == 0 && quiet_push {
                    late_move_reduction(depth, mi, &mut lmr_count, is_capture)
                } else {
                    0
                };
                let mut new_depth = depth - PLY_SCALE + extend - lmr;

                let mut new_capture_square = None;
                if is_capture && (gives_check || depth + extend > PLY_SCALE) {
                    let f_val = piece_value(m.role());
                    let t_val = self.pos.value_at(m.to());
                    if (t_val - f_val).abs() < PAWN_VALUE / 2 {
                        let sv = match see_val {
                            Some(sv) => sv,
                            None => self.see.evaluate(chess, &m),
                        };
                        if sv.abs() < PAWN_VALUE / 2 {
                            new_capture_square = Some(m.to());
                        }
                    }
                }

                let undo = self.pos.make_move(&m);
                self.nodes += 1;
                self.total_nodes += 1;
                self.sti[ply].current_move = PackedMove::from_move(&m);
                self.sti[ply].lmr = lmr;
                let mut result = self
                    .negascout(-b, -alpha, ply + 1, new_depth, new_capture_square, gives_check)
                    .map(|s| -s);
                if let Ok(score) = result {
                    let reduced_beat_alpha = lmr > 0 && score > alpha;
                    let null_window_beat_alpha = score > alpha && score < beta && b != beta && score != illegal_score;
                    if reduced_beat_alpha || null_window_beat_alpha {
                        self.sti[ply].lmr = 0;
                        new_depth += lmr;
                        result = self
                            .negascout(-beta, -alpha, ply + 1, new_depth, new_capture_square, gives_check)
                            .map(|s| -s);
                    }
                }
                self.pos.unmake_move(undo);
                result?
            };
            have_legal_moves = true;

            best_score = best_score.max(score);
            if score > alpha {
                alpha = score;
                best_move = Some(mi);
                self.sti[ply].best_move = PackedMove::from_move(&m);
            }
            if alpha >= beta {
                if !is_capture {
                    let chess = self.pos.chess();
                    let hist_depth = depth / PLY_SCALE;
                    self.kt.add_killer(ply, PackedMove::from_move(&m));
                    self.ht.add_success(chess, &m, hist_depth);
                    for earlier in moves[..mi].iter().filter(|sm| !sm.mv.is_capture()) {
                        self.ht.add_fail(chess, &earlier.mv, hist_depth);
                    }
                }
                self.tt.insert(h_key, PackedMove::from_move(&m), Bound::Lower, iply, depth, alpha, eval_score);
                return Ok(alpha);
            }
            b = alpha + 1;
        }

        if !have_legal_moves && !self.pos.is_check() {
            return Ok(0);
        }
        match best_move {
            Some(idx) => {
                let mv = PackedMove::from_move(&moves[idx].mv);
                self.tt.insert(h_key, mv, Bound::Exact, iply, depth, best_score, eval_score);
            }
            None => {
                self.tt.insert(h_key, PackedMove::NONE, Bound::Upper, iply, depth, best_score, eval_score);
            }
        }
        Ok(best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::position::SearchPosition;

    fn session(fen: &str) -> SearchSession {
        let mut session = SearchSession::new(SearchConfig { hash_log2_size: 14, ..SearchConfig::default() });
        session.set_position(SearchPosition::from_fen(fen).unwrap());
        session
    }

    #[test]
    fn test_mated_side_gets_mate_score() {
        let mut s = session("R5k1/5ppp/8/8/8/8/5PPP/6K1 b - - 0 1");
        let score = s.negascout(-MATE0, MATE0, 0, 2 * PLY_SCALE, None, true).unwrap();
        assert_eq!(score, -(MATE0 - 1));
    }

    #[test]
    fn test_finds_mate_in_one() {
        let mut s = session("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");
        let score = s.negascout(-MATE0, MATE0, 0, 2 * PLY_SCALE, None, false).unwrap();
        assert_eq!(score, MATE0 - 2);
        let ent = s.tt().probe(s.position().history_hash());
        assert_eq!(ent.mv(), PackedMove::new(Square::A1, Square::A8, None));
    }

    #[test]
    fn test_fifty_move_rule_is_a_draw() {
        let mut s = session("4k3/8/8/8/8/8/8/4K2R w - - 100 80");
        assert_eq!(s.negascout(-MATE0, MATE0, 0, 3 * PLY_SCALE, None, false).unwrap(), 0);
    }

    #[test]
    fn test_first_three_moves_not_reduced() {
        let mut count = 0;
        for mi in 0..3 {
            assert_eq!(late_move_reduction(6 * PLY_SCALE, mi, &mut count, false), 0);
        }
        assert_eq!(count, 0);
        assert_eq!(late_move_reduction(2 * PLY_SCALE, 10, &mut count, false), 0);
        for mi in 3..6 {
            assert_eq!(late_move_reduction(6 * PLY_SCALE, mi, &mut count, false), PLY_SCALE);
        }
        assert_eq!(late_move_reduction(6 * PLY_SCALE, 6, &mut count, false), 2 * PLY_SCALE);
        assert_eq!(late_move_reduction(6 * PLY_SCALE, 7, &mut count, true), PLY_SCALE);
        assert_eq!(late_move_reduction(4 * PLY_SCALE, 8, &mut count, false), PLY_SCALE);
        assert_eq!(count, 6);
    }

    #[test]
    fn test_null_move_permission_restored() {
        let mut s = session("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3");
        s.negascout(-1, 0, 1, 5 * PLY_SCALE, None, false).unwrap();
        s.negascout(-MATE0, MATE0, 0, 4 * PLY_SCALE, None, false).unwrap();
        assert!(s.sti.iter().all(|sti| sti.allow_null_move));
    }

    // Black's knight just arrived on c4 and attacks the undefended queen.
    const KNIGHT_THREAT: &str = "7k/6pp/8/8/2n5/8/1Q6/7K w - - 0 1";

    #[test]
    fn test_threat_after_reduced_move_fails_low() {
        let mut s = session(KNIGHT_THREAT);
        s.sti[0].current_move = PackedMove::new(Square::E5, Square::C4, None);
        s.sti[0].lmr = PLY_SCALE;
        assert_eq!(s.negascout(-1, 0, 1, 4 * PLY_SCALE, None, false).unwrap(), -1);
        assert_eq!(s.sti[2].best_move, PackedMove::new(Square::C4, Square::B2, None));
        assert!(s.sti.iter().all(|sti| sti.allow_null_move));
    }

    #[test]
    fn test_threat_without_reduction_is_searched() {
        let mut s = session(KNIGHT_THREAT);
        s.sti[0].current_move = PackedMove::new(Square::E5, Square::C4, None);
        s.sti[0].lmr = 0;
        assert!(s.negascout(-1, 0, 1, 4 * PLY_SCALE, None, false).unwrap() >= 0);
    }

    #[test]
    fn test_razoring_stores_upper_bound() {
        let mut s = session("4k3/8/8/3q4/8/8/8/4K3 w - - 0 1");
        let score = s.negascout(100, 101, 1, PLY_SCALE, None, false).unwrap();
        assert!(score <= 100 - RAZOR_MARGIN);
        let ent = s.tt().probe(s.position().history_hash());
        assert_eq!(ent.bound, Bound::Upper);
        assert!(ent.mv().is_none());
    }

    #[test]
    fn test_futility_keeps_a_legal_move_searched() {
        // Hopelessly behind: quiet moves are pruned, but the score still
        // comes from a searched move rather than the mate bound.
        let mut s = session("3qk3/8/8/8/8/8/8/4K3 w - - 0 1");
        let score = s.negascout(0, 1, 1, 2 * PLY_SCALE, None, false).unwrap();
        assert!(score > -MATE0 / 2 && score <= 0);
    }

    #[test]
    fn test_iid_supplies_hash_move() {
        let mut s = session("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3");
        s.negascout(-MATE0, MATE0, 0, 5 * PLY_SCALE, None, false).unwrap();
        assert!(!s.sti[0].hash_move.is_none());
        let ent = s.tt().probe(s.position().history_hash());
        assert!(!ent.mv().is_none());
    }

    #[test]
    fn test_position_restored_after_search() {
        let mut s = session("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3");
        let hash = s.position().zobrist_hash();
        s.negascout(-MATE0, MATE0, 0, 3 * PLY_SCALE, None, false).unwrap();
        assert_eq!(s.position().zobrist_hash(), hash);
        assert_eq!(s.position().history_len(), 0);
    }
}

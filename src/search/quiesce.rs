use shakmaty::{Chess, Color, Position};

use super::SearchSession;
use crate::constants::*;
use crate::movegen;
use crate::moves::{ScoredMove, select_best};

/// Delta pruning margin on top of the captured material.
const DELTA_MARGIN: i32 = 200;

/// Most valuable victim first, least valuable attacker as tie break.
fn score_mvv_lva(pos: &Chess, moves: &mut [ScoredMove]) {
    let board = pos.board();
    for sm in moves {
        let m = &sm.mv;
        let victim = if m.is_en_passant() {
            PAWN_VALUE
        } else {
            board.role_at(m.to()).map_or(0, piece_value)
        };
        let promotion = m.promotion().map_or(0, piece_value);
        sm.score = (victim + promotion) * 100 - piece_value(m.role()) / 10;
    }
}

impl SearchSession {
    /// Searches captures, promotions and, close to the horizon, checks.
    /// `depth` is 0 at the horizon and decreases by one per ply.
    pub fn quiesce(&mut self, mut alpha: i32, beta: i32, ply: usize, depth: i32, in_check: bool) -> i32 {
        let iply = ply as i32;
        let mut score = if in_check {
            -(MATE0 - (iply + 1))
        } else if depth == 0 && self.q0_eval != UNKNOWN_SCORE {
            self.q0_eval
        } else {
            let score = self.eval.eval_pos(self.pos.chess());
            if depth == 0 {
                self.q0_eval = score;
            }
            score
        };
        if score >= beta {
            return score;
        }
        let eval_score = score;
        alpha = alpha.max(score);
        let mut best_score = score;

        let try_checks = depth > -3;
        let mut moves = if in_check {
            movegen::check_evasions(self.pos.chess())
        } else if try_checks {
            movegen::legal_moves(self.pos.chess())
        } else {
            movegen::captures(self.pos.chess())
        };
        score_mvv_lva(self.pos.chess(), &mut moves);

        for mi in 0..moves.len() {
            // Past the first few moves this is most likely an all-node, where
            // ordering is wasted effort.
            if mi < 8 {
                select_best(&mut moves, mi);
            }
            let m = moves[mi].mv.clone();
            let chess = self.pos.chess();
            let mut gives_check = None;
            if !in_check {
                if !m.is_capture() && !m.is_promotion() {
                    if !try_checks || !movegen::gives_check(chess, &m) {
                        continue;
                    }
                    gives_check = Some(true);
                    if self.see.is_negative(chess, &m) {
                        continue;
                    }
                } else {
                    if self.see.is_negative(chess, &m) {
                        continue;
                    }
                    let capt = self.pos.value_at(m.to());
                    let prom = m.promotion().map_or(0, piece_value);
                    let optimistic_score = eval_score + capt + prom + DELTA_MARGIN;
                    if optimistic_score < alpha && self.enough_material_for_delta_pruning(capt) {
                        let check = depth - 1 > -4 && movegen::gives_check(chess, &m);
                        gives_check = Some(check);
                        if !check {
                            best_score = best_score.max(optimistic_score);
                            continue;
                        }
                    }
                }
            }
            let next_in_check =
                depth - 1 > -4 && gives_check.unwrap_or_else(|| movegen::gives_check(chess, &m));

            let undo = self.pos.make_move(&m);
            self.q_nodes += 1;
            self.total_nodes += 1;
            score = -self.quiesce(-beta, -alpha, ply + 1, depth - 1, next_in_check);
            self.pos.unmake_move(undo);
            if score > best_score {
                best_score = score;
                if score > alpha {
                    alpha = score;
                    if alpha >= beta {
                        return alpha;
                    }
                }
            }
        }
        best_score
    }

    /// Delta pruning is unsafe in sparse endings, where a single capture can
    /// decide the game.
    fn enough_material_for_delta_pruning(&self, capt: i32) -> bool {
        [Color::White, Color::Black]
            .into_iter()
            .all(|c| self.pos.pawn_material(c) > 0 && self.pos.non_pawn_material(c) > capt)
    }
}

use std::time::Instant;

use shakmaty::{CastlingMode, Move};

use super::{PvInfo, SearchResult, SearchSession};
use crate::constants::*;
use crate::movegen::{gives_check, passed_pawn_push};
use crate::moves::{PackedMove, ScoredMove};
use crate::tt::Bound;

#[derive(Clone, Debug)]
struct RootMove {
    mv: Move,
    score: i32,
    /// Nodes spent on this move in the last iteration.
    nodes: u64,
}

/// Converts a mate score into moves to mate. Other scores pass through.
pub fn score_to_mate(score: i32) -> Option<i32> {
    if score > MATE0 / 2 {
        Some((MATE0 - score) / 2)
    } else if score < -MATE0 / 2 {
        Some(-((MATE0 + score - 1) / 2))
    } else {
        None
    }
}

impl SearchSession {
    /// Searches `root_moves` with increasing depth until a limit is reached
    /// and returns the best move of the deepest completed iteration. An
    /// iteration ended early by the time check between root moves counts as
    /// completed for the moves it searched; one aborted inside a subtree
    /// does not.
    ///
    /// `max_depth` is in whole plies, values outside `1..=100` mean 100.
    /// Returns `None` only for an empty move list.
    pub fn iterative_deepening(
        &mut self,
        root_moves: Vec<ScoredMove>,
        max_depth: i32,
        max_nodes: Option<u64>,
    ) -> Option<Move> {
        self.t_start = Instant::now();
        self.t_last_stats = self.t_start;
        self.total_nodes = 0;
        let root_moves = self.select_root_moves(root_moves);
        let mut sc_moves: Vec<RootMove> = root_moves
            .into_iter()
            .map(|sm| RootMove { mv: sm.mv, score: 0, nodes: 0 })
            .collect();
        let mut best_move = sc_moves.first()?.mv.clone();

        self.max_nodes = max_nodes;
        self.nodes_to_go = 0;
        self.first_new = self.pos.history_len();
        let max_depth = if (1..=100).contains(&max_depth) { max_depth } else { 100 };
        for sti in self.sti.iter_mut() {
            sti.allow_null_move = true;
            sti.lmr = 0;
        }
        self.tt.next_generation();
        self.kt.clear();
        self.q0_eval = UNKNOWN_SCORE;

        let orig_pos = self.pos.clone();
        self.first_iteration = true;
        if let Err(reason) = self.deepen(&mut sc_moves, max_depth, &mut best_move) {
            log::debug!("search stopped: {reason}");
            self.pos = orig_pos;
        }
        self.first_iteration = false;
        self.search_need_more_time = false;
        self.notify_stats();

        let stats = self.tt.stats();
        log::debug!(
            "nodes {} time {}ms nps {}, hash {} used {} this generation {}",
            self.total_nodes,
            self.elapsed_millis(),
            self.nps(),
            stats.size,
            stats.size - stats.unused,
            stats.this_generation,
        );
        Some(best_move)
    }

    fn deepen(&mut self, sc_moves: &mut [RootMove], max_depth: i32, best_move: &mut Move) -> SearchResult<()> {
        let mut best_score_last_iter: i32 = 0;
        let mut depth_s = PLY_SCALE;
        loop {
            let depth = depth_s / PLY_SCALE;
            self.init_node_stats();
            if let Some(listener) = self.listener.as_mut() {
                listener.notify_depth(depth);
            }
            let aspiration_delta = if best_score_last_iter.abs() <= MATE0 / 2 { 20 } else { 1000 };
            let mut alpha = if self.first_iteration {
                -MATE0
            } else {
                (best_score_last_iter - aspiration_delta).max(-MATE0)
            };
            let mut best_score = -MATE0;
            let mut need_more_time = false;

            for mi in 0..sc_moves.len() {
                self.search_need_more_time = need_more_time;
                let m = sc_moves[mi].mv.clone();
                if self.elapsed_millis() >= 1000 {
                    if let Some(listener) = self.listener.as_mut() {
                        listener.notify_curr_move(&m, mi + 1);
                    }
                }
                self.nodes = 0;
                self.q_nodes = 0;
                let chess = self.pos.chess();
                let check = gives_check(chess, &m);
                let mut beta = if self.first_iteration {
                    MATE0
                } else if mi == 0 {
                    (best_score_last_iter + aspiration_delta).min(MATE0)
                } else {
                    alpha + 1
                };
                let lmr = if depth_s >= 3 * PLY_SCALE
                    && mi >= 3
                    && !m.is_capture()
                    && !m.is_promotion()
                    && !check
                    && !passed_pawn_push(chess, &m)
                {
                    PLY_SCALE
                } else {
                    0
                };

                let mut score = self.search_root_move(&m, alpha, beta, depth_s - lmr - PLY_SCALE, check, lmr)?;
                if lmr > 0 && score > alpha {
                    score = self.search_root_move(&m, alpha, beta, depth_s - PLY_SCALE, check, 0)?;
                }
                let mut nodes_this_move = self.nodes + self.q_nodes;
                let bound = if score <= alpha {
                    Bound::Upper
                } else if score >= beta {
                    Bound::Lower
                } else {
                    Bound::Exact
                };
                let root_key = self.pos.history_hash();
                self.tt.insert(root_key, PackedMove::from_move(&m), bound, 0, depth_s, score, UNKNOWN_SCORE);

                if score >= beta {
                    let mut retry_delta = aspiration_delta * 2;
                    while score >= beta {
                        beta = (score + retry_delta).min(MATE0);
                        retry_delta = MATE0 * 2;
                        if mi != 0 {
                            need_more_time = true;
                            self.search_need_more_time = true;
                        }
                        self.log_root_move(&m, score, nodes_this_move, ">");
                        self.notify_pv(depth, score, false, true, &m);
                        self.nodes = 0;
                        self.q_nodes = 0;
                        let score2 = self.search_root_move(&m, score, beta, depth_s - PLY_SCALE, check, 0)?;
                        score = score.max(score2);
                        nodes_this_move += self.nodes + self.q_nodes;
                    }
                } else if mi == 0 && score <= alpha {
                    while score <= alpha {
                        alpha = (score - MATE0 * 2).max(-MATE0);
                        need_more_time = true;
                        self.search_need_more_time = true;
                        self.log_root_move(&m, score, nodes_this_move, "<");
                        self.notify_pv(depth, score, true, false, &m);
                        self.nodes = 0;
                        self.q_nodes = 0;
                        score = self.search_root_move(&m, alpha, score, depth_s - PLY_SCALE, check, 0)?;
                        nodes_this_move += self.nodes + self.q_nodes;
                    }
                }

                let have_pv = score > alpha || mi == 0;
                if self.verbose {
                    let pv = if have_pv { self.tt.extract_pv_moves(self.pos.chess(), &m) } else { Vec::new() };
                    let pv: Vec<String> = pv.iter().map(|m| m.to_uci(CastlingMode::Standard).to_string()).collect();
                    log::info!(
                        "{:<6} {:>6} {:>8} {:>8} {}",
                        m.to_uci(CastlingMode::Standard).to_string(),
                        score,
                        nodes_this_move,
                        self.q_nodes,
                        pv.join(" ")
                    );
                }
                if have_pv && !self.first_iteration {
                    self.notify_pv(depth, score, false, false, &m);
                }

                sc_moves[mi].score = score;
                sc_moves[mi].nodes = nodes_this_move;
                best_score = best_score.max(score);
                if !self.first_iteration {
                    if have_pv {
                        alpha = score;
                        sc_moves[..=mi].rotate_right(1);
                    }
                    let limit = if need_more_time { self.max_time_millis } else { self.min_time_millis };
                    if limit.is_some_and(|limit| self.elapsed_millis() >= limit) {
                        break;
                    }
                }
            }

            // Only a finished iteration may change the answer.
            if self.first_iteration {
                sc_moves.sort_by(|a, b| b.score.cmp(&a.score));
                *best_move = sc_moves[0].mv.clone();
                self.notify_pv(depth, sc_moves[0].score, false, false, best_move);
            } else {
                *best_move = sc_moves[0].mv.clone();
            }
            log::debug!(
                "depth {depth} score {best_score} best {} nodes {} time {}ms",
                best_move.to_uci(CastlingMode::Standard),
                self.total_nodes,
                self.elapsed_millis()
            );
            if self.verbose {
                log::info!("nodes per ply {:?}", self.nodes_ply);
                log::info!("nodes per depth {:?}", self.nodes_depth);
            }

            if self.min_time_millis.is_some_and(|limit| self.elapsed_millis() >= limit) {
                break;
            }
            if depth >= max_depth {
                break;
            }
            if self.max_nodes.is_some_and(|max| self.total_nodes >= max) {
                break;
            }
            let ply_to_mate = MATE0 - best_score.abs();
            if depth >= ply_to_mate {
                break;
            }
            best_score_last_iter = best_score;

            // Moves that were hard to search go first next time.
            if !self.first_iteration && sc_moves.len() > 1 {
                sc_moves[1..].sort_by(|a, b| b.nodes.cmp(&a.nodes));
            }
            depth_s += PLY_SCALE;
            self.first_iteration = false;
        }
        Ok(())
    }

    /// Plays `m` at the root, searches the reply with window `(alpha, beta)`
    /// from the mover's side and takes the move back.
    fn search_root_move(
        &mut self,
        m: &Move,
        alpha: i32,
        beta: i32,
        depth: i32,
        gives_check: bool,
        lmr: i32,
    ) -> SearchResult<i32> {
        let undo = self.pos.make_move(m);
        self.sti[0].current_move = PackedMove::from_move(m);
        self.sti[0].lmr = lmr;
        self.sti[0].node_idx = self.total_nodes;
        let result = self.negascout(-beta, -alpha, 1, depth, None, gives_check);
        self.pos.unmake_move(undo);
        result.map(|score| -score)
    }

    fn log_root_move(&self, m: &Move, score: i32, nodes: u64, mark: &str) {
        if self.verbose {
            log::info!(
                "{:<6} {:>6} {:>8} {:>8} {mark}",
                m.to_uci(CastlingMode::Standard).to_string(),
                score,
                nodes,
                self.q_nodes
            );
        }
    }

    fn notify_pv(&mut self, depth: i32, score: i32, upper_bound: bool, lower_bound: bool, m: &Move) {
        if self.listener.is_none() {
            return;
        }
        let (is_mate, score) = match score_to_mate(score) {
            Some(moves) => (true, moves),
            None => (false, score),
        };
        let info = PvInfo {
            depth,
            score,
            time_ms: self.elapsed_millis(),
            nodes: self.total_nodes,
            nps: self.nps(),
            is_mate,
            upper_bound,
            lower_bound,
            pv: self.tt.extract_pv_moves(self.pos.chess(), m),
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.notify_pv(&info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::position::SearchPosition;
    use crate::search::StopSearch;

    fn root_moves(session: &mut SearchSession) -> Vec<RootMove> {
        session
            .root_moves()
            .into_iter()
            .map(|sm| RootMove { mv: sm.mv, score: 0, nodes: 0 })
            .collect()
    }

    #[test]
    fn test_later_root_moves_keep_soft_limit() {
        let mut session = SearchSession::new(SearchConfig { hash_log2_size: 12, ..SearchConfig::default() });
        session.set_position(SearchPosition::default());
        let mut sc_moves = root_moves(&mut session);
        assert!(sc_moves.len() > 1);
        let mut best = sc_moves[0].mv.clone();
        session.first_iteration = true;
        session.deepen(&mut sc_moves, 1, &mut best).unwrap();
        // Full windows in the first iteration, so nothing failed.
        assert!(!session.search_need_more_time);
    }

    #[test]
    fn test_aborted_iteration_keeps_previous_best() {
        let mut session = SearchSession::new(SearchConfig { hash_log2_size: 12, ..SearchConfig::default() });
        session.set_position(SearchPosition::default());
        let mut sc_moves = root_moves(&mut session);
        let mut best = sc_moves[sc_moves.len() - 1].mv.clone();
        let before = best.clone();
        session.stop_handle().store(true, std::sync::atomic::Ordering::Relaxed);
        session.first_iteration = false;
        assert_eq!(session.deepen(&mut sc_moves, 3, &mut best), Err(StopSearch::Requested));
        assert_eq!(best, before);
    }

    #[test]
    fn test_score_to_mate() {
        assert_eq!(score_to_mate(MATE0 - 1), Some(0));
        assert_eq!(score_to_mate(MATE0 - 2), Some(1));
        assert_eq!(score_to_mate(MATE0 - 4), Some(2));
        assert_eq!(score_to_mate(-(MATE0 - 1)), Some(0));
        assert_eq!(score_to_mate(-(MATE0 - 3)), Some(-1));
        assert_eq!(score_to_mate(150), None);
    }
}

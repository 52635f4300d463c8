//! Negascout search with iterative deepening.
//!
//! - `negascout` - main alpha-beta search with pruning, reductions and extensions
//! - `quiesce` - capture and check search at the horizon
//! - `deepening` - root move loop, aspiration windows and time control
//! - `strength` - deliberate weakening of play
//! - `listener` - progress reports

mod deepening;
mod listener;
mod negascout;
mod quiesce;
mod strength;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use shakmaty::{Move, Position};
use thiserror::Error;

use crate::config::SearchConfig;
use crate::constants::*;
use crate::evaluation::{Evaluate, PieceSquareEval};
use crate::moves::{PackedMove, ScoredMove};
use crate::ordering::{History, KillerTable};
use crate::position::SearchPosition;
use crate::see::See;
use crate::tt::TranspositionTable;

pub use listener::{PvInfo, SearchListener};

/// Why a search was cut short. Propagated with `?` from the node where the
/// budget check fails up to the iterative deepening loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSearch {
    #[error("time limit reached")]
    Time,
    #[error("node limit reached")]
    Nodes,
    #[error("stop requested")]
    Requested,
}

pub type SearchResult<T> = Result<T, StopSearch>;

/// Per-ply scratch, overwritten in place as the search moves up and down.
#[derive(Clone, Copy, Debug)]
struct SearchTreeInfo {
    hash_move: PackedMove,
    allow_null_move: bool,
    /// Best move found at this ply, also used as the threat move after a
    /// failed null move search.
    best_move: PackedMove,
    current_move: PackedMove,
    /// Reduction applied to `current_move`.
    lmr: i32,
    /// Value of the total node counter when the node was entered.
    node_idx: u64,
}

impl Default for SearchTreeInfo {
    fn default() -> Self {
        Self {
            hash_move: PackedMove::NONE,
            allow_null_move: true,
            best_move: PackedMove::NONE,
            current_move: PackedMove::NONE,
            lmr: 0,
            node_idx: 0,
        }
    }
}

const STATS_PLIES: usize = 20;

pub struct SearchSession {
    pos: SearchPosition,
    tt: TranspositionTable,
    kt: KillerTable,
    ht: History,
    see: See,
    eval: Box<dyn Evaluate>,
    sti: Vec<SearchTreeInfo>,
    /// History index of the first position reached inside the search tree.
    first_new: usize,

    t_start: Instant,
    min_time_millis: Option<u64>,
    max_time_millis: Option<u64>,
    search_need_more_time: bool,
    first_iteration: bool,
    max_nodes: Option<u64>,
    nodes_to_go: u64,
    nodes_between_time_check: u64,

    nodes: u64,
    q_nodes: u64,
    total_nodes: u64,
    nodes_ply: [u64; STATS_PLIES],
    nodes_depth: [u64; STATS_PLIES],
    t_last_stats: Instant,
    verbose: bool,

    strength: u32,
    weak: bool,
    random_seed: u64,

    /// Static evaluation of the node that entered quiescence search, if
    /// already known.
    q0_eval: i32,
    listener: Option<Box<dyn SearchListener>>,
    stop: Arc<AtomicBool>,
}

impl SearchSession {
    pub fn new(config: SearchConfig) -> Self {
        let now = Instant::now();
        let mut session = Self {
            pos: SearchPosition::default(),
            tt: TranspositionTable::new(config.hash_log2_size),
            kt: KillerTable::new(),
            ht: History::new(),
            see: See::new(),
            eval: Box::new(PieceSquareEval),
            sti: vec![SearchTreeInfo::default(); MAX_SEARCH_PLY],
            first_new: 0,
            t_start: now,
            min_time_millis: None,
            max_time_millis: None,
            search_need_more_time: false,
            first_iteration: false,
            max_nodes: None,
            nodes_to_go: 0,
            nodes_between_time_check: config.nodes_between_time_check.max(1),
            nodes: 0,
            q_nodes: 0,
            total_nodes: 0,
            nodes_ply: [0; STATS_PLIES],
            nodes_depth: [0; STATS_PLIES],
            t_last_stats: now,
            verbose: config.verbose,
            strength: 1000,
            weak: false,
            random_seed: 0,
            q0_eval: UNKNOWN_SCORE,
            listener: None,
            stop: Arc::new(AtomicBool::new(false)),
        };
        session.set_strength(config.strength, config.random_seed);
        session
    }

    /// Sets the root position. Positions already in its history count as
    /// played over the board for repetition claims.
    pub fn set_position(&mut self, pos: SearchPosition) {
        self.first_new = pos.history_len();
        self.pos = pos;
    }

    pub fn position(&self) -> &SearchPosition {
        &self.pos
    }

    pub fn tt(&self) -> &TranspositionTable {
        &self.tt
    }

    pub fn set_evaluator(&mut self, eval: Box<dyn Evaluate>) {
        self.eval = eval;
    }

    pub fn set_listener(&mut self, listener: Box<dyn SearchListener>) {
        self.listener = Some(listener);
    }

    /// Forgets everything learned in earlier searches.
    pub fn new_game(&mut self) {
        self.tt.clear();
        self.kt.clear();
        self.ht.clear();
    }

    /// Replaces the transposition table with one of `2^log2_size` entries.
    pub fn resize_tt(&mut self, log2_size: u32) {
        self.tt = TranspositionTable::new(log2_size);
    }

    /// Flag checked together with the time budget. Setting it aborts the
    /// running search and every later one until it is cleared again.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Later iterations are started only while under `min_millis`. Searches
    /// are cut at `min_millis` unless a root move of the current iteration
    /// has failed low or high, which allows running on to `max_millis`.
    pub fn time_limit(&mut self, min_millis: u64, max_millis: u64) {
        self.min_time_millis = Some(min_millis);
        self.max_time_millis = Some(max_millis.max(min_millis));
    }

    pub fn clear_time_limit(&mut self) {
        self.min_time_millis = None;
        self.max_time_millis = None;
    }

    pub fn total_nodes(&self) -> u64 {
        self.total_nodes
    }

    fn elapsed_millis(&self) -> u64 {
        self.t_start.elapsed().as_millis() as u64
    }

    fn nps(&self) -> u64 {
        let millis = self.elapsed_millis();
        if millis > 0 { self.total_nodes * 1000 / millis } else { 0 }
    }

    /// Periodic time, node and stop flag check.
    fn check_budget(&mut self) -> SearchResult<()> {
        self.nodes_to_go = self.nodes_to_go.saturating_sub(1);
        if self.nodes_to_go > 0 {
            return Ok(());
        }
        self.nodes_to_go = self.nodes_between_time_check;
        if self.stop.load(Ordering::Relaxed) {
            return Err(StopSearch::Requested);
        }
        if !self.first_iteration {
            let limit = if self.search_need_more_time {
                self.max_time_millis
            } else {
                self.min_time_millis
            };
            if limit.is_some_and(|limit| self.elapsed_millis() >= limit) {
                return Err(StopSearch::Time);
            }
        }
        if self.max_nodes.is_some_and(|max| self.total_nodes >= max) {
            return Err(StopSearch::Nodes);
        }
        if self.t_last_stats.elapsed().as_millis() >= 1000 {
            self.notify_stats();
            self.t_last_stats = Instant::now();
        }
        Ok(())
    }

    fn init_node_stats(&mut self) {
        self.nodes = 0;
        self.q_nodes = 0;
        self.nodes_ply = [0; STATS_PLIES];
        self.nodes_depth = [0; STATS_PLIES];
    }

    fn count_node(&mut self, ply: usize, depth: i32) {
        if !self.verbose {
            return;
        }
        if ply < STATS_PLIES {
            self.nodes_ply[ply] += 1;
        }
        if depth >= 0 && ((depth / PLY_SCALE) as usize) < STATS_PLIES {
            self.nodes_depth[(depth / PLY_SCALE) as usize] += 1;
        }
    }

    fn notify_stats(&mut self) {
        let (nodes, nps, time) = (self.total_nodes, self.nps(), self.elapsed_millis());
        if let Some(listener) = self.listener.as_mut() {
            listener.notify_stats(nodes, nps, time);
        }
    }

    /// Ordering keys for the moves from `start` on: captures by SEE sign and
    /// MVV/LVA, then killers, then history.
    fn score_move_list(&mut self, moves: &mut [ScoredMove], ply: usize, start: usize) {
        let pos = self.pos.chess();
        let board = pos.board();
        for sm in moves.iter_mut().skip(start) {
            let m = &sm.mv;
            let mut score = 0;
            if m.is_capture() || m.is_promotion() {
                let see_score = self.see.sign(pos, m);
                let victim = board.role_at(m.to()).map_or(0, piece_value);
                let attacker = piece_value(m.role());
                score = victim / 10 * 1000 - attacker / 10;
                score += match see_score {
                    s if s > 0 => 2_000_000,
                    0 => 1_000_000,
                    _ => -1_000_000,
                };
                score *= 100;
            }
            let ks = self.kt.get_killer_score(ply, m);
            if ks > 0 {
                score += ks + 50;
            } else {
                score += self.ht.get_hist_score(pos, m);
            }
            sm.score = score;
        }
    }

    /// Legal moves of the root position in initial search order.
    pub fn root_moves(&mut self) -> Vec<ScoredMove> {
        let mut moves = crate::movegen::legal_moves(self.pos.chess());
        self.score_move_list(&mut moves, 0, 0);
        moves.sort_by(|a, b| b.score.cmp(&a.score));
        moves.into_vec()
    }

    /// Searches the current position and returns the best move, `None` if
    /// there are no legal moves. `max_depth` is in whole plies.
    pub fn search(&mut self, max_depth: i32, max_nodes: Option<u64>) -> Option<Move> {
        let moves = self.root_moves();
        self.iterative_deepening(moves, max_depth, max_nodes)
    }
}

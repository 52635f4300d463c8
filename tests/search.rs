use std::cell::RefCell;
use std::rc::Rc;

use scoutfish::config::SearchConfig;
use scoutfish::constants::{MATE0, PLY_SCALE};
use scoutfish::position::SearchPosition;
use scoutfish::search::{PvInfo, SearchListener, SearchSession};
use shakmaty::{CastlingMode, Chess, Move, Position};

fn session_at(fen: &str) -> SearchSession {
    let mut session = SearchSession::new(SearchConfig { hash_log2_size: 16, ..SearchConfig::default() });
    session.set_position(SearchPosition::from_fen(fen).unwrap());
    session
}

fn uci(m: &Move) -> String {
    m.to_uci(CastlingMode::Standard).to_string()
}

fn is_legal(pos: &Chess, m: &Move) -> bool {
    pos.legal_moves().contains(m)
}

#[derive(Default)]
struct Recorder {
    depths: Vec<i32>,
    pvs: Vec<PvInfo>,
    stats_calls: usize,
}

struct SharedRecorder(Rc<RefCell<Recorder>>);

impl SearchListener for SharedRecorder {
    fn notify_depth(&mut self, depth: i32) {
        self.0.borrow_mut().depths.push(depth);
    }

    fn notify_pv(&mut self, info: &PvInfo) {
        self.0.borrow_mut().pvs.push(info.clone());
    }

    fn notify_stats(&mut self, _nodes: u64, _nps: u64, _time_ms: u64) {
        self.0.borrow_mut().stats_calls += 1;
    }
}

#[test]
fn finds_back_rank_mate() {
    let mut session = session_at("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");
    let best = session.search(4, None).unwrap();
    assert_eq!(uci(&best), "a1a8");
}

#[test]
fn stalemate_scores_zero_at_every_depth() {
    for d in 1..=4 {
        let mut session = session_at("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let score = session.negascout(-MATE0, MATE0, 0, d * PLY_SCALE, None, false).unwrap();
        assert_eq!(score, 0, "depth {d}");
    }
}

#[test]
fn no_move_for_stalemated_side() {
    let mut session = session_at("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
    assert!(session.search(3, None).is_none());
}

#[test]
fn threefold_repetition_is_a_draw() {
    let mut pos = SearchPosition::from_fen("4k3/8/8/8/8/8/8/QN2K3 w - - 0 1").unwrap();
    for _ in 0..2 {
        for m in ["e1d1", "e8d8", "d1e1", "d8e8"] {
            pos.play_uci(m).unwrap();
        }
    }
    let mut session = SearchSession::new(SearchConfig { hash_log2_size: 12, ..SearchConfig::default() });
    session.set_position(pos);
    assert_eq!(session.negascout(-MATE0, MATE0, 0, 4 * PLY_SCALE, None, false).unwrap(), 0);
}

#[test]
fn fifty_move_rule() {
    let mut session = session_at("4k3/8/8/8/8/8/8/QN2K3 w - - 100 90");
    assert_eq!(session.negascout(-MATE0, MATE0, 0, 3 * PLY_SCALE, None, false).unwrap(), 0);

    // Checkmate takes precedence over the fifty-move claim.
    let mut session = session_at("R5k1/5ppp/8/8/8/8/5PPP/6K1 b - - 100 80");
    assert_eq!(session.negascout(-MATE0, MATE0, 0, 3 * PLY_SCALE, None, true).unwrap(), -(MATE0 - 1));
}

#[test]
fn zero_time_still_returns_a_legal_move() {
    let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
    let mut session = session_at(fen);
    session.time_limit(0, 0);
    let best = session.search(50, None).unwrap();
    assert!(is_legal(session.position().chess(), &best));
}

#[test]
fn node_limit_is_respected() {
    let mut session = SearchSession::new(SearchConfig {
        hash_log2_size: 14,
        nodes_between_time_check: 100,
        ..SearchConfig::default()
    });
    session.set_position(SearchPosition::default());
    let best = session.search(50, Some(3000)).unwrap();
    assert!(is_legal(session.position().chess(), &best));
    assert!(session.total_nodes() < 3000 + 5000);
}

#[test]
fn stop_flag_still_yields_a_move() {
    let mut session = session_at("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1");
    session.stop_handle().store(true, std::sync::atomic::Ordering::Relaxed);
    let best = session.search(10, None).unwrap();
    assert!(is_legal(session.position().chess(), &best));
}

#[test]
fn wins_the_hanging_queen() {
    let mut session = session_at("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1");
    let best = session.search(5, None).unwrap();
    assert_eq!(uci(&best), "e4d5");
}

#[test]
fn search_leaves_root_position_untouched() {
    let mut session = session_at("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3");
    let hash = session.position().zobrist_hash();
    session.search(4, None).unwrap();
    assert_eq!(session.position().zobrist_hash(), hash);
    assert_eq!(session.position().history_len(), 0);
}

#[test]
fn listener_receives_legal_principal_variations() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut session = session_at("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3");
    session.set_listener(Box::new(SharedRecorder(Rc::clone(&recorder))));
    session.search(4, None).unwrap();

    let rec = recorder.borrow();
    assert_eq!(rec.depths, vec![1, 2, 3, 4]);
    assert!(!rec.pvs.is_empty());
    assert!(rec.stats_calls >= 1);
    for info in &rec.pvs {
        let mut pos = session.position().chess().clone();
        assert!(!info.pv.is_empty());
        for m in &info.pv {
            assert!(is_legal(&pos, m), "illegal pv move {}", uci(m));
            pos.play_unchecked(m);
        }
    }
}

#[test]
fn mate_is_reported_in_moves() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut session = session_at("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");
    session.set_listener(Box::new(SharedRecorder(Rc::clone(&recorder))));
    session.search(3, None).unwrap();
    let rec = recorder.borrow();
    let last = rec.pvs.last().unwrap();
    assert!(last.is_mate);
    assert_eq!(last.score, 1);
}

#[test]
fn weakest_strength_plays_legal_moves() {
    let mut session = SearchSession::new(SearchConfig {
        hash_log2_size: 12,
        strength: 0,
        random_seed: 7,
        ..SearchConfig::default()
    });
    session.set_position(SearchPosition::default());
    let best = session.search(3, None).unwrap();
    assert!(is_legal(session.position().chess(), &best));
}

#[test]
fn new_game_clears_the_table() {
    let mut session = session_at("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");
    session.search(3, None).unwrap();
    assert!(session.tt().stats().unused < session.tt().len());
    session.new_game();
    assert_eq!(session.tt().stats().unused, session.tt().len());
}

fn best_and_nodes(fen: &str, depth: i32) -> (Move, u64) {
    let mut session = session_at(fen);
    let best = session.search(depth, None).unwrap();
    (best, session.total_nodes())
}

#[test]
fn node_abort_returns_last_completed_iteration() {
    let fen = "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";
    let (depth1_best, depth1_nodes) = best_and_nodes(fen, 1);
    let (_, depth3_nodes) = best_and_nodes(fen, 3);
    let (depth2_best, depth2_nodes) = best_and_nodes(fen, 2);
    assert!(depth3_nodes > depth2_nodes && depth2_nodes > depth1_nodes);

    // Limits inside the first half of iteration 2 and of iteration 3.
    for (completed_best, lo, hi) in [
        (&depth1_best, depth1_nodes, depth2_nodes),
        (&depth2_best, depth2_nodes, depth3_nodes),
    ] {
        for pct in [0, 10, 25, 50] {
            let limit = lo + 1 + (hi - lo) * pct / 100;
            let mut session = SearchSession::new(SearchConfig {
                hash_log2_size: 16,
                nodes_between_time_check: 1,
                ..SearchConfig::default()
            });
            session.set_position(SearchPosition::from_fen(fen).unwrap());
            let best = session.search(50, Some(limit)).unwrap();
            assert_eq!(uci(&best), uci(completed_best), "node limit {limit}");
        }
    }
}

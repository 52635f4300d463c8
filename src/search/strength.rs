//! Deliberately weaker play for strength settings below the maximum.
//!
//! Moves are skipped with a probability that grows with the distance from
//! the root, so a weak setting misses deep tactics first. The random value
//! is derived from the position and the move, which keeps the choice stable
//! between iterations of the same search.

use std::sync::LazyLock;

use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use shakmaty::{Color, Move};

use super::SearchSession;
use crate::config::MAX_STRENGTH;
use crate::constants::QUEEN_VALUE;
use crate::moves::{PackedMove, ScoredMove};

static SQUARE_KEYS: LazyLock<[u64; 64]> = LazyLock::new(|| {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x7371_7561_7265_6b65);
    let mut keys = [0u64; 64];
    for key in keys.iter_mut() {
        *key = rng.next_u64();
    }
    keys
});

/// Linear interpolation between `(x1, y1)` and `(x2, y2)`, clamped to the
/// end points.
fn interpolate(x: i32, x1: i32, y1: i32, x2: i32, y2: i32) -> i32 {
    if x > x2 {
        y2
    } else if x < x1 {
        y1
    } else {
        (x - x1) * (y2 - y1) / (x2 - x1) + y1
    }
}

impl SearchSession {
    /// `strength` ranges from 0 to 1000, where 1000 is full strength.
    pub fn set_strength(&mut self, strength: u32, random_seed: u64) {
        self.strength = strength.min(MAX_STRENGTH);
        self.weak = self.strength < MAX_STRENGTH;
        self.random_seed = random_seed;
    }

    pub(super) fn weak_play_skip_move(&self, m: &Move, ply: usize) -> bool {
        let Some(from) = m.from() else { return false };
        let rnd_l = self.pos.zobrist_hash()
            ^ SQUARE_KEYS[from as usize]
            ^ SQUARE_KEYS[m.to() as usize]
            ^ self.random_seed;
        let rnd = ((rnd_l & 0x7fff_ffff_ffff_ffff) % 1_000_000_000) as f64 / 1e9;

        let s = f64::from(self.strength) * 1e-3;
        let offs = (17.0 - 50.0 * s) / 3.0;
        let material = self.pos.material(Color::White) + self.pos.material(Color::Black);
        let eff_ply = ply as f64 * f64::from(interpolate(material, 0, 30, 4 * QUEEN_VALUE, 100)) * 1e-2;
        let t = eff_ply + offs;
        // Probability to "see" the move.
        let mut p = 1.0 / (1.0 + t.exp());

        let prev_own = if ply >= 2 { self.sti[ply - 2].current_move } else { PackedMove::NONE };
        let easy_move = m.is_capture() || ply < 2 || (!prev_own.is_none() && prev_own.to_square() == from);
        if easy_move {
            p = 1.0 - (1.0 - p) * (1.0 - p);
        }
        rnd > p
    }

    /// At very low strength only a random subset of the root moves is
    /// considered at all. Always keeps at least one move.
    pub(super) fn select_root_moves(&self, moves: Vec<ScoredMove>) -> Vec<ScoredMove> {
        if self.strength >= 100 || moves.len() <= 1 {
            return moves;
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_seed ^ self.pos.zobrist_hash());
        let p = f64::from(self.strength * self.strength) * 1e-4;
        let fallback = rng.random_range(0..moves.len());
        let mut kept: Vec<ScoredMove> = Vec::with_capacity(moves.len());
        let mut fallback_move = None;
        for (i, sm) in moves.into_iter().enumerate() {
            if rng.random_bool(p) {
                kept.push(sm);
            } else if i == fallback {
                fallback_move = Some(sm);
            }
        }
        if kept.is_empty() {
            kept.extend(fallback_move);
        }
        log::debug!("strength {}: searching {} root moves", self.strength, kept.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::position::SearchPosition;
    use shakmaty::Position;

    fn session(strength: u32) -> SearchSession {
        let mut session = SearchSession::new(SearchConfig {
            hash_log2_size: 10,
            strength,
            random_seed: 12345,
            ..SearchConfig::default()
        });
        session.set_position(SearchPosition::default());
        session
    }

    #[test]
    fn test_interpolate() {
        assert_eq!(interpolate(-5, 0, 30, 100, 100), 30);
        assert_eq!(interpolate(50, 0, 30, 100, 100), 65);
        assert_eq!(interpolate(500, 0, 30, 100, 100), 100);
    }

    #[test]
    fn test_strength_is_clamped() {
        let mut s = session(1000);
        assert!(!s.weak);
        s.set_strength(5000, 1);
        assert_eq!(s.strength, MAX_STRENGTH);
        assert!(!s.weak);
        s.set_strength(10, 1);
        assert!(s.weak);
    }

    #[test]
    fn test_weakest_setting_skips_deep_quiet_moves() {
        let s = session(0);
        let moves = s.pos.chess().legal_moves();
        let skipped = moves.iter().filter(|m| s.weak_play_skip_move(m, 10)).count();
        assert_eq!(skipped, moves.len());
    }

    #[test]
    fn test_high_strength_rarely_skips() {
        let s = session(1000);
        let moves = s.pos.chess().legal_moves();
        let skipped = moves.iter().filter(|m| s.weak_play_skip_move(m, 2)).count();
        assert!(skipped <= 1);
    }

    #[test]
    fn test_root_subset_keeps_a_move() {
        let s = session(0);
        let moves = s.root_moves_for_test();
        let total = moves.len();
        let kept = s.select_root_moves(moves);
        assert!(!kept.is_empty() && kept.len() <= total);

        let strong = session(500);
        let kept = strong.select_root_moves(strong.root_moves_for_test());
        assert_eq!(kept.len(), total);
    }

    impl SearchSession {
        fn root_moves_for_test(&self) -> Vec<ScoredMove> {
            crate::movegen::legal_moves(self.pos.chess()).into_vec()
        }
    }
}

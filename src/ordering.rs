//! Move ordering heuristics: killer moves per ply and a ply independent
//! history table.

use shakmaty::{Chess, Color, Move, Position};

use crate::constants::MAX_SEARCH_PLY;
use crate::moves::PackedMove;

#[derive(Clone, Copy, Default)]
struct KillerEntry {
    move0: PackedMove,
    move1: PackedMove,
}

pub struct KillerTable {
    entries: Vec<KillerEntry>,
}

impl Default for KillerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl KillerTable {
    pub fn new() -> Self {
        Self { entries: vec![KillerEntry::default(); MAX_SEARCH_PLY] }
    }

    pub fn clear(&mut self) {
        self.entries.fill(KillerEntry::default());
    }

    pub fn add_killer(&mut self, ply: usize, packed: PackedMove) {
        let Some(ent) = self.entries.get_mut(ply) else { return };
        if packed != ent.move0 {
            ent.move1 = ent.move0;
            ent.move0 = packed;
        }
    }

    /// 4 and 3 for the killers of this ply, 2 and 1 for those two plies up,
    /// 0 otherwise.
    pub fn get_killer_score(&self, ply: usize, m: &Move) -> i32 {
        let packed = PackedMove::from_move(m);
        if let Some(ent) = self.entries.get(ply) {
            if packed == ent.move0 {
                return 4;
            } else if packed == ent.move1 {
                return 3;
            }
        }
        if let Some(ent) = ply.checked_sub(2).and_then(|p| self.entries.get(p)) {
            if packed == ent.move0 {
                return 2;
            } else if packed == ent.move1 {
                return 1;
            }
        }
        0
    }
}

const PIECE_KINDS: usize = 12;

/// Success/fail counters per (piece, destination square).
pub struct History {
    count_success: [[i32; 64]; PIECE_KINDS],
    count_fail: [[i32; 64]; PIECE_KINDS],
    // Cached score, -1 when stale.
    score: [[i32; 64]; PIECE_KINDS],
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            count_success: [[0; 64]; PIECE_KINDS],
            count_fail: [[0; 64]; PIECE_KINDS],
            score: [[-1; 64]; PIECE_KINDS],
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    fn piece_index(pos: &Chess, m: &Move) -> usize {
        let color = match pos.turn() {
            Color::White => 0,
            Color::Black => 6,
        };
        color + m.role() as usize - 1
    }

    pub fn add_success(&mut self, pos: &Chess, m: &Move, depth: i32) {
        let p = Self::piece_index(pos, m);
        let to = m.to() as usize;
        let mut val = self.count_success[p][to] + depth;
        if val > 1000 {
            val /= 2;
            self.count_fail[p][to] /= 2;
        }
        self.count_success[p][to] = val;
        self.score[p][to] = -1;
    }

    pub fn add_fail(&mut self, pos: &Chess, m: &Move, depth: i32) {
        let p = Self::piece_index(pos, m);
        let to = m.to() as usize;
        self.count_fail[p][to] += depth;
        self.score[p][to] = -1;
    }

    /// Score in `0..=49`, the share of cutoffs among all tries.
    pub fn get_hist_score(&mut self, pos: &Chess, m: &Move) -> i32 {
        let p = Self::piece_index(pos, m);
        let to = m.to() as usize;
        let cached = self.score[p][to];
        if cached >= 0 {
            return cached;
        }
        let succ = self.count_success[p][to];
        let fail = self.count_fail[p][to];
        let ret = if succ + fail > 0 { succ * 49 / (succ + fail) } else { 0 };
        self.score[p][to] = ret;
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves() -> (Chess, Move, Move) {
        let pos = Chess::default();
        let list = pos.legal_moves();
        (pos, list[0].clone(), list[1].clone())
    }

    #[test]
    fn test_killer_scores_by_ply() {
        let (_, a, b) = moves();
        let mut kt = KillerTable::new();
        kt.add_killer(5, PackedMove::from_move(&a));
        kt.add_killer(5, PackedMove::from_move(&b));
        assert_eq!(kt.get_killer_score(5, &b), 4);
        assert_eq!(kt.get_killer_score(5, &a), 3);
        assert_eq!(kt.get_killer_score(7, &b), 2);
        assert_eq!(kt.get_killer_score(7, &a), 1);
        assert_eq!(kt.get_killer_score(6, &a), 0);
        assert_eq!(kt.get_killer_score(0, &a), 0);
    }

    #[test]
    fn test_killer_not_duplicated() {
        let (_, a, b) = moves();
        let mut kt = KillerTable::new();
        kt.add_killer(3, PackedMove::from_move(&b));
        kt.add_killer(3, PackedMove::from_move(&a));
        kt.add_killer(3, PackedMove::from_move(&a));
        assert_eq!(kt.get_killer_score(3, &a), 4);
        assert_eq!(kt.get_killer_score(3, &b), 3);
    }

    #[test]
    fn test_killer_ignores_out_of_range_ply() {
        let (_, a, _) = moves();
        let mut kt = KillerTable::new();
        kt.add_killer(MAX_SEARCH_PLY + 3, PackedMove::from_move(&a));
        assert_eq!(kt.get_killer_score(MAX_SEARCH_PLY + 3, &a), 0);
    }

    #[test]
    fn test_history_score_share() {
        let (pos, a, b) = moves();
        let mut ht = History::new();
        assert_eq!(ht.get_hist_score(&pos, &a), 0);
        ht.add_success(&pos, &a, 3);
        assert_eq!(ht.get_hist_score(&pos, &a), 49);
        ht.add_fail(&pos, &a, 3);
        assert_eq!(ht.get_hist_score(&pos, &a), 24);
        assert_eq!(ht.get_hist_score(&pos, &b), 0);
    }

    #[test]
    fn test_history_counts_are_halved() {
        let (pos, a, _) = moves();
        let mut ht = History::new();
        for _ in 0..200 {
            ht.add_success(&pos, &a, 10);
        }
        assert!(ht.count_success.iter().flatten().all(|&c| c <= 1000));
        assert_eq!(ht.get_hist_score(&pos, &a), 49);
    }
}

//! Transposition table with two candidate slots per key.
//!
//! A key is stored either at `h0(key)` (low 32 bits) or `h1(key)` (high 32
//! bits). Which of the two an entry occupies is remembered in the top bit of
//! its depth field so the entry can later be moved to its other slot.

use std::collections::HashSet;
use std::fmt::Write as _;

use shakmaty::{CastlingMode, Chess, Move, Position};

use crate::constants::{MATE0, PLY_SCALE};
use crate::moves::PackedMove;
use crate::position::{history_hash, zobrist};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Exact,
    /// Score is at least the stored value (fail high).
    Lower,
    /// Score is at most the stored value (fail low).
    Upper,
    Empty,
}

const DEPTH_MASK: u16 = 0x7fff;
const SLOT_BIT: u16 = 0x8000;

#[derive(Clone, Copy, Debug)]
pub struct TTEntry {
    pub key: u64,
    mv: PackedMove,
    score: i16,
    depth_slot: u16,
    pub generation: u8,
    pub bound: Bound,
    pub eval_score: i16,
}

impl TTEntry {
    pub const EMPTY: TTEntry = TTEntry {
        key: 0,
        mv: PackedMove::NONE,
        score: 0,
        depth_slot: 0,
        generation: 0,
        bound: Bound::Empty,
        eval_score: 0,
    };

    pub fn mv(&self) -> PackedMove {
        self.mv
    }

    /// Stored score as seen from `ply`. Mate scores are kept as distance
    /// from the node that stored them and converted back here.
    pub fn score(&self, ply: i32) -> i32 {
        let sc = i32::from(self.score);
        if sc > MATE0 - 1000 {
            sc - ply
        } else if sc < -(MATE0 - 1000) {
            sc + ply
        } else {
            sc
        }
    }

    pub fn set_score(&mut self, score: i32, ply: i32) {
        let sc = if score > MATE0 - 1000 {
            score + ply
        } else if score < -(MATE0 - 1000) {
            score - ply
        } else {
            score
        };
        self.score = clamp_i16(sc);
    }

    pub fn depth(&self) -> i32 {
        i32::from(self.depth_slot & DEPTH_MASK)
    }

    fn set_depth(&mut self, depth: i32) {
        let depth = depth.clamp(0, i32::from(DEPTH_MASK)) as u16;
        self.depth_slot = (self.depth_slot & SLOT_BIT) | depth;
    }

    /// 0 if the entry lives at `h0(key)`, 1 if at `h1(key)`.
    pub fn hash_slot(&self) -> usize {
        usize::from(self.depth_slot & SLOT_BIT != 0)
    }

    fn set_hash_slot(&mut self, slot: usize) {
        self.depth_slot &= DEPTH_MASK;
        if slot != 0 {
            self.depth_slot |= SLOT_BIT;
        }
    }

    /// Replacement order: current generation first, then exact scores, then
    /// depth.
    fn better_than(&self, other: &TTEntry, generation: u8) -> bool {
        let cur = self.generation == generation;
        let other_cur = other.generation == generation;
        if cur != other_cur {
            return cur;
        }
        let exact = self.bound == Bound::Exact;
        let other_exact = other.bound == Bound::Exact;
        if exact != other_exact {
            return exact;
        }
        self.depth() > other.depth()
    }

    /// Worth keeping when its slot is claimed by another key.
    fn valuable(&self, generation: u8) -> bool {
        self.generation == generation
            && (self.bound == Bound::Exact || self.depth() > 3 * PLY_SCALE)
    }
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Hash usage summary, see [`TranspositionTable::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub size: usize,
    pub unused: usize,
    pub this_generation: usize,
    /// Entry count per stored depth in whole plies. The last bucket also
    /// holds everything deeper.
    pub depth_histogram: Vec<usize>,
}

const DEPTH_HISTOGRAM_BUCKETS: usize = 20;

pub struct TranspositionTable {
    table: Vec<TTEntry>,
    generation: u8,
}

impl TranspositionTable {
    /// Creates a table with `2^log2_size` entries.
    pub fn new(log2_size: u32) -> Self {
        let size = 1usize << log2_size.min(usize::BITS - 1);
        log::debug!("transposition table with {size} entries");
        Self { table: vec![TTEntry::EMPTY; size], generation: 0 }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn generation(&self) -> u8 {
        self.generation
    }

    fn h0(&self, key: u64) -> usize {
        (key as u32 as usize) & (self.table.len() - 1)
    }

    fn h1(&self, key: u64) -> usize {
        ((key >> 32) as usize) & (self.table.len() - 1)
    }

    fn slot_index(&self, key: u64, slot: usize) -> usize {
        if slot == 0 { self.h0(key) } else { self.h1(key) }
    }

    /// Returns the entry stored for `key`, or [`TTEntry::EMPTY`].
    pub fn probe(&self, key: u64) -> TTEntry {
        let ent = self.table[self.h0(key)];
        if ent.key == key {
            return ent;
        }
        let ent = self.table[self.h1(key)];
        if ent.key == key {
            return ent;
        }
        TTEntry::EMPTY
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        key: u64,
        mv: PackedMove,
        bound: Bound,
        ply: i32,
        depth: i32,
        score: i32,
        eval_score: i32,
    ) {
        let generation = self.generation;
        let idx0 = self.h0(key);
        let idx1 = self.h1(key);
        let (mut idx, mut slot) = (idx0, 0);
        if self.table[idx].key != key {
            (idx, slot) = (idx1, 1);
        }
        if self.table[idx].key != key {
            if self.table[idx1].better_than(&self.table[idx0], generation) {
                (idx, slot) = (idx0, 0);
            }
            let ent = self.table[idx];
            if ent.valuable(generation) {
                let alt_slot = ent.hash_slot() ^ 1;
                let alt_idx = self.slot_index(ent.key, alt_slot);
                if ent.better_than(&self.table[alt_idx], generation) {
                    let mut moved = ent;
                    moved.set_hash_slot(alt_slot);
                    self.table[alt_idx] = moved;
                }
            }
        }

        let ent = &mut self.table[idx];
        if ent.key == key && ent.depth() > depth && ent.bound == bound {
            let skip = match bound {
                Bound::Exact | Bound::Empty => true,
                Bound::Lower => score <= ent.score(ply),
                Bound::Upper => score >= ent.score(ply),
            };
            if skip {
                return;
            }
        }
        if ent.key != key || !mv.is_none() {
            ent.mv = mv;
        }
        ent.key = key;
        ent.set_score(score, ply);
        ent.set_depth(depth);
        ent.generation = generation;
        ent.bound = bound;
        ent.set_hash_slot(slot);
        ent.eval_score = clamp_i16(eval_score);
    }

    /// Called once per root search so older entries become replaceable.
    pub fn next_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn clear(&mut self) {
        self.table.fill(TTEntry::EMPTY);
    }

    pub fn stats(&self) -> TableStats {
        let mut stats = TableStats {
            size: self.table.len(),
            depth_histogram: vec![0; DEPTH_HISTOGRAM_BUCKETS],
            ..TableStats::default()
        };
        for ent in &self.table {
            if ent.bound == Bound::Empty {
                stats.unused += 1;
                continue;
            }
            if ent.generation == self.generation {
                stats.this_generation += 1;
            }
            let bucket = (ent.depth() / PLY_SCALE) as usize;
            stats.depth_histogram[bucket.min(DEPTH_HISTOGRAM_BUCKETS - 1)] += 1;
        }
        stats
    }

    /// Walks the stored best moves starting at `pos`.
    pub fn pv_line(&self, pos: &Chess) -> PvLine<'_> {
        PvLine::new(self, pos.clone())
    }

    /// `first` followed by the stored continuation after it.
    pub fn extract_pv_moves(&self, root: &Chess, first: &Move) -> Vec<Move> {
        let mut pos = root.clone();
        pos.play_unchecked(first);
        let mut ret = vec![first.clone()];
        ret.extend(PvLine::new(self, pos).map(|step| step.mv));
        ret
    }

    /// Stored line from `pos` in UCI notation. Moves whose entry is only an
    /// upper bound are prefixed with `<`, lower bounds with `>`.
    pub fn extract_pv(&self, pos: &Chess) -> String {
        let mut ret = String::new();
        for step in self.pv_line(pos) {
            if !ret.is_empty() {
                ret.push(' ');
            }
            let prefix = match step.bound {
                Bound::Upper => "<",
                Bound::Lower => ">",
                _ => "",
            };
            let _ = write!(ret, "{prefix}{}", step.mv.to_uci(CastlingMode::Standard));
        }
        ret
    }
}

#[derive(Clone, Debug)]
pub struct PvStep {
    pub mv: Move,
    pub bound: Bound,
}

/// Lazy walk along stored best moves. Ends at an empty probe, at a stored
/// move that is not legal in the reached position, or right after a move
/// that repeats a position already on the line.
pub struct PvLine<'a> {
    tt: &'a TranspositionTable,
    pos: Chess,
    seen: HashSet<u64>,
    done: bool,
}

impl<'a> PvLine<'a> {
    fn new(tt: &'a TranspositionTable, pos: Chess) -> Self {
        let seen = HashSet::from([zobrist(&pos)]);
        Self { tt, pos, seen, done: false }
    }
}

impl Iterator for PvLine<'_> {
    type Item = PvStep;

    fn next(&mut self) -> Option<PvStep> {
        if self.done {
            return None;
        }
        let ent = self.tt.probe(history_hash(&self.pos));
        if ent.bound == Bound::Empty {
            self.done = true;
            return None;
        }
        let moves = self.pos.legal_moves();
        let Some(m) = ent.mv().find_in(moves.iter()).cloned() else {
            self.done = true;
            return None;
        };
        self.pos.play_unchecked(&m);
        if !self.seen.insert(zobrist(&self.pos)) {
            self.done = true;
        }
        Some(PvStep { mv: m, bound: ent.bound })
    }
}

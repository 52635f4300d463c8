use std::fmt;

use shakmaty::{Move, Role, Square};
use smallvec::SmallVec;

/// A move reduced to `(from, to, promotion)`, packed into 16 bits:
/// bits 0-5 from, bits 6-11 to, bits 12-14 promotion role.
///
/// This is the identity of a move wherever moves are remembered across
/// positions (transposition table, killer table, per-ply scratch). A packed
/// move is turned back into a [`Move`] only by finding it among the legal
/// moves of the position it is meant for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedMove(u16);

impl PackedMove {
    /// The empty move (`from == to`).
    pub const NONE: PackedMove = PackedMove(0);

    pub fn new(from: Square, to: Square, promotion: Option<Role>) -> Self {
        let promo = promotion.map_or(0, |r| r as u16);
        PackedMove(from as u16 | (to as u16) << 6 | promo << 12)
    }

    pub fn from_move(m: &Move) -> Self {
        match m.from() {
            Some(from) => Self::new(from, m.to(), m.promotion()),
            None => Self::NONE,
        }
    }

    pub fn from_square(self) -> Square {
        Square::new(u32::from(self.0 & 63))
    }

    pub fn to_square(self) -> Square {
        Square::new(u32::from((self.0 >> 6) & 63))
    }

    pub fn promotion(self) -> Option<Role> {
        match (self.0 >> 12) & 7 {
            1 => Some(Role::Pawn),
            2 => Some(Role::Knight),
            3 => Some(Role::Bishop),
            4 => Some(Role::Rook),
            5 => Some(Role::Queen),
            6 => Some(Role::King),
            _ => None,
        }
    }

    pub fn is_none(self) -> bool {
        self.from_square() == self.to_square()
    }

    pub fn matches(self, m: &Move) -> bool {
        !self.is_none() && self == Self::from_move(m)
    }

    pub fn find_in<'a, I>(self, moves: I) -> Option<&'a Move>
    where
        I: IntoIterator<Item = &'a Move>,
    {
        if self.is_none() {
            return None;
        }
        moves.into_iter().find(|m| self.matches(m))
    }
}

impl fmt::Debug for PackedMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("PackedMove(none)");
        }
        write!(f, "PackedMove({}{}", self.from_square(), self.to_square())?;
        if let Some(role) = self.promotion() {
            write!(f, "{}", role.char())?;
        }
        f.write_str(")")
    }
}

/// A move together with its ordering key. The key is scratch space for
/// move ordering only and never part of the move's identity.
#[derive(Clone, Debug)]
pub struct ScoredMove {
    pub mv: Move,
    pub score: i32,
}

impl ScoredMove {
    pub fn new(mv: Move) -> Self {
        Self { mv, score: 0 }
    }
}

pub type ScoredMoveList = SmallVec<[ScoredMove; 64]>;

/// Moves the highest scored move at or after `start` to `start`.
pub fn select_best(moves: &mut [ScoredMove], start: usize) {
    let mut best = start;
    for i in start + 1..moves.len() {
        if moves[i].score > moves[best].score {
            best = i;
        }
    }
    if best != start {
        moves.swap(start, best);
    }
}

/// Moves `hash_move` to the front of the list if present.
pub fn select_hash_move(moves: &mut [ScoredMove], hash_move: PackedMove) -> bool {
    if hash_move.is_none() {
        return false;
    }
    match moves.iter().position(|sm| hash_move.matches(&sm.mv)) {
        Some(idx) => {
            moves.swap(0, idx);
            moves[0].score = 10000;
            true
        }
        None => false,
    }
}

//! Game position as seen by the search.
//!
//! [`SearchPosition`] wraps a [`Chess`] position together with the zobrist
//! hashes of the positions that led to it, which is what repetition claims
//! and the transposition table key need.

use std::sync::LazyLock;

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role, Square};

use crate::constants::piece_value;
use crate::error::{EngineError, EngineResult};

/// Half-move clock from which the history hash starts to differ from the
/// plain zobrist hash.
const HISTORY_HASH_CLOCK: u32 = 80;

static MOVE_CNT_KEYS: LazyLock<[u64; 101]> = LazyLock::new(|| {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x6d6f_7665_636e_7400);
    let mut keys = [0u64; 101];
    for key in keys.iter_mut() {
        *key = rng.next_u64();
    }
    keys
});

pub fn zobrist(pos: &Chess) -> u64 {
    pos.zobrist_hash::<Zobrist64>(EnPassantMode::Legal).0
}

/// Zobrist hash that also separates positions close to a fifty-move claim.
pub fn history_hash(pos: &Chess) -> u64 {
    mix_clock(zobrist(pos), pos.halfmoves())
}

fn mix_clock(key: u64, clock: u32) -> u64 {
    if clock >= HISTORY_HASH_CLOCK {
        key ^ MOVE_CNT_KEYS[clock.min(100) as usize]
    } else {
        key
    }
}

pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string()
}

/// State needed to take back one move. Only meaningful for the position
/// that produced it.
#[derive(Debug)]
pub struct UndoInfo {
    prev: Chess,
    prev_hash: u64,
}

#[derive(Clone, Debug)]
pub struct SearchPosition {
    pos: Chess,
    hash: u64,
    hash_history: Vec<u64>,
}

impl Default for SearchPosition {
    fn default() -> Self {
        Self::new(Chess::default())
    }
}

impl SearchPosition {
    pub fn new(pos: Chess) -> Self {
        let hash = zobrist(&pos);
        Self { pos, hash, hash_history: Vec::new() }
    }

    pub fn from_fen(fen: &str) -> EngineResult<Self> {
        let fen: Fen = fen.trim().parse()?;
        let pos: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| EngineError::IllegalPosition(e.to_string()))?;
        Ok(Self::new(pos))
    }

    /// Plays a move "over the board". A zeroing move drops the hash history
    /// since no earlier position can repeat after it.
    pub fn play_uci(&mut self, text: &str) -> EngineResult<Move> {
        let uci: UciMove = text
            .parse()
            .map_err(|_| EngineError::InvalidMove(text.to_owned()))?;
        let m = uci.to_move(&self.pos).map_err(|_| EngineError::IllegalMove {
            uci: text.to_owned(),
            fen: to_fen(&self.pos),
        })?;
        let _ = self.make_move(&m);
        if self.pos.halfmoves() == 0 {
            self.hash_history.clear();
        }
        Ok(m)
    }

    pub fn chess(&self) -> &Chess {
        &self.pos
    }

    pub fn turn(&self) -> Color {
        self.pos.turn()
    }

    pub fn is_check(&self) -> bool {
        self.pos.is_check()
    }

    pub fn zobrist_hash(&self) -> u64 {
        self.hash
    }

    pub fn history_hash(&self) -> u64 {
        mix_clock(self.hash, self.pos.halfmoves())
    }

    /// Number of positions recorded before the current one.
    pub fn history_len(&self) -> usize {
        self.hash_history.len()
    }

    pub fn make_move(&mut self, m: &Move) -> UndoInfo {
        let undo = UndoInfo { prev: self.pos.clone(), prev_hash: self.hash };
        self.hash_history.push(self.hash);
        self.pos.play_unchecked(m);
        self.hash = zobrist(&self.pos);
        undo
    }

    pub fn unmake_move(&mut self, undo: UndoInfo) {
        self.hash_history.pop();
        self.pos = undo.prev;
        self.hash = undo.prev_hash;
    }

    /// Passes the turn. Returns `None` when passing would leave an illegal
    /// position, which only happens when the side to move is in check.
    pub fn make_null_move(&mut self) -> Option<UndoInfo> {
        let swapped = self.pos.clone().swap_turn().ok()?;
        let undo = UndoInfo {
            prev: std::mem::replace(&mut self.pos, swapped),
            prev_hash: self.hash,
        };
        self.hash = zobrist(&self.pos);
        Some(undo)
    }

    pub fn unmake_null_move(&mut self, undo: UndoInfo) {
        self.pos = undo.prev;
        self.hash = undo.prev_hash;
    }

    /// Value of the piece on `square`, 0 if empty.
    pub fn value_at(&self, square: Square) -> i32 {
        self.pos.board().role_at(square).map_or(0, piece_value)
    }

    pub fn pawn_material(&self, color: Color) -> i32 {
        let board = self.pos.board();
        (board.pawns() & board.by_color(color)).count() as i32 * piece_value(Role::Pawn)
    }

    /// Material of `color` excluding pawns and king.
    pub fn non_pawn_material(&self, color: Color) -> i32 {
        let board = self.pos.board();
        let ours = board.by_color(color);
        [Role::Knight, Role::Bishop, Role::Rook, Role::Queen]
            .into_iter()
            .map(|role| (board.by_role(role) & ours).count() as i32 * piece_value(role))
            .sum()
    }

    pub fn material(&self, color: Color) -> i32 {
        self.pawn_material(color) + self.non_pawn_material(color)
    }

    pub fn can_claim_draw_50(&self) -> bool {
        self.pos.halfmoves() >= 100
    }

    /// True if the current position can be claimed as a repetition.
    ///
    /// Positions recorded at index `first_new` or later were reached inside
    /// the search tree; a single repetition of one of those already counts
    /// as a draw.
    pub fn can_claim_draw_rep(&self, first_new: usize) -> bool {
        let len = self.hash_history.len();
        if len < 4 {
            return false;
        }
        let mut reps = 0;
        for i in (0..=len - 4).rev().step_by(2) {
            if self.hash_history[i] == self.hash {
                reps += 1;
                if i >= first_new {
                    reps += 1;
                    break;
                }
            }
        }
        reps >= 2
    }
}

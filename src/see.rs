//! Static exchange evaluation.

use shakmaty::attacks;
use shakmaty::{Bitboard, Board, Chess, Color, Move, Position, Square};

use crate::constants::*;

/// Evaluates the capture sequence on one square. Keeps a scratch buffer of
/// captured values so repeated calls do not allocate.
pub struct See {
    captures: [i32; 64],
}

impl Default for See {
    fn default() -> Self {
        Self::new()
    }
}

impl See {
    pub fn new() -> Self {
        Self { captures: [0; 64] }
    }

    /// Net material won by the side making `m` if both sides keep capturing
    /// on the destination square with their least valuable attacker, each
    /// free to stop at any point.
    pub fn evaluate(&mut self, pos: &Chess, m: &Move) -> i32 {
        let Some(from) = m.from() else { return 0 };
        if m.is_castle() {
            return 0;
        }
        let board = pos.board();
        let square = m.to();
        let mut occupied = board.occupied() ^ Bitboard::from(from);
        if m.is_en_passant() {
            self.captures[0] = PAWN_VALUE;
            occupied ^= Bitboard::from(Square::from_coords(square.file(), from.rank()));
        } else {
            self.captures[0] = match board.role_at(square) {
                Some(role) => piece_value(role),
                None => 0,
            };
            if self.captures[0] == KING_VALUE {
                return KING_VALUE;
            }
        }
        let mut n_capt = 1;

        let mut side = !pos.turn();
        let mut val_on_square = piece_value(m.promotion().unwrap_or(m.role()));
        while let Some((attacker, value)) = least_valuable_attacker(board, square, side, occupied) {
            self.captures[n_capt] = val_on_square;
            n_capt += 1;
            if val_on_square == KING_VALUE {
                break;
            }
            val_on_square = value;
            occupied ^= Bitboard::from(attacker);
            side = !side;
        }

        let mut score = 0;
        for i in (1..n_capt).rev() {
            score = (self.captures[i] - score).max(0);
        }
        self.captures[0] - score
    }

    /// Cheap test for a losing move: only runs the full exchange when the
    /// moving piece is worth more than what it takes.
    pub fn is_negative(&mut self, pos: &Chess, m: &Move) -> bool {
        let board = pos.board();
        let moving = m.from().and_then(|sq| board.role_at(sq)).map_or(0, piece_value);
        let taken = board.role_at(m.to()).map_or(0, piece_value);
        if taken >= moving {
            return false;
        }
        self.evaluate(pos, m) < 0
    }

    /// Like [`See::evaluate`] but only the sign is meaningful. Skips the
    /// exchange when the capture cannot lose material.
    pub fn sign(&mut self, pos: &Chess, m: &Move) -> i32 {
        let board = pos.board();
        let moving = m.from().and_then(|sq| board.role_at(sq)).map_or(0, piece_value);
        let taken = board.role_at(m.to()).map_or(0, piece_value);
        if taken > moving {
            return 1;
        }
        self.evaluate(pos, m).signum()
    }
}

fn least_valuable_attacker(
    board: &Board,
    square: Square,
    side: Color,
    occupied: Bitboard,
) -> Option<(Square, i32)> {
    let ours = board.by_color(side) & occupied;

    let pawns = attacks::pawn_attacks(!side, square) & board.pawns() & ours;
    if let Some(sq) = pawns.first() {
        return Some((sq, PAWN_VALUE));
    }
    let knights = attacks::knight_attacks(square) & board.knights() & ours;
    if let Some(sq) = knights.first() {
        return Some((sq, KNIGHT_VALUE));
    }
    let diagonal = attacks::bishop_attacks(square, occupied);
    if let Some(sq) = (diagonal & board.bishops() & ours).first() {
        return Some((sq, BISHOP_VALUE));
    }
    let straight = attacks::rook_attacks(square, occupied);
    if let Some(sq) = (straight & board.rooks() & ours).first() {
        return Some((sq, ROOK_VALUE));
    }
    if let Some(sq) = ((diagonal | straight) & board.queens() & ours).first() {
        return Some((sq, QUEEN_VALUE));
    }
    let kings = attacks::king_attacks(square) & board.kings() & ours;
    kings.first().map(|sq| (sq, KING_VALUE))
}

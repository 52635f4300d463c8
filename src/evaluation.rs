use shakmaty::{Bitboard, Board, Chess, Color, Piece, Position, Rank, Role, Square};

use crate::constants::*;
use crate::movegen::pawn_blocker_mask;

/// Static evaluation used by the search. Scores are from the point of view
/// of the side to move.
pub trait Evaluate {
    fn eval_pos(&mut self, pos: &Chess) -> i32;
}

/// Tapered piece-square evaluation with a handful of pawn and piece terms.
#[derive(Clone, Copy, Debug, Default)]
pub struct PieceSquareEval;

impl Evaluate for PieceSquareEval {
    fn eval_pos(&mut self, pos: &Chess) -> i32 {
        let board = pos.board();
        let phase = game_phase(board);
        let mut score = 0;
        for square in board.occupied() {
            if let Some(piece) = board.piece_at(square) {
                let val = piece_score(board, piece, square, phase);
                score += if piece.color == Color::White { val } else { -val };
            }
        }
        score += bishop_pair(board, Color::White) - bishop_pair(board, Color::Black);
        if pos.turn() == Color::White { score } else { -score }
    }
}

/// 0 with all pieces on the board, 256 with none left.
fn game_phase(board: &Board) -> i32 {
    const TOTAL: i32 = 24;
    let weight = board.knights().count() + board.bishops().count()
        + board.rooks().count() * 2
        + board.queens().count() * 4;
    let phase = (TOTAL - (weight as i32).min(TOTAL)).max(0);
    (phase * 256 + TOTAL / 2) / TOTAL
}

fn pst_index(color: Color, square: Square) -> usize {
    let rank = square.rank() as usize;
    let file = square.file() as usize;
    match color {
        Color::White => (7 - rank) * 8 + file,
        Color::Black => rank * 8 + file,
    }
}

fn pst_value(role: Role, color: Color, square: Square, phase: i32) -> i32 {
    let idx = pst_index(color, square);
    let (mg, eg) = match role {
        Role::Pawn => (MG_PAWN_PST[idx], EG_PAWN_PST[idx]),
        Role::Knight => (KNIGHT_PST[idx], KNIGHT_PST[idx]),
        Role::Bishop => (BISHOP_PST[idx], BISHOP_PST[idx]),
        Role::Rook => (ROOK_PST[idx], ROOK_PST[idx]),
        Role::Queen => (QUEEN_PST[idx], QUEEN_PST[idx]),
        Role::King => (MG_KING_PST[idx], EG_KING_PST[idx]),
    };
    (mg * (256 - phase) + eg * phase) / 256
}

fn adjacent_files(square: Square) -> Bitboard {
    square.file().offset(-1).map_or(Bitboard(0), Bitboard::from_file)
        | square.file().offset(1).map_or(Bitboard(0), Bitboard::from_file)
}

fn piece_score(board: &Board, piece: Piece, square: Square, phase: i32) -> i32 {
    let mut val = piece_value(piece.role) + pst_value(piece.role, piece.color, square, phase);
    let own_pawns = board.pawns() & board.by_color(piece.color);
    match piece.role {
        Role::Rook => {
            if (board.pawns() & Bitboard::from_file(square.file())).is_empty() {
                val += ROOK_ON_OPEN_FILE;
            }
            let seventh = match piece.color {
                Color::White => Rank::Seventh,
                Color::Black => Rank::Second,
            };
            if square.rank() == seventh {
                val += ROOK_ON_7TH_BONUS;
            }
        }
        Role::Knight => {
            let file = square.file() as i32;
            let rank = square.rank() as i32;
            let advanced = match piece.color {
                Color::White => rank >= 3,
                Color::Black => rank <= 4,
            };
            if (2..=5).contains(&file) && advanced && (own_pawns & adjacent_files(square)).any() {
                val += KNIGHT_OUTPOST_BONUS;
            }
        }
        Role::King if phase < 128 => {
            let shield_rank = match piece.color {
                Color::White => Rank::Second,
                Color::Black => Rank::Seventh,
            };
            let shield = Bitboard::from_rank(shield_rank)
                & (Bitboard::from_file(square.file()) | adjacent_files(square));
            val += (own_pawns & shield).count() as i32 * KING_SHIELD_BONUS;
        }
        Role::Pawn => val += pawn_structure(board, piece.color, square),
        _ => {}
    }
    val
}

fn pawn_structure(board: &Board, color: Color, square: Square) -> i32 {
    let own_pawns = board.pawns() & board.by_color(color);
    let their_pawns = board.pawns() & board.by_color(!color);
    let mut val = 0;
    if (own_pawns & Bitboard::from_file(square.file())).count() > 1 {
        val += DOUBLED_PAWN_PENALTY;
    }
    if (own_pawns & adjacent_files(square)).is_empty() {
        val += ISOLATED_PAWN_PENALTY;
    }
    if (their_pawns & pawn_blocker_mask(color, square)).is_empty() {
        let rank = square.rank() as usize;
        let rel_rank = match color {
            Color::White => rank,
            Color::Black => 7 - rank,
        };
        val += PASSED_PAWN_BONUS[rel_rank];
    }
    val
}

fn bishop_pair(board: &Board, color: Color) -> i32 {
    if (board.bishops() & board.by_color(color)).count() >= 2 {
        BISHOP_PAIR_BONUS
    } else {
        0
    }
}

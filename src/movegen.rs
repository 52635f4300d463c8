use shakmaty::attacks;
use shakmaty::{Bitboard, Chess, Color, File, Move, Position, Rank, Role, Square};

use crate::moves::{PackedMove, ScoredMove, ScoredMoveList};

pub fn legal_moves(pos: &Chess) -> ScoredMoveList {
    pos.legal_moves().into_iter().map(ScoredMove::new).collect()
}

/// Replies to check. shakmaty only generates legal moves, so while in check
/// the legal move list is exactly the set of evasions.
pub fn check_evasions(pos: &Chess) -> ScoredMoveList {
    legal_moves(pos)
}

/// Captures and promotions.
pub fn captures(pos: &Chess) -> ScoredMoveList {
    pos.legal_moves()
        .into_iter()
        .filter(|m| m.is_capture() || m.is_promotion())
        .map(ScoredMove::new)
        .collect()
}

pub fn gives_check(pos: &Chess, m: &Move) -> bool {
    let mut next = pos.clone();
    next.play_unchecked(m);
    next.is_check()
}

fn adjacent_files(file: File) -> Bitboard {
    file.offset(-1).map_or(Bitboard(0), Bitboard::from_file)
        | file.offset(1).map_or(Bitboard(0), Bitboard::from_file)
}

/// Squares in front of `square` on its own and the adjacent files, seen from
/// `color`. An enemy pawn on any of them stops a pawn on `square` from being
/// passed.
pub fn pawn_blocker_mask(color: Color, square: Square) -> Bitboard {
    let files = Bitboard::from_file(square.file()) | adjacent_files(square.file());
    let rank = square.rank() as u32;
    let mut ahead = Bitboard(0);
    match color {
        Color::White => {
            for r in rank + 1..8 {
                ahead |= Bitboard::from_rank(Rank::new(r));
            }
        }
        Color::Black => {
            for r in 0..rank {
                ahead |= Bitboard::from_rank(Rank::new(r));
            }
        }
    }
    files & ahead
}

/// True for a pawn move to the sixth rank or beyond (relative) with no enemy
/// pawn left in front of it.
pub fn passed_pawn_push(pos: &Chess, m: &Move) -> bool {
    if m.role() != Role::Pawn {
        return false;
    }
    let us = pos.turn();
    let board = pos.board();
    let their_pawns = board.pawns() & board.by_color(!us);
    if (pawn_blocker_mask(us, m.to()) & their_pawns).any() {
        return false;
    }
    let rank = m.to().rank() as u32;
    match us {
        Color::White => rank >= 5,
        Color::Black => rank <= 2,
    }
}

/// True if `m2` could have been made possible by `m1`: `m2` moves the piece
/// `m1` moved, moves to the square `m1` left, or slides through it.
pub fn related_moves(m1: PackedMove, m2: PackedMove) -> bool {
    if m1.is_none() || m2.is_none() {
        return false;
    }
    m1.to_square() == m2.from_square()
        || m1.from_square() == m2.to_square()
        || attacks::between(m2.from_square(), m2.to_square()).contains(m1.from_square())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::SearchPosition;

    fn find(pos: &Chess, uci: &str) -> Move {
        pos.legal_moves()
            .into_iter()
            .find(|m| m.to_uci(shakmaty::CastlingMode::Standard).to_string() == uci)
            .unwrap()
    }

    #[test]
    fn test_captures_only_contains_captures_and_promotions() {
        let pos = SearchPosition::from_fen("4k3/1P6/8/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let caps = captures(pos.chess());
        assert!(!caps.is_empty());
        assert!(caps.iter().all(|sm| sm.mv.is_capture() || sm.mv.is_promotion()));
        assert_eq!(caps.iter().filter(|sm| sm.mv.is_capture()).count(), 1);
    }

    #[test]
    fn test_gives_check() {
        let pos = SearchPosition::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        assert!(gives_check(pos.chess(), &find(pos.chess(), "a1a8")));
        assert!(!gives_check(pos.chess(), &find(pos.chess(), "a1a2")));
    }

    #[test]
    fn test_passed_pawn_push() {
        let pos = SearchPosition::from_fen("4k3/8/8/4P3/8/8/1p6/4K3 w - - 0 1").unwrap();
        assert!(passed_pawn_push(pos.chess(), &find(pos.chess(), "e5e6")));

        let blocked = SearchPosition::from_fen("4k3/3p4/8/4P3/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(!passed_pawn_push(blocked.chess(), &find(blocked.chess(), "e5e6")));

        let early = SearchPosition::from_fen("4k3/8/8/8/8/4P3/8/4K3 w - - 0 1").unwrap();
        assert!(!passed_pawn_push(early.chess(), &find(early.chess(), "e3e4")));
    }

    #[test]
    fn test_related_moves() {
        let m1 = PackedMove::new(Square::D4, Square::D5, None);
        // Slides through the square m1 vacated.
        let through = PackedMove::new(Square::D1, Square::D8, None);
        assert!(related_moves(m1, through));
        let same_piece = PackedMove::new(Square::D5, Square::D6, None);
        assert!(related_moves(m1, same_piece));
        let unrelated = PackedMove::new(Square::A2, Square::A3, None);
        assert!(!related_moves(m1, unrelated));
        assert!(!related_moves(PackedMove::NONE, through));
    }
}

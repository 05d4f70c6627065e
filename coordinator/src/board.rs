//! Rules-free position tracking.
//!
//! The server is the referee; this tracker only mirrors occupancy so that
//! USI→CSA conversion can resolve source pieces and promotion can be
//! detected. Captures just vacate the destination (hands are not modeled
//! beyond what drops require, which is nothing).

use csa_client::Side;
use tracing::warn;

use crate::notation::{CsaMove, Piece, Square};

const HIRATE: [&str; 9] = [
    "P1-KY-KE-GI-KI-OU-KI-GI-KE-KY",
    "P2 * -HI *  *  *  *  * -KA * ",
    "P3-FU-FU-FU-FU-FU-FU-FU-FU-FU",
    "P4 *  *  *  *  *  *  *  *  * ",
    "P5 *  *  *  *  *  *  *  *  * ",
    "P6 *  *  *  *  *  *  *  *  * ",
    "P7+FU+FU+FU+FU+FU+FU+FU+FU+FU",
    "P8 * +KA *  *  *  *  * +HI * ",
    "P9+KY+KE+GI+KI+OU+KI+GI+KE+KY",
];

/// 9×9 occupancy grid. Indexed by CSA file/rank, both 1..=9.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    // squares[rank - 1][file - 1]
    squares: [[Option<(Side, Piece)>; 9]; 9],
}

impl PositionTracker {
    pub fn empty() -> Self {
        Self {
            squares: [[None; 9]; 9],
        }
    }

    /// The standard starting position.
    pub fn hirate() -> Self {
        let mut tracker = Self::empty();
        for line in HIRATE {
            tracker.feed_position_line(line);
        }
        tracker
    }

    /// Seed from the `Game_Summary` position lines. An empty or row-less
    /// set of lines means the standard start.
    pub fn from_position_lines(lines: &[String]) -> Self {
        let has_rows = lines
            .iter()
            .any(|l| l.starts_with("P1") || l.starts_with("P+") || l.starts_with("P-"));
        if !has_rows {
            return Self::hirate();
        }
        let mut tracker = Self::empty();
        for line in lines {
            tracker.feed_position_line(line);
        }
        tracker
    }

    fn feed_position_line(&mut self, line: &str) {
        let bytes = line.as_bytes();
        if bytes.len() < 2 || bytes[0] != b'P' {
            return;
        }
        match bytes[1] {
            b'1'..=b'9' => {
                let rank = bytes[1] - b'0';
                // Cells run file 9 down to file 1, three chars each.
                let cells = &line[2..];
                for (i, cell) in cells.as_bytes().chunks(3).enumerate() {
                    if i >= 9 || cell.len() < 3 {
                        break;
                    }
                    let file = 9 - i as u8;
                    let side = match cell[0] {
                        b'+' => Side::Black,
                        b'-' => Side::White,
                        _ => continue,
                    };
                    let code = match std::str::from_utf8(&cell[1..3]) {
                        Ok(code) => code,
                        Err(_) => continue,
                    };
                    if let (Some(piece), Some(sq)) = (Piece::from_csa(code), Square::new(file, rank))
                    {
                        self.set(sq, Some((side, piece)));
                    } else {
                        warn!(line, cell = code, "unparseable position cell");
                    }
                }
            }
            b'+' | b'-' => {
                let side = if bytes[1] == b'+' {
                    Side::Black
                } else {
                    Side::White
                };
                // Placements in groups of four: file, rank, piece code.
                let rest = &line[2..];
                for group in rest.as_bytes().chunks(4) {
                    if group.len() < 4 {
                        break;
                    }
                    let (file, rank) = (group[0].wrapping_sub(b'0'), group[1].wrapping_sub(b'0'));
                    let Ok(code) = std::str::from_utf8(&group[2..4]) else {
                        continue;
                    };
                    // `00AL` (rest to hand) carries no board square.
                    let (Some(sq), Some(piece)) = (Square::new(file, rank), Piece::from_csa(code))
                    else {
                        continue;
                    };
                    self.set(sq, Some((side, piece)));
                }
            }
            _ => {}
        }
    }

    pub fn piece_at(&self, sq: Square) -> Option<(Side, Piece)> {
        self.squares[(sq.rank - 1) as usize][(sq.file - 1) as usize]
    }

    fn set(&mut self, sq: Square, value: Option<(Side, Piece)>) {
        self.squares[(sq.rank - 1) as usize][(sq.file - 1) as usize] = value;
    }

    /// Whether the moving piece is already promoted before `mv`.
    pub fn source_promoted(&self, mv: &CsaMove) -> bool {
        mv.from
            .and_then(|from| self.piece_at(from))
            .is_some_and(|(_, piece)| piece.is_promoted())
    }

    /// Whether `mv` promotes its piece (arrives promoted, left unpromoted).
    pub fn is_promotion(&self, mv: &CsaMove) -> bool {
        mv.piece.is_promoted() && !self.source_promoted(mv) && mv.from.is_some()
    }

    /// Apply a CSA move. Legality is the server's business; this only
    /// moves occupancy, the CSA piece code already reflecting promotion.
    pub fn apply_csa(&mut self, mv: &CsaMove) {
        if let Some(from) = mv.from {
            self.set(from, None);
        }
        self.set(mv.to, Some((mv.side, mv.piece)));
    }

    /// SFEN rendering of the board with empty hands, for the USI
    /// `position sfen ...` command. `to_move` is the side to move.
    pub fn to_sfen(&self, to_move: Side) -> String {
        let mut out = String::new();
        for rank in 1..=9u8 {
            if rank > 1 {
                out.push('/');
            }
            let mut empties = 0;
            for i in 0..9u8 {
                let file = 9 - i;
                let cell = self.squares[(rank - 1) as usize][(file - 1) as usize];
                match cell {
                    None => empties += 1,
                    Some((side, piece)) => {
                        if empties > 0 {
                            out.push_str(&empties.to_string());
                            empties = 0;
                        }
                        if piece.is_promoted() {
                            out.push('+');
                        }
                        let letter = piece.usi_letter();
                        out.push(match side {
                            Side::Black => letter,
                            Side::White => letter.to_ascii_lowercase(),
                        });
                    }
                }
            }
            if empties > 0 {
                out.push_str(&empties.to_string());
            }
        }
        let turn = match to_move {
            Side::Black => 'b',
            Side::White => 'w',
        };
        format!("{out} {turn} - 1")
    }

    /// True when the position equals the standard start.
    pub fn is_hirate(&self) -> bool {
        self.to_sfen(Side::Black)
            == "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hirate_layout() {
        let tracker = PositionTracker::hirate();
        assert_eq!(
            tracker.piece_at(Square::new(7, 7).unwrap()),
            Some((Side::Black, Piece::Pawn))
        );
        assert_eq!(
            tracker.piece_at(Square::new(8, 8).unwrap()),
            Some((Side::Black, Piece::Bishop))
        );
        assert_eq!(
            tracker.piece_at(Square::new(2, 2).unwrap()),
            Some((Side::White, Piece::Bishop))
        );
        assert_eq!(
            tracker.piece_at(Square::new(5, 1).unwrap()),
            Some((Side::White, Piece::King))
        );
        assert_eq!(tracker.piece_at(Square::new(5, 5).unwrap()), None);
        assert!(tracker.is_hirate());
    }

    #[test]
    fn test_hirate_sfen() {
        let tracker = PositionTracker::hirate();
        assert_eq!(
            tracker.to_sfen(Side::Black),
            "lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b - 1"
        );
    }

    #[test]
    fn test_empty_lines_mean_hirate() {
        let tracker = PositionTracker::from_position_lines(&["+".to_string()]);
        assert!(tracker.is_hirate());
    }

    #[test]
    fn test_placement_lines() {
        let lines = vec!["P+55KA".to_string(), "P-51OU23TO".to_string()];
        let tracker = PositionTracker::from_position_lines(&lines);
        assert_eq!(
            tracker.piece_at(Square::new(5, 5).unwrap()),
            Some((Side::Black, Piece::Bishop))
        );
        assert_eq!(
            tracker.piece_at(Square::new(5, 1).unwrap()),
            Some((Side::White, Piece::King))
        );
        assert_eq!(
            tracker.piece_at(Square::new(2, 3).unwrap()),
            Some((Side::White, Piece::ProPawn))
        );
        assert!(!tracker.is_hirate());
    }

    #[test]
    fn test_apply_moves_and_promotion_detection() {
        let mut tracker = PositionTracker::hirate();

        let mv = CsaMove::parse("+7776FU").unwrap();
        assert!(!tracker.is_promotion(&mv));
        tracker.apply_csa(&mv);
        assert_eq!(tracker.piece_at(Square::new(7, 7).unwrap()), None);
        assert_eq!(
            tracker.piece_at(Square::new(7, 6).unwrap()),
            Some((Side::Black, Piece::Pawn))
        );

        // Walk the bishop diagonal open, then promote on 2b.
        tracker.apply_csa(&CsaMove::parse("-3334FU").unwrap());
        let capture = CsaMove::parse("+8822UM").unwrap();
        assert!(tracker.is_promotion(&capture));
        assert!(!tracker.source_promoted(&capture));
        tracker.apply_csa(&capture);
        assert_eq!(
            tracker.piece_at(Square::new(2, 2).unwrap()),
            Some((Side::Black, Piece::Horse))
        );

        // Moving the horse afterwards is not a promotion.
        let slide = CsaMove::parse("+2233UM").unwrap();
        assert!(tracker.source_promoted(&slide));
        assert!(!tracker.is_promotion(&slide));
    }

    #[test]
    fn test_drop_fills_square() {
        let mut tracker = PositionTracker::hirate();
        let drop = CsaMove::parse("-0055KA").unwrap();
        assert!(!tracker.is_promotion(&drop));
        tracker.apply_csa(&drop);
        assert_eq!(
            tracker.piece_at(Square::new(5, 5).unwrap()),
            Some((Side::White, Piece::Bishop))
        );
    }
}

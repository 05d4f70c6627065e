//! CSA ↔ USI move notation.
//!
//! CSA writes a move as side sign, source, destination, and the piece code
//! *after* the move (`+7776FU`, drops use source `00`). USI writes source
//! and destination squares with `a`-`i` ranks plus a promotion marker
//! (`7g7f+`), and drops as `P*5e`. Converting CSA→USI therefore needs to
//! know whether the source piece was already promoted; USI→CSA needs a
//! source-square lookup to recover the piece code.

use std::fmt;

use csa_client::Side;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NotationError {
    #[error("Invalid CSA move: {0}")]
    InvalidCsa(String),
    #[error("Invalid USI move: {0}")]
    InvalidUsi(String),
    #[error("Unknown piece code: {0}")]
    UnknownPiece(String),
    #[error("No piece on source square of {0}")]
    UnresolvedSource(String),
}

/// A board square, file and rank both 1..=9 (CSA numbering; USI writes the
/// rank as `a`..`i`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Square {
    pub file: u8,
    pub rank: u8,
}

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Square> {
        ((1..=9).contains(&file) && (1..=9).contains(&rank)).then_some(Square { file, rank })
    }

    fn usi_rank(self) -> char {
        (b'a' + self.rank - 1) as char
    }
}

/// Shogi piece kinds, promoted forms included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece {
    Pawn,
    Lance,
    Knight,
    Silver,
    Gold,
    Bishop,
    Rook,
    King,
    ProPawn,
    ProLance,
    ProKnight,
    ProSilver,
    Horse,
    Dragon,
}

impl Piece {
    pub const ALL: [Piece; 14] = [
        Piece::Pawn,
        Piece::Lance,
        Piece::Knight,
        Piece::Silver,
        Piece::Gold,
        Piece::Bishop,
        Piece::Rook,
        Piece::King,
        Piece::ProPawn,
        Piece::ProLance,
        Piece::ProKnight,
        Piece::ProSilver,
        Piece::Horse,
        Piece::Dragon,
    ];

    pub fn csa_code(self) -> &'static str {
        match self {
            Piece::Pawn => "FU",
            Piece::Lance => "KY",
            Piece::Knight => "KE",
            Piece::Silver => "GI",
            Piece::Gold => "KI",
            Piece::Bishop => "KA",
            Piece::Rook => "HI",
            Piece::King => "OU",
            Piece::ProPawn => "TO",
            Piece::ProLance => "NY",
            Piece::ProKnight => "NK",
            Piece::ProSilver => "NG",
            Piece::Horse => "UM",
            Piece::Dragon => "RY",
        }
    }

    pub fn from_csa(code: &str) -> Option<Piece> {
        Some(match code {
            "FU" => Piece::Pawn,
            "KY" => Piece::Lance,
            "KE" => Piece::Knight,
            "GI" => Piece::Silver,
            "KI" => Piece::Gold,
            "KA" => Piece::Bishop,
            "HI" => Piece::Rook,
            "OU" => Piece::King,
            "TO" => Piece::ProPawn,
            "NY" => Piece::ProLance,
            "NK" => Piece::ProKnight,
            "NG" => Piece::ProSilver,
            "UM" => Piece::Horse,
            "RY" => Piece::Dragon,
            _ => return None,
        })
    }

    /// USI letter of the unpromoted base piece.
    pub fn usi_letter(self) -> char {
        match self.unpromoted() {
            Piece::Pawn => 'P',
            Piece::Lance => 'L',
            Piece::Knight => 'N',
            Piece::Silver => 'S',
            Piece::Gold => 'G',
            Piece::Bishop => 'B',
            Piece::Rook => 'R',
            Piece::King => 'K',
            // unpromoted() only returns base pieces
            _ => 'P',
        }
    }

    pub fn from_usi_letter(letter: char) -> Option<Piece> {
        Some(match letter {
            'P' => Piece::Pawn,
            'L' => Piece::Lance,
            'N' => Piece::Knight,
            'S' => Piece::Silver,
            'G' => Piece::Gold,
            'B' => Piece::Bishop,
            'R' => Piece::Rook,
            'K' => Piece::King,
            _ => return None,
        })
    }

    pub fn is_promoted(self) -> bool {
        matches!(
            self,
            Piece::ProPawn
                | Piece::ProLance
                | Piece::ProKnight
                | Piece::ProSilver
                | Piece::Horse
                | Piece::Dragon
        )
    }

    /// Promoted form, if the piece has one.
    pub fn promoted(self) -> Option<Piece> {
        Some(match self {
            Piece::Pawn => Piece::ProPawn,
            Piece::Lance => Piece::ProLance,
            Piece::Knight => Piece::ProKnight,
            Piece::Silver => Piece::ProSilver,
            Piece::Bishop => Piece::Horse,
            Piece::Rook => Piece::Dragon,
            _ => return None,
        })
    }

    pub fn unpromoted(self) -> Piece {
        match self {
            Piece::ProPawn => Piece::Pawn,
            Piece::ProLance => Piece::Lance,
            Piece::ProKnight => Piece::Knight,
            Piece::ProSilver => Piece::Silver,
            Piece::Horse => Piece::Bishop,
            Piece::Dragon => Piece::Rook,
            other => other,
        }
    }

    pub fn kanji(self) -> &'static str {
        match self {
            Piece::Pawn => "歩",
            Piece::Lance => "香",
            Piece::Knight => "桂",
            Piece::Silver => "銀",
            Piece::Gold => "金",
            Piece::Bishop => "角",
            Piece::Rook => "飛",
            Piece::King => "玉",
            Piece::ProPawn => "と",
            Piece::ProLance => "成香",
            Piece::ProKnight => "成桂",
            Piece::ProSilver => "成銀",
            Piece::Horse => "馬",
            Piece::Dragon => "龍",
        }
    }
}

/// A move in CSA notation. `from` is `None` for drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsaMove {
    pub side: Side,
    pub from: Option<Square>,
    pub to: Square,
    /// Piece code after the move (promoted form for promoting moves).
    pub piece: Piece,
}

impl CsaMove {
    pub fn parse(text: &str) -> Result<CsaMove, NotationError> {
        let bytes = text.as_bytes();
        if bytes.len() != 7 {
            return Err(NotationError::InvalidCsa(text.to_string()));
        }
        let side = Side::from_sign(bytes[0] as char)
            .ok_or_else(|| NotationError::InvalidCsa(text.to_string()))?;

        let digit = |b: u8| -> Result<u8, NotationError> {
            if b.is_ascii_digit() {
                Ok(b - b'0')
            } else {
                Err(NotationError::InvalidCsa(text.to_string()))
            }
        };
        let (ff, fr) = (digit(bytes[1])?, digit(bytes[2])?);
        let (tf, tr) = (digit(bytes[3])?, digit(bytes[4])?);

        let to = Square::new(tf, tr).ok_or_else(|| NotationError::InvalidCsa(text.to_string()))?;
        let from = if ff == 0 && fr == 0 {
            None
        } else {
            Some(Square::new(ff, fr).ok_or_else(|| NotationError::InvalidCsa(text.to_string()))?)
        };

        let piece = Piece::from_csa(&text[5..7])
            .ok_or_else(|| NotationError::UnknownPiece(text[5..7].to_string()))?;

        // A dropped piece cannot arrive promoted.
        if from.is_none() && piece.is_promoted() {
            return Err(NotationError::InvalidCsa(text.to_string()));
        }

        Ok(CsaMove {
            side,
            from,
            to,
            piece,
        })
    }
}

impl fmt::Display for CsaMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ff, fr) = self.from.map_or((0, 0), |sq| (sq.file, sq.rank));
        write!(
            f,
            "{}{}{}{}{}{}",
            self.side.sign(),
            ff,
            fr,
            self.to.file,
            self.to.rank,
            self.piece.csa_code()
        )
    }
}

/// A move in USI notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsiMove {
    Board {
        from: Square,
        to: Square,
        promote: bool,
    },
    Drop {
        piece: Piece,
        to: Square,
    },
}

impl UsiMove {
    pub fn parse(text: &str) -> Result<UsiMove, NotationError> {
        let bytes = text.as_bytes();
        let err = || NotationError::InvalidUsi(text.to_string());

        if bytes.len() == 4 && bytes[1] == b'*' {
            let piece = Piece::from_usi_letter(bytes[0] as char).ok_or_else(err)?;
            let to = parse_usi_square(bytes[2], bytes[3]).ok_or_else(err)?;
            return Ok(UsiMove::Drop { piece, to });
        }

        if bytes.len() == 4 || (bytes.len() == 5 && bytes[4] == b'+') {
            let from = parse_usi_square(bytes[0], bytes[1]).ok_or_else(err)?;
            let to = parse_usi_square(bytes[2], bytes[3]).ok_or_else(err)?;
            return Ok(UsiMove::Board {
                from,
                to,
                promote: bytes.len() == 5,
            });
        }

        Err(err())
    }
}

fn parse_usi_square(file: u8, rank: u8) -> Option<Square> {
    if !file.is_ascii_digit() || !(b'a'..=b'i').contains(&rank) {
        return None;
    }
    Square::new(file - b'0', rank - b'a' + 1)
}

impl fmt::Display for UsiMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsiMove::Board { from, to, promote } => {
                write!(
                    f,
                    "{}{}{}{}{}",
                    from.file,
                    from.usi_rank(),
                    to.file,
                    to.usi_rank(),
                    if *promote { "+" } else { "" }
                )
            }
            UsiMove::Drop { piece, to } => {
                write!(f, "{}*{}{}", piece.usi_letter(), to.file, to.usi_rank())
            }
        }
    }
}

/// Convert a CSA move to USI.
///
/// `source_promoted` says whether the moving piece was already promoted
/// before this move; the `+` marker is only written when the move itself
/// promotes.
pub fn csa_to_usi(mv: &CsaMove, source_promoted: bool) -> UsiMove {
    match mv.from {
        None => UsiMove::Drop {
            piece: mv.piece,
            to: mv.to,
        },
        Some(from) => UsiMove::Board {
            from,
            to: mv.to,
            promote: mv.piece.is_promoted() && !source_promoted,
        },
    }
}

/// Convert a USI move to CSA. Board moves resolve the piece code through
/// `piece_at`; the side prefix comes from the caller's turn tracking.
pub fn usi_to_csa(
    mv: &UsiMove,
    side: Side,
    piece_at: impl Fn(Square) -> Option<Piece>,
) -> Result<CsaMove, NotationError> {
    match mv {
        UsiMove::Drop { piece, to } => Ok(CsaMove {
            side,
            from: None,
            to: *to,
            piece: *piece,
        }),
        UsiMove::Board { from, to, promote } => {
            let source =
                piece_at(*from).ok_or_else(|| NotationError::UnresolvedSource(mv.to_string()))?;
            let piece = if *promote {
                source
                    .promoted()
                    .ok_or_else(|| NotationError::InvalidUsi(mv.to_string()))?
            } else {
                source
            };
            Ok(CsaMove {
                side,
                from: Some(*from),
                to: *to,
                piece,
            })
        }
    }
}

const ZEN_FILE: [&str; 10] = ["", "１", "２", "３", "４", "５", "６", "７", "８", "９"];
const KANJI_RANK: [&str; 10] = ["", "一", "二", "三", "四", "五", "六", "七", "八", "九"];

/// Render a CSA move for display: `▲７六歩(77)`, `△同　銀(31)`,
/// `▲５五角打`, promotion marked with `成`.
pub fn pretty_move(
    mv: &CsaMove,
    is_promotion: bool,
    prev_to: Option<Square>,
    move_count: u32,
) -> String {
    let mark = match mv.side {
        Side::Black => "▲",
        Side::White => "△",
    };

    // Promoting moves show the pre-promotion piece name plus 成.
    let display_piece = if is_promotion {
        mv.piece.unpromoted()
    } else {
        mv.piece
    };

    let mut out = String::from(mark);
    if prev_to == Some(mv.to) && move_count > 0 {
        out.push_str("同　");
        out.push_str(display_piece.kanji());
    } else {
        out.push_str(ZEN_FILE[mv.to.file as usize]);
        out.push_str(KANJI_RANK[mv.to.rank as usize]);
        out.push_str(display_piece.kanji());
    }

    if is_promotion {
        out.push('成');
    }

    match mv.from {
        None => out.push('打'),
        Some(from) => out.push_str(&format!("({}{})", from.file, from.rank)),
    }
    out
}

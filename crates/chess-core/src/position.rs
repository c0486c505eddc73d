//! Validated board positions in FEN notation.

use crate::Square;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when validating a position string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("invalid FEN: expected 6 fields (or 4 without clocks), got {0}")]
    InvalidFieldCount(usize),

    #[error("invalid piece placement: {0}")]
    InvalidPiecePlacement(String),

    #[error("invalid side to move: expected 'w' or 'b', got '{0}'")]
    InvalidSideToMove(String),

    #[error("invalid castling rights: {0}")]
    InvalidCastlingRights(String),

    #[error("invalid en passant square: {0}")]
    InvalidEnPassantSquare(String),

    #[error("invalid halfmove clock: {0}")]
    InvalidHalfmoveClock(String),

    #[error("invalid fullmove number: {0}")]
    InvalidFullmoveNumber(String),

    #[error("expected exactly one {color} king, found {count}")]
    KingCount { color: &'static str, count: usize },
}

/// The side whose turn it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    White,
    Black,
}

/// A syntactically validated board position.
///
/// Validation is purely structural: field count, piece characters, rank
/// widths, castling/en passant notation, clocks, and one king per side.
/// Move legality is never checked. Once constructed a position is immutable
/// and always renders as a canonical six-field FEN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    placement: String,
    side: Side,
    castling: String,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl Position {
    /// The standard starting position.
    pub const STARTPOS: &'static str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// Parses and validates a position string.
    ///
    /// Accepts the full six-field FEN, or the first four fields alone (as
    /// produced by board-recognition tools that cannot know the clocks), in
    /// which case the clocks default to `0 1`.
    pub fn parse(fen: &str) -> Result<Self, PositionError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 && fields.len() != 4 {
            return Err(PositionError::InvalidFieldCount(fields.len()));
        }

        let placement = fields[0];
        Self::validate_placement(placement)?;

        let side = match fields[1] {
            "w" => Side::White,
            "b" => Side::Black,
            other => return Err(PositionError::InvalidSideToMove(other.to_string())),
        };

        let castling = fields[2];
        Self::validate_castling(castling)?;

        let en_passant = Self::parse_en_passant(fields[3])?;

        let (halfmove_clock, fullmove_number) = if fields.len() == 6 {
            let halfmove = fields[4]
                .parse::<u32>()
                .map_err(|_| PositionError::InvalidHalfmoveClock(fields[4].to_string()))?;
            let fullmove = fields[5]
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| PositionError::InvalidFullmoveNumber(fields[5].to_string()))?;
            (halfmove, fullmove)
        } else {
            (0, 1)
        };

        Ok(Position {
            placement: placement.to_string(),
            side,
            castling: castling.to_string(),
            en_passant,
            halfmove_clock,
            fullmove_number,
        })
    }

    /// The standard starting position.
    pub fn startpos() -> Self {
        Self::parse(Self::STARTPOS).expect("STARTPOS is valid")
    }

    /// Piece placement field (e.g., "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR").
    pub fn placement(&self) -> &str {
        &self.placement
    }

    /// Side to move.
    pub fn side_to_move(&self) -> Side {
        self.side
    }

    /// Castling availability field ("KQkq", "-", ...).
    pub fn castling(&self) -> &str {
        &self.castling
    }

    /// En passant target square, if any.
    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    /// Halfmove clock (for the 50-move rule).
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    /// Fullmove number, starting at 1.
    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    /// Canonical six-field FEN.
    pub fn to_fen(&self) -> String {
        self.to_string()
    }

    fn validate_placement(placement: &str) -> Result<(), PositionError> {
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(PositionError::InvalidPiecePlacement(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }

        let mut white_kings = 0;
        let mut black_kings = 0;

        for (i, rank) in ranks.iter().enumerate() {
            let mut squares = 0;
            for c in rank.chars() {
                match c {
                    '1'..='8' => squares += c as u32 - '0' as u32,
                    'K' => {
                        white_kings += 1;
                        squares += 1;
                    }
                    'k' => {
                        black_kings += 1;
                        squares += 1;
                    }
                    'p' | 'n' | 'b' | 'r' | 'q' | 'P' | 'N' | 'B' | 'R' | 'Q' => squares += 1,
                    _ => {
                        return Err(PositionError::InvalidPiecePlacement(format!(
                            "invalid character '{}' in rank {}",
                            c,
                            8 - i
                        )))
                    }
                }
            }
            if squares != 8 {
                return Err(PositionError::InvalidPiecePlacement(format!(
                    "rank {} has {} squares, expected 8",
                    8 - i,
                    squares
                )));
            }
        }

        if white_kings != 1 {
            return Err(PositionError::KingCount {
                color: "white",
                count: white_kings,
            });
        }
        if black_kings != 1 {
            return Err(PositionError::KingCount {
                color: "black",
                count: black_kings,
            });
        }

        Ok(())
    }

    fn validate_castling(castling: &str) -> Result<(), PositionError> {
        if castling == "-" {
            return Ok(());
        }
        if castling.is_empty() || castling.len() > 4 {
            return Err(PositionError::InvalidCastlingRights(castling.to_string()));
        }

        let mut seen = String::with_capacity(4);
        for c in castling.chars() {
            if !"KQkq".contains(c) {
                return Err(PositionError::InvalidCastlingRights(format!(
                    "invalid character '{}'",
                    c
                )));
            }
            if seen.contains(c) {
                return Err(PositionError::InvalidCastlingRights(format!(
                    "duplicate right '{}'",
                    c
                )));
            }
            seen.push(c);
        }

        Ok(())
    }

    fn parse_en_passant(ep: &str) -> Result<Option<Square>, PositionError> {
        if ep == "-" {
            return Ok(None);
        }

        match Square::from_algebraic(ep) {
            Some(square) if square.is_en_passant_rank() => Ok(Some(square)),
            _ => Err(PositionError::InvalidEnPassantSquare(ep.to_string())),
        }
    }
}

impl FromStr for Position {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::White => 'w',
            Side::Black => 'b',
        };
        write!(f, "{} {} {} ", self.placement, side, self.castling)?;
        match self.en_passant {
            Some(square) => write!(f, "{}", square)?,
            None => f.write_str("-")?,
        }
        write!(f, " {} {}", self.halfmove_clock, self.fullmove_number)
    }
}

//! Board square notation.

use std::fmt;

/// A square on the chess board, addressed by file (a-h) and rank (1-8).
///
/// Only the notation matters here: squares are used to validate move text and
/// en passant targets, never to hold board state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Parses a square from algebraic notation (e.g., "e4").
    ///
    /// Only lowercase files are accepted, matching the UCI wire format.
    pub const fn from_algebraic(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        Self::from_bytes(bytes[0], bytes[1])
    }

    /// Builds a square from a file byte (`b'a'..=b'h'`) and a rank byte (`b'1'..=b'8'`).
    pub const fn from_bytes(file: u8, rank: u8) -> Option<Self> {
        if file < b'a' || file > b'h' || rank < b'1' || rank > b'8' {
            return None;
        }
        Some(Square {
            file: file - b'a',
            rank: rank - b'1',
        })
    }

    /// Returns the file character ('a'-'h').
    #[inline]
    pub const fn file_char(self) -> char {
        (b'a' + self.file) as char
    }

    /// Returns the rank number (1-8).
    #[inline]
    pub const fn rank_number(self) -> u8 {
        self.rank + 1
    }

    /// Returns the index (0-63), a1 = 0 and h8 = 63.
    #[inline]
    pub const fn index(self) -> u8 {
        self.rank * 8 + self.file
    }

    /// True for squares a pawn can be captured on en passant (ranks 3 and 6).
    #[inline]
    pub const fn is_en_passant_rank(self) -> bool {
        self.rank == 2 || self.rank == 5
    }
}

impl fmt::Debug for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Square({})", self)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file_char(), self.rank_number())
    }
}

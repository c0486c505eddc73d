//! Moves in UCI long algebraic notation.

use crate::Square;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned for text that is not a move in UCI notation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid UCI move: '{0}'")]
pub struct MoveError(pub String);

/// Piece a pawn promotes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Promotion {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl Promotion {
    /// Parses the lowercase promotion suffix used by UCI.
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'q' => Some(Promotion::Queen),
            'r' => Some(Promotion::Rook),
            'b' => Some(Promotion::Bishop),
            'n' => Some(Promotion::Knight),
            _ => None,
        }
    }

    /// Returns the UCI suffix character.
    pub const fn to_char(self) -> char {
        match self {
            Promotion::Queen => 'q',
            Promotion::Rook => 'r',
            Promotion::Bishop => 'b',
            Promotion::Knight => 'n',
        }
    }
}

/// A move as an engine reports it, e.g. `e2e4` or `e7e8q`.
///
/// This is notation only (`^[a-h][1-8][a-h][1-8][qrbn]?$`); whether the move
/// is legal in any position is not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UciMove {
    from: Square,
    to: Square,
    promotion: Option<Promotion>,
}

impl UciMove {
    /// Parses a move in UCI notation.
    pub fn parse(s: &str) -> Result<Self, MoveError> {
        let err = || MoveError(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 4 && bytes.len() != 5 {
            return Err(err());
        }

        let from = Square::from_bytes(bytes[0], bytes[1]).ok_or_else(err)?;
        let to = Square::from_bytes(bytes[2], bytes[3]).ok_or_else(err)?;
        let promotion = match bytes.get(4) {
            Some(&b) => Some(Promotion::from_char(b as char).ok_or_else(err)?),
            None => None,
        };

        Ok(UciMove {
            from,
            to,
            promotion,
        })
    }

    /// True for the placeholders engines print when there is no move to make.
    pub fn is_null(s: &str) -> bool {
        matches!(s, "0000" | "(none)")
    }

    pub fn from(&self) -> Square {
        self.from
    }

    pub fn to(&self) -> Square {
        self.to
    }

    pub fn promotion(&self) -> Option<Promotion> {
        self.promotion
    }
}

impl FromStr for UciMove {
    type Err = MoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(p) = self.promotion {
            write!(f, "{}", p.to_char())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_simple_move() {
        let mv = UciMove::parse("e2e4").unwrap();
        assert_eq!(mv.from().to_string(), "e2");
        assert_eq!(mv.to().to_string(), "e4");
        assert_eq!(mv.promotion(), None);
        assert_eq!(mv.to_string(), "e2e4");
    }

    #[test]
    fn parse_promotion() {
        let mv: UciMove = "a7a8n".parse().unwrap();
        assert_eq!(mv.promotion(), Some(Promotion::Knight));
        assert_eq!(mv.to_string(), "a7a8n");
    }

    #[test]
    fn rejects_bad_notation() {
        for text in ["", "e2", "e2e", "e2e9", "i2e4", "e2e4k", "e2e4Q", "E2E4", "e2e4qq", "(none)", "0000"] {
            assert_eq!(
                UciMove::parse(text),
                Err(MoveError(text.to_string())),
                "'{}' should be rejected",
                text
            );
        }
    }

    #[test]
    fn null_move_placeholders() {
        assert!(UciMove::is_null("(none)"));
        assert!(UciMove::is_null("0000"));
        assert!(!UciMove::is_null("e2e4"));
    }

    proptest! {
        #[test]
        fn pattern_matches_parse(s in "[a-h][1-8][a-h][1-8][qrbn]?") {
            let mv = UciMove::parse(&s).unwrap();
            prop_assert_eq!(mv.to_string(), s);
        }

        #[test]
        fn off_pattern_text_is_rejected(s in "[i-z0A-Z]{4,5}") {
            prop_assert!(UciMove::parse(&s).is_err());
        }
    }
}

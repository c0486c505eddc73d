//! UCI (Universal Chess Interface) protocol library.
//!
//! This crate provides types, formatting, and parsing for both directions of
//! the line-oriented UCI protocol.
//!
//! # GUI to engine
//!
//! - `uci` - Initialize engine, get id and options
//! - `isready` / `readyok` - Synchronization
//! - `setoption name <name> [value <value>]` - Configure the engine
//! - `ucinewgame` - Next position is unrelated to the previous one
//! - `position fen <fen> [moves <move>...]` - Set position
//! - `go [depth <d>] [nodes <n>] [movetime <ms>]` - Start search
//! - `stop` - Stop search
//! - `quit` - Exit engine
//!
//! # Engine to GUI
//!
//! - `id name <name>` / `id author <author>`
//! - `option name ...`
//! - `uciok`, `readyok`
//! - `info ...` - Search progress
//! - `bestmove <move> [ponder <move>]`

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{EngineInfo, Score};

use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Unrecognized engine output: {0}")]
    Unrecognized(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id { name: Option<String>, author: Option<String> },
    /// Option declaration, kept verbatim (everything after `option `).
    Option(String),
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found. The move is kept as raw text; engines print
    /// placeholders such as `(none)` when there is nothing to play.
    BestMove { mv: String, ponder: Option<String> },
}

impl EngineMessage {
    /// Parse one line of engine output.
    ///
    /// Lines that do not start with a known keyword (banners, debug chatter)
    /// yield [`UciError::Unrecognized`]; a known keyword with missing
    /// arguments yields [`UciError::ParseError`].
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let line = line.trim();
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (line, ""),
        };

        match keyword {
            "uciok" => Ok(EngineMessage::UciOk),
            "readyok" => Ok(EngineMessage::ReadyOk),
            "id" => {
                if let Some(name) = rest.strip_prefix("name ") {
                    Ok(EngineMessage::Id {
                        name: Some(name.trim().to_string()),
                        author: None,
                    })
                } else if let Some(author) = rest.strip_prefix("author ") {
                    Ok(EngineMessage::Id {
                        name: None,
                        author: Some(author.trim().to_string()),
                    })
                } else {
                    Err(UciError::ParseError(format!("Malformed id line: '{}'", line)))
                }
            }
            "option" => Ok(EngineMessage::Option(rest.to_string())),
            "info" => EngineInfo::parse(line)
                .map(EngineMessage::Info)
                .ok_or_else(|| UciError::ParseError(format!("Malformed info line: '{}'", line))),
            "bestmove" => {
                let mut parts = rest.split_whitespace();
                let mv = parts
                    .next()
                    .ok_or_else(|| UciError::ParseError("bestmove without a move".to_string()))?;
                let ponder = match (parts.next(), parts.next()) {
                    (Some("ponder"), Some(p)) => Some(p.to_string()),
                    _ => None,
                };
                Ok(EngineMessage::BestMove {
                    mv: mv.to_string(),
                    ponder,
                })
            }
            _ => Err(UciError::Unrecognized(line.to_string())),
        }
    }

    /// Format message for output.
    pub fn to_uci(&self) -> String {
        match self {
            EngineMessage::Id { name, author } => {
                let mut parts = Vec::new();
                if let Some(n) = name {
                    parts.push(format!("id name {}", n));
                }
                if let Some(a) = author {
                    parts.push(format!("id author {}", a));
                }
                parts.join("\n")
            }
            EngineMessage::Option(decl) => format!("option {}", decl),
            EngineMessage::UciOk => "uciok".to_string(),
            EngineMessage::ReadyOk => "readyok".to_string(),
            EngineMessage::Info(info) => info.to_uci(),
            EngineMessage::BestMove { mv, ponder } => match ponder {
                Some(p) => format!("bestmove {} ponder {}", mv, p),
                None => format!("bestmove {}", mv),
            },
        }
    }
}

/// Read and parse the next command from a GUI.
///
/// Returns `Ok(None)` at end of input.
pub fn read_command<R: BufRead>(reader: &mut R) -> Result<Option<GuiCommand>, UciError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    GuiCommand::parse(&line).map(Some)
}

/// Writer side of a UCI engine, for writing engine binaries.
pub struct EngineOutput<W: Write> {
    writer: W,
}

impl<W: Write> EngineOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Send a message to the GUI.
    pub fn send(&mut self, msg: &EngineMessage) -> Result<(), UciError> {
        writeln!(self.writer, "{}", msg.to_uci())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send engine identification.
    pub fn send_id(&mut self, name: &str, author: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::Id {
            name: Some(name.to_string()),
            author: Some(author.to_string()),
        })
    }

    /// Send uciok.
    pub fn send_uciok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::UciOk)
    }

    /// Send readyok.
    pub fn send_readyok(&mut self) -> Result<(), UciError> {
        self.send(&EngineMessage::ReadyOk)
    }

    /// Send best move.
    pub fn send_bestmove(&mut self, mv: &str) -> Result<(), UciError> {
        self.send(&EngineMessage::BestMove {
            mv: mv.to_string(),
            ponder: None,
        })
    }

    /// Send search info.
    pub fn send_info(&mut self, info: EngineInfo) -> Result<(), UciError> {
        self.send(&EngineMessage::Info(info))
    }

    /// Send a raw line, bypassing message formatting.
    pub fn send_raw(&mut self, line: &str) -> Result<(), UciError> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Engine output on stdout.
pub fn stdout_output() -> EngineOutput<std::io::Stdout> {
    EngineOutput::new(std::io::stdout())
}

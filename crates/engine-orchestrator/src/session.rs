//! A single engine process and the conversation with it.

use crate::config::EngineConfig;
use crate::error::SessionError;
use crate::request::{AnalysisRequest, RequestId};
use crate::spawner::{EngineHandle, EngineSpawner};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use uci::{EngineMessage, GoOptions, GuiCommand, UciError};

/// How long `quit` may take to write before the process is killed anyway.
const QUIT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Ready,
    Busy,
    Crashed,
}

/// One running engine.
///
/// Owns both pipes: every line written to the engine goes through this type,
/// and [`EngineSession::next_line`] is the only reader.
pub struct EngineSession {
    id: usize,
    state: SessionState,
    stdin: Box<dyn AsyncWrite + Send + Unpin>,
    lines: Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>,
    handle: Box<dyn EngineHandle>,
    engine_name: Option<String>,
    current: Option<RequestId>,
}

impl EngineSession {
    /// Spawns an engine and runs the UCI handshake.
    ///
    /// Sends `uci` and waits for `uciok`, applies the configured options,
    /// then confirms with `isready`/`readyok`. The whole exchange must finish
    /// within the handshake timeout; on failure the process is killed.
    pub(crate) async fn start(
        id: usize,
        spawner: &dyn EngineSpawner,
        config: &EngineConfig,
    ) -> Result<Self, SessionError> {
        let io = spawner.spawn().map_err(SessionError::Spawn)?;
        let mut session = Self {
            id,
            state: SessionState::Starting,
            stdin: io.stdin,
            lines: BufReader::new(io.stdout).lines(),
            handle: io.handle,
            engine_name: None,
            current: None,
        };

        let limit = config.handshake_timeout();
        let outcome = match tokio::time::timeout(limit, session.handshake(config)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::HandshakeTimeout(limit)),
        };

        match outcome {
            Ok(()) => {
                session.state = SessionState::Ready;
                tracing::info!(
                    session = id,
                    pid = ?session.handle.id(),
                    engine = session.engine_name.as_deref().unwrap_or("unknown"),
                    "Engine ready"
                );
                Ok(session)
            }
            Err(e) => {
                session.state = SessionState::Crashed;
                session.terminate().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, config: &EngineConfig) -> Result<(), SessionError> {
        self.send(&GuiCommand::Uci).await?;
        loop {
            match self.read_message().await? {
                EngineMessage::Id { name: Some(name), .. } => self.engine_name = Some(name),
                EngineMessage::UciOk => break,
                _ => {}
            }
        }

        for (name, value) in &config.options {
            self.send(&GuiCommand::SetOption {
                name: name.clone(),
                value: Some(value.clone()),
            })
            .await?;
        }

        self.send(&GuiCommand::IsReady).await?;
        loop {
            if let EngineMessage::ReadyOk = self.read_message().await? {
                return Ok(());
            }
        }
    }

    /// Next recognised message, skipping banners and unknown chatter.
    async fn read_message(&mut self) -> Result<EngineMessage, SessionError> {
        loop {
            let line = self.lines.next_line().await?.ok_or(SessionError::Closed)?;
            match EngineMessage::parse(&line) {
                Ok(msg) => return Ok(msg),
                Err(UciError::Unrecognized(_)) => {
                    tracing::debug!(session = self.id, line = %line, "Ignoring engine output");
                }
                Err(e) => {
                    tracing::warn!(session = self.id, error = %e, "Malformed engine output");
                }
            }
        }
    }

    async fn send(&mut self, command: &GuiCommand) -> Result<(), SessionError> {
        let line = command.to_uci();
        tracing::trace!(session = self.id, command = %line, "-> engine");
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Starts a search for `request`.
    pub(crate) async fn submit(
        &mut self,
        request: &AnalysisRequest,
        new_game: bool,
    ) -> Result<(), SessionError> {
        if new_game {
            self.send(&GuiCommand::UciNewGame).await?;
        }
        self.send(&GuiCommand::Position {
            fen: Some(request.position().to_string()),
            moves: Vec::new(),
        })
        .await?;
        self.send(&GuiCommand::Go(GoOptions::depth(request.depth().get())))
            .await?;
        self.state = SessionState::Busy;
        self.current = Some(request.id());
        Ok(())
    }

    /// Next line of engine output.
    ///
    /// Cancel safe. Returns `None` only when the engine's output has ended,
    /// at which point the session is `Crashed`.
    pub(crate) async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(Some(line)) => {
                tracing::trace!(session = self.id, line = %line, "<- engine");
                Some(line)
            }
            Ok(None) => {
                self.state = SessionState::Crashed;
                None
            }
            Err(e) => {
                tracing::warn!(session = self.id, error = %e, "Engine output failed");
                self.state = SessionState::Crashed;
                None
            }
        }
    }

    /// Marks the active request as resolved.
    pub(crate) fn clear_request(&mut self) {
        self.current = None;
        if self.state == SessionState::Busy {
            self.state = SessionState::Ready;
        }
    }

    /// Asks the engine to end the current search.
    pub(crate) async fn stop(&mut self) -> Result<(), SessionError> {
        self.send(&GuiCommand::Stop).await
    }

    /// Sends `quit` if the engine is still listening, then kills it.
    pub(crate) async fn terminate(mut self) {
        if self.state != SessionState::Crashed {
            let _ = tokio::time::timeout(QUIT_WRITE_TIMEOUT, self.send(&GuiCommand::Quit)).await;
        }
        if let Err(e) = self.handle.start_kill() {
            tracing::debug!(session = self.id, error = %e, "Engine already gone");
        }
        tracing::debug!(session = self.id, "Engine terminated");
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.engine_name.as_deref()
    }

    pub fn current_request(&self) -> Option<RequestId> {
        self.current
    }
}

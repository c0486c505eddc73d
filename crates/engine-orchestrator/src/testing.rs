//! A scripted in-process engine for tests.
//!
//! [`FakeEngine`] implements [`EngineSpawner`] over in-memory pipes and
//! speaks enough UCI to exercise the whole orchestration path without an
//! external binary. Every command it receives is recorded.

use crate::spawner::{EngineHandle, EngineIo, EngineSpawner};
use chess_core::Position;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::oneshot;
use tokio::time::Instant;
use uci::GuiCommand;

type MoveFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
struct Script {
    name: String,
    think_time: Duration,
    best_move: MoveFn,
    answers_handshake: bool,
    ignores_stop: bool,
    chatty: bool,
}

/// Scripted UCI engine. Clones share the command log and counters.
#[derive(Clone)]
pub struct FakeEngine {
    script: Script,
    log: Arc<Mutex<Vec<String>>>,
    spawns: Arc<AtomicUsize>,
    crashes_left: Arc<AtomicUsize>,
    failing_spawn: Arc<AtomicBool>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    /// An engine that answers every search instantly with `e2e4`.
    pub fn new() -> Self {
        Self {
            script: Script {
                name: "FakeEngine".to_string(),
                think_time: Duration::ZERO,
                best_move: Arc::new(|_| "e2e4".to_string()),
                answers_handshake: true,
                ignores_stop: false,
                chatty: false,
            },
            log: Arc::new(Mutex::new(Vec::new())),
            spawns: Arc::new(AtomicUsize::new(0)),
            crashes_left: Arc::new(AtomicUsize::new(0)),
            failing_spawn: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Name reported in `id name`.
    pub fn named(mut self, name: &str) -> Self {
        self.script.name = name.to_string();
        self
    }

    /// How long each search runs before `bestmove` unless stopped.
    pub fn think_time(mut self, think_time: Duration) -> Self {
        self.script.think_time = think_time;
        self
    }

    /// Always answer with `mv` (which may be `(none)` or garbage).
    pub fn best_move(mut self, mv: &str) -> Self {
        let mv = mv.to_string();
        self.script.best_move = Arc::new(move |_| mv.clone());
        self
    }

    /// Answer with a move computed from the position's FEN.
    pub fn respond_with(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.script.best_move = Arc::new(f);
        self
    }

    /// The next `n` searches make the engine exit instead of answering.
    pub fn crash_on_go(self, n: usize) -> Self {
        self.crashes_left.store(n, Ordering::SeqCst);
        self
    }

    /// Keep searching after `stop` until the think time runs out.
    pub fn ignoring_stop(mut self) -> Self {
        self.script.ignores_stop = true;
        self
    }

    /// Never answer `uci` or `isready`.
    pub fn silent(mut self) -> Self {
        self.script.answers_handshake = false;
        self
    }

    /// Interleave banners and unknown lines with real output.
    pub fn chatty(mut self) -> Self {
        self.script.chatty = true;
        self
    }

    /// Every spawn attempt fails.
    pub fn failing_spawn(self) -> Self {
        self.set_failing_spawn(true);
        self
    }

    pub fn set_failing_spawn(&self, failing: bool) {
        self.failing_spawn.store(failing, Ordering::SeqCst);
    }

    /// Every command line received so far, across all spawned instances.
    pub fn commands(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful spawns.
    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Waits until some received command satisfies `pred`.
    pub async fn wait_for_command(&self, within: Duration, pred: impl Fn(&str) -> bool) -> bool {
        let deadline = Instant::now() + within;
        loop {
            if self.commands().iter().any(|c| pred(c)) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl EngineSpawner for FakeEngine {
    fn spawn(&self) -> io::Result<EngineIo> {
        if self.failing_spawn.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "fake engine refuses to start",
            ));
        }
        self.spawns.fetch_add(1, Ordering::SeqCst);

        let (host_stdin, engine_stdin) = tokio::io::duplex(64 * 1024);
        let (engine_stdout, host_stdout) = tokio::io::duplex(64 * 1024);
        let (kill_tx, kill_rx) = oneshot::channel();

        let instance = Instance {
            script: self.script.clone(),
            log: self.log.clone(),
            crashes_left: self.crashes_left.clone(),
            output: engine_stdout,
        };
        tokio::spawn(instance.run(engine_stdin, kill_rx));

        Ok(EngineIo {
            stdin: Box::new(host_stdin),
            stdout: Box::new(host_stdout),
            handle: Box::new(FakeHandle {
                kill: Some(kill_tx),
            }),
        })
    }

    fn describe(&self) -> String {
        format!("fake:{}", self.script.name)
    }
}

struct FakeHandle {
    kill: Option<oneshot::Sender<()>>,
}

impl EngineHandle for FakeHandle {
    fn id(&self) -> Option<u32> {
        None
    }

    fn start_kill(&mut self) -> io::Result<()> {
        match self.kill.take() {
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::Other, "already killed")),
        }
    }
}

struct Search {
    done_at: Instant,
    best_move: String,
    depth: u32,
}

enum Event {
    Killed,
    SearchDone,
    Line(Option<String>),
}

/// One running fake engine process.
struct Instance {
    script: Script,
    log: Arc<Mutex<Vec<String>>>,
    crashes_left: Arc<AtomicUsize>,
    output: DuplexStream,
}

impl Instance {
    async fn run(mut self, input: DuplexStream, mut kill: oneshot::Receiver<()>) {
        let mut lines = BufReader::new(input).lines();
        let mut fen = Position::STARTPOS.to_string();
        let mut search: Option<Search> = None;

        loop {
            let done_at = search.as_ref().map_or_else(Instant::now, |s| s.done_at);
            let event = tokio::select! {
                biased;
                _ = &mut kill => Event::Killed,
                _ = tokio::time::sleep_until(done_at), if search.is_some() => Event::SearchDone,
                line = lines.next_line() => Event::Line(line.ok().flatten()),
            };

            let result = match event {
                Event::Killed | Event::Line(None) => return,
                Event::SearchDone => match search.take() {
                    Some(s) => self.finish_search(s).await,
                    None => Ok(()),
                },
                Event::Line(Some(line)) => {
                    let line = line.trim().to_string();
                    self.log
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(line.clone());
                    match GuiCommand::parse(&line) {
                        Ok(GuiCommand::Quit) => return,
                        Ok(GuiCommand::Go(opts)) => {
                            if self.take_crash() {
                                return;
                            }
                            search = Some(Search {
                                done_at: Instant::now() + self.script.think_time,
                                best_move: (self.script.best_move)(&fen),
                                depth: opts.depth.unwrap_or(1),
                            });
                            if self.script.chatty {
                                self.emit("info string thinking hard").await
                            } else {
                                Ok(())
                            }
                        }
                        Ok(GuiCommand::Stop) if !self.script.ignores_stop => match search.take() {
                            Some(s) => self.finish_search(s).await,
                            None => Ok(()),
                        },
                        Ok(GuiCommand::Position { fen: Some(f), .. }) => {
                            fen = f;
                            Ok(())
                        }
                        Ok(GuiCommand::Position { fen: None, .. }) => {
                            fen = Position::STARTPOS.to_string();
                            Ok(())
                        }
                        Ok(cmd) => self.answer(&cmd).await,
                        Err(_) => Ok(()),
                    }
                }
            };

            if result.is_err() {
                return;
            }
        }
    }

    fn take_crash(&self) -> bool {
        self.crashes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn answer(&mut self, cmd: &GuiCommand) -> io::Result<()> {
        if !self.script.answers_handshake {
            return Ok(());
        }
        match cmd {
            GuiCommand::Uci => {
                if self.script.chatty {
                    self.emit(&format!("{} by nobody in particular", self.script.name))
                        .await?;
                }
                self.emit(&format!("id name {}", self.script.name)).await?;
                self.emit("id author engine-orchestrator tests").await?;
                self.emit("option name Threads type spin default 1 min 1 max 8")
                    .await?;
                self.emit("uciok").await
            }
            GuiCommand::IsReady => self.emit("readyok").await,
            _ => Ok(()),
        }
    }

    async fn finish_search(&mut self, search: Search) -> io::Result<()> {
        if self.script.chatty {
            self.emit("some debugging output nobody asked for").await?;
        }
        self.emit(&format!(
            "info depth {} seldepth {} score cp 17 nodes 1024 pv {}",
            search.depth,
            search.depth + 2,
            search.best_move
        ))
        .await?;
        self.emit(&format!("bestmove {}", search.best_move)).await
    }

    async fn emit(&mut self, line: &str) -> io::Result<()> {
        self.output.write_all(line.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await
    }
}

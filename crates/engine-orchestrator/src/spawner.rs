//! Starting engine processes.
//!
//! Sessions never spawn processes themselves; they ask an [`EngineSpawner`]
//! for a pair of pipes and a kill handle. Production uses [`ProcessSpawner`],
//! tests substitute an in-process engine speaking the same protocol.

use crate::config::EngineConfig;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

/// Control over a running engine.
pub trait EngineHandle: Send {
    /// OS process id, if there is one.
    fn id(&self) -> Option<u32>;
    /// Ask the engine to die without waiting for it.
    fn start_kill(&mut self) -> io::Result<()>;
}

/// The pipes and handle of a freshly started engine.
pub struct EngineIo {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub handle: Box<dyn EngineHandle>,
}

/// Something that can start an engine speaking UCI on the returned pipes.
pub trait EngineSpawner: Send + Sync + 'static {
    fn spawn(&self) -> io::Result<EngineIo>;

    /// Human readable description for logs.
    fn describe(&self) -> String;
}

/// Spawns the engine as a child process.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.path.clone(), config.args.clone())
    }
}

impl EngineSpawner for ProcessSpawner {
    fn spawn(&self) -> io::Result<EngineIo> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdout unavailable"))?;

        Ok(EngineIo {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            handle: Box::new(ChildHandle(child)),
        })
    }

    fn describe(&self) -> String {
        self.program.display().to_string()
    }
}

struct ChildHandle(Child);

impl EngineHandle for ChildHandle {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }
}

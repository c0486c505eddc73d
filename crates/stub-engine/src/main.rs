//! Stub engine - a UCI engine that plays a fixed move.
//!
//! Speaks just enough UCI for the orchestrator and can be told to think
//! slowly, ignore `stop` or crash, so the subprocess path can be tested
//! without a real engine installed.

use clap::Parser;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use uci::{stdout_output, EngineInfo, EngineOutput, GuiCommand, Score, UciError};

#[derive(Parser)]
#[command(name = "stub-engine")]
#[command(about = "Scriptable UCI engine for tests")]
struct Args {
    /// Move returned by every search
    #[arg(long = "move", default_value = "e2e4")]
    best_move: String,

    /// How long each search takes unless stopped, in milliseconds
    #[arg(long, default_value = "0")]
    think_ms: u64,

    /// Exit on the Nth `go` instead of answering it
    #[arg(long)]
    crash_after: Option<u32>,

    /// Keep searching after `stop`
    #[arg(long)]
    ignore_stop: bool,

    /// Name reported in `id name`
    #[arg(long, default_value = "StubEngine")]
    name: String,
}

struct Search {
    done_at: Instant,
    depth: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut out = stdout_output();
    let commands = spawn_reader();

    let mut search: Option<Search> = None;
    let mut searches = 0u32;

    loop {
        let next = match &search {
            Some(s) => commands.recv_timeout(s.done_at.saturating_duration_since(Instant::now())),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let cmd = match next {
            Ok(cmd) => cmd,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(s) = search.take() {
                    finish(&mut out, &args, s)?;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };

        match cmd {
            GuiCommand::Uci => {
                out.send_id(&args.name, "bestmove-server tests")?;
                out.send_raw("option name Hash type spin default 16 min 1 max 1024")?;
                out.send_uciok()?;
            }
            GuiCommand::IsReady => out.send_readyok()?,
            GuiCommand::Go(opts) => {
                searches += 1;
                if args.crash_after == Some(searches) {
                    eprintln!("stub-engine: crashing on search {}", searches);
                    std::process::exit(3);
                }
                search = Some(Search {
                    done_at: Instant::now() + Duration::from_millis(args.think_ms),
                    depth: opts.depth.unwrap_or(1),
                });
            }
            GuiCommand::Stop if !args.ignore_stop => {
                if let Some(s) = search.take() {
                    finish(&mut out, &args, s)?;
                }
            }
            GuiCommand::Quit => return Ok(()),
            // Position, options and new games don't change a fixed answer.
            _ => {}
        }
    }
}

/// Reads commands on a separate thread so searches can time out while
/// stdin is idle.
fn spawn_reader() -> mpsc::Receiver<GuiCommand> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        loop {
            match uci::read_command(&mut input) {
                Ok(Some(cmd)) => {
                    if tx.send(cmd).is_err() {
                        return;
                    }
                }
                Ok(None) | Err(UciError::IoError(_)) => return,
                Err(e) => eprintln!("stub-engine: {}", e),
            }
        }
    });
    rx
}

fn finish<W: io::Write>(out: &mut EngineOutput<W>, args: &Args, search: Search) -> anyhow::Result<()> {
    out.send_info(EngineInfo {
        depth: Some(search.depth),
        score: Some(Score::Cp(23)),
        nodes: Some(4096),
        pv: vec![args.best_move.clone()],
        ..EngineInfo::new()
    })?;
    out.send_bestmove(&args.best_move)?;
    Ok(())
}

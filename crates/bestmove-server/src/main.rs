//! Best-move server.
//!
//! Keeps a pool of UCI engines running and answers `POST /bestmove` with
//! the engine's best move for a position.

use anyhow::Context;
use bestmove_server::config::ServerConfig;
use bestmove_server::{app, AppState};
use clap::Parser;
use engine_orchestrator::{AnalysisService, ProcessSpawner};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Best-move server - answers best-move requests from a UCI engine pool.
#[derive(Parser)]
#[command(name = "bestmove-server")]
#[command(about = "Answers best-move requests from a pool of UCI engines")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "BESTMOVE_CONFIG", default_value_os_t = ServerConfig::config_path())]
    config: PathBuf,

    /// Address to listen on (overrides the config file)
    #[arg(long, env = "BESTMOVE_BIND")]
    bind: Option<SocketAddr>,

    /// Engine executable (overrides the config file)
    #[arg(long, env = "BESTMOVE_ENGINE")]
    engine: Option<PathBuf>,

    /// Number of engine processes (overrides the config file)
    #[arg(long)]
    pool_size: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(engine) = args.engine {
        config.engine.path = engine;
    }
    if let Some(pool_size) = args.pool_size {
        config.engine.pool_size = pool_size;
    }

    let spawner = Arc::new(ProcessSpawner::from_config(&config.engine));
    let service = AnalysisService::start(config.engine.clone(), spawner)
        .context("invalid engine configuration")?;
    let state = AppState {
        service: service.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!("Server running on http://{}", config.bind);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.supervisor().shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

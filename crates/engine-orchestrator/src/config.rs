//! Engine pool configuration.
//!
//! Every field has a serde default so a config file only needs to name what
//! it changes. Durations are stored as milliseconds to keep the TOML flat.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A configuration value that cannot work at runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("pool_size must be at least 1")]
    EmptyPool,
    #[error("queue_capacity must be at least 1")]
    EmptyQueue,
    #[error("depth range {min}..={max} is empty or starts below 1")]
    DepthRange { min: u32, max: u32 },
    #[error("default_depth {default} is outside {min}..={max}")]
    DefaultDepth { default: u32, min: u32, max: u32 },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("max_analysis_time_ms {0} exceeds the limit of 3600000")]
    AnalysisTimeTooLong(u64),
}

/// Longest search any request may ask for: one hour.
pub const MAX_ANALYSIS_TIME_MS: u64 = 3_600_000;

/// Settings for the engine processes and the requests they serve.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Engine executable. Defaults to "stockfish" (assumes it's in PATH).
    #[serde(default = "default_engine_path")]
    pub path: PathBuf,
    /// Extra command line arguments for the engine.
    #[serde(default)]
    pub args: Vec<String>,
    /// Number of engine processes kept running.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Requests each session may hold waiting behind its active one.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_depth")]
    pub default_depth: u32,
    #[serde(default = "default_min_depth")]
    pub min_depth: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Upper bound on any caller supplied timeout.
    #[serde(default = "default_max_analysis_time_ms")]
    pub max_analysis_time_ms: u64,
    /// How long a stopped search may take to report its move.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Send `ucinewgame` before every position.
    #[serde(default = "default_new_game_per_request")]
    pub new_game_per_request: bool,
    /// UCI options applied with `setoption` after the handshake.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub restart: RestartPolicy,
}

fn default_engine_path() -> PathBuf {
    PathBuf::from("stockfish")
}

fn default_pool_size() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    50
}

fn default_depth() -> u32 {
    15
}

fn default_min_depth() -> u32 {
    1
}

fn default_max_depth() -> u32 {
    30
}

fn default_max_analysis_time_ms() -> u64 {
    10_000
}

fn default_stop_grace_ms() -> u64 {
    1_000
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}

fn default_new_game_per_request() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            args: Vec::new(),
            pool_size: default_pool_size(),
            queue_capacity: default_queue_capacity(),
            default_depth: default_depth(),
            min_depth: default_min_depth(),
            max_depth: default_max_depth(),
            max_analysis_time_ms: default_max_analysis_time_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            new_game_per_request: default_new_game_per_request(),
            options: BTreeMap::new(),
            restart: RestartPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn max_analysis_time(&self) -> Duration {
        Duration::from_millis(self.max_analysis_time_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// The time a request may take: the caller's timeout, never more than
    /// `max_analysis_time`.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        let max = self.max_analysis_time();
        requested.map_or(max, |t| t.min(max))
    }

    /// Checks that the configuration can actually run.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.pool_size == 0 {
            return Err(InvalidConfig::EmptyPool);
        }
        if self.queue_capacity == 0 {
            return Err(InvalidConfig::EmptyQueue);
        }
        if self.min_depth == 0 || self.min_depth > self.max_depth {
            return Err(InvalidConfig::DepthRange {
                min: self.min_depth,
                max: self.max_depth,
            });
        }
        if !(self.min_depth..=self.max_depth).contains(&self.default_depth) {
            return Err(InvalidConfig::DefaultDepth {
                default: self.default_depth,
                min: self.min_depth,
                max: self.max_depth,
            });
        }
        if self.max_analysis_time_ms == 0 {
            return Err(InvalidConfig::ZeroDuration("max_analysis_time_ms"));
        }
        if self.max_analysis_time_ms > MAX_ANALYSIS_TIME_MS {
            return Err(InvalidConfig::AnalysisTimeTooLong(self.max_analysis_time_ms));
        }
        if self.stop_grace_ms == 0 {
            return Err(InvalidConfig::ZeroDuration("stop_grace_ms"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(InvalidConfig::ZeroDuration("handshake_timeout_ms"));
        }
        self.restart.validate()
    }
}

/// Backoff schedule for restarting failed engines.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestartPolicy {
    /// Consecutive failures tolerated before a session is marked degraded.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// How long a degraded session waits before trying again on its own.
    #[serde(default = "default_recovery_interval_ms")]
    pub recovery_interval_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_recovery_interval_ms() -> u64 {
    60_000
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            recovery_interval_ms: default_recovery_interval_ms(),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart attempt `attempt` (1-based): doubles from
    /// `initial_backoff_ms`, capped at `max_backoff_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    fn validate(&self) -> Result<(), InvalidConfig> {
        if self.recovery_interval_ms == 0 {
            return Err(InvalidConfig::ZeroDuration("restart.recovery_interval_ms"));
        }
        Ok(())
    }
}

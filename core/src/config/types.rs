use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub parallel: ParallelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "tajaa_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Knobs for foreground runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Deadline applied by `run_chain` to each entry. Unset means no deadline.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,

    /// How long a terminated process gets between Term and Kill.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    /// How long readers may keep draining after the process was terminated.
    #[serde(default = "default_drain_ms")]
    pub drain_ms: u64,
}

fn default_terminate_grace_ms() -> u64 {
    2_000
}

fn default_drain_ms() -> u64 {
    200
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: None,
            terminate_grace_ms: default_terminate_grace_ms(),
            drain_ms: default_drain_ms(),
        }
    }
}

impl RunnerConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_stdout_capacity")]
    pub stdout_capacity: usize,

    #[serde(default = "default_stderr_capacity")]
    pub stderr_capacity: usize,

    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    #[serde(default = "default_drain_ms")]
    pub drain_ms: u64,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_stdout_capacity() -> usize {
    1000
}

fn default_stderr_capacity() -> usize {
    500
}

fn default_cancel_grace_ms() -> u64 {
    5_000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            stdout_capacity: default_stdout_capacity(),
            stderr_capacity: default_stderr_capacity(),
            cancel_grace_ms: default_cancel_grace_ms(),
            drain_ms: default_drain_ms(),
        }
    }
}

impl SupervisorConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(default = "default_parallel_max")]
    pub max_concurrent: usize,
}

fn default_parallel_max() -> usize {
    3
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_parallel_max(),
        }
    }
}

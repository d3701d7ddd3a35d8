use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("runner failed: {0}")]
    Runner(#[from] RunnerError),
    #[error("supervisor failed: {0}")]
    Supervisor(#[from] super::SupervisorError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("empty command")]
    EmptyCommand,
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
    #[error("signal delivery failed: {0}")]
    Signal(String),
    #[error("wait failed: {0}")]
    Wait(String),
}

impl RunnerError {
    /// Launch failures never produced a process; everything else happened after spawn.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::EmptyCommand | Self::NotFound(_) | Self::Spawn(_)
        )
    }
}

use serde::{Deserialize, Serialize};

/// Exit status used when no process was ever launched, or it never reported.
pub const EXIT_NOT_LAUNCHED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Kill,
    Term,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStream {
    Stdout,
    Stderr,
}

impl LineStream {
    pub fn label(self) -> &'static str {
        match self {
            LineStream::Stdout => "stdout",
            LineStream::Stderr => "stderr",
        }
    }
}

/// One entry of a chain or fan-out batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub command: String,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Aggregated outcome of one command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub output: String,
    pub errors: String,
    pub exit_code: i32,
    pub success: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl ExecutionResult {
    /// Result for a command that never produced a process.
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self {
            name: None,
            output: String::new(),
            errors: message.into(),
            exit_code: EXIT_NOT_LAUNCHED,
            success: false,
            timed_out: false,
            duration_ms: 0,
            pid: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn launched(&self) -> bool {
        self.pid.is_some()
    }
}

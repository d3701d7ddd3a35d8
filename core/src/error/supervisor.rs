use thiserror::Error;

/// Construction-time errors for the task supervisor.
///
/// Process-level problems never surface here; they are recorded on the task.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("concurrency ceiling must be at least 1 (got {0})")]
    InvalidCeiling(usize),

    #[error("{stream} buffer capacity must be at least 1")]
    InvalidCapacity { stream: &'static str },

    #[error("task supervisor must be created inside a tokio runtime")]
    NoRuntime,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::{ExecutionResult, EXIT_NOT_LAUNCHED};

/// Process-unique task identifier, assigned at submission and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task_{:04}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a background task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub command: String,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Lines evicted from the stdout ring buffer.
    pub stdout_dropped: u64,
    /// Lines evicted from the stderr ring buffer.
    pub stderr_dropped: u64,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True if either buffer lost its oldest lines.
    pub fn truncated(&self) -> bool {
        self.stdout_dropped > 0 || self.stderr_dropped > 0
    }

    pub fn output(&self) -> String {
        self.stdout.join("\n")
    }

    pub fn duration_ms(&self) -> Option<u64> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds().max(0) as u64)
    }

    /// Result view of a terminal task; `None` while it is still pending or running.
    pub fn to_result(&self) -> Option<ExecutionResult> {
        if !self.is_terminal() {
            return None;
        }
        let exit_code = self.exit_code.unwrap_or(EXIT_NOT_LAUNCHED);
        Some(ExecutionResult {
            name: Some(self.name.clone()),
            output: self.output(),
            errors: self.stderr.join("\n"),
            exit_code,
            success: self.status == TaskStatus::Completed,
            timed_out: false,
            duration_ms: self.duration_ms().unwrap_or(0),
            pid: self.pid,
        })
    }
}

/// Invoked once when a task reaches a terminal state.
pub trait TaskCallback: Send + Sync {
    fn on_task_complete(&self, task: &Task);
}

impl<F> TaskCallback for F
where
    F: Fn(&Task) + Send + Sync,
{
    fn on_task_complete(&self, task: &Task) {
        self(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_display_is_zero_padded() {
        assert_eq!(TaskId(7).to_string(), "task_0007");
        assert_eq!(TaskId(12345).to_string(), "task_12345");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}

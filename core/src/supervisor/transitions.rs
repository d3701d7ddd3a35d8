//! Task lifecycle rules.
//!
//! ```text
//! PENDING ──► RUNNING ──► COMPLETED | FAILED | CANCELLED
//!    └──────────────────► CANCELLED
//! ```

use thiserror::Error;

use super::task::TaskStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("cannot leave terminal state {state}")]
    FromTerminalState { state: TaskStatus },
}

pub struct StateTransition;

impl StateTransition {
    pub fn validate(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }
}

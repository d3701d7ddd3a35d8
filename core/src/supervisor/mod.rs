mod manager;
mod task;
mod transitions;

pub use manager::TaskSupervisor;
pub use task::{Task, TaskCallback, TaskId, TaskStatus};
pub use transitions::{StateTransition, TransitionError};

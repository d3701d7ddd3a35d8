#[allow(clippy::module_inception)]
pub mod error;
pub mod supervisor;

pub use error::{CliError, RunnerError};
pub use supervisor::SupervisorError;

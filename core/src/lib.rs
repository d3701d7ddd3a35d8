pub mod config;
pub mod decoder;
pub mod error;
pub mod runner;
pub mod supervisor;
pub mod util;

pub use config::AppConfig;
pub use decoder::{DecoderRegistry, Finding, Findings, OutputDecoder};
pub use error::{CliError, RunnerError, SupervisorError};
pub use runner::{CommandRunner, CommandSpec, ExecutionResult, OutputObserver};
pub use supervisor::{Task, TaskCallback, TaskId, TaskStatus, TaskSupervisor};

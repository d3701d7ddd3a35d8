mod command;
mod drive;
mod io_pump;
mod observe;
mod process;
pub mod spawn;
mod traits;
pub mod types;

pub use command::CommandRunner;
pub use io_pump::pump_lines;
pub use observe::{ObserverId, ObserverSet, ObserverTap, OutputObserver};
pub use process::{exit_code, terminate_gracefully, OsLauncher};
pub use spawn::{has_shell_syntax, SpawnPlan};
pub use traits::{ProcessHandle, ProcessLauncher};
pub use types::{CommandSpec, ExecutionResult, LineStream, Signal, EXIT_NOT_LAUNCHED};

pub(crate) use drive::{drive_process, Capture, Ended, Limits};

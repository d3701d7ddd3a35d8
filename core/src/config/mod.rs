mod load;
mod types;

pub use load::{apply_env_overrides, get_tajaa_data_dir, load_default, load_from_path};
pub use types::{AppConfig, LoggingConfig, ParallelConfig, RunnerConfig, SupervisorConfig};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::RunnerError;

use super::types::Signal;

/// A single launched OS process and its two output streams.
#[async_trait]
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    async fn signal(&mut self, signal: Signal) -> Result<(), RunnerError>;
    /// Wait for the process to exit and return its exit status.
    async fn wait(&mut self) -> Result<i32, RunnerError>;
}

/// Turns a prepared command line into a running process.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    fn name(&self) -> &str;
    async fn launch(&self, command: &str) -> Result<Box<dyn ProcessHandle>, RunnerError>;
}

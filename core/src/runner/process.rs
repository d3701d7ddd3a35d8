use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::Child;

use crate::error::RunnerError;

use super::spawn::SpawnPlan;
use super::traits::{ProcessHandle, ProcessLauncher};
use super::types::{Signal, EXIT_NOT_LAUNCHED};

/// Launches commands as real OS processes with piped stdout/stderr.
pub struct OsLauncher {}

impl OsLauncher {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for OsLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for OsLauncher {
    fn name(&self) -> &str {
        "os"
    }

    async fn launch(&self, command: &str) -> Result<Box<dyn ProcessHandle>, RunnerError> {
        let plan = SpawnPlan::for_command(command)?;
        tracing::debug!(strategy = plan.strategy(), command = %command, "launching");

        let mut cmd = plan.to_command();
        // Own process group, so signals reach the shell and everything it forked.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => RunnerError::NotFound(plan.program().to_string()),
                _ => RunnerError::Spawn(e.to_string()),
            })?;

        let pgid = child.id();
        Ok(Box::new(OsProcess { child, pgid }))
    }
}

struct OsProcess {
    child: Child,
    /// Leader pid at spawn; stays valid for the group after the leader is reaped.
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

#[async_trait]
impl ProcessHandle for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn signal(&mut self, signal: Signal) -> Result<(), RunnerError> {
        match signal {
            Signal::Kill => self.kill(),
            Signal::Term => self.terminate(),
        }
    }

    async fn wait(&mut self) -> Result<i32, RunnerError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| RunnerError::Wait(e.to_string()))?;
        Ok(exit_code(status))
    }
}

impl OsProcess {
    #[cfg(unix)]
    fn terminate(&mut self) -> Result<(), RunnerError> {
        self.signal_group(libc::SIGTERM)
    }

    #[cfg(unix)]
    fn kill(&mut self) -> Result<(), RunnerError> {
        self.signal_group(libc::SIGKILL)
    }

    #[cfg(unix)]
    fn signal_group(&self, sig: libc::c_int) -> Result<(), RunnerError> {
        let Some(pgid) = self.pgid else {
            return Ok(());
        };
        let rc = unsafe { libc::killpg(pgid as libc::pid_t, sig) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        // Group already empty.
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(RunnerError::Signal(err.to_string()))
    }

    // No graceful termination on windows; Term behaves like Kill.
    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<(), RunnerError> {
        self.kill()
    }

    #[cfg(not(unix))]
    fn kill(&mut self) -> Result<(), RunnerError> {
        if self.child.id().is_none() {
            return Ok(());
        }
        self.child
            .start_kill()
            .map_err(|e| RunnerError::Signal(e.to_string()))
    }
}

/// Exit status as a signed integer; `-n` when the process died from signal `n`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    EXIT_NOT_LAUNCHED
}

/// Term, wait up to `grace`, then Kill and wait.
///
/// A final Kill sweeps whatever is left of the process group once the
/// leader has been reaped. Returns the exit status the process finally
/// reported, if any.
pub async fn terminate_gracefully(handle: &mut dyn ProcessHandle, grace: Duration) -> Option<i32> {
    if let Err(e) = handle.signal(Signal::Term).await {
        tracing::debug!(error = %e, "term signal failed");
    }

    let waited = tokio::time::timeout(grace, handle.wait()).await;
    let code = match waited {
        Ok(Ok(code)) => Some(code),
        Ok(Err(e)) => {
            tracing::warn!(error.kind = "process.wait", error.message = %e);
            None
        }
        Err(_) => {
            tracing::warn!(pid = ?handle.pid(), grace_ms = grace.as_millis() as u64, "process ignored term, killing");
            if let Err(e) = handle.signal(Signal::Kill).await {
                tracing::warn!(error.kind = "process.kill", error.message = %e);
            }
            match handle.wait().await {
                Ok(code) => Some(code),
                Err(e) => {
                    tracing::warn!(error.kind = "process.wait", error.message = %e);
                    None
                }
            }
        }
    };

    if let Err(e) = handle.signal(Signal::Kill).await {
        tracing::debug!(error = %e, "group sweep failed");
    }
    code
}

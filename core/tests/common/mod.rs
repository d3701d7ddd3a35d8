#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tajaa_core::error::RunnerError;
use tajaa_core::runner::{OsLauncher, ProcessHandle, ProcessLauncher, Signal};
use tokio::io::{AsyncRead, ReadBuf};

/// Real launcher that records every command it is asked to start.
#[derive(Default)]
pub struct SpyLauncher {
    inner: OsLauncher,
    launches: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

impl SpyLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessLauncher for SpyLauncher {
    fn name(&self) -> &str {
        "spy"
    }

    async fn launch(&self, command: &str) -> Result<Box<dyn ProcessHandle>, RunnerError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().unwrap().push(command.to_string());
        self.inner.launch(command).await
    }
}

/// Where a [`BrokenLauncher`] process breaks after a successful launch.
#[derive(Debug, Clone, Copy)]
pub enum Breakage {
    /// Reading stdout fails with this message; the process exits 0.
    StdoutRead(&'static str),
    /// Both streams end cleanly; collecting the exit status fails.
    Wait(&'static str),
}

/// Launcher whose processes start fine and then fail at runtime.
pub struct BrokenLauncher {
    breakage: Breakage,
}

impl BrokenLauncher {
    pub fn new(breakage: Breakage) -> Arc<Self> {
        Arc::new(Self { breakage })
    }
}

#[async_trait]
impl ProcessLauncher for BrokenLauncher {
    fn name(&self) -> &str {
        "broken"
    }

    async fn launch(&self, _command: &str) -> Result<Box<dyn ProcessHandle>, RunnerError> {
        Ok(Box::new(BrokenProcess {
            breakage: self.breakage,
        }))
    }
}

struct BrokenProcess {
    breakage: Breakage,
}

#[async_trait]
impl ProcessHandle for BrokenProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        match self.breakage {
            Breakage::StdoutRead(msg) => Some(Box::new(FailingReader(msg))),
            Breakage::Wait(_) => Some(Box::new(tokio::io::empty())),
        }
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        Some(Box::new(tokio::io::empty()))
    }

    async fn signal(&mut self, _signal: Signal) -> Result<(), RunnerError> {
        Ok(())
    }

    async fn wait(&mut self) -> Result<i32, RunnerError> {
        match self.breakage {
            Breakage::StdoutRead(_) => Ok(0),
            Breakage::Wait(msg) => Err(RunnerError::Wait(msg.to_string())),
        }
    }
}

struct FailingReader(&'static str);

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other(self.0)))
    }
}

/// Pid printed on the first stdout line of a finished run.
pub fn first_line_pid(output: &str) -> u32 {
    output
        .lines()
        .next()
        .and_then(|l| l.trim().parse().ok())
        .unwrap_or_else(|| panic!("no pid in output {output:?}"))
}

/// True while `pid` names a live (or unreaped) process.
pub fn process_exists(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Like [`process_exists`], but a zombie left for init to reap counts as gone.
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // State is the first field after the parenthesised command name.
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) if std::path::Path::new("/proc/self").exists() => false,
        Err(_) => process_exists(pid),
    }
}

/// Poll `cond` every 10ms until it holds or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

//! Shared process driver for foreground runs and supervised tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::RunnerError;
use crate::util::RingLines;

use super::io_pump::pump_lines;
use super::observe::ObserverTap;
use super::process::terminate_gracefully;
use super::traits::ProcessHandle;
use super::types::LineStream;

pub(crate) struct Capture {
    pub stdout: Arc<RingLines>,
    pub stderr: Arc<RingLines>,
    pub tap: Option<ObserverTap>,
}

pub(crate) struct Limits {
    pub timeout: Option<Duration>,
    pub grace: Duration,
    pub drain: Duration,
}

#[derive(Debug)]
pub(crate) enum Ended {
    Exited(i32),
    TimedOut(Option<i32>),
    Cancelled(Option<i32>),
    Failed(RunnerError, Option<i32>),
}

enum Stop {
    Finished(Result<(), RunnerError>, Result<i32, RunnerError>),
    Deadline,
    Cancel,
}

/// Stream both outputs of `handle` into `capture` until exit, deadline or cancel.
///
/// On the normal path both readers reach EOF before the exit status is
/// collected. On deadline or cancel the process is terminated (Term, then Kill
/// after `grace`), readers get `drain` to flush, then they are aborted.
pub(crate) async fn drive_process(
    handle: &mut dyn ProcessHandle,
    capture: &Capture,
    limits: &Limits,
    cancel: Option<oneshot::Receiver<()>>,
) -> Ended {
    let (Some(stdout), Some(stderr)) = (handle.stdout(), handle.stderr()) else {
        let code = terminate_gracefully(handle, limits.grace).await;
        return Ended::Failed(
            RunnerError::Spawn("process has no stdout/stderr pipes".into()),
            code,
        );
    };

    let mut out_task = pump_lines(
        stdout,
        LineStream::Stdout,
        capture.stdout.clone(),
        capture.tap.clone(),
    );
    let mut err_task = pump_lines(stderr, LineStream::Stderr, capture.stderr.clone(), None);

    let timeout = limits.timeout;
    let stop = {
        let finish = async {
            let out = join_reader(&mut out_task, LineStream::Stdout).await;
            let err = join_reader(&mut err_task, LineStream::Stderr).await;
            let exit = handle.wait().await;
            (out.and(err), exit)
        };
        tokio::pin!(finish);

        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cancelled = async move {
            match cancel {
                // A dropped sender is not a cancellation request.
                Some(rx) => {
                    if rx.await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            (readers, exit) = &mut finish => Stop::Finished(readers, exit),
            _ = deadline => Stop::Deadline,
            _ = cancelled => Stop::Cancel,
        }
    };

    match stop {
        Stop::Finished(Ok(()), Ok(code)) => Ended::Exited(code),
        Stop::Finished(Err(e), exit) => Ended::Failed(e, exit.ok()),
        Stop::Finished(Ok(()), Err(e)) => Ended::Failed(e, None),
        Stop::Deadline => {
            tracing::debug!(pid = ?handle.pid(), "deadline reached, terminating");
            let code = terminate_gracefully(handle, limits.grace).await;
            settle_readers(out_task, err_task, limits.drain).await;
            Ended::TimedOut(code)
        }
        Stop::Cancel => {
            tracing::debug!(pid = ?handle.pid(), "cancel requested, terminating");
            let code = terminate_gracefully(handle, limits.grace).await;
            settle_readers(out_task, err_task, limits.drain).await;
            Ended::Cancelled(code)
        }
    }
}

async fn join_reader(
    task: &mut JoinHandle<Result<u64, RunnerError>>,
    stream: LineStream,
) -> Result<(), RunnerError> {
    match task.await {
        Ok(Ok(_lines)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(RunnerError::StreamIo {
            stream: stream.label(),
            source: std::io::Error::other(e.to_string()),
        }),
    }
}

async fn settle_readers(
    mut out_task: JoinHandle<Result<u64, RunnerError>>,
    mut err_task: JoinHandle<Result<u64, RunnerError>>,
    drain: Duration,
) {
    let (out, err) = tokio::join!(
        tokio::time::timeout(drain, &mut out_task),
        tokio::time::timeout(drain, &mut err_task),
    );
    if out.is_err() {
        out_task.abort();
    }
    if err.is_err() {
        err_task.abort();
    }
}

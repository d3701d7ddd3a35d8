use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::config::RunnerConfig;
use crate::util::RingLines;

use super::drive::{drive_process, Capture, Ended, Limits};
use super::observe::{ObserverId, ObserverSet, ObserverTap, OutputObserver};
use super::process::OsLauncher;
use super::traits::ProcessLauncher;
use super::types::{CommandSpec, ExecutionResult, EXIT_NOT_LAUNCHED};

/// Foreground execution: one command, a sequential chain, or a bounded fan-out.
///
/// Nothing here returns an error; launch failures, stream failures and
/// timeouts are all encoded in the returned [`ExecutionResult`].
#[derive(Clone)]
pub struct CommandRunner {
    launcher: Arc<dyn ProcessLauncher>,
    observers: ObserverSet,
    cfg: RunnerConfig,
}

impl CommandRunner {
    pub fn new(cfg: RunnerConfig) -> Self {
        Self::with_launcher(cfg, Arc::new(OsLauncher::new()))
    }

    pub fn with_launcher(cfg: RunnerConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            observers: ObserverSet::new(),
            cfg,
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn OutputObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Run `command` to completion, or until `timeout` elapses.
    ///
    /// With `stream_output`, every stdout line is handed to the registered
    /// observers as it is read.
    pub async fn run(
        &self,
        command: &str,
        stream_output: bool,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let started = Instant::now();

        let mut handle = match self.launcher.launch(command).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error.kind = "runner.launch", error.message = %e, command = %command);
                let mut res = ExecutionResult::launch_failure(e.to_string());
                res.duration_ms = started.elapsed().as_millis() as u64;
                return res;
            }
        };
        let pid = handle.pid();

        let capture = Capture {
            stdout: RingLines::unbounded(),
            stderr: RingLines::unbounded(),
            tap: stream_output.then(|| ObserverTap::new(self.observers.clone(), None)),
        };
        let limits = Limits {
            timeout,
            grace: self.cfg.terminate_grace(),
            drain: self.cfg.drain(),
        };

        let ended = drive_process(handle.as_mut(), &capture, &limits, None).await;
        let mut broken = false;
        let (exit_code, timed_out) = match ended {
            Ended::Exited(code) => (code, false),
            Ended::TimedOut(code) => {
                tracing::warn!(pid = ?pid, timeout_ms = ?timeout.map(|t| t.as_millis() as u64), "command timed out");
                (code.unwrap_or(EXIT_NOT_LAUNCHED), true)
            }
            // Foreground runs carry no cancel signal.
            Ended::Cancelled(code) => (code.unwrap_or(EXIT_NOT_LAUNCHED), false),
            Ended::Failed(e, code) => {
                tracing::warn!(error.kind = "runner.runtime", error.message = %e, pid = ?pid);
                capture.stderr.push(e.to_string());
                broken = true;
                (code.unwrap_or(EXIT_NOT_LAUNCHED), false)
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(pid = ?pid, exit_code, timed_out, duration_ms, "command finished");

        ExecutionResult {
            name: None,
            output: capture.stdout.joined(),
            errors: capture.stderr.joined(),
            exit_code,
            success: exit_code == 0 && !timed_out && !broken,
            timed_out,
            duration_ms,
            pid,
        }
    }

    /// Run entries one after another; with `stop_on_failure` the first
    /// unsuccessful result ends the chain and later entries are skipped.
    pub async fn run_chain(
        &self,
        commands: &[CommandSpec],
        stop_on_failure: bool,
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(commands.len());

        for spec in commands {
            tracing::info!(name = %spec.name, "chain step");
            let result = self
                .run(&spec.command, true, self.cfg.default_timeout())
                .await
                .with_name(spec.name.clone());
            let failed = !result.success;
            results.push(result);

            if stop_on_failure && failed {
                tracing::info!(name = %spec.name, skipped = commands.len() - results.len(), "chain stopped due to failure");
                break;
            }
        }

        results
    }

    /// Run all entries with at most `max_concurrent` in flight.
    ///
    /// Output streaming is disabled. Results come back in input order.
    pub async fn run_parallel(
        &self,
        commands: &[CommandSpec],
        max_concurrent: usize,
    ) -> Vec<ExecutionResult> {
        let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut futs = FuturesUnordered::new();

        for (idx, spec) in commands.iter().enumerate() {
            let sem = sem.clone();
            futs.push(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => self.run(&spec.command, false, None).await,
                    Err(_) => ExecutionResult::launch_failure("semaphore closed unexpectedly"),
                };
                (idx, result.with_name(spec.name.clone()))
            });
        }

        let mut slots: Vec<Option<ExecutionResult>> = vec![None; commands.len()];
        while let Some((idx, result)) = futs.next().await {
            slots[idx] = Some(result);
        }

        slots
            .into_iter()
            .zip(commands)
            .map(|(slot, spec)| {
                slot.unwrap_or_else(|| {
                    ExecutionResult::launch_failure("no result recorded").with_name(spec.name.clone())
                })
            })
            .collect()
    }
}

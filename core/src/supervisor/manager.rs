use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::runner::{
    drive_process, Capture, Ended, Limits, ObserverId, ObserverSet, ObserverTap, OsLauncher,
    OutputObserver, ProcessLauncher,
};
use crate::util::RingLines;

use super::task::{Task, TaskCallback, TaskId, TaskStatus};
use super::transitions::StateTransition;

/// Extra time `cancel` waits beyond the termination grace before giving up.
const CANCEL_WAIT_SLACK: Duration = Duration::from_secs(1);

/// Bounded pool of background tasks with FIFO admission.
///
/// At most `max_concurrent` tasks hold a slot at once. A slot is taken when a
/// task is admitted and released once its process has been reaped, so a
/// cancelled task keeps its slot until the process is actually gone.
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: SupervisorConfig,
    runtime: Handle,
    launcher: Arc<dyn ProcessLauncher>,
    observers: ObserverSet,
    table: Mutex<TaskTable>,
}

#[derive(Default)]
struct TaskTable {
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, Entry>,
    pending: VecDeque<TaskId>,
    running: usize,
    next_id: u64,
}

struct Entry {
    id: TaskId,
    name: String,
    command: String,
    status: TaskStatus,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    pid: Option<u32>,
    stdout: Arc<RingLines>,
    stderr: Arc<RingLines>,
    cancel_tx: Option<oneshot::Sender<()>>,
    /// Set by `cancel` on a running task; the reap then settles as CANCELLED.
    cancel_requested: bool,
    done: watch::Sender<bool>,
    callback: Option<Arc<dyn TaskCallback>>,
}

/// Everything a driver needs once a task has been granted a slot.
struct Admission {
    id: TaskId,
    command: String,
    stdout: Arc<RingLines>,
    stderr: Arc<RingLines>,
    cancel_rx: oneshot::Receiver<()>,
}

type Fired = (Arc<dyn TaskCallback>, Task);

impl Entry {
    fn snapshot(&self) -> Task {
        Task {
            id: self.id,
            name: self.name.clone(),
            command: self.command.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            exit_code: self.exit_code,
            pid: self.pid,
            stdout: self.stdout.to_vec(),
            stderr: self.stderr.to_vec(),
            stdout_dropped: self.stdout.dropped(),
            stderr_dropped: self.stderr.dropped(),
        }
    }

    fn transition(&mut self, to: TaskStatus) -> bool {
        match StateTransition::validate(self.status, to) {
            Ok(()) => {
                tracing::debug!(task.id = %self.id, from = %self.status, to = %to, "task transition");
                self.status = to;
                if to.is_terminal() {
                    self.completed_at = Some(Utc::now());
                }
                true
            }
            Err(e) => {
                tracing::warn!(task.id = %self.id, error = %e, "rejected task transition");
                false
            }
        }
    }

    /// Move to a terminal state and hand back the callback, if any, to fire
    /// once the table lock is released.
    fn settle(&mut self, to: TaskStatus) -> Option<Fired> {
        if !self.transition(to) {
            return None;
        }
        self.callback.take().map(|cb| (cb, self.snapshot()))
    }
}

impl TaskTable {
    /// Grant free slots to the oldest pending tasks.
    fn admit(&mut self, ceiling: usize) -> Vec<Admission> {
        let mut admitted = Vec::new();
        while self.running < ceiling {
            let Some(id) = self.pending.pop_front() else {
                break;
            };
            let Some(entry) = self.tasks.get_mut(&id) else {
                continue;
            };
            if !entry.transition(TaskStatus::Running) {
                continue;
            }
            entry.started_at = Some(Utc::now());
            let (cancel_tx, cancel_rx) = oneshot::channel();
            entry.cancel_tx = Some(cancel_tx);
            self.running += 1;
            admitted.push(Admission {
                id,
                command: entry.command.clone(),
                stdout: entry.stdout.clone(),
                stderr: entry.stderr.clone(),
                cancel_rx,
            });
        }
        admitted
    }
}

impl TaskSupervisor {
    /// Must be called from within a tokio runtime; drivers are spawned onto it.
    pub fn new(cfg: SupervisorConfig) -> Result<Self, SupervisorError> {
        Self::with_launcher(cfg, Arc::new(OsLauncher::new()))
    }

    pub fn with_launcher(
        cfg: SupervisorConfig,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self, SupervisorError> {
        if cfg.max_concurrent == 0 {
            return Err(SupervisorError::InvalidCeiling(cfg.max_concurrent));
        }
        if cfg.stdout_capacity == 0 {
            return Err(SupervisorError::InvalidCapacity { stream: "stdout" });
        }
        if cfg.stderr_capacity == 0 {
            return Err(SupervisorError::InvalidCapacity { stream: "stderr" });
        }
        let runtime = Handle::try_current().map_err(|_| SupervisorError::NoRuntime)?;

        tracing::debug!(
            max_concurrent = cfg.max_concurrent,
            launcher = launcher.name(),
            "task supervisor created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                cfg,
                runtime,
                launcher,
                observers: ObserverSet::new(),
                table: Mutex::new(TaskTable::default()),
            }),
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.cfg.max_concurrent
    }

    pub fn add_observer(&self, observer: Arc<dyn OutputObserver>) -> ObserverId {
        self.inner.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Queue `command` and start it right away if a slot is free.
    ///
    /// Never blocks on execution and never fails; launch problems show up
    /// later as a FAILED task.
    pub fn submit(
        &self,
        name: impl Into<String>,
        command: impl Into<String>,
        callback: Option<Arc<dyn TaskCallback>>,
    ) -> TaskId {
        let name = name.into();
        let command = command.into();
        let cfg = &self.inner.cfg;

        let (id, admitted) = {
            let mut table = self.inner.lock();
            table.next_id += 1;
            let id = TaskId(table.next_id);
            let (done, _) = watch::channel(false);
            table.tasks.insert(
                id,
                Entry {
                    id,
                    name: name.clone(),
                    command,
                    status: TaskStatus::Pending,
                    submitted_at: Utc::now(),
                    started_at: None,
                    completed_at: None,
                    exit_code: None,
                    pid: None,
                    stdout: RingLines::new(cfg.stdout_capacity),
                    stderr: RingLines::new(cfg.stderr_capacity),
                    cancel_tx: None,
                    cancel_requested: false,
                    done,
                    callback,
                },
            );
            table.order.push(id);
            table.pending.push_back(id);
            let admitted = table.admit(cfg.max_concurrent);
            (id, admitted)
        };

        tracing::info!(task.id = %id, name = %name, "task submitted");
        self.inner.spawn_drivers(admitted);
        id
    }

    /// Cancel a pending or running task. Returns false if it is unknown or
    /// already terminal.
    ///
    /// A running task stays RUNNING while its process gets Term, the
    /// configured grace, and Kill; it becomes CANCELLED once the process is
    /// reaped. This call waits for that for a bounded time only, after which
    /// the task is marked CANCELLED anyway and keeps its slot until the reap.
    /// Cancelling a task already on its way out returns false.
    pub async fn cancel(&self, id: TaskId) -> bool {
        let (fired, reaped) = {
            let mut table = self.inner.lock();
            let Some(entry) = table.tasks.get_mut(&id) else {
                return false;
            };
            match entry.status {
                TaskStatus::Pending => {
                    let fired = entry.settle(TaskStatus::Cancelled);
                    entry.done.send_replace(true);
                    table.pending.retain(|p| *p != id);
                    (fired, None)
                }
                TaskStatus::Running => {
                    if entry.cancel_requested {
                        return false;
                    }
                    entry.cancel_requested = true;
                    if let Some(tx) = entry.cancel_tx.take() {
                        let _ = tx.send(());
                    }
                    (None, Some(entry.done.subscribe()))
                }
                _ => return false,
            }
        };

        tracing::info!(task.id = %id, "task cancelled");
        fire(fired);

        if let Some(mut rx) = reaped {
            let bound = self.inner.cfg.cancel_grace() + self.inner.cfg.drain() + CANCEL_WAIT_SLACK;
            if tokio::time::timeout(bound, rx.wait_for(|done| *done))
                .await
                .is_err()
            {
                tracing::warn!(task.id = %id, "cancelled task not reaped within bound");
                let fired = {
                    let mut table = self.inner.lock();
                    table
                        .tasks
                        .get_mut(&id)
                        .filter(|e| e.status == TaskStatus::Running)
                        .and_then(|e| e.settle(TaskStatus::Cancelled))
                };
                fire(fired);
            }
        }
        true
    }

    /// Cancel every non-terminal task. Pending tasks go first so freed slots
    /// are not handed to tasks about to be cancelled. Returns how many were
    /// cancelled.
    pub async fn cancel_all(&self) -> usize {
        let (pending, running) = {
            let table = self.inner.lock();
            let mut pending = Vec::new();
            let mut running = Vec::new();
            for id in &table.order {
                match table.tasks.get(id).map(|e| e.status) {
                    Some(TaskStatus::Pending) => pending.push(*id),
                    Some(TaskStatus::Running) => running.push(*id),
                    _ => {}
                }
            }
            (pending, running)
        };

        let mut count = 0;
        for id in pending {
            if self.cancel(id).await {
                count += 1;
            }
        }
        let results = futures::future::join_all(running.into_iter().map(|id| self.cancel(id))).await;
        count += results.into_iter().filter(|c| *c).count();
        count
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(&id).map(Entry::snapshot)
    }

    /// All known tasks in submission order.
    pub fn list(&self) -> Vec<Task> {
        let table = self.inner.lock();
        table
            .order
            .iter()
            .filter_map(|id| table.tasks.get(id))
            .map(Entry::snapshot)
            .collect()
    }

    pub fn list_running(&self) -> Vec<Task> {
        let table = self.inner.lock();
        table
            .order
            .iter()
            .filter_map(|id| table.tasks.get(id))
            .filter(|e| e.status == TaskStatus::Running)
            .map(Entry::snapshot)
            .collect()
    }

    /// Joined stdout lines; empty for an unknown id.
    pub fn output(&self, id: TaskId) -> String {
        self.inner
            .lock()
            .tasks
            .get(&id)
            .map(|e| e.stdout.joined())
            .unwrap_or_default()
    }

    pub fn result(&self, id: TaskId) -> Option<crate::runner::ExecutionResult> {
        self.get(id)?.to_result()
    }

    /// Evict a terminal task from the table.
    pub fn forget(&self, id: TaskId) -> bool {
        let mut table = self.inner.lock();
        match table.tasks.get(&id) {
            Some(e) if e.status.is_terminal() => {
                table.tasks.remove(&id);
                table.order.retain(|o| *o != id);
                true
            }
            _ => false,
        }
    }

    /// Suspend until the task is terminal and its process reaped, or until
    /// `timeout` elapses. Returns the latest snapshot.
    pub async fn wait(&self, id: TaskId, timeout: Option<Duration>) -> Option<Task> {
        let mut rx = self.inner.lock().tasks.get(&id)?.done.subscribe();
        match timeout {
            Some(t) => {
                let _ = tokio::time::timeout(t, rx.wait_for(|done| *done)).await;
            }
            None => {
                let _ = rx.wait_for(|done| *done).await;
            }
        }
        self.get(id)
    }

    /// Occupied slots, including cancelled tasks whose process is still
    /// being reaped.
    pub fn running_count(&self) -> usize {
        self.inner.lock().running
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_drivers(self: &Arc<Self>, admitted: Vec<Admission>) {
        for adm in admitted {
            let inner = Arc::clone(self);
            self.runtime.spawn(async move { inner.drive(adm).await });
        }
    }

    async fn drive(self: Arc<Self>, adm: Admission) {
        let id = adm.id;
        let mut handle = match self.launcher.launch(&adm.command).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(task.id = %id, error.kind = "supervisor.launch", error.message = %e);
                adm.stderr.push(e.to_string());
                self.finish(id, TaskStatus::Failed, None);
                return;
            }
        };

        let pid = handle.pid();
        if let Some(entry) = self.lock().tasks.get_mut(&id) {
            entry.pid = pid;
        }
        tracing::info!(task.id = %id, pid = ?pid, "task started");

        let capture = Capture {
            stdout: adm.stdout,
            stderr: adm.stderr.clone(),
            tap: Some(ObserverTap::new(self.observers.clone(), Some(id))),
        };
        let limits = Limits {
            timeout: None,
            grace: self.cfg.cancel_grace(),
            drain: self.cfg.drain(),
        };

        let ended = drive_process(handle.as_mut(), &capture, &limits, Some(adm.cancel_rx)).await;
        let (status, code) = match ended {
            Ended::Exited(0) => (TaskStatus::Completed, Some(0)),
            Ended::Exited(code) => (TaskStatus::Failed, Some(code)),
            Ended::Cancelled(code) => (TaskStatus::Cancelled, code),
            Ended::TimedOut(code) => (TaskStatus::Failed, code),
            Ended::Failed(e, code) => {
                tracing::warn!(task.id = %id, error.kind = "supervisor.runtime", error.message = %e);
                adm.stderr.push(e.to_string());
                (TaskStatus::Failed, code)
            }
        };
        self.finish(id, status, code);
    }

    /// Release the slot, record the outcome, admit the next pending task and
    /// fire the callback outside the lock. Waiters are woken last, so a
    /// returned `wait` or `cancel` has seen the callback run.
    fn finish(self: &Arc<Self>, id: TaskId, status: TaskStatus, code: Option<i32>) {
        let (fired, admitted) = {
            let mut table = self.lock();
            table.running = table.running.saturating_sub(1);

            let mut fired = None;
            if let Some(entry) = table.tasks.get_mut(&id) {
                entry.cancel_tx = None;
                if entry.exit_code.is_none() {
                    entry.exit_code = code;
                }
                let status = if entry.cancel_requested {
                    TaskStatus::Cancelled
                } else {
                    status
                };
                // Already CANCELLED when the reap outlived the cancel bound.
                if entry.status == TaskStatus::Running {
                    fired = entry.settle(status);
                }
                tracing::info!(
                    task.id = %id,
                    status = %entry.status,
                    exit_code = ?entry.exit_code,
                    "task finished"
                );
            }

            let admitted = table.admit(self.cfg.max_concurrent);
            (fired, admitted)
        };

        self.spawn_drivers(admitted);
        fire(fired);

        if let Some(entry) = self.lock().tasks.get(&id) {
            entry.done.send_replace(true);
        }
    }
}

fn fire(fired: Option<Fired>) {
    if let Some((callback, task)) = fired {
        callback.on_task_complete(&task);
    }
}

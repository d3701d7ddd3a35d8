use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::supervisor::TaskId;

/// Receives standard-output lines as they are read.
///
/// `task` is set when the line belongs to a supervised background task and is
/// `None` for foreground runs.
pub trait OutputObserver: Send + Sync {
    fn on_output_line(&self, task: Option<TaskId>, line: &str);
}

impl<F> OutputObserver for F
where
    F: Fn(Option<TaskId>, &str) + Send + Sync,
{
    fn on_output_line(&self, task: Option<TaskId>, line: &str) {
        self(task, line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Entries = Vec<(ObserverId, Arc<dyn OutputObserver>)>;

/// Caller-managed observer list, safe to mutate while lines are streaming.
///
/// Notification iterates a snapshot, so an observer may add or remove
/// observers (itself included) from inside its callback.
#[derive(Clone, Default)]
pub struct ObserverSet {
    entries: Arc<RwLock<Entries>>,
    next_id: Arc<AtomicU64>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn OutputObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    pub fn remove(&self, id: ObserverId) -> bool {
        let mut g = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = g.len();
        g.retain(|(oid, _)| *oid != id);
        g.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, task: Option<TaskId>, line: &str) {
        let snapshot: Vec<Arc<dyn OutputObserver>> = {
            let g = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if g.is_empty() {
                return;
            }
            g.iter().map(|(_, o)| Arc::clone(o)).collect()
        };
        for observer in snapshot {
            observer.on_output_line(task, line);
        }
    }
}

/// Observer fan-out attached to one stdout reader.
#[derive(Clone)]
pub struct ObserverTap {
    pub observers: ObserverSet,
    pub task: Option<TaskId>,
}

impl ObserverTap {
    pub fn new(observers: ObserverSet, task: Option<TaskId>) -> Self {
        Self { observers, task }
    }

    pub fn emit(&self, line: &str) {
        self.observers.notify(self.task, line);
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Bounded line buffer; once full, the oldest line is evicted to admit the newest.
///
/// Evictions are counted so readers can tell the buffer no longer holds the
/// complete output.
pub struct RingLines {
    inner: Mutex<Inner>,
    cap: usize,
}

struct Inner {
    lines: VecDeque<String>,
    dropped: u64,
}

impl RingLines {
    pub fn new(cap: usize) -> Arc<Self> {
        let cap = cap.max(1);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                lines: VecDeque::with_capacity(cap.min(1024)),
                dropped: 0,
            }),
            cap,
        })
    }

    /// A buffer that never evicts; used for foreground runs.
    pub fn unbounded() -> Arc<Self> {
        Self::new(usize::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, line: String) {
        let mut g = self.lock();
        if g.lines.len() == self.cap {
            g.lines.pop_front();
            g.dropped += 1;
        }
        g.lines.push_back(line);
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }

    /// Number of lines evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn to_vec(&self) -> Vec<String> {
        let g = self.lock();
        let mut out = Vec::with_capacity(g.lines.len());
        out.extend(g.lines.iter().cloned());
        out
    }

    pub fn joined(&self) -> String {
        let g = self.lock();
        let mut out = String::new();
        for (i, line) in g.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(line);
        }
        out
    }
}

impl std::fmt::Debug for RingLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let g = self.lock();
        f.debug_struct("RingLines")
            .field("cap", &self.cap)
            .field("len", &g.lines.len())
            .field("dropped", &g.dropped)
            .finish()
    }
}

use std::io::Write;

use tajaa_core::supervisor::TaskId;
use tajaa_core::OutputObserver;

/// Echoes streamed stdout lines to the terminal, indented under a gutter.
#[derive(Debug, Default, Clone)]
pub struct ConsoleObserver {
    show_task: bool,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix background lines with their task id.
    pub fn with_task_prefix(mut self) -> Self {
        self.show_task = true;
        self
    }

    pub fn format_line(&self, task: Option<TaskId>, line: &str) -> String {
        match task {
            Some(id) if self.show_task => format!("  │ [{id}] {line}"),
            _ => format!("  │ {line}"),
        }
    }
}

impl OutputObserver for ConsoleObserver {
    fn on_output_line(&self, task: Option<TaskId>, line: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not take the reader down with it.
        let _ = writeln!(out, "{}", self.format_line(task, line));
    }
}

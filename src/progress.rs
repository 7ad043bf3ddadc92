//! Live download progress on stderr

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt::Display;
use std::io::{self, IsTerminal, Write};

const BAR_TEMPLATE: &str = "{spinner:.green} {msg:40} [{bar:30.cyan/blue}] {bytes}/{total_bytes}";
const FAILED_TEMPLATE: &str = "{msg:.red}";

/// Terminal state of a [`ProgressTask`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Cached,
    Downloaded,
    Failed(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }
}

/// Set of progress bars shared by all workers
#[derive(Clone)]
pub struct ProgressBoard {
    multi: MultiProgress,
}

impl ProgressBoard {
    /// Draw to stderr, or nowhere when stderr is not a terminal
    pub fn new() -> Self {
        if std::io::stderr().is_terminal() {
            Self {
                multi: MultiProgress::new(),
            }
        } else {
            Self::hidden()
        }
    }

    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    pub fn add_task(&self, label: impl Into<String>) -> ProgressTask {
        let label = label.into();
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(bar_style());
        bar.set_message(label.clone());

        ProgressTask {
            label,
            bar,
            total: None,
            completed: 0,
            status: TaskStatus::Pending,
        }
    }

    /// Stderr writer that clears the bars while a line is printed
    pub fn log_writer(&self) -> LogWriter {
        LogWriter {
            multi: self.multi.clone(),
        }
    }
}

/// Log sink for `tracing_subscriber` that does not tear the bars
#[derive(Clone)]
pub struct LogWriter {
    multi: MultiProgress,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.multi.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.multi.suspend(|| io::stderr().flush())
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn failed_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(FAILED_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Progress of a single chart request, owned by the worker handling it
pub struct ProgressTask {
    label: String,
    bar: ProgressBar,
    total: Option<u64>,
    completed: u64,
    status: TaskStatus,
}

impl ProgressTask {
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
        self.bar.set_message(self.label.clone());
    }

    /// Total becomes known once the response headers arrive
    pub fn start(&mut self, total: u64) {
        self.total = Some(total);
        self.status = TaskStatus::Running;
        self.bar.set_length(total);
    }

    pub fn set_completed(&mut self, completed: u64) {
        self.completed = completed;
        self.bar.set_position(completed);
    }

    /// Report an existing cache file as fully transferred in one step
    pub fn complete_from_cache(&mut self, size: u64) {
        self.start(size);
        self.set_completed(size);
        self.status = TaskStatus::Cached;
        self.bar.finish_with_message(format!("{} (cached)", self.label));
    }

    pub fn finish(&mut self) {
        self.status = TaskStatus::Downloaded;
        self.bar.finish_with_message(self.label.clone());
    }

    pub fn fail(&mut self, error: &dyn Display) {
        let message = format!("{} failed, {error}", self.label);
        self.status = TaskStatus::Failed(error.to_string());
        self.bar.set_style(failed_style());
        self.bar.abandon_with_message(message);
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }
}

//! Progress reporting for export operations
//!
//! [`ProgressReporter`] counts processed and matched records, renders a
//! one-line status and forwards it to a [`ProgressSink`] at most once per
//! update interval. Identical lines are never emitted twice in a row.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::Instant;
use tracing::info;

use crate::config::ProgressConfig;
use crate::utils::number::group_thousands;

use super::fetcher::FetchObserver;

const BAR_WIDTH: usize = 20;

/// Receives rendered progress lines
pub trait ProgressSink: Send + Sync {
    fn emit(&self, line: &str);

    /// Called once when the run is over
    fn finish(&self) {}
}

/// Discards every line
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&self, _line: &str) {}
}

/// Writes lines to the log
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&self, line: &str) {
        info!("{}", line);
    }
}

/// Shows the latest line on a terminal spinner
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn emit(&self, line: &str) {
        self.bar.set_message(line.to_string());
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Progress tracker for one run
pub struct ProgressReporter {
    count: u64,
    matched: u64,
    total: Option<u64>,
    update_interval: Duration,
    batch_size: u64,
    last_emit: Instant,
    last_rendered: Option<String>,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    /// Create a new progress reporter
    ///
    /// # Arguments
    /// * `total` - Expected number of records if known
    /// * `config` - Emission interval and batch size
    /// * `sink` - Destination of rendered lines
    pub fn new(total: Option<u64>, config: &ProgressConfig, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            count: 0,
            matched: 0,
            total,
            update_interval: Duration::from_secs_f64(config.update_interval),
            batch_size: config.batch_size.max(1),
            last_emit: Instant::now(),
            last_rendered: None,
            sink,
        }
    }

    /// Wrap the reporter for use as a fetch observer
    pub fn shared(self) -> SharedProgress {
        SharedProgress(Arc::new(Mutex::new(self)))
    }

    /// Count processed records and emit if due
    ///
    /// # Arguments
    /// * `processed_increment` - Records processed since the last call
    /// * `matched` - Whether the latest record passed the filters
    ///
    /// # Returns
    /// * `Option<String>` - The line emitted, if any
    pub fn update(&mut self, processed_increment: u64, matched: bool) -> Option<String> {
        self.count += processed_increment;
        if matched {
            self.matched += 1;
        }
        self.maybe_emit(false)
    }

    /// Count a fetched batch and emit unconditionally
    pub fn record_batch(&mut self, fetched: u64) -> Option<String> {
        self.count += fetched;
        self.maybe_emit(true)
    }

    /// Emit the current state unless it was already emitted
    pub fn force_update(&mut self) -> Option<String> {
        self.maybe_emit(true)
    }

    /// Start counting again with a new total
    pub fn restart(&mut self, total: Option<u64>) {
        self.count = 0;
        self.matched = 0;
        self.total = total;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn matched(&self) -> u64 {
        self.matched
    }

    pub fn finish(&self) {
        self.sink.finish();
    }

    /// Render the current status line
    pub fn render(&self) -> String {
        let matched = if self.matched > 0 {
            format!(" ({} matched)", group_thousands(self.matched))
        } else {
            String::new()
        };

        match self.total {
            Some(total) if total > 0 => {
                let percent = (self.count as f64 / total as f64 * 100.0).min(100.0);
                let filled = ((BAR_WIDTH as f64 * percent / 100.0) as usize).min(BAR_WIDTH);
                let bar = format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled));
                format!(
                    "Progress: {}/{} messages [{}] ({:.1}%){}",
                    group_thousands(self.count),
                    group_thousands(total),
                    bar,
                    percent,
                    matched
                )
            }
            _ => format!(
                "Progress: {} messages processed...{}",
                group_thousands(self.count),
                matched
            ),
        }
    }

    fn maybe_emit(&mut self, force: bool) -> Option<String> {
        let due = force
            || (self.count % self.batch_size == 0
                && self.last_emit.elapsed() >= self.update_interval);
        if !due {
            return None;
        }

        self.last_emit = Instant::now();
        let line = self.render();
        if self.last_rendered.as_deref() == Some(line.as_str()) {
            return None;
        }

        self.sink.emit(&line);
        self.last_rendered = Some(line.clone());
        Some(line)
    }
}

/// Reporter shared between the fetcher and the processing loop
#[derive(Clone)]
pub struct SharedProgress(Arc<Mutex<ProgressReporter>>);

impl SharedProgress {
    /// Run `f` with exclusive access to the reporter
    pub fn with<R>(&self, f: impl FnOnce(&mut ProgressReporter) -> R) -> R {
        let mut guard = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl FetchObserver for SharedProgress {
    fn on_batch(&self, fetched: usize, _total: u64) {
        self.with(|reporter| reporter.record_batch(fetched as u64));
    }
}

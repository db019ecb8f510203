//! Progress reporting for parallel batches

use std::io::Write;
use std::sync::Mutex;
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use tracing::{debug, warn};

use super::{JobOutcome, JobStatus};

/// Observer of job outcomes.
///
/// The scheduler calls `on_outcome` exactly once per completed job, one call
/// at a time, with `completed` non-decreasing and never above `total`.
pub trait Reporter: Send + Sync {
    fn on_outcome(&self, outcome: &JobOutcome, completed: usize, total: usize);

    /// Called once after every worker has stopped
    fn on_batch_complete(&self, _report: &super::BatchReport) {}
}

/// Reporter that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpReporter;

impl Reporter for NoOpReporter {
    fn on_outcome(&self, _outcome: &JobOutcome, _completed: usize, _total: usize) {}
}

/// Human-readable per-job lines with a live progress bar on stderr
pub struct ConsoleReporter {
    progress: ProgressBar,
    show_lines: bool,
}

impl ConsoleReporter {
    /// Create a console reporter for `total` jobs
    pub fn new(total: usize, show_lines: bool) -> Self {
        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}, {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        Self { progress, show_lines }
    }

    /// Create a console reporter without a progress bar
    pub fn plain(total: usize, show_lines: bool) -> Self {
        let reporter = Self::new(total, show_lines);
        reporter.progress.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Format the line printed for one outcome
    pub fn format_line(outcome: &JobOutcome, completed: usize, total: usize) -> String {
        let worker = format!("[Worker {}]", outcome.worker);
        match &outcome.status {
            JobStatus::Success(info) => format!(
                "{} {} {}/{}: {} ({}x{})",
                style(worker).dim(),
                style("Processed").green(),
                completed,
                total,
                outcome.job.file_name(),
                info.width,
                info.height,
            ),
            JobStatus::Failure { detail, .. } => format!(
                "{} {} {}/{}: {} -> {}",
                style(worker).dim(),
                style("Error").red().bold(),
                completed,
                total,
                outcome.job.file_name(),
                detail,
            ),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn on_outcome(&self, outcome: &JobOutcome, completed: usize, total: usize) {
        if self.show_lines {
            let line = Self::format_line(outcome, completed, total);
            self.progress.suspend(|| println!("{}", line));
        }
        self.progress.set_position(completed as u64);
    }

    fn on_batch_complete(&self, _report: &super::BatchReport) {
        self.progress.finish_and_clear();
    }
}

/// One JSON object per line for automation
pub struct JsonReporter<W: Write + Send> {
    out: Mutex<W>,
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    completed: usize,
    total: usize,
    #[serde(flatten)]
    outcome: &'a JobOutcome,
}

impl JsonReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> Reporter for JsonReporter<W> {
    fn on_outcome(&self, outcome: &JobOutcome, completed: usize, total: usize) {
        let record = OutcomeRecord { completed, total, outcome };
        let mut out = self.out.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let written = serde_json::to_writer(&mut *out, &record)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out));

        if let Err(e) = written {
            warn!("Failed to write JSON progress record: {}", e);
        }
    }

    fn on_batch_complete(&self, report: &super::BatchReport) {
        let mut out = self.out.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let summary = report.summary();

        let written = serde_json::to_writer(&mut *out, &summary)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());

        if let Err(e) = written {
            warn!("Failed to write JSON summary: {}", e);
        }
        debug!("JSON summary written");
    }
}

//! Bounded parallel execution of thumbnail jobs

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Serialize;

use crate::error::{FailureReason, ThumbnailError};

pub mod progress;
pub mod scheduler;

pub use progress::*;
pub use scheduler::*;

/// One unit of work: a single image to resize and re-encode
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Job {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Job {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source: P, output_dir: Q, width: u32, height: u32) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            width,
            height,
        }
    }

    /// Source file name as shown in progress lines
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map_or_else(|| self.source.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Thumbnail destination: the source file name inside the output directory
    pub fn output_path(&self) -> PathBuf {
        match self.source.file_name() {
            Some(name) => self.output_dir.join(name),
            None => self.output_dir.join(&self.source),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// Details of a thumbnail that was written successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailInfo {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub bytes_written: u64,
}

/// Terminal state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Success(ThumbnailInfo),
    Failure {
        reason: FailureReason,
        detail: String,
    },
}

impl JobStatus {
    pub(crate) fn from_error(error: &ThumbnailError) -> Self {
        Self::Failure {
            reason: error.failure_reason(),
            detail: error.user_message(),
        }
    }
}

/// Per-job result record, produced exactly once per job by the worker that ran it
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job: Job,
    /// Index of the worker that ran the job
    pub worker: usize,
    /// 1-based position in completion order
    pub sequence: usize,
    pub status: JobStatus,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Success(_))
    }

    /// Error detail, present only for failures
    pub fn error_detail(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Failure { detail, .. } => Some(detail),
            JobStatus::Success(_) => None,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match &self.status {
            JobStatus::Failure { reason, .. } => Some(*reason),
            JobStatus::Success(_) => None,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

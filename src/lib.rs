//! batchthumb - Parallel Batch Thumbnail Generator
//!
//! Scans one directory for JPEG, PNG, BMP and GIF images and writes a
//! thumbnail of each into an output directory, fitted inside a bounding box
//! with its aspect ratio kept and encoded in the source format.
//!
//! # Features
//!
//! - **Bounded parallelism**: a fixed pool of workers, never more than asked for
//! - **Failure isolation**: a corrupt or unreadable image fails only its own job
//! - **Progress reporting**: one serialized callback per finished job
//! - **Deterministic results**: the same outcomes at any parallelism level
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use batchthumb::{run_batch, BatchConfig, ConsoleReporter};
//!
//! let config = BatchConfig::new("./Images", "./OutputThumbnails").max_parallelism(4);
//! let reporter = ConsoleReporter::plain(0, true);
//! let report = run_batch(&config, &reporter, None)?;
//!
//! println!("{} thumbnails written", report.successful());
//! # Ok::<(), batchthumb::ThumbnailError>(())
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod parallel;
pub mod processing;

// Re-export commonly used types
pub use config::{BatchConfig, ImageFormat, LoggingConfig};
pub use discovery::discover_jobs;
pub use error::{FailureReason, Result, ThumbnailError};
pub use parallel::{
    BatchReport, BatchScheduler, CancellationToken, ConsoleReporter, Job, JobOutcome, JobStatus,
    JsonReporter, NoOpReporter, Reporter,
};
pub use processing::{FilterType, ImageTransform, ImageTransformer};

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` overrides the configured level. Calling this more than once
/// is harmless: only the first call installs a subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            ThumbnailError::config(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.json_format {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        tracing::subscriber::set_global_default(builder.finish()).is_ok()
    };

    if installed {
        info!("batchthumb v{} initialized", VERSION);
    }

    Ok(())
}

/// Enumerate the jobs for `config` without touching the filesystem.
///
/// Fails if the configuration is invalid, the input directory is missing or
/// it holds no eligible image.
pub fn plan_batch(config: &BatchConfig) -> Result<Vec<Job>> {
    collect_jobs(config, false)
}

/// Like [`plan_batch`], but creates the output directory (with parents)
/// once the input directory is known to exist, before enumerating.
pub fn prepare_batch(config: &BatchConfig) -> Result<Vec<Job>> {
    collect_jobs(config, true)
}

fn collect_jobs(config: &BatchConfig, create_output: bool) -> Result<Vec<Job>> {
    config.validate()?;

    if !config.input_dir.is_dir() {
        return Err(ThumbnailError::input_not_found(&config.input_dir));
    }

    if create_output {
        std::fs::create_dir_all(&config.output_dir)
            .map_err(|e| ThumbnailError::io(e, Some(config.output_dir.clone())))?;
    }

    let jobs = discovery::discover_for(config)?;
    if jobs.is_empty() {
        return Err(ThumbnailError::no_eligible_files(&config.input_dir));
    }

    Ok(jobs)
}

/// Run prepared jobs with the transformer and worker limit from `config`
pub fn dispatch_batch(
    config: &BatchConfig,
    jobs: &[Job],
    reporter: &dyn Reporter,
    cancellation: Option<CancellationToken>,
) -> Result<BatchReport> {
    let transformer = ImageTransformer::new()
        .with_quality(config.quality)
        .with_filter(config.filter);

    let mut scheduler = BatchScheduler::new(config.max_parallelism);
    if let Some(token) = cancellation {
        scheduler = scheduler.with_cancellation(token);
    }

    scheduler.run(jobs, &transformer, reporter)
}

/// Run a whole batch: prepare the output directory, enumerate, dispatch.
///
/// Fails before any job runs if the input directory is missing or holds no
/// eligible image. Per-image failures are reported in the returned outcomes.
pub fn run_batch(
    config: &BatchConfig,
    reporter: &dyn Reporter,
    cancellation: Option<CancellationToken>,
) -> Result<BatchReport> {
    let jobs = prepare_batch(config)?;
    dispatch_batch(config, &jobs, reporter, cancellation)
}

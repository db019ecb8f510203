//! Bounded worker pool that runs every job exactly once

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::time::{Duration, Instant};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Job, JobOutcome, JobStatus, Reporter, ThumbnailInfo};
use crate::config::default_parallelism;
use crate::error::{ErrorContext, Result, ThumbnailError};
use crate::processing::ImageTransform;

/// Cooperative stop signal checked by workers between jobs
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask workers to stop pulling new jobs
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Process-local counters for one batch
#[derive(Debug)]
pub struct BatchState {
    total: usize,
    completed: AtomicUsize,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Count one more finished job and return the new count
    fn record_completion(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Runs a static job list on a fixed number of workers
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    max_parallelism: usize,
    cancellation: Option<CancellationToken>,
}

impl BatchScheduler {
    /// Create a scheduler allowing at most `max_parallelism` active workers.
    ///
    /// Zero means one worker per available CPU.
    pub fn new(max_parallelism: usize) -> Self {
        let max_parallelism = if max_parallelism == 0 {
            default_parallelism()
        } else {
            max_parallelism
        };

        Self {
            max_parallelism,
            cancellation: None,
        }
    }

    /// Stop pulling jobs once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Number of workers actually started for `job_count` jobs
    pub fn worker_count(&self, job_count: usize) -> usize {
        self.max_parallelism.min(job_count).max(1)
    }

    /// Run every job and return the outcomes in completion order.
    ///
    /// Job failures never surface here; they become failed outcomes. The
    /// only error is a worker pool that cannot be started.
    pub fn run(
        &self,
        jobs: &[Job],
        transform: &dyn ImageTransform,
        reporter: &dyn Reporter,
    ) -> Result<BatchReport> {
        let start_time = Instant::now();
        let workers = self.worker_count(jobs.len());

        info!("Dispatching {} jobs to {} workers", jobs.len(), workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("{}{}", WORKER_THREAD_PREFIX, i))
            .build()
            .map_err(|e| ThumbnailError::parallel(format!("Failed to start worker pool: {}", e)))?;

        install_worker_panic_hook();

        let context = RunContext {
            jobs,
            collisions: find_output_collisions(jobs),
            transform,
            reporter,
            cancellation: self.cancellation.as_ref(),
            cursor: AtomicUsize::new(0),
            state: BatchState::new(jobs.len()),
            outcomes: Mutex::new(Vec::with_capacity(jobs.len())),
        };

        // The scope returns only after every worker has drained the list
        pool.scope(|scope| {
            for worker in 0..workers {
                let context = &context;
                scope.spawn(move |_| context.worker_loop(worker));
            }
        });

        let completed = context.state.completed();
        let outcomes = context
            .outcomes
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let report = BatchReport {
            outcomes,
            total: jobs.len(),
            completed,
            duration: start_time.elapsed(),
        };

        if report.skipped() > 0 {
            warn!("Batch cancelled: {} of {} jobs were not started", report.skipped(), report.total);
        }
        info!(
            "Batch finished in {:.2}s: {} succeeded, {} failed",
            report.duration.as_secs_f64(),
            report.successful(),
            report.failed()
        );

        reporter.on_batch_complete(&report);
        Ok(report)
    }
}

/// Shared, read-mostly state borrowed by every worker
struct RunContext<'a> {
    jobs: &'a [Job],
    collisions: HashMap<usize, PathBuf>,
    transform: &'a dyn ImageTransform,
    reporter: &'a dyn Reporter,
    cancellation: Option<&'a CancellationToken>,
    cursor: AtomicUsize,
    state: BatchState,
    outcomes: Mutex<Vec<JobOutcome>>,
}

impl RunContext<'_> {
    fn worker_loop(&self, worker: usize) {
        debug!("Worker {} started", worker);

        loop {
            if self.cancellation.is_some_and(CancellationToken::is_cancelled) {
                debug!("Worker {} stopping: batch cancelled", worker);
                break;
            }

            // fetch_add hands each index to exactly one worker
            let index = self.cursor.fetch_add(1, Ordering::SeqCst);
            let Some(job) = self.jobs.get(index) else {
                break;
            };

            let started = Instant::now();
            let status = match self.collisions.get(&index) {
                Some(existing) => JobStatus::from_error(&ThumbnailError::output_collision(
                    job.output_path(),
                    existing.clone(),
                )),
                None => self.execute(job),
            };

            self.emit(job, worker, status, started.elapsed());
        }

        debug!("Worker {} finished", worker);
    }

    /// Run one job, containing every error and panic at this boundary
    fn execute(&self, job: &Job) -> JobStatus {
        let result = panic::catch_unwind(AssertUnwindSafe(|| write_thumbnail(self.transform, job)))
            .unwrap_or_else(|payload| {
                Err(ThumbnailError::transform_panic(
                    panic_message(payload.as_ref()),
                    Some(job.source.clone()),
                ))
            });

        match result {
            Ok(info) => JobStatus::Success(info),
            Err(e) => {
                debug!("Job failed for {:?}: {}", job.source, e);
                JobStatus::from_error(&e)
            }
        }
    }

    /// Count, number, report and record one outcome as a single step
    fn emit(&self, job: &Job, worker: usize, status: JobStatus, elapsed: Duration) {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);

        let completed = self.state.record_completion();
        let outcome = JobOutcome {
            job: job.clone(),
            worker,
            sequence: completed,
            status,
            elapsed,
        };

        let reported = panic::catch_unwind(AssertUnwindSafe(|| {
            self.reporter.on_outcome(&outcome, completed, self.state.total());
        }));
        if reported.is_err() {
            warn!("Reporter panicked on {:?}; continuing", job.source);
        }

        outcomes.push(outcome);
    }
}

/// Transform one job and write its thumbnail
fn write_thumbnail(transform: &dyn ImageTransform, job: &Job) -> Result<ThumbnailInfo> {
    let encoded = transform.transform(&job.source, job.width, job.height)?;
    let output_path = job.output_path();

    std::fs::write(&output_path, &encoded.bytes).with_file_context(output_path.clone())?;

    Ok(ThumbnailInfo {
        output_path,
        width: encoded.width,
        height: encoded.height,
        source_width: encoded.source_width,
        source_height: encoded.source_height,
        bytes_written: encoded.bytes.len() as u64,
    })
}

/// Map each job whose output path clashes, ignoring case, with an earlier
/// job's output path to that earlier path.
pub fn find_output_collisions(jobs: &[Job]) -> HashMap<usize, PathBuf> {
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let mut collisions = HashMap::new();

    for (index, job) in jobs.iter().enumerate() {
        let output_path = job.output_path();
        let key = output_path.to_string_lossy().to_lowercase();

        match claimed.get(&key) {
            Some(existing) => {
                warn!("Output {:?} collides with {:?}; the later job will fail", output_path, existing);
                collisions.insert(index, existing.clone());
            }
            None => {
                claimed.insert(key, output_path);
            }
        }
    }

    collisions
}

const WORKER_THREAD_PREFIX: &str = "batchthumb-worker-";

static PANIC_HOOK: Once = Once::new();

/// Route panics on worker threads to the log instead of stderr.
///
/// They are already caught and turned into failed outcomes. Panics on any
/// other thread still go to the previously installed hook.
fn install_worker_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if is_worker_thread(std::thread::current().name()) {
                debug!("Worker panic contained: {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

fn is_worker_thread(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with(WORKER_THREAD_PREFIX))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of a batch run
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Outcomes in completion order
    pub outcomes: Vec<JobOutcome>,
    pub total: usize,
    pub completed: usize,
    pub duration: Duration,
}

/// Aggregate counts of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.successful()
    }

    /// Jobs never started because the batch was cancelled
    pub fn skipped(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    /// Get processing speed in files per second
    pub fn files_per_second(&self) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }
        self.completed as f64 / self.duration.as_secs_f64()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            successful: self.successful(),
            failed: self.failed(),
            skipped: self.skipped(),
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageFormat;
    use crate::error::FailureReason;
    use crate::parallel::NoOpReporter;
    use crate::processing::EncodedImage;
    use std::collections::HashSet;
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    /// Transform that fabricates a tiny payload and can be told to fail
    #[derive(Default)]
    struct FakeTransform {
        fail_on: HashSet<String>,
        panic_on: HashSet<String>,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeTransform {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail_on: names.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn panicking(names: &[&str]) -> Self {
            Self {
                panic_on: names.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self { delay, ..Default::default() }
        }
    }

    impl ImageTransform for FakeTransform {
        fn transform(&self, source: &Path, width: u32, height: u32) -> Result<EncodedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let name = source.file_name().unwrap().to_string_lossy().to_string();
            if self.panic_on.contains(&name) {
                panic!("decoder exploded on {}", name);
            }
            if self.fail_on.contains(&name) {
                return Err(ThumbnailError::decode("corrupt data", Some(source.to_path_buf())));
            }

            Ok(EncodedImage {
                bytes: name.into_bytes(),
                format: ImageFormat::Png,
                width,
                height: height / 2,
                source_width: width * 2,
                source_height: height,
            })
        }
    }

    /// Reporter that records every call
    #[derive(Default)]
    struct RecordingReporter {
        calls: Mutex<Vec<(String, usize, usize)>>,
        finished: AtomicUsize,
    }

    impl Reporter for RecordingReporter {
        fn on_outcome(&self, outcome: &JobOutcome, completed: usize, total: usize) {
            self.calls.lock().unwrap().push((outcome.job.file_name(), completed, total));
        }

        fn on_batch_complete(&self, _report: &BatchReport) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_jobs(output: &Path, count: usize) -> Vec<Job> {
        (0..count)
            .map(|i| Job::new(format!("/in/img{:03}.png", i), output, 150, 150))
            .collect()
    }

    fn outcome_set(report: &BatchReport) -> Vec<(String, bool)> {
        let mut set: Vec<_> = report
            .outcomes
            .iter()
            .map(|o| (o.job.file_name(), o.is_success()))
            .collect();
        set.sort();
        set
    }

    #[test]
    fn test_every_job_yields_one_outcome_for_any_parallelism() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 23);

        for parallelism in [1, 2, 3, 8, 64] {
            let report = BatchScheduler::new(parallelism)
                .run(&jobs, &FakeTransform::default(), &NoOpReporter)
                .unwrap();

            assert_eq!(report.outcomes.len(), 23, "P={}", parallelism);
            assert_eq!(report.completed, 23);
            assert!(report.is_complete());

            let sequences: Vec<usize> = report.outcomes.iter().map(|o| o.sequence).collect();
            assert_eq!(sequences, (1..=23).collect::<Vec<_>>());

            let distinct: HashSet<_> = report.outcomes.iter().map(|o| o.job.source.clone()).collect();
            assert_eq!(distinct.len(), 23);
        }
    }

    #[test]
    fn test_transform_called_once_per_job() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 40);
        let transform = FakeTransform::default();

        BatchScheduler::new(6).run(&jobs, &transform, &NoOpReporter).unwrap();
        assert_eq!(transform.calls.load(Ordering::SeqCst), 40);
    }

    #[test]
    fn test_failure_is_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 10);
        let transform = FakeTransform::failing(&["img004.png"]);

        let report = BatchScheduler::new(4).run(&jobs, &transform, &NoOpReporter).unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.successful(), 9);
        for outcome in &report.outcomes {
            if outcome.job.file_name() == "img004.png" {
                assert_eq!(outcome.failure_reason(), Some(FailureReason::Decode));
                assert!(outcome.error_detail().unwrap().contains("corrupt data"));
                assert!(!temp_dir.path().join("img004.png").exists());
            } else {
                assert!(outcome.is_success());
                assert!(temp_dir.path().join(outcome.job.file_name()).exists());
            }
        }
    }

    #[test]
    fn test_panic_is_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 8);
        let transform = FakeTransform::panicking(&["img002.png", "img005.png"]);

        let report = BatchScheduler::new(3).run(&jobs, &transform, &NoOpReporter).unwrap();

        assert_eq!(report.outcomes.len(), 8);
        assert_eq!(report.failed(), 2);
        let panicked: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| o.failure_reason() == Some(FailureReason::Panic))
            .map(|o| o.job.file_name())
            .collect();
        assert_eq!(panicked.len(), 2);
        assert!(panicked.contains(&"img002.png".to_string()));
    }

    #[test]
    fn test_write_failure_is_io_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let missing_output = temp_dir.path().join("does-not-exist");
        let jobs = make_jobs(&missing_output, 3);

        let report = BatchScheduler::new(2)
            .run(&jobs, &FakeTransform::default(), &NoOpReporter)
            .unwrap();

        assert_eq!(report.failed(), 3);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.failure_reason() == Some(FailureReason::Io)));
    }

    #[test]
    fn test_parallelism_is_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 24);
        let transform = FakeTransform::slow(Duration::from_millis(10));

        let report = BatchScheduler::new(3).run(&jobs, &transform, &NoOpReporter).unwrap();

        assert_eq!(report.completed, 24);
        let peak = transform.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency was {}", peak);
        let workers: HashSet<_> = report.outcomes.iter().map(|o| o.worker).collect();
        assert!(workers.iter().all(|&w| w < 3));
    }

    #[test]
    fn test_reporter_called_exactly_once_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 30);
        let reporter = RecordingReporter::default();

        BatchScheduler::new(5)
            .run(&jobs, &FakeTransform::failing(&["img010.png"]), &reporter)
            .unwrap();

        let calls = reporter.calls.lock().unwrap();
        assert_eq!(calls.len(), 30);
        let counts: Vec<usize> = calls.iter().map(|(_, completed, _)| *completed).collect();
        assert_eq!(counts, (1..=30).collect::<Vec<_>>());
        assert!(calls.iter().all(|(_, completed, total)| completed <= total && *total == 30));

        let names: HashSet<_> = calls.iter().map(|(name, _, _)| name.clone()).collect();
        assert_eq!(names.len(), 30);
        assert_eq!(reporter.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_outcomes_regardless_of_parallelism() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 50);
        let failing = ["img007.png", "img021.png", "img049.png"];

        let serial = BatchScheduler::new(1)
            .run(&jobs, &FakeTransform::failing(&failing), &NoOpReporter)
            .unwrap();
        let parallel = BatchScheduler::new(8)
            .run(&jobs, &FakeTransform::failing(&failing), &NoOpReporter)
            .unwrap();

        assert_eq!(outcome_set(&serial), outcome_set(&parallel));
        assert_eq!(serial.failed(), 3);
        assert!(serial.outcomes.iter().all(|o| o.worker == 0));
    }

    #[test]
    fn test_cancellation_stops_pulling() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 100);
        let token = CancellationToken::new();

        /// Cancels the batch as soon as the fifth job completes
        struct CancelAfter {
            token: CancellationToken,
        }
        impl Reporter for CancelAfter {
            fn on_outcome(&self, _outcome: &JobOutcome, completed: usize, _total: usize) {
                if completed == 5 {
                    self.token.cancel();
                }
            }
        }

        let report = BatchScheduler::new(2)
            .with_cancellation(token.clone())
            .run(
                &jobs,
                &FakeTransform::slow(Duration::from_millis(2)),
                &CancelAfter { token: token.clone() },
            )
            .unwrap();

        assert!(token.is_cancelled());
        // Workers finish the job in hand, so at most one extra per worker
        assert!(report.completed >= 5 && report.completed <= 7, "completed {}", report.completed);
        assert_eq!(report.outcomes.len(), report.completed);
        assert_eq!(report.completed + report.skipped(), 100);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_pre_cancelled_batch_runs_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = make_jobs(temp_dir.path(), 4);
        let token = CancellationToken::new();
        token.cancel();

        let transform = FakeTransform::default();
        let report = BatchScheduler::new(2)
            .with_cancellation(token)
            .run(&jobs, &transform, &NoOpReporter)
            .unwrap();

        assert_eq!(report.completed, 0);
        assert_eq!(report.skipped(), 4);
        assert_eq!(transform.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_case_only_collisions_are_flagged() {
        let temp_dir = TempDir::new().unwrap();
        let jobs = vec![
            Job::new("/in/Photo.JPG", temp_dir.path(), 150, 150),
            Job::new("/in/other.png", temp_dir.path(), 150, 150),
            Job::new("/in/photo.jpg", temp_dir.path(), 150, 150),
        ];

        let collisions = find_output_collisions(&jobs);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions.get(&2), Some(&temp_dir.path().join("Photo.JPG")));

        let transform = FakeTransform::default();
        let report = BatchScheduler::new(3).run(&jobs, &transform, &NoOpReporter).unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(transform.calls.load(Ordering::SeqCst), 2);
        let collided: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| o.failure_reason() == Some(FailureReason::OutputCollision))
            .collect();
        assert_eq!(collided.len(), 1);
        assert_eq!(collided[0].job.file_name(), "photo.jpg");
    }

    #[test]
    fn test_different_extensions_do_not_collide() {
        let jobs = vec![
            Job::new("/in/a.jpg", "/out", 1, 1),
            Job::new("/in/a.png", "/out", 1, 1),
        ];
        assert!(find_output_collisions(&jobs).is_empty());
    }

    #[test]
    fn test_empty_job_list() {
        let report = BatchScheduler::new(4)
            .run(&[], &FakeTransform::default(), &NoOpReporter)
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.is_complete());
        assert_eq!(report.summary().total, 0);
    }

    #[test]
    fn test_zero_parallelism_means_cpu_count() {
        let scheduler = BatchScheduler::new(0);
        assert_eq!(scheduler.max_parallelism(), num_cpus::get());
        assert_eq!(scheduler.worker_count(1_000), num_cpus::get());
    }

    #[test]
    fn test_worker_thread_names() {
        assert!(is_worker_thread(Some("batchthumb-worker-0")));
        assert!(is_worker_thread(Some("batchthumb-worker-12")));
        assert!(!is_worker_thread(Some("main")));
        assert!(!is_worker_thread(None));
    }

    #[test]
    fn test_panic_outside_workers_still_unwinds() {
        install_worker_panic_hook();
        let caught = std::thread::Builder::new()
            .name("not-a-worker".into())
            .spawn(|| panic!("ordinary panic"))
            .unwrap()
            .join();
        assert!(caught.is_err());
    }

    #[test]
    fn test_worker_count() {

        let scheduler = BatchScheduler::new(8);
        assert_eq!(scheduler.worker_count(3), 3);
        assert_eq!(scheduler.worker_count(100), 8);
        assert_eq!(scheduler.worker_count(0), 1);
    }

    #[test]
    fn test_batch_state_counts() {
        let state = BatchState::new(3);
        assert_eq!(state.record_completion(), 1);
        assert_eq!(state.record_completion(), 2);
        assert_eq!(state.completed(), 2);
        assert_eq!(state.total(), 3);
    }
}

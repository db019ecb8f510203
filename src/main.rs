//! batchthumb CLI - Parallel Batch Thumbnail Generator
//!
//! Writes a bounded thumbnail of every image in a directory, several at a
//! time, reporting each file as it finishes.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use console::style;
use tracing::{debug, info, warn};

use batchthumb::{
    dispatch_batch, init_logging, plan_batch, prepare_batch, BatchConfig, BatchReport,
    CancellationToken, ConsoleReporter, FilterType, JsonReporter, LoggingConfig, Reporter,
};

const USAGE: &str = "Usage: batchthumb <inputDir> <outputDir> [height] [width] [maxParallelism]";

/// batchthumb - Parallel Batch Thumbnail Generator
#[derive(Parser)]
#[command(
    name = "batchthumb",
    version,
    about = "Generate thumbnails for every image in a directory, in parallel",
    long_about = "batchthumb scans a directory for jpg, jpeg, png, bmp and gif files and writes a \
                  thumbnail of each one into the output directory. Thumbnails fit inside the \
                  bounding box with their aspect ratio kept and use the source file's format."
)]
struct Cli {
    /// Directory holding the source images
    #[arg(value_name = "INPUT_DIR")]
    input: Option<PathBuf>,

    /// Directory receiving the thumbnails (created if missing)
    #[arg(value_name = "OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Bounding box height in pixels (default 150)
    #[arg(value_name = "HEIGHT", allow_hyphen_values = true)]
    height: Option<String>,

    /// Bounding box width in pixels (default 150)
    #[arg(value_name = "WIDTH", allow_hyphen_values = true)]
    width: Option<String>,

    /// Maximum number of images processed at once (default: CPU count)
    #[arg(value_name = "MAX_PARALLELISM", allow_hyphen_values = true)]
    max_parallelism: Option<String>,

    /// JPEG output quality (1-100)
    #[arg(
        short,
        long,
        env = "BATCHTHUMB_QUALITY",
        default_value_t = batchthumb::config::DEFAULT_QUALITY,
        value_parser = clap::value_parser!(u8).range(1..=100),
        value_name = "QUALITY"
    )]
    quality: u8,

    /// Resampling filter
    #[arg(long, value_enum, default_value_t = CliFilter::CatmullRom, value_name = "FILTER")]
    filter: CliFilter,

    /// Print the jobs that would run without processing anything
    #[arg(long)]
    dry_run: bool,

    /// Output progress as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose")]
    quiet: bool,
}

/// CLI-compatible resampling filter enum
#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<CliFilter> for FilterType {
    fn from(filter: CliFilter) -> Self {
        match filter {
            CliFilter::Nearest => FilterType::Nearest,
            CliFilter::Triangle => FilterType::Triangle,
            CliFilter::CatmullRom => FilterType::CatmullRom,
            CliFilter::Gaussian => FilterType::Gaussian,
            CliFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = LoggingConfig::from_verbosity(cli.verbose, cli.quiet);
    if let Err(e) = init_logging(&logging) {
        eprintln!("{}: {}", style("Error").red().bold(), e);
        process::exit(1);
    }

    let (input, output) = match (&cli.input, &cli.output) {
        (Some(input), Some(output)) => (input.clone(), output.clone()),
        _ => {
            println!("{}", USAGE);
            println!("Run with --help for all options");
            return;
        }
    };

    let config = BatchConfig::from_positional(
        input,
        output,
        cli.height.as_deref(),
        cli.width.as_deref(),
        cli.max_parallelism.as_deref(),
    )
    .quality(cli.quality)
    .filter(cli.filter.into());

    if let Err(e) = run(&cli, config).await {
        eprintln!("{}: {:#}", style("Error").red().bold(), e);
        process::exit(1);
    }
}

/// Run the batch described by `config`
async fn run(cli: &Cli, config: BatchConfig) -> anyhow::Result<()> {
    if cli.dry_run {
        let jobs = plan_batch(&config)?;
        println!("{} files would be processed:", style(jobs.len()).bold());
        for job in &jobs {
            println!("  {} -> {}", job.source.display(), job.output_path().display());
        }
        return Ok(());
    }

    let jobs = prepare_batch(&config)?;

    if !cli.json {
        println!(
            "Processing {} files with parallelism = {}...",
            jobs.len(),
            config.max_parallelism
        );
        println!("Target size: {}x{}", config.width, config.height);
    }

    let reporter: Box<dyn Reporter> = if cli.json {
        Box::new(JsonReporter::stdout())
    } else if cli.quiet {
        Box::new(ConsoleReporter::plain(jobs.len(), false))
    } else {
        Box::new(ConsoleReporter::new(jobs.len(), true))
    };

    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing jobs in progress");
                token.cancel();
            }
        })
    };

    info!("Dispatching {} jobs", jobs.len());
    let report = tokio::task::spawn_blocking(move || {
        dispatch_batch(&config, &jobs, reporter.as_ref(), Some(token))
    })
    .await
    .context("Worker pool task failed")??;

    ctrl_c.abort();
    debug!("Batch report: {:?}", report.summary());

    if !cli.json {
        print_summary(&report, cli.quiet);
    }

    Ok(())
}

/// Print processing summary
fn print_summary(report: &BatchReport, quiet: bool) {
    if quiet {
        println!(
            "Done: {} succeeded, {} failed",
            report.successful(),
            report.failed()
        );
        return;
    }

    println!();
    println!("{}", style("Processing Summary:").bold());
    println!("  {}: {}", style("Processed").green(), report.successful());
    if report.failed() > 0 {
        println!("  {}: {}", style("Failed").red(), report.failed());
    }
    if report.skipped() > 0 {
        println!("  {}: {}", style("Skipped").yellow(), report.skipped());
    }
    println!("  {}: {:.2}s", style("Duration").blue(), report.duration.as_secs_f64());
    println!("  {}: {:.1} files/sec", style("Speed").cyan(), report.files_per_second());
}

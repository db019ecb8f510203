//! Job enumeration: the eligible images directly inside an input directory

use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::BatchConfig;
use crate::error::{Result, ThumbnailError};
use crate::parallel::Job;
use crate::processing::has_supported_extension;

/// Enumerate jobs for every recognized image directly inside `input_dir`.
///
/// Subdirectories are not entered. Jobs come back sorted by file name so
/// progress numbering is reproducible. An empty result is not an error.
pub fn discover_jobs(
    input_dir: &Path,
    output_dir: &Path,
    width: u32,
    height: u32,
) -> Result<Vec<Job>> {
    if !input_dir.is_dir() {
        return Err(ThumbnailError::input_not_found(input_dir));
    }

    let mut jobs = Vec::new();

    let walker = WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Unreadable entries (dangling links, races) only concern
                // their own file; images among them fail later as Io
                let Some(path) = e.path().map(Path::to_path_buf) else {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                };
                if e.depth() == 1 && has_supported_extension(&path) {
                    debug!("Queueing unreadable image {:?}: {}", path, e);
                    jobs.push(Job::new(path, output_dir, width, height));
                } else {
                    debug!("Skipping unreadable entry {:?}: {}", path, e);
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if has_supported_extension(entry.path()) {
            jobs.push(Job::new(entry.path(), output_dir, width, height));
        } else {
            debug!("Skipping unrecognized file: {:?}", entry.path());
        }
    }

    // Queued unreadable entries can arrive out of name order
    jobs.sort_by(|a, b| a.source.file_name().cmp(&b.source.file_name()));

    info!("Found {} image files in {:?}", jobs.len(), input_dir);
    Ok(jobs)
}

/// Enumerate jobs for a resolved configuration
pub fn discover_for(config: &BatchConfig) -> Result<Vec<Job>> {
    discover_jobs(&config.input_dir, &config.output_dir, config.width, config.height)
}

//! Configuration management for batchthumb

use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ThumbnailError};
use crate::processing::FilterType;

/// Default bounding box side when none (or garbage) is supplied
pub const DEFAULT_DIMENSION: u32 = 150;

/// Default JPEG quality for thumbnails
pub const DEFAULT_QUALITY: u8 = 75;

/// Batch configuration, resolved once before dispatch and read-only afterwards
#[derive(Debug, Clone, Serialize)]
pub struct BatchConfig {
    /// Directory scanned for source images
    pub input_dir: PathBuf,

    /// Directory receiving the thumbnails
    pub output_dir: PathBuf,

    /// Bounding box width in pixels
    pub width: u32,

    /// Bounding box height in pixels
    pub height: u32,

    /// Upper bound on concurrently active workers
    pub max_parallelism: usize,

    /// JPEG encoder quality (1-100)
    pub quality: u8,

    /// Resampling filter used by the resizer
    pub filter: FilterType,
}

impl BatchConfig {
    /// Build a configuration with default size, parallelism and encoding
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input_dir: P, output_dir: Q) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            max_parallelism: default_parallelism(),
            quality: DEFAULT_QUALITY,
            filter: FilterType::default(),
        }
    }

    /// Resolve a configuration from raw positional arguments.
    ///
    /// Size and parallelism arguments are lenient: anything absent,
    /// non-numeric or not positive falls back to the default.
    pub fn from_positional<P: Into<PathBuf>, Q: Into<PathBuf>>(
        input_dir: P,
        output_dir: Q,
        height: Option<&str>,
        width: Option<&str>,
        max_parallelism: Option<&str>,
    ) -> Self {
        let config = Self::new(input_dir, output_dir)
            .dimensions(parse_dimension(width), parse_dimension(height))
            .max_parallelism(parse_parallelism(max_parallelism));

        debug!("Resolved configuration: {:?}", config);
        config
    }

    /// Set the bounding box
    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the worker limit; zero means the host CPU count
    pub fn max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = if max_parallelism == 0 {
            default_parallelism()
        } else {
            max_parallelism
        };
        self
    }

    /// Set the JPEG quality
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Set the resampling filter
    pub fn filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ThumbnailError::config(
                "Width and height must be greater than 0",
            ));
        }

        if self.quality == 0 || self.quality > 100 {
            return Err(ThumbnailError::config(
                "Quality must be between 1 and 100",
            ));
        }

        Ok(())
    }
}

/// Number of available processing units on the host
pub fn default_parallelism() -> usize {
    num_cpus::get().max(1)
}

/// Parse a bounding box side, falling back to [`DEFAULT_DIMENSION`]
pub fn parse_dimension(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|&v| v > 0)
        .map_or(DEFAULT_DIMENSION, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// Parse a worker limit, falling back to the host CPU count
pub fn parse_parallelism(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|&v| v > 0)
        .map_or_else(default_parallelism, |v| {
            usize::try_from(v).unwrap_or(usize::MAX)
        })
}

/// Image formats a thumbnail can be written in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Gif,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Pick a level from the usual verbose/quiet switches
    pub fn from_verbosity(verbose: bool, quiet: bool) -> Self {
        let level = if quiet {
            "error"
        } else if verbose {
            "debug"
        } else {
            "warn"
        };

        Self {
            level: level.to_string(),
            ..Default::default()
        }
    }
}

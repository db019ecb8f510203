//! Error types and handling for batchthumb

use std::path::PathBuf;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for batchthumb operations
pub type Result<T> = std::result::Result<T, ThumbnailError>;

/// Main error type for batchthumb operations
#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// Input directory is missing or not a directory
    #[error("Input directory '{}' does not exist", path.display())]
    InputNotFound { path: PathBuf },

    /// Input directory holds no file with a recognized image extension
    #[error("No image files found in '{}'", path.display())]
    NoEligibleFiles { path: PathBuf },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Worker pool could not be set up
    #[error("Parallel processing error: {message}")]
    ParallelError { message: String },

    /// File extension outside the recognized set
    #[error("File extension '{format}' is not supported (file: {file:?})")]
    UnsupportedFormat {
        format: String,
        file: Option<PathBuf>,
    },

    /// Source bytes could not be decoded as an image
    #[error("Failed to decode image: {message} (file: {file:?})")]
    DecodeError {
        message: String,
        file: Option<PathBuf>,
    },

    /// Resized image could not be encoded
    #[error("Failed to encode image: {message} (file: {file:?})")]
    EncodeError {
        message: String,
        file: Option<PathBuf>,
    },

    /// I/O related errors
    #[error("I/O error: {source} (file: {file:?})")]
    Io {
        #[source]
        source: std::io::Error,
        file: Option<PathBuf>,
    },

    /// Another job in the same batch already claimed this output name
    #[error("Output '{}' collides with '{}'", file.display(), existing.display())]
    OutputCollision { file: PathBuf, existing: PathBuf },

    /// The transform panicked while working on this file
    #[error("Transform panicked: {message} (file: {file:?})")]
    TransformPanic {
        message: String,
        file: Option<PathBuf>,
    },
}

/// Coarse classification of a per-job failure, carried on outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnsupportedFormat,
    Decode,
    Encode,
    Io,
    OutputCollision,
    Panic,
    Other,
}

impl ThumbnailError {
    /// Create a new input-not-found error
    pub fn input_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::InputNotFound { path: path.into() }
    }

    /// Create a new no-eligible-files error
    pub fn no_eligible_files<P: Into<PathBuf>>(path: P) -> Self {
        Self::NoEligibleFiles { path: path.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new parallel processing error
    pub fn parallel<S: Into<String>>(message: S) -> Self {
        Self::ParallelError {
            message: message.into(),
        }
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S, file: Option<PathBuf>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
            file,
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::DecodeError {
            message: message.into(),
            file,
        }
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::EncodeError {
            message: message.into(),
            file,
        }
    }

    /// Wrap an I/O error with the file it concerns
    pub fn io(source: std::io::Error, file: Option<PathBuf>) -> Self {
        Self::Io { source, file }
    }

    pub fn output_collision(file: PathBuf, existing: PathBuf) -> Self {
        Self::OutputCollision { file, existing }
    }

    pub fn transform_panic<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::TransformPanic {
            message: message.into(),
            file,
        }
    }

    /// Check if this error is recoverable (the batch can continue)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // These errors end the run before any job is dispatched
            Self::InputNotFound { .. }
            | Self::NoEligibleFiles { .. }
            | Self::ConfigError { .. }
            | Self::ParallelError { .. } => false,

            // These errors affect individual files only
            Self::UnsupportedFormat { .. }
            | Self::DecodeError { .. }
            | Self::EncodeError { .. }
            | Self::Io { .. }
            | Self::OutputCollision { .. }
            | Self::TransformPanic { .. } => true,
        }
    }

    /// Classify this error for a failed job outcome
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::UnsupportedFormat { .. } => FailureReason::UnsupportedFormat,
            Self::DecodeError { .. } => FailureReason::Decode,
            Self::EncodeError { .. } => FailureReason::Encode,
            Self::Io { .. } => FailureReason::Io,
            Self::OutputCollision { .. } => FailureReason::OutputCollision,
            Self::TransformPanic { .. } => FailureReason::Panic,
            _ => FailureReason::Other,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::UnsupportedFormat { file, .. }
            | Self::DecodeError { file, .. }
            | Self::EncodeError { file, .. }
            | Self::Io { file, .. }
            | Self::TransformPanic { file, .. } => file.as_ref(),

            Self::OutputCollision { file, .. } => Some(file),
            Self::InputNotFound { path } | Self::NoEligibleFiles { path } => Some(path),

            _ => None,
        }
    }

    /// Get a short message suitable for a per-file console line
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat { format, .. } => {
                format!("File extension '{}' is not supported. Supported: jpg, jpeg, png, bmp, gif", format)
            }
            Self::DecodeError { message, .. } => format!("Could not decode image: {}", message),
            Self::EncodeError { message, .. } => format!("Could not encode thumbnail: {}", message),
            Self::Io { source, .. } => format!("File system error: {}", source),
            Self::TransformPanic { message, .. } => format!("Image library panicked: {}", message),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for ThumbnailError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err, None)
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Add file context to an error
    fn with_file_context(self, file: PathBuf) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ThumbnailError>,
{
    fn with_file_context(self, file: PathBuf) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();

            // Add file context if not already present
            match &mut error {
                ThumbnailError::UnsupportedFormat { file: ref mut f, .. }
                | ThumbnailError::DecodeError { file: ref mut f, .. }
                | ThumbnailError::EncodeError { file: ref mut f, .. }
                | ThumbnailError::Io { file: ref mut f, .. }
                | ThumbnailError::TransformPanic { file: ref mut f, .. } => {
                    if f.is_none() {
                        *f = Some(file);
                    }
                }
                _ => {}
            }

            error
        })
    }
}

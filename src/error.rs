//! Error types for pipeline construction and execution.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while building or running a pipeline.
///
/// Configuration problems surface from constructors, before any resource
/// is touched. Resource problems surface when a source or sink is acquired.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A record field failed validation.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Invalid or conflicting configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An extension already has a handler and override was not requested.
    #[error(
        "Handler for extension '{extension}' is already registered ({existing}); use force to overwrite"
    )]
    HandlerConflict { extension: String, existing: String },

    /// A file or folder did not exist when it was acquired.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Any other I/O failure.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An element could not be routed into a pipeline.
    #[error("Unsupported type for pipeline: {0}")]
    Unsupported(String),

    /// Syntax error in a pipeline definition.
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Wrap an I/O error, mapping `NotFound` onto its own variant.
    pub fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            PipelineError::NotFound(path.to_path_buf())
        } else {
            PipelineError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// True for errors raised before any resource is touched.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidRecord(_)
                | PipelineError::Config(_)
                | PipelineError::HandlerConflict { .. }
        )
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the segmentation driver.
///
/// Variants map onto the three failure classes the drivers care about:
/// setup errors that end the program (`Configuration`, `Restore`,
/// `MetricNotFound`, `Validation`), per-process errors (`Spawn`,
/// `ProcessFailed`, `Timeout`) whose severity depends on the caller, and
/// archive errors which are only ever reported.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Search state could not be restored from {path:?}: {reason}")]
    Restore { path: PathBuf, reason: String },

    #[error("No trial reports the metric `{metric}`")]
    MetricNotFound { metric: String },

    #[error("Failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status})")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s and was killed")]
    Timeout { program: String, secs: u64 },

    #[error("Archive error: could not write {path:?}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DriverError>;

impl DriverError {
    pub(crate) fn file_system(
        path: impl Into<PathBuf>,
        operation: &str,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            path: path.into(),
            operation: operation.to_string(),
            source,
        }
    }
}

/// Fallback for I/O errors raised without path context.
///
/// Call sites that know the path should build `DriverError::FileSystem`
/// themselves.
impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        Self::file_system("unknown", "unknown", err)
    }
}

impl From<walkdir::Error> for DriverError {
    fn from(err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("unknown"));
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        Self::file_system(path, "directory walk", source)
    }
}

impl From<zip::result::ZipError> for DriverError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive {
            path: PathBuf::from("unknown"),
            source: err,
        }
    }
}

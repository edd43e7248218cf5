use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the storage layer.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the time-series store.
///
/// Nothing in this crate retries or recovers; every variant is surfaced to the
/// caller that drives the time stepping.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backing directory or file could not be created at setup.
    #[error("failed to initialise storage at '{path}': {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A time value does not exactly match any coordinate of the axis.
    #[error("time value {value} is not a coordinate of the '{axis}' axis")]
    CoordinateMismatch { axis: &'static str, value: f64 },

    /// Time values are all valid coordinates but not adjacent ones.
    #[error("time values are not contiguous: index {found} follows index {previous}")]
    NonContiguousRange { previous: usize, found: usize },

    /// A batch array does not have the shape its backing file expects.
    #[error("'{name}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Axis coordinates are empty, non-finite or not strictly increasing.
    #[error("invalid '{axis}' axis: {detail}")]
    InvalidAxis { axis: &'static str, detail: String },

    /// A durable write, sync or read failed mid-run.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A backing file is truncated or not in the expected layout.
    #[error("malformed array file '{path}': {detail}")]
    Format { path: PathBuf, detail: String },

    /// The parameter mapping cannot be represented as structured text.
    #[error("parameter serialization failed: {0}")]
    Serialization(String),

    /// The store has been finalised; no further writes are accepted.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StorageError::Io { path, source }
    }

    pub(crate) fn init(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StorageError::Init { path, source }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        StorageError::Format {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

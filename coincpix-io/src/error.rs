//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Array element type that cannot be read.
    #[error("unsupported dtype '{0}'")]
    UnsupportedDtype(String),

    /// Array contents do not fit the requested element type.
    #[error("value {value} at element {index} is not a valid {target}")]
    InvalidValue {
        /// Flat element index in file order.
        index: usize,
        /// Offending value.
        value: f64,
        /// Requested element type.
        target: &'static str,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] coincpix_core::Error),
}

//! Error types for coincpix-core.

use thiserror::Error;

/// Result type alias for coincpix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for coincpix operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Array does not have the expected layout.
    #[error("invalid array shape: expected {expected}, got {got:?}")]
    InvalidShape {
        expected: &'static str,
        got: Vec<usize>,
    },

    /// Selection mask does not match the number of records.
    #[error("mask length {mask} does not match {records} records")]
    MaskLength { mask: usize, records: usize },

    /// Bin size must be a positive integer.
    #[error("invalid {axis} bin size: {value}")]
    InvalidBinSize { axis: char, value: i64 },

    /// Threshold fraction outside of (0, 1].
    #[error("invalid threshold {0}: must be in (0, 1]")]
    InvalidThreshold(f64),

    /// Time window with inverted bounds.
    #[error("invalid time window: min {min} > max {max}")]
    InvalidTimeWindow { min: i64, max: i64 },

    /// Row crop with an empty or inverted range.
    #[error("invalid crop [{lower}, {upper}) for {rows} rows")]
    InvalidCrop {
        lower: usize,
        upper: usize,
        rows: usize,
    },

    /// A statistic was requested on an empty input.
    #[error("cannot compute {0} of an empty dataset")]
    EmptyDataset(&'static str),

    /// Template has no extent or no contrast.
    #[error("reference template is empty")]
    EmptyTemplate,

    /// Numerical computation could not produce a result.
    #[error("computation error: {0}")]
    Computation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Failure reported by the detector toolkit.
    #[error("detector toolkit error: {0}")]
    Toolkit(String),
}

//! Error types for data operations.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while building or transforming series.
#[derive(Debug, Error)]
pub enum DataError {
    /// Too few observations to derive anything from the series
    #[error("Empty series: need at least {required} observations, got {actual}")]
    EmptySeries {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Price at or below zero
    #[error("Non-positive price {price} on {date}")]
    NonPositivePrice {
        /// Date of the offending observation
        date: NaiveDate,
        /// Offending price
        price: f64,
    },

    /// NaN or infinite value where a finite one is required
    #[error("Non-finite value on {0}")]
    NonFinite(NaiveDate),

    /// Timestamps not strictly increasing (includes duplicates)
    #[error("Timestamps must be strictly increasing: {previous} is followed by {next}")]
    UnorderedTimestamps {
        /// Earlier position in the series
        previous: NaiveDate,
        /// Later position in the series
        next: NaiveDate,
    },

    /// Lengths of paired inputs differ
    #[error("Length mismatch: {dates} dates but {values} values")]
    LengthMismatch {
        /// Number of timestamps
        dates: usize,
        /// Number of values
        values: usize,
    },

    /// Asset identifier appears twice in a matrix
    #[error("Duplicate asset: {0}")]
    DuplicateAsset(String),

    /// Matrix has no assets
    #[error("Price matrix has no assets")]
    NoAssets,

    /// Asset identifier not present in a matrix
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

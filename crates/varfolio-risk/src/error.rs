//! Error types for risk estimation.

use crate::covariance::CovarianceError;
use thiserror::Error;
use varfolio_data::DataError;

/// Result type for risk estimation.
pub type Result<T> = std::result::Result<T, RiskError>;

/// Errors raised by the risk metrics, beta, VaR and expected-return estimators.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Not enough finite observations for the statistic
    #[error("Empty series: need at least {required} finite observations, got {actual}")]
    EmptySeries {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Too few dates left after aligning two series
    #[error("Insufficient overlap: need at least {required} aligned observations, got {actual}")]
    InsufficientOverlap {
        /// Required number of aligned observations
        required: usize,
        /// Actual number of aligned observations
        actual: usize,
    },

    /// Confidence level outside the open interval (0, 1)
    #[error("Invalid confidence level: {0} (must be strictly between 0 and 1)")]
    InvalidConfidence(f64),

    /// Two inputs describe different asset sets
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Benchmark returns have zero variance, so beta is undefined
    #[error("Market returns have zero variance")]
    ZeroMarketVariance,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error building series
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Covariance estimation error
    #[error("Covariance error: {0}")]
    Covariance(#[from] CovarianceError),
}

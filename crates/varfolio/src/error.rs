//! Error type for the end-to-end analysis pipeline.

use thiserror::Error;
use varfolio_data::DataError;
use varfolio_optim::OptimizerError;
use varfolio_risk::{CovarianceError, RiskError};

/// Result type for the analysis pipeline.
pub type Result<T> = std::result::Result<T, VarfolioError>;

/// Failure at any stage between a price table and a portfolio report.
#[derive(Debug, Error)]
pub enum VarfolioError {
    /// Price data error
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Risk metric or return model error
    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    /// Covariance estimation error
    #[error("Covariance error: {0}")]
    Covariance(#[from] CovarianceError),

    /// Optimization error
    #[error("Optimization error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// Asset named in the configuration is missing from the prices
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Configuration cannot be used as given
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

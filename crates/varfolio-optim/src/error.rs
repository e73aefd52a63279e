//! Error types for portfolio optimization.

use crate::solver::SolverError;
use thiserror::Error;
use varfolio_risk::{CovarianceError, RiskError};

/// Result type for portfolio optimization.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Errors raised while configuring or solving a portfolio optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Expected returns and covariance describe different assets
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The requested return or volatility cannot be reached
    #[error("Infeasible target: {0}")]
    InfeasibleTarget(String),

    /// No portfolio satisfies the bounds and constraints
    #[error("Infeasible constraints: {0}")]
    InfeasibleConstraint(String),

    /// Covariance is not usable by the solver
    #[error("Singular covariance: {0}")]
    SingularCovariance(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Constraint refers to an asset outside the universe
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// The solver stopped before reaching its tolerances
    #[error("Optimization did not converge after {iterations} iterations")]
    NotConverged {
        /// Iterations run
        iterations: usize,
    },

    /// Solver failure not covered above
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    /// Covariance matrix error
    #[error("Covariance error: {0}")]
    Covariance(#[from] CovarianceError),

    /// Expected-return error
    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),
}

impl OptimizerError {
    /// Translate a solver failure, reporting infeasibility as a constraint problem.
    pub(crate) fn from_solver(err: SolverError) -> Self {
        match err {
            SolverError::PrimalInfeasible { .. } => Self::InfeasibleConstraint(
                "no portfolio satisfies the bounds and constraints".to_string(),
            ),
            SolverError::MaxIterations { iterations, .. } => Self::NotConverged { iterations },
            other => Self::Solver(other),
        }
    }
}

//! Asset covariance estimation
//!
//! Estimators turn a `T x N` matrix of periodic returns into an annualized
//! `N x N` covariance matrix. [`CovarianceMatrix`] attaches asset labels to the
//! raw array so the optimizer can match it against an expected-return vector.

pub mod exponential;
pub mod ledoit_wolf;
pub mod sample;
pub mod utils;

pub use exponential::{ExponentialCovarianceConfig, ExponentialCovarianceEstimator};
pub use ledoit_wolf::{LedoitWolfConfig, LedoitWolfEstimator, ShrinkageTarget};
pub use sample::{SampleCovarianceConfig, SampleCovarianceEstimator};
pub use utils::{
    EigenDecomposition, clip_eigenvalues, condition_number, is_positive_semidefinite,
    jacobi_eigendecomp, min_eigenvalue,
};

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use varfolio_data::ReturnMatrix;

/// Errors that can occur during covariance estimation
#[derive(Debug, Error)]
pub enum CovarianceError {
    /// Insufficient data for estimation
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Matrix is not positive semidefinite
    #[error("Covariance matrix is not positive semidefinite (min eigenvalue {0})")]
    NotPositiveSemidefinite(f64),

    /// Invalid span parameter
    #[error("Invalid span: {0} (must be at least 1)")]
    InvalidSpan(f64),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Asset not present in the matrix
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Matrix contains NaN or infinite entries
    #[error("Covariance matrix contains non-finite entries")]
    NonFinite,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Trait for covariance matrix estimators
pub trait CovarianceEstimator {
    /// Estimate the annualized covariance matrix from periodic returns
    ///
    /// # Arguments
    /// * `returns` - Matrix where each row is a time period and each column is an asset
    ///
    /// # Returns
    /// * Estimated covariance matrix (N x N where N is number of assets)
    fn estimate(&self, returns: &Array2<f64>) -> Result<Array2<f64>, CovarianceError>;

    /// Estimate a labelled covariance matrix from a return matrix.
    fn covariance(&self, returns: &ReturnMatrix) -> Result<CovarianceMatrix, CovarianceError> {
        let matrix = self.estimate(returns.values())?;
        CovarianceMatrix::new(returns.assets().to_vec(), matrix)
    }
}

/// Keep only rows where every asset has a finite return.
pub(crate) fn finite_rows(returns: &Array2<f64>) -> Array2<f64> {
    let keep: Vec<usize> = returns
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
        .map(|(t, _)| t)
        .collect();
    if keep.len() == returns.nrows() {
        return returns.clone();
    }
    tracing::warn!(
        dropped = returns.nrows() - keep.len(),
        "dropping return rows with non-finite values"
    );
    returns.select(Axis(0), &keep)
}

/// Subtract each column's mean.
pub(crate) fn demean(returns: &Array2<f64>) -> Array2<f64> {
    match returns.mean_axis(Axis(0)) {
        Some(means) => returns - &means.insert_axis(Axis(0)),
        None => returns.clone(),
    }
}

pub(crate) fn check_observations(
    returns: &Array2<f64>,
    min_observations: usize,
) -> Result<(), CovarianceError> {
    let required = min_observations.max(2);
    if returns.nrows() < required {
        return Err(CovarianceError::InsufficientData {
            required,
            actual: returns.nrows(),
        });
    }
    if returns.ncols() == 0 {
        return Err(CovarianceError::DimensionMismatch {
            expected: 1,
            actual: 0,
        });
    }
    Ok(())
}

/// Annualized covariance matrix labelled by asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    assets: Vec<String>,
    matrix: Array2<f64>,
}

impl CovarianceMatrix {
    /// Wrap a square matrix whose rows and columns follow `assets`.
    pub fn new(assets: Vec<String>, matrix: Array2<f64>) -> Result<Self, CovarianceError> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(CovarianceError::DimensionMismatch {
                expected: rows,
                actual: cols,
            });
        }
        if rows != assets.len() {
            return Err(CovarianceError::DimensionMismatch {
                expected: assets.len(),
                actual: rows,
            });
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(CovarianceError::NonFinite);
        }
        Ok(Self { assets, matrix })
    }

    /// Asset labels in row/column order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Raw `N x N` array.
    pub const fn values(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Consume into the raw array.
    pub fn into_values(self) -> Array2<f64> {
        self.matrix
    }

    /// Number of assets.
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Position of an asset.
    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Covariance between two assets.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.matrix[[self.index_of(a)?, self.index_of(b)?]])
    }

    /// Variance of one asset.
    pub fn variance(&self, asset: &str) -> Option<f64> {
        self.get(asset, asset)
    }

    /// Whether the matrix equals its transpose within `tolerance`.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let n = self.n_assets();
        (0..n).all(|i| {
            (i + 1..n).all(|j| (self.matrix[[i, j]] - self.matrix[[j, i]]).abs() <= tolerance)
        })
    }

    /// Correlation matrix. Zero-variance assets get zero correlation with
    /// every other asset and one on the diagonal.
    pub fn correlation(&self) -> Array2<f64> {
        let std_devs: Array1<f64> = self.matrix.diag().mapv(|v| v.max(0.0).sqrt());
        Array2::from_shape_fn(self.matrix.dim(), |(i, j)| {
            if i == j {
                1.0
            } else if std_devs[i] > 0.0 && std_devs[j] > 0.0 {
                (self.matrix[[i, j]] / (std_devs[i] * std_devs[j])).clamp(-1.0, 1.0)
            } else {
                0.0
            }
        })
    }

    /// Permute rows and columns into the order of `assets`.
    ///
    /// The requested set must equal this matrix's asset set.
    pub fn reorder(&self, assets: &[String]) -> Result<Self, CovarianceError> {
        if assets.len() != self.n_assets() {
            return Err(CovarianceError::DimensionMismatch {
                expected: self.n_assets(),
                actual: assets.len(),
            });
        }
        let order = assets
            .iter()
            .map(|a| {
                self.index_of(a)
                    .ok_or_else(|| CovarianceError::UnknownAsset(a.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let matrix = Array2::from_shape_fn(self.matrix.dim(), |(i, j)| {
            self.matrix[[order[i], order[j]]]
        });
        Self::new(assets.to_vec(), matrix)
    }

    /// Whether every eigenvalue is at least `-tolerance`.
    pub fn is_positive_semidefinite(&self, tolerance: f64) -> bool {
        is_positive_semidefinite(&self.matrix, tolerance)
    }

    /// Smallest eigenvalue.
    pub fn min_eigenvalue(&self) -> Result<f64, CovarianceError> {
        min_eigenvalue(&self.matrix)
    }

    /// Ratio of the largest to the smallest eigenvalue.
    pub fn condition_number(&self) -> f64 {
        condition_number(&self.matrix)
    }

    /// Repair a matrix with negative eigenvalues by clipping them to zero.
    ///
    /// A matrix that is already positive semidefinite is returned unchanged.
    pub fn fix_nonpositive_semidefinite(&self) -> Result<Self, CovarianceError> {
        if self.is_positive_semidefinite(1e-12) {
            return Ok(self.clone());
        }
        tracing::warn!("covariance matrix is not positive semidefinite, clipping eigenvalues");
        let fixed = clip_eigenvalues(&self.matrix, 0.0)?;
        let symmetric = (&fixed + &fixed.t()) / 2.0;
        Self::new(self.assets.clone(), symmetric)
    }

    /// `wᵀ Σ w` for weights in this matrix's asset order.
    pub fn portfolio_variance(&self, weights: &Array1<f64>) -> Result<f64, CovarianceError> {
        if weights.len() != self.n_assets() {
            return Err(CovarianceError::DimensionMismatch {
                expected: self.n_assets(),
                actual: weights.len(),
            });
        }
        Ok(weights.dot(&self.matrix.dot(weights)))
    }
}

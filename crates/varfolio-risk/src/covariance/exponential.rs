//! Exponentially weighted covariance estimator
//!
//! Gives more weight to recent observations. Each pair of assets uses the
//! exponentially weighted mean of the products of deviations from the plain
//! sample mean:
//!
//! Cov(i,j) = Σ_t w_t (r_ti − r̄_i)(r_tj − r̄_j) / Σ_t w_t,  w_t = (1-α)^(T-1-t)
//!
//! with α = 2 / (span + 1), then annualized by the frequency.

use super::{CovarianceError, CovarianceEstimator, check_observations, demean, finite_rows};
use crate::stats::TRADING_DAYS_PER_YEAR;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Exponentially weighted covariance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialCovarianceConfig {
    /// Span of the exponential window in periods (default: 180)
    pub span: f64,
    /// Periods per year used for annualization (default: 252)
    pub frequency: usize,
    /// Minimum number of observations required (default: 2)
    pub min_observations: usize,
}

impl Default for ExponentialCovarianceConfig {
    fn default() -> Self {
        Self {
            span: 180.0,
            frequency: TRADING_DAYS_PER_YEAR,
            min_observations: 2,
        }
    }
}

/// Exponentially weighted covariance estimator
#[derive(Debug, Clone, Default)]
pub struct ExponentialCovarianceEstimator {
    config: ExponentialCovarianceConfig,
}

impl ExponentialCovarianceEstimator {
    /// Create a new estimator, rejecting spans below one period
    pub fn new(config: ExponentialCovarianceConfig) -> Result<Self, CovarianceError> {
        if !config.span.is_finite() || config.span < 1.0 {
            return Err(CovarianceError::InvalidSpan(config.span));
        }
        Ok(Self { config })
    }

    /// Smoothing factor α = 2 / (span + 1)
    pub fn alpha(&self) -> f64 {
        2.0 / (self.config.span + 1.0)
    }

    /// Get the half-life of the weights (in periods)
    ///
    /// Half-life = ln(0.5) / ln(1 - α)
    pub fn half_life(&self) -> f64 {
        0.5_f64.ln() / (1.0 - self.alpha()).ln()
    }

    /// Normalized weights for `n_periods` observations, oldest first
    fn weights(&self, n_periods: usize) -> Array1<f64> {
        let decay = 1.0 - self.alpha();
        let raw = Array1::from_shape_fn(n_periods, |t| decay.powi((n_periods - 1 - t) as i32));
        let total = raw.sum();
        raw / total
    }
}

impl CovarianceEstimator for ExponentialCovarianceEstimator {
    fn estimate(&self, returns: &Array2<f64>) -> Result<Array2<f64>, CovarianceError> {
        let returns = finite_rows(returns);
        check_observations(&returns, self.config.min_observations)?;

        let weights = self.weights(returns.nrows());
        let centered = demean(&returns);
        let weighted = &centered * &weights.view().insert_axis(Axis(1));
        let cov = weighted.t().dot(&centered);

        Ok(cov * self.config.frequency as f64)
    }
}

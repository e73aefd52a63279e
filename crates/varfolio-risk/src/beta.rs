//! CAPM beta estimation
//!
//! Beta measures the sensitivity of an asset's returns to market returns.
//! Two estimators are provided:
//!
//! - covariance ratio: `Cov(asset, market) / Var(market)` (sample moments)
//! - least squares through the origin: `sum(x*y) / sum(x*x)`, with the usual
//!   regression diagnostics
//!
//! Both operate on series inner-joined by date. On clean data they agree in
//! sign and rough magnitude; they differ only by the treatment of the means.

use crate::error::{Result, RiskError};
use crate::stats;
use serde::{Deserialize, Serialize};
use varfolio_data::{PriceSeries, ReturnSeries, log_returns};

/// Configuration for beta estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaConfig {
    /// Minimum number of aligned observations (default: 30)
    pub min_overlap: usize,
}

impl Default for BetaConfig {
    fn default() -> Self {
        Self { min_overlap: 30 }
    }
}

/// Least-squares fit of asset returns on market returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    /// Slope coefficient
    pub beta: f64,
    /// Coefficient of determination (uncentered, as the fit has no intercept)
    pub r_squared: f64,
    /// Standard error of the slope
    pub std_error: f64,
    /// t-statistic of the slope (`beta / std_error`)
    pub t_stat: f64,
    /// Residual variance `SSR / (n - 1)`
    pub residual_variance: f64,
    /// Number of aligned observations used
    pub n_observations: usize,
}

/// Beta estimator over date-aligned return series
#[derive(Debug, Clone, Default)]
pub struct BetaEstimator {
    config: BetaConfig,
}

impl BetaEstimator {
    /// Create a new estimator with the given configuration
    pub const fn new(config: BetaConfig) -> Self {
        Self { config }
    }

    /// Estimator configuration
    pub const fn config(&self) -> &BetaConfig {
        &self.config
    }

    fn aligned(&self, asset: &ReturnSeries, market: &ReturnSeries) -> Result<(Vec<f64>, Vec<f64>)> {
        let (_, a, m) = asset.align(market);
        let required = self.config.min_overlap.max(2);
        if a.len() < required {
            return Err(RiskError::InsufficientOverlap {
                required,
                actual: a.len(),
            });
        }
        Ok((a, m))
    }

    /// `Cov(asset, market) / Var(market)` on the aligned observations.
    pub fn beta_by_covariance(&self, asset: &ReturnSeries, market: &ReturnSeries) -> Result<f64> {
        let (a, m) = self.aligned(asset, market)?;
        let var_m = stats::sample_variance(&m).unwrap_or(0.0);
        if var_m <= f64::EPSILON * f64::EPSILON {
            return Err(RiskError::ZeroMarketVariance);
        }
        let cov = stats::sample_covariance(&a, &m).unwrap_or(0.0);
        Ok(cov / var_m)
    }

    /// Ordinary least squares of asset on market without intercept.
    pub fn beta_by_regression(
        &self,
        asset: &ReturnSeries,
        market: &ReturnSeries,
    ) -> Result<RegressionResult> {
        let (y, x) = self.aligned(asset, market)?;
        let n = y.len();

        let sxx: f64 = x.iter().map(|v| v * v).sum();
        if sxx <= f64::EPSILON * f64::EPSILON {
            return Err(RiskError::ZeroMarketVariance);
        }
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| a * b).sum();
        let syy: f64 = y.iter().map(|v| v * v).sum();
        let beta = sxy / sxx;

        let ssr: f64 = x
            .iter()
            .zip(&y)
            .map(|(xi, yi)| (yi - beta * xi).powi(2))
            .sum();
        let residual_variance = ssr / (n - 1) as f64;
        let std_error = (residual_variance / sxx).sqrt();
        let r_squared = if syy > 0.0 { 1.0 - ssr / syy } else { 1.0 };
        let t_stat = if std_error > 0.0 {
            beta / std_error
        } else {
            f64::INFINITY.copysign(beta)
        };

        Ok(RegressionResult {
            beta,
            r_squared,
            std_error,
            t_stat,
            residual_variance,
            n_observations: n,
        })
    }

    /// Covariance beta from two price series, using log returns.
    pub fn beta_from_prices(&self, asset: &PriceSeries, market: &PriceSeries) -> Result<f64> {
        let a = log_returns(asset)?;
        let m = log_returns(market)?;
        self.beta_by_covariance(&a, &m)
    }
}

//! Sample covariance estimator
//!
//! Unbiased (ddof = 1) covariance of periodic returns, scaled by the number of
//! periods per year. A zero-variance asset yields a zero row and column.

use super::{CovarianceError, CovarianceEstimator, check_observations, demean, finite_rows};
use crate::stats::TRADING_DAYS_PER_YEAR;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Sample covariance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleCovarianceConfig {
    /// Periods per year used for annualization (default: 252)
    pub frequency: usize,
    /// Minimum number of observations required (default: 2)
    pub min_observations: usize,
}

impl Default for SampleCovarianceConfig {
    fn default() -> Self {
        Self {
            frequency: TRADING_DAYS_PER_YEAR,
            min_observations: 2,
        }
    }
}

/// Annualized sample covariance estimator
#[derive(Debug, Clone, Default)]
pub struct SampleCovarianceEstimator {
    config: SampleCovarianceConfig,
}

impl SampleCovarianceEstimator {
    /// Create a new estimator with the given configuration
    pub const fn new(config: SampleCovarianceConfig) -> Self {
        Self { config }
    }
}

impl CovarianceEstimator for SampleCovarianceEstimator {
    fn estimate(&self, returns: &Array2<f64>) -> Result<Array2<f64>, CovarianceError> {
        let returns = finite_rows(returns);
        check_observations(&returns, self.config.min_observations)?;

        let n_periods = returns.nrows() as f64;
        let centered = demean(&returns);
        let cov = centered.t().dot(&centered) / (n_periods - 1.0);

        Ok(cov * self.config.frequency as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use ndarray::array;
    use varfolio_data::{ReturnKind, ReturnMatrix};

    #[test]
    fn test_known_covariance() {
        let returns = array![[0.01, 0.02], [-0.01, 0.00], [0.03, 0.04], [0.01, 0.02]];
        let est = SampleCovarianceEstimator::new(SampleCovarianceConfig {
            frequency: 1,
            ..Default::default()
        });
        let cov = est.estimate(&returns).unwrap();

        // Column means 0.01 and 0.02; deviations (0, -0.02, 0.02, 0) for both.
        assert_relative_eq!(cov[[0, 0]], 0.0008 / 3.0, epsilon = 1e-15);
        assert_relative_eq!(cov[[0, 1]], 0.0008 / 3.0, epsilon = 1e-15);
        assert_relative_eq!(cov[[1, 1]], 0.0008 / 3.0, epsilon = 1e-15);
    }

    #[test]
    fn test_annualization() {
        let returns = array![[0.01, 0.02], [-0.01, 0.00], [0.03, 0.05]];
        let daily = SampleCovarianceEstimator::new(SampleCovarianceConfig {
            frequency: 1,
            ..Default::default()
        })
        .estimate(&returns)
        .unwrap();
        let annual = SampleCovarianceEstimator::default().estimate(&returns).unwrap();
        for (d, a) in daily.iter().zip(annual.iter()) {
            assert_relative_eq!(*a, d * 252.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_zero_variance_asset_contributes_zero() {
        let returns = array![[0.01, 0.0], [-0.02, 0.0], [0.015, 0.0]];
        let cov = SampleCovarianceEstimator::default().estimate(&returns).unwrap();
        assert_eq!(cov[[1, 1]], 0.0);
        assert_eq!(cov[[0, 1]], 0.0);
        assert!(cov[[0, 0]] > 0.0);
    }

    #[test]
    fn test_skips_non_finite_rows() {
        let with_nan = array![[f64::NAN, 0.01], [0.01, 0.02], [-0.01, 0.0], [0.02, 0.01]];
        let clean = array![[0.01, 0.02], [-0.01, 0.0], [0.02, 0.01]];
        let est = SampleCovarianceEstimator::default();
        assert_eq!(est.estimate(&with_nan).unwrap(), est.estimate(&clean).unwrap());
    }

    #[test]
    fn test_insufficient_data() {
        let returns = array![[0.01, 0.02]];
        assert!(matches!(
            SampleCovarianceEstimator::default().estimate(&returns),
            Err(CovarianceError::InsufficientData { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_labelled_covariance() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = start.iter_days().take(3).collect();
        let matrix = ReturnMatrix::new(
            vec!["AAA".to_string(), "BBB".to_string()],
            dates,
            array![[0.01, 0.02], [-0.01, 0.00], [0.03, 0.05]],
            ReturnKind::Simple,
        )
        .unwrap();
        let cov = SampleCovarianceEstimator::default()
            .covariance(&matrix)
            .unwrap();
        assert_eq!(cov.assets(), matrix.assets());
        assert!(cov.is_symmetric(1e-15));
        assert!(cov.variance("BBB").unwrap() > cov.variance("AAA").unwrap());
    }
}

//! Ledoit-Wolf Shrinkage Covariance Estimator
//!
//! Implements the analytical shrinkage estimators from:
//! - "A well-conditioned estimator for large-dimensional covariance matrices"
//!   (Ledoit & Wolf, 2004), constant-variance target
//! - "Honey, I Shrunk the Sample Covariance Matrix" (Ledoit & Wolf, 2004),
//!   constant-correlation target
//!
//! The estimator has the form:
//! Σ_LW = δ* F + (1-δ*) S
//!
//! where:
//! - S is the maximum-likelihood sample covariance (divisor T, centered returns)
//! - F is the shrinkage target
//! - δ* = clamp((π̂ - ρ̂) / (T γ̂), 0, 1) is the optimal shrinkage intensity
//!
//! with π̂ the summed asymptotic variance of the entries of S, ρ̂ the summed
//! asymptotic covariance between F and S, and γ̂ = ‖S − F‖²_F. The result is
//! annualized after shrinkage, so δ* does not depend on the frequency.

use super::{CovarianceError, CovarianceEstimator, check_observations, demean, finite_rows};
use crate::stats::TRADING_DAYS_PER_YEAR;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Shrinkage target types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkageTarget {
    /// Identity matrix scaled by average variance: F = μ I where μ = trace(S)/N
    #[default]
    ConstantVariance,

    /// Sample variances with a single average correlation off the diagonal
    ConstantCorrelation,

    /// Sample variances with zero covariances
    Diagonal,
}

/// Ledoit-Wolf covariance estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedoitWolfConfig {
    /// Minimum number of observations required (default: 2)
    pub min_observations: usize,

    /// Shrinkage target type (default: ConstantVariance)
    pub target: ShrinkageTarget,

    /// Periods per year used for annualization (default: 252)
    pub frequency: usize,
}

impl Default for LedoitWolfConfig {
    fn default() -> Self {
        Self {
            min_observations: 2,
            target: ShrinkageTarget::ConstantVariance,
            frequency: TRADING_DAYS_PER_YEAR,
        }
    }
}

/// Shrunk covariance together with the intensity that produced it
#[derive(Debug, Clone)]
pub struct Shrinkage {
    /// Shrunk covariance (periodic, not annualized)
    pub covariance: Array2<f64>,
    /// Target matrix F
    pub target: Array2<f64>,
    /// Optimal intensity δ*
    pub intensity: f64,
}

/// Ledoit-Wolf shrinkage covariance estimator
#[derive(Debug, Clone, Default)]
pub struct LedoitWolfEstimator {
    config: LedoitWolfConfig,
}

impl LedoitWolfEstimator {
    /// Create a new Ledoit-Wolf estimator with the given configuration
    pub const fn new(config: LedoitWolfConfig) -> Self {
        Self { config }
    }

    /// Maximum-likelihood covariance of centered returns: S = XᵀX / T
    fn sample_covariance(centered: &Array2<f64>) -> Array2<f64> {
        centered.t().dot(centered) / centered.nrows() as f64
    }

    /// Compute the shrinkage target matrix F
    fn shrinkage_target(&self, sample_cov: &Array2<f64>) -> (Array2<f64>, f64) {
        let n_assets = sample_cov.nrows();

        match self.config.target {
            ShrinkageTarget::ConstantVariance => {
                let mu = sample_cov.diag().sum() / n_assets as f64;
                (Array2::eye(n_assets) * mu, 0.0)
            }

            ShrinkageTarget::Diagonal => (Array2::from_diag(&sample_cov.diag()), 0.0),

            ShrinkageTarget::ConstantCorrelation => {
                let std_devs: Array1<f64> = sample_cov.diag().mapv(|v| v.max(0.0).sqrt());

                let mut sum_corr = 0.0;
                let mut count = 0usize;
                for i in 0..n_assets {
                    for j in (i + 1)..n_assets {
                        if std_devs[i] > 0.0 && std_devs[j] > 0.0 {
                            sum_corr += sample_cov[[i, j]] / (std_devs[i] * std_devs[j]);
                            count += 1;
                        }
                    }
                }
                let avg_corr = if count > 0 {
                    sum_corr / count as f64
                } else {
                    0.0
                };

                let target = Array2::from_shape_fn((n_assets, n_assets), |(i, j)| {
                    if i == j {
                        sample_cov[[i, i]]
                    } else {
                        avg_corr * std_devs[i] * std_devs[j]
                    }
                });
                (target, avg_corr)
            }
        }
    }

    /// Optimal intensity δ* for centered returns, their sample covariance and target.
    fn compute_shrinkage_intensity(
        &self,
        centered: &Array2<f64>,
        sample_cov: &Array2<f64>,
        target: &Array2<f64>,
        avg_corr: f64,
    ) -> f64 {
        let (n_periods, n_assets) = centered.dim();
        let t = n_periods as f64;

        let gamma_hat: f64 = sample_cov
            .iter()
            .zip(target.iter())
            .map(|(s, f)| (s - f).powi(2))
            .sum();
        if gamma_hat <= 0.0 {
            return 0.0;
        }

        // π̂_ij = (1/T) Σ_t (x_ti x_tj − s_ij)², computed as E[x_i² x_j²] − s_ij²
        let squared = centered.mapv(|v| v * v);
        let pi_mat = squared.t().dot(&squared) / t - sample_cov.mapv(|v| v * v);
        let pi_hat = pi_mat.sum();

        let rho_hat = match self.config.target {
            ShrinkageTarget::ConstantVariance => 0.0,
            ShrinkageTarget::Diagonal => pi_mat.diag().sum(),
            ShrinkageTarget::ConstantCorrelation => {
                // θ̂_ij = (1/T) Σ_t (x_ti² − s_ii)(x_ti x_tj − s_ij)
                let cubed = centered.mapv(|v| v * v * v);
                let third = cubed.t().dot(centered) / t;
                let std_devs: Array1<f64> = sample_cov.diag().mapv(|v| v.max(0.0).sqrt());

                let mut rho_off = 0.0;
                for i in 0..n_assets {
                    for j in 0..n_assets {
                        if i == j || std_devs[i] <= 0.0 || std_devs[j] <= 0.0 {
                            continue;
                        }
                        let theta_ij = third[[i, j]] - sample_cov[[i, i]] * sample_cov[[i, j]];
                        rho_off += std_devs[j] / std_devs[i] * theta_ij;
                    }
                }
                pi_mat.diag().sum() + avg_corr * rho_off
            }
        };

        ((pi_hat - rho_hat) / (t * gamma_hat)).clamp(0.0, 1.0)
    }

    fn shrink(&self, returns: &Array2<f64>) -> Result<Shrinkage, CovarianceError> {
        let returns = finite_rows(returns);
        check_observations(&returns, self.config.min_observations)?;

        let centered = demean(&returns);
        let sample_cov = Self::sample_covariance(&centered);
        let (target, avg_corr) = self.shrinkage_target(&sample_cov);
        let intensity =
            self.compute_shrinkage_intensity(&centered, &sample_cov, &target, avg_corr);

        tracing::debug!(
            target = ?self.config.target,
            intensity,
            n_periods = returns.nrows(),
            n_assets = returns.ncols(),
            "ledoit-wolf shrinkage"
        );

        let covariance = &target * intensity + &sample_cov * (1.0 - intensity);
        Ok(Shrinkage {
            covariance,
            target,
            intensity,
        })
    }

    /// Optimal shrinkage intensity δ* for the given returns (diagnostics)
    pub fn shrinkage_intensity(&self, returns: &Array2<f64>) -> Result<f64, CovarianceError> {
        Ok(self.shrink(returns)?.intensity)
    }

    /// Shrunk covariance, target and intensity before annualization
    pub fn shrinkage(&self, returns: &Array2<f64>) -> Result<Shrinkage, CovarianceError> {
        self.shrink(returns)
    }
}

impl CovarianceEstimator for LedoitWolfEstimator {
    fn estimate(&self, returns: &Array2<f64>) -> Result<Array2<f64>, CovarianceError> {
        let shrunk = self.shrink(returns)?;
        Ok(shrunk.covariance * self.config.frequency as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::is_positive_semidefinite;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use rstest::rstest;

    fn noisy_returns(n_periods: usize, n_assets: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out = Array2::zeros((n_periods, n_assets));
        for t in 0..n_periods {
            let common: f64 = rng.gen_range(-0.01..0.01);
            for i in 0..n_assets {
                let own: f64 = rng.gen_range(-0.02..0.02);
                out[[t, i]] = common * (1.0 + 0.2 * i as f64) + own;
            }
        }
        out
    }

    /// Direct transcription of the intensity definitions, one entry at a time.
    fn brute_force_intensity(returns: &Array2<f64>, target: ShrinkageTarget) -> f64 {
        let (t_len, n) = returns.dim();
        let t = t_len as f64;
        let x = demean(returns);
        let s = x.t().dot(&x) / t;
        let sd: Vec<f64> = (0..n).map(|i| s[[i, i]].sqrt()).collect();

        let pi = |i: usize, j: usize| -> f64 {
            (0..t_len)
                .map(|k| (x[[k, i]] * x[[k, j]] - s[[i, j]]).powi(2))
                .sum::<f64>()
                / t
        };
        let theta = |i: usize, j: usize| -> f64 {
            (0..t_len)
                .map(|k| (x[[k, i]].powi(2) - s[[i, i]]) * (x[[k, i]] * x[[k, j]] - s[[i, j]]))
                .sum::<f64>()
                / t
        };

        let mut r_bar = 0.0;
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    r_bar += s[[i, j]] / (sd[i] * sd[j]);
                }
            }
        }
        r_bar /= (n * (n - 1)) as f64;

        let mu = (0..n).map(|i| s[[i, i]]).sum::<f64>() / n as f64;
        let f = |i: usize, j: usize| -> f64 {
            match target {
                ShrinkageTarget::ConstantVariance => {
                    if i == j {
                        mu
                    } else {
                        0.0
                    }
                }
                ShrinkageTarget::Diagonal => {
                    if i == j {
                        s[[i, i]]
                    } else {
                        0.0
                    }
                }
                ShrinkageTarget::ConstantCorrelation => {
                    if i == j {
                        s[[i, i]]
                    } else {
                        r_bar * sd[i] * sd[j]
                    }
                }
            }
        };

        let mut pi_hat = 0.0;
        let mut gamma_hat = 0.0;
        let mut rho_hat = 0.0;
        for i in 0..n {
            for j in 0..n {
                pi_hat += pi(i, j);
                gamma_hat += (s[[i, j]] - f(i, j)).powi(2);
                match target {
                    ShrinkageTarget::ConstantVariance => {}
                    ShrinkageTarget::Diagonal => {
                        if i == j {
                            rho_hat += pi(i, i);
                        }
                    }
                    ShrinkageTarget::ConstantCorrelation => {
                        if i == j {
                            rho_hat += pi(i, i);
                        } else {
                            rho_hat += r_bar / 2.0
                                * ((sd[j] / sd[i]) * theta(i, j) + (sd[i] / sd[j]) * theta(j, i));
                        }
                    }
                }
            }
        }
        ((pi_hat - rho_hat) / (t * gamma_hat)).clamp(0.0, 1.0)
    }

    #[test]
    fn test_config_default() {
        let config = LedoitWolfConfig::default();
        assert_eq!(config.min_observations, 2);
        assert_eq!(config.target, ShrinkageTarget::ConstantVariance);
        assert_eq!(config.frequency, 252);
    }

    #[test]
    fn test_insufficient_data() {
        let estimator = LedoitWolfEstimator::default();
        let returns = Array2::<f64>::zeros((1, 3));
        assert!(matches!(
            estimator.estimate(&returns),
            Err(CovarianceError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_constant_variance_target() {
        let estimator = LedoitWolfEstimator::default();
        let sample_cov = array![[4.0, 1.0, 0.5], [1.0, 9.0, 1.5], [0.5, 1.5, 16.0]];
        let (target, _) = estimator.shrinkage_target(&sample_cov);

        let mu = 29.0 / 3.0;
        assert_relative_eq!(target[[0, 0]], mu, epsilon = 1e-12);
        assert_relative_eq!(target[[2, 2]], mu, epsilon = 1e-12);
        assert_eq!(target[[0, 1]], 0.0);
    }

    #[test]
    fn test_constant_correlation_target() {
        let estimator = LedoitWolfEstimator::new(LedoitWolfConfig {
            target: ShrinkageTarget::ConstantCorrelation,
            ..Default::default()
        });
        let sample_cov = array![[4.0, 2.0, 0.0], [2.0, 9.0, 3.0], [0.0, 3.0, 16.0]];
        let (target, avg_corr) = estimator.shrinkage_target(&sample_cov);

        // Correlations 1/3, 0 and 1/4.
        let expected = (1.0 / 3.0 + 0.0 + 0.25) / 3.0;
        assert_relative_eq!(avg_corr, expected, epsilon = 1e-12);
        assert_relative_eq!(target[[0, 1]], expected * 2.0 * 3.0, epsilon = 1e-12);
        assert_eq!(target[[1, 1]], 9.0);
    }

    #[rstest]
    #[case(ShrinkageTarget::ConstantVariance)]
    #[case(ShrinkageTarget::Diagonal)]
    #[case(ShrinkageTarget::ConstantCorrelation)]
    fn test_intensity_matches_definition(#[case] target: ShrinkageTarget) {
        let returns = noisy_returns(60, 5, 11);
        let estimator = LedoitWolfEstimator::new(LedoitWolfConfig {
            target,
            ..Default::default()
        });
        let delta = estimator.shrinkage_intensity(&returns).unwrap();
        assert!((0.0..=1.0).contains(&delta));
        assert_relative_eq!(delta, brute_force_intensity(&returns, target), epsilon = 1e-10);
    }

    #[rstest]
    #[case(ShrinkageTarget::ConstantVariance)]
    #[case(ShrinkageTarget::Diagonal)]
    #[case(ShrinkageTarget::ConstantCorrelation)]
    fn test_estimate_is_symmetric_psd(#[case] target: ShrinkageTarget) {
        let returns = noisy_returns(12, 10, 3);
        let estimator = LedoitWolfEstimator::new(LedoitWolfConfig {
            target,
            ..Default::default()
        });
        let cov = estimator.estimate(&returns).unwrap();

        for i in 0..10 {
            for j in 0..10 {
                assert_relative_eq!(cov[[i, j]], cov[[j, i]], epsilon = 1e-15);
            }
        }
        assert!(is_positive_semidefinite(&cov, 1e-10));
    }

    #[test]
    fn test_shrinkage_improves_conditioning() {
        // Fewer observations than assets: the sample covariance is singular.
        let returns = noisy_returns(8, 10, 5);
        let shrunk = LedoitWolfEstimator::default().estimate(&returns).unwrap();
        let centered = demean(&returns);
        let sample = LedoitWolfEstimator::sample_covariance(&centered) * 252.0;

        let sample_max = sample.diag().iter().copied().fold(0.0, f64::max);
        let sample_min = crate::covariance::min_eigenvalue(&sample).unwrap();
        assert!(sample_min.abs() < 1e-10 * sample_max);
        let shrunk_cond = crate::covariance::condition_number(&shrunk);
        assert!(shrunk_cond.is_finite() && shrunk_cond < 1e4);
    }

    #[test]
    fn test_no_shrinkage_when_sample_equals_target() {
        // Orthogonal columns with equal variance: S is already μ I.
        let returns = array![[1.0, 1.0], [1.0, -1.0], [-1.0, 1.0], [-1.0, -1.0]];
        let delta = LedoitWolfEstimator::default()
            .shrinkage_intensity(&returns)
            .unwrap();
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn test_diagonal_preserved_by_variance_targets() {
        let returns = noisy_returns(40, 4, 9);
        let diag = LedoitWolfEstimator::new(LedoitWolfConfig {
            target: ShrinkageTarget::Diagonal,
            frequency: 1,
            ..Default::default()
        });
        let shrunk = diag.shrinkage(&returns).unwrap();
        let centered = demean(&returns);
        let sample = LedoitWolfEstimator::sample_covariance(&centered);
        for i in 0..4 {
            assert_relative_eq!(shrunk.covariance[[i, i]], sample[[i, i]], epsilon = 1e-15);
        }
    }

    #[test]
    fn test_annualization_scales_result() {
        let returns = noisy_returns(30, 3, 1);
        let daily = LedoitWolfEstimator::new(LedoitWolfConfig {
            frequency: 1,
            ..Default::default()
        })
        .estimate(&returns)
        .unwrap();
        let annual = LedoitWolfEstimator::default().estimate(&returns).unwrap();
        assert_relative_eq!(annual[[0, 1]], daily[[0, 1]] * 252.0, epsilon = 1e-14);
    }
}

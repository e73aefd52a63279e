//! Value-at-Risk
//!
//! Three estimators of the `(1 - confidence)` quantile of the return
//! distribution, all reported as a signed return (negative = loss):
//!
//! - historical: empirical quantile of observed returns
//! - parametric: quantile of a fitted normal distribution
//! - Monte Carlo: empirical quantile of simulated normal returns
//!
//! Monte-Carlo paths are produced by [`simulate_paths`], a pure function that
//! seeds every path from `(seed, path_index)` and generates paths in parallel.
//! The pooled sample is therefore identical for any thread count.

use crate::error::{Result, RiskError};
use crate::stats;
use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use varfolio_data::ReturnSeries;

/// Check that a confidence level lies strictly inside `(0, 1)`.
pub fn validate_confidence(confidence: f64) -> Result<()> {
    if confidence.is_finite() && confidence > 0.0 && confidence < 1.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidConfidence(confidence))
    }
}

/// Empirical `(1 - confidence)` quantile of the finite returns.
pub fn historical_var(returns: &[f64], confidence: f64) -> Result<f64> {
    validate_confidence(confidence)?;
    let finite: Vec<f64> = returns.iter().copied().filter(|v| v.is_finite()).collect();
    stats::quantile(&finite, 1.0 - confidence).ok_or(RiskError::EmptySeries {
        required: 1,
        actual: 0,
    })
}

/// `(1 - confidence)` quantile of `Normal(mean, std_dev)`.
///
/// A zero standard deviation is a degenerate distribution whose every
/// quantile is `mean`.
pub fn parametric_var(mean: f64, std_dev: f64, confidence: f64) -> Result<f64> {
    validate_confidence(confidence)?;
    if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
        return Err(RiskError::InvalidParameter(format!(
            "normal parameters must be finite with std_dev >= 0, got mean={mean}, std_dev={std_dev}"
        )));
    }
    if std_dev == 0.0 {
        return Ok(mean);
    }
    let normal =
        Normal::new(mean, std_dev).map_err(|e| RiskError::InvalidParameter(e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - confidence))
}

/// Per-path seed derived from the base seed and path index (SplitMix64).
fn path_seed(seed: u64, path: u64) -> u64 {
    let mut z = seed
        .wrapping_add(path.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Simulate `n_paths` independent paths of `horizon_days` daily returns.
///
/// Returns an `n_paths x horizon_days` array; row `i` depends only on `seed`
/// and `i`.
pub fn simulate_paths(
    mean: f64,
    std_dev: f64,
    horizon_days: usize,
    n_paths: usize,
    seed: u64,
) -> Result<Array2<f64>> {
    if horizon_days == 0 || n_paths == 0 {
        return Err(RiskError::InvalidParameter(format!(
            "horizon_days and n_paths must be positive, got {horizon_days} and {n_paths}"
        )));
    }
    if !mean.is_finite() || !std_dev.is_finite() || std_dev < 0.0 {
        return Err(RiskError::InvalidParameter(format!(
            "normal parameters must be finite with std_dev >= 0, got mean={mean}, std_dev={std_dev}"
        )));
    }

    let flat: Vec<f64> = (0..n_paths)
        .into_par_iter()
        .flat_map_iter(|path| {
            let mut rng = StdRng::seed_from_u64(path_seed(seed, path as u64));
            (0..horizon_days)
                .map(|_| {
                    let z: f64 = rng.sample(StandardNormal);
                    mean + std_dev * z
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    Array2::from_shape_vec((n_paths, horizon_days), flat)
        .map_err(|e| RiskError::InvalidParameter(e.to_string()))
}

/// Monte-Carlo VaR: the historical VaR of the pooled simulated sample.
pub fn monte_carlo_var(
    mean: f64,
    std_dev: f64,
    horizon_days: usize,
    n_paths: usize,
    confidence: f64,
    seed: u64,
) -> Result<f64> {
    validate_confidence(confidence)?;
    let paths = simulate_paths(mean, std_dev, horizon_days, n_paths, seed)?;
    let pooled: Vec<f64> = paths.iter().copied().collect();
    historical_var(&pooled, confidence)
}

/// Monte-Carlo simulation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of simulated paths (default: 1000)
    pub n_paths: usize,
    /// Daily returns per path (default: 252)
    pub horizon_days: usize,
    /// Base RNG seed (default: 42)
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_paths: 1000,
            horizon_days: 252,
            seed: 42,
        }
    }
}

/// Configuration for [`VarEngine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VarConfig {
    /// Confidence levels to report (default: 0.90, 0.95, 0.99)
    pub confidence_levels: Vec<f64>,
    /// Monte-Carlo settings
    pub monte_carlo: MonteCarloConfig,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            confidence_levels: vec![0.90, 0.95, 0.99],
            monte_carlo: MonteCarloConfig::default(),
        }
    }
}

/// VaR estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    /// Empirical quantile
    Historical,
    /// Normal quantile
    Parametric,
    /// Simulated normal quantile
    MonteCarlo,
}

/// One VaR figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    /// Estimation method
    pub method: VarMethod,
    /// Confidence level
    pub confidence: f64,
    /// Signed return at the quantile (negative = loss)
    pub value: f64,
}

impl VarEstimate {
    /// Signed currency amount for a position of `portfolio_value`.
    pub fn loss_amount(&self, portfolio_value: f64) -> f64 {
        self.value * portfolio_value
    }
}

/// VaR at every configured confidence level and method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarReport {
    /// Mean of the finite returns
    pub mean: f64,
    /// Sample standard deviation of the finite returns
    pub std_dev: f64,
    /// Number of finite observations
    pub n_observations: usize,
    /// Estimates ordered by confidence, then method
    pub estimates: Vec<VarEstimate>,
}

impl VarReport {
    /// Look up one estimate.
    pub fn get(&self, method: VarMethod, confidence: f64) -> Option<&VarEstimate> {
        self.estimates
            .iter()
            .find(|e| e.method == method && (e.confidence - confidence).abs() < 1e-12)
    }
}

/// Value-at-Risk engine
#[derive(Debug, Clone, Default)]
pub struct VarEngine {
    config: VarConfig,
}

impl VarEngine {
    /// Create an engine, validating every configured confidence level.
    pub fn new(config: VarConfig) -> Result<Self> {
        for &c in &config.confidence_levels {
            validate_confidence(c)?;
        }
        if config.monte_carlo.n_paths == 0 || config.monte_carlo.horizon_days == 0 {
            return Err(RiskError::InvalidParameter(
                "Monte-Carlo n_paths and horizon_days must be positive".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Engine configuration
    pub const fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Historical, parametric and Monte-Carlo VaR of a return series.
    ///
    /// The normal fit uses the mean and sample standard deviation of the
    /// finite returns.
    pub fn report(&self, returns: &ReturnSeries) -> Result<VarReport> {
        let values = returns.finite_values();
        let mean = stats::mean(&values).ok_or(RiskError::EmptySeries {
            required: 2,
            actual: values.len(),
        })?;
        let std_dev = stats::sample_variance(&values)
            .map(f64::sqrt)
            .ok_or(RiskError::EmptySeries {
                required: 2,
                actual: values.len(),
            })?;

        let mc = self.config.monte_carlo;
        let paths = simulate_paths(mean, std_dev, mc.horizon_days, mc.n_paths, mc.seed)?;
        let pooled: Vec<f64> = paths.iter().copied().collect();

        let mut estimates = Vec::with_capacity(self.config.confidence_levels.len() * 3);
        for &confidence in &self.config.confidence_levels {
            estimates.push(VarEstimate {
                method: VarMethod::Historical,
                confidence,
                value: historical_var(&values, confidence)?,
            });
            estimates.push(VarEstimate {
                method: VarMethod::Parametric,
                confidence,
                value: parametric_var(mean, std_dev, confidence)?,
            });
            estimates.push(VarEstimate {
                method: VarMethod::MonteCarlo,
                confidence,
                value: historical_var(&pooled, confidence)?,
            });
        }
        tracing::debug!(
            n_observations = values.len(),
            mean,
            std_dev,
            n_estimates = estimates.len(),
            "computed VaR report"
        );

        Ok(VarReport {
            mean,
            std_dev,
            n_observations: values.len(),
            estimates,
        })
    }
}

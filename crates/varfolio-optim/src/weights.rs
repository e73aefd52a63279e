//! Portfolio weights and weight cleaning

use crate::error::{OptimizerError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SUM_TOLERANCE: f64 = 1e-9;
const ROUNDING_TOLERANCE: f64 = 1e-12;

/// Settings for [`PortfolioWeights::clean`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Weights with magnitude below this are set to zero (default: 1e-4)
    pub threshold: f64,
    /// Decimal places to round to, if any (default: none)
    pub rounding: Option<u32>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            threshold: 1e-4,
            rounding: None,
        }
    }
}

/// Weight per asset, in the optimizer's asset order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
    assets: Vec<String>,
    values: Array1<f64>,
}

impl PortfolioWeights {
    /// Pair asset labels with weights.
    pub fn new(assets: Vec<String>, values: Array1<f64>) -> Result<Self> {
        if assets.len() != values.len() {
            return Err(OptimizerError::DimensionMismatch(format!(
                "{} assets but {} weights",
                assets.len(),
                values.len()
            )));
        }
        Ok(Self { assets, values })
    }

    /// Asset labels.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Weights in asset order.
    pub const fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether there are no assets.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Weight of one asset.
    pub fn get(&self, asset: &str) -> Option<f64> {
        let idx = self.assets.iter().position(|a| a == asset)?;
        Some(self.values[idx])
    }

    /// Iterate over `(asset, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.assets
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Sum of weights.
    pub fn sum(&self) -> f64 {
        self.values.sum()
    }

    /// Weights keyed by asset.
    pub fn to_map(&self) -> HashMap<String, f64> {
        self.iter().map(|(a, w)| (a.to_string(), w)).collect()
    }

    /// Number of non-zero weights.
    pub fn n_holdings(&self) -> usize {
        self.values.iter().filter(|w| **w != 0.0).count()
    }

    /// Whether cleaning with `config` would leave the weights unchanged.
    pub fn is_clean(&self, config: &CleanConfig) -> bool {
        let no_dust = self
            .values
            .iter()
            .all(|w| *w == 0.0 || w.abs() >= config.threshold);
        let rounded = config.rounding.is_none_or(|decimals| {
            self.values
                .iter()
                .all(|w| (w - round_to(*w, decimals)).abs() <= ROUNDING_TOLERANCE)
        });
        no_dust && rounded && (self.sum() - 1.0).abs() <= SUM_TOLERANCE
    }

    /// Zero out weights below the threshold and renormalize to sum to one.
    ///
    /// With rounding, the rounding residual goes to the largest position.
    /// Cleaning already-clean weights returns them unchanged.
    pub fn clean(&self, config: &CleanConfig) -> Result<Self> {
        if !(config.threshold >= 0.0 && config.threshold.is_finite()) {
            return Err(OptimizerError::InvalidParameter(format!(
                "cleaning threshold must be non-negative, got {}",
                config.threshold
            )));
        }
        if self.is_clean(config) {
            return Ok(self.clone());
        }

        let mut values = self.values.clone();
        // Each extra pass zeroes at least one more weight, so this settles.
        for _ in 0..=values.len() {
            values.mapv_inplace(|w| if w.abs() < config.threshold { 0.0 } else { w });
            let total = values.sum();
            if total.abs() <= f64::EPSILON {
                return Err(OptimizerError::InvalidParameter(
                    "no weight survives the cleaning threshold".to_string(),
                ));
            }
            values /= total;

            if let Some(decimals) = config.rounding {
                values.mapv_inplace(|w| round_to(w, decimals));
                let residual = 1.0 - values.sum();
                if let Some(largest) = largest_position(&values) {
                    values[largest] += residual;
                }
            }

            let candidate = Self {
                assets: self.assets.clone(),
                values: values.clone(),
            };
            if candidate.is_clean(config) {
                return Ok(candidate);
            }
        }

        Ok(Self {
            assets: self.assets.clone(),
            values,
        })
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

fn largest_position(values: &Array1<f64>) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| i)
}

//! Weight constraints
//!
//! Constraints are stated against asset names and resolved to coefficient
//! rows over the optimizer's asset order when an objective is solved.

use crate::error::{OptimizerError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lower and upper limit on a single asset weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bounds {
    /// Minimum weight (default: 0, long only)
    pub lower: f64,
    /// Maximum weight (default: 1)
    pub upper: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
        }
    }
}

impl Bounds {
    /// Create bounds. Infinite limits are allowed; NaN is not.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if lower.is_nan() || upper.is_nan() || lower == f64::INFINITY || upper == f64::NEG_INFINITY
        {
            return Err(OptimizerError::InvalidParameter(format!(
                "invalid weight bounds [{lower}, {upper}]"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Bounds allowing short positions down to `-1`.
    pub const fn long_short() -> Self {
        Self {
            lower: -1.0,
            upper: 1.0,
        }
    }

    /// Whether `weight` lies within the bounds up to `tolerance`.
    pub fn contains(&self, weight: f64, tolerance: f64) -> bool {
        weight >= self.lower - tolerance && weight <= self.upper + tolerance
    }

    /// Clamp a weight into the bounds.
    pub fn clamp(&self, weight: f64) -> f64 {
        weight.max(self.lower).min(self.upper)
    }
}

/// Sector exposure limits
///
/// `mapper` assigns assets to sectors; the summed weight of each sector's
/// assets must lie within its lower and upper limits. A sector may have only
/// one side set. Assets missing from the mapper belong to no sector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorConstraints {
    /// Asset to sector
    pub mapper: HashMap<String, String>,
    /// Minimum total weight per sector
    pub lower: HashMap<String, f64>,
    /// Maximum total weight per sector
    pub upper: HashMap<String, f64>,
}

impl SectorConstraints {
    /// Start from an asset-to-sector map with no limits.
    pub fn new<I, A, S>(mapper: I) -> Self
    where
        I: IntoIterator<Item = (A, S)>,
        A: Into<String>,
        S: Into<String>,
    {
        Self {
            mapper: mapper
                .into_iter()
                .map(|(a, s)| (a.into(), s.into()))
                .collect(),
            ..Default::default()
        }
    }

    /// Require at least `value` in `sector`.
    pub fn with_lower(mut self, sector: impl Into<String>, value: f64) -> Self {
        self.lower.insert(sector.into(), value);
        self
    }

    /// Allow at most `value` in `sector`.
    pub fn with_upper(mut self, sector: impl Into<String>, value: f64) -> Self {
        self.upper.insert(sector.into(), value);
        self
    }

    /// One row per constrained sector, sorted by sector name.
    pub(crate) fn rows(&self, assets: &[String]) -> Result<Vec<ConstraintRow>> {
        let mut sectors: Vec<&String> = self.lower.keys().chain(self.upper.keys()).collect();
        sectors.sort();
        sectors.dedup();

        sectors
            .into_iter()
            .map(|sector| {
                let lower = self.lower.get(sector).copied().unwrap_or(f64::NEG_INFINITY);
                let upper = self.upper.get(sector).copied().unwrap_or(f64::INFINITY);
                let coefficients = Array1::from_iter(assets.iter().map(|asset| {
                    if self.mapper.get(asset) == Some(sector) {
                        1.0
                    } else {
                        0.0
                    }
                }));
                ConstraintRow::new(format!("sector {sector}"), coefficients, lower, upper)
            })
            .collect()
    }
}

/// Linear constraint `lower ≤ Σ cᵢ wᵢ ≤ upper` over named assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    coefficients: Vec<(String, f64)>,
    lower: f64,
    upper: f64,
}

impl LinearConstraint {
    /// `lower ≤ Σ cᵢ wᵢ ≤ upper`; use infinities for one-sided constraints.
    pub fn between<I, S>(coefficients: I, lower: f64, upper: f64) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            coefficients: coefficients
                .into_iter()
                .map(|(a, c)| (a.into(), c))
                .collect(),
            lower,
            upper,
        }
    }

    /// `Σ cᵢ wᵢ ≤ upper`.
    pub fn at_most<I, S>(coefficients: I, upper: f64) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::between(coefficients, f64::NEG_INFINITY, upper)
    }

    /// `Σ cᵢ wᵢ ≥ lower`.
    pub fn at_least<I, S>(coefficients: I, lower: f64) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::between(coefficients, lower, f64::INFINITY)
    }

    /// Cap a single asset's weight.
    pub fn asset_at_most(asset: impl Into<String>, cap: f64) -> Self {
        Self::at_most([(asset.into(), 1.0)], cap)
    }

    /// Floor a single asset's weight.
    pub fn asset_at_least(asset: impl Into<String>, floor: f64) -> Self {
        Self::at_least([(asset.into(), 1.0)], floor)
    }

    /// Coefficients by asset.
    pub fn coefficients(&self) -> &[(String, f64)] {
        &self.coefficients
    }

    /// Lower limit.
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper limit.
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// Resolve against an asset order. Repeated assets add up.
    pub(crate) fn row(&self, assets: &[String]) -> Result<ConstraintRow> {
        let mut coefficients = Array1::<f64>::zeros(assets.len());
        for (asset, c) in &self.coefficients {
            let idx = assets
                .iter()
                .position(|a| a == asset)
                .ok_or_else(|| OptimizerError::UnknownAsset(asset.clone()))?;
            coefficients[idx] += c;
        }
        ConstraintRow::new("linear constraint".to_string(), coefficients, self.lower, self.upper)
    }
}

/// A resolved constraint row over the asset order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConstraintRow {
    pub(crate) label: String,
    pub(crate) coefficients: Array1<f64>,
    pub(crate) lower: f64,
    pub(crate) upper: f64,
}

impl ConstraintRow {
    pub(crate) fn new(
        label: String,
        coefficients: Array1<f64>,
        lower: f64,
        upper: f64,
    ) -> Result<Self> {
        if coefficients.iter().any(|c| !c.is_finite())
            || lower.is_nan()
            || upper.is_nan()
            || lower == f64::INFINITY
            || upper == f64::NEG_INFINITY
        {
            return Err(OptimizerError::InvalidParameter(format!(
                "{label} has invalid limits [{lower}, {upper}]"
            )));
        }
        Ok(Self {
            label,
            coefficients,
            lower,
            upper,
        })
    }

    /// Range of `cᵀw` reachable within per-asset bounds.
    pub(crate) fn reachable(&self, bounds: &[Bounds]) -> (f64, f64) {
        self.coefficients
            .iter()
            .zip(bounds)
            .filter(|(c, _)| **c != 0.0)
            .fold((0.0, 0.0), |(lo, hi), (&c, b)| {
                if c > 0.0 {
                    (lo + c * b.lower, hi + c * b.upper)
                } else {
                    (lo + c * b.upper, hi + c * b.lower)
                }
            })
    }

    /// Whether `cᵀw` lies within the limits up to `tolerance`.
    pub(crate) fn is_satisfied(&self, weights: &Array1<f64>, tolerance: f64) -> bool {
        let value = self.coefficients.dot(weights);
        value >= self.lower - tolerance && value <= self.upper + tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assets() -> Vec<String> {
        ["AAA", "BBB", "CCC"].iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_bounds() {
        let b = Bounds::default();
        assert!(b.contains(0.5, 0.0));
        assert!(!b.contains(-0.01, 1e-3));
        assert_eq!(b.clamp(1.2), 1.0);
        assert_eq!(Bounds::long_short().clamp(-3.0), -1.0);
        assert!(Bounds::new(f64::NAN, 1.0).is_err());
        assert!(Bounds::new(f64::NEG_INFINITY, f64::INFINITY).is_ok());
    }

    #[test]
    fn test_sector_rows() {
        let sectors = SectorConstraints::new([("AAA", "tech"), ("BBB", "tech"), ("CCC", "energy")])
            .with_upper("tech", 0.6)
            .with_lower("energy", 0.1)
            .with_upper("energy", 0.5);
        let rows = sectors.rows(&assets()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].coefficients, array![0.0, 0.0, 1.0]);
        assert_eq!((rows[0].lower, rows[0].upper), (0.1, 0.5));
        assert_eq!(rows[1].coefficients, array![1.0, 1.0, 0.0]);
        assert_eq!(rows[1].lower, f64::NEG_INFINITY);
        assert_eq!(rows[1].upper, 0.6);
    }

    #[test]
    fn test_linear_row_resolution() {
        let row = LinearConstraint::between([("CCC", 2.0), ("AAA", -1.0), ("CCC", 1.0)], 0.0, 0.5)
            .row(&assets())
            .unwrap();
        assert_eq!(row.coefficients, array![-1.0, 0.0, 3.0]);

        let err = LinearConstraint::asset_at_most("ZZZ", 0.1).row(&assets());
        assert!(matches!(err, Err(OptimizerError::UnknownAsset(a)) if a == "ZZZ"));
    }

    #[test]
    fn test_reachable_range() {
        let row = LinearConstraint::between([("AAA", 1.0), ("BBB", -2.0)], 0.0, 1.0)
            .row(&assets())
            .unwrap();
        let bounds = vec![Bounds::default(); 3];
        assert_eq!(row.reachable(&bounds), (-2.0, 1.0));
        assert!(row.is_satisfied(&array![0.5, 0.1, 0.4], 0.0));
        assert!(!row.is_satisfied(&array![0.0, 0.5, 0.5], 1e-9));
    }
}

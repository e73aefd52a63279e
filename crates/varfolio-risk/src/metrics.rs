//! Single-asset risk metrics
//!
//! Volatility, drawdown and downside deviation of a return series. Non-finite
//! returns (e.g. a leading NaN carried over from raw data) are excluded from
//! every dispersion statistic and treated as a zero move in the drawdown index.

use crate::error::{Result, RiskError};
use crate::stats::{self, TRADING_DAYS_PER_YEAR};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use varfolio_data::ReturnSeries;

/// Base value of the cumulative index used for drawdowns.
pub const INDEX_BASE: f64 = 100.0;

/// Floor applied to the running peak before dividing by it.
pub const PEAK_FLOOR: f64 = 1.0;

fn finite_or_empty(returns: &ReturnSeries, required: usize) -> Result<Vec<f64>> {
    let values = returns.finite_values();
    if values.len() < required {
        return Err(RiskError::EmptySeries {
            required,
            actual: values.len(),
        });
    }
    Ok(values)
}

/// Sample standard deviation (ddof = 1) of the finite returns.
pub fn daily_volatility(returns: &ReturnSeries) -> Result<f64> {
    let values = finite_or_empty(returns, 2)?;
    stats::sample_variance(&values)
        .map(f64::sqrt)
        .ok_or(RiskError::EmptySeries {
            required: 2,
            actual: values.len(),
        })
}

/// Population standard deviation (ddof = 0) of the finite returns.
pub fn population_volatility(returns: &ReturnSeries) -> Result<f64> {
    let values = finite_or_empty(returns, 1)?;
    stats::variance(&values, 0)
        .map(f64::sqrt)
        .ok_or(RiskError::EmptySeries {
            required: 1,
            actual: 0,
        })
}

/// Daily volatility scaled by `sqrt(periods_per_year)`.
pub fn annualized_volatility(returns: &ReturnSeries, periods_per_year: usize) -> Result<f64> {
    if periods_per_year == 0 {
        return Err(RiskError::InvalidParameter(
            "periods_per_year must be positive".to_string(),
        ));
    }
    Ok(daily_volatility(returns)? * (periods_per_year as f64).sqrt())
}

/// Annualized volatility assuming 252 trading days.
pub fn annualized_daily_volatility(returns: &ReturnSeries) -> Result<f64> {
    annualized_volatility(returns, TRADING_DAYS_PER_YEAR)
}

/// Standard deviation (ddof = 1) of the strictly negative returns.
///
/// Fewer than two negative observations leave no measurable downside
/// dispersion and yield `0.0`.
pub fn downside_deviation(returns: &ReturnSeries) -> Result<f64> {
    let values = finite_or_empty(returns, 1)?;
    let losses: Vec<f64> = values.into_iter().filter(|&r| r < 0.0).collect();
    Ok(stats::sample_variance(&losses).map_or(0.0, f64::sqrt))
}

/// Base-100 cumulative value index built from log returns.
///
/// Non-finite returns count as a zero move.
pub fn cumulative_index(log_returns: &ReturnSeries) -> Vec<f64> {
    let mut cumulative = 0.0;
    log_returns
        .values()
        .iter()
        .map(|&r| {
            if r.is_finite() {
                cumulative += r;
            }
            INDEX_BASE * cumulative.exp()
        })
        .collect()
}

/// Fractional decline of a value index from its running peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownSeries {
    /// Observation dates
    pub dates: Vec<NaiveDate>,
    /// Drawdown at each date, always `<= 0`
    pub values: Vec<f64>,
}

impl DrawdownSeries {
    /// Deepest drawdown (most negative value).
    pub fn max_drawdown(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::min)
    }

    /// Date of the deepest drawdown.
    pub fn trough_date(&self) -> Option<NaiveDate> {
        self.values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.dates[i])
    }
}

/// Drawdown series of the cumulative index built from log returns.
///
/// The running peak is floored at [`PEAK_FLOOR`] so the division stays well
/// defined; the value at the index's global peak is exactly zero.
pub fn drawdown(log_returns: &ReturnSeries) -> Result<DrawdownSeries> {
    if log_returns.is_empty() {
        return Err(RiskError::EmptySeries {
            required: 1,
            actual: 0,
        });
    }
    let index = cumulative_index(log_returns);
    let mut peak = f64::NEG_INFINITY;
    let values = index
        .iter()
        .map(|&level| {
            peak = peak.max(level);
            let floored = peak.max(PEAK_FLOOR);
            (level / floored - 1.0).min(0.0)
        })
        .collect();

    Ok(DrawdownSeries {
        dates: log_returns.dates().to_vec(),
        values,
    })
}

/// Deepest drawdown of the cumulative index built from log returns.
pub fn max_drawdown(log_returns: &ReturnSeries) -> Result<f64> {
    Ok(drawdown(log_returns)?.max_drawdown())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use varfolio_data::ReturnKind;

    fn series(values: &[f64], kind: ReturnKind) -> ReturnSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ReturnSeries::from_values(start, values.to_vec(), kind).unwrap()
    }

    #[test]
    fn test_daily_volatility_ignores_nan() {
        let r = series(&[f64::NAN, 0.01, -0.01, 0.02, -0.02], ReturnKind::Simple);
        let expected = stats::sample_variance(&[0.01, -0.01, 0.02, -0.02])
            .unwrap()
            .sqrt();
        assert_relative_eq!(daily_volatility(&r).unwrap(), expected, epsilon = 1e-15);
    }

    #[test]
    fn test_annualized_volatility_is_exact_scaling() {
        let r = series(&[0.01, -0.003, 0.007, -0.012, 0.004], ReturnKind::Simple);
        let daily = daily_volatility(&r).unwrap();
        assert_eq!(
            annualized_volatility(&r, 252).unwrap(),
            daily * (252.0_f64).sqrt()
        );
        assert_eq!(annualized_daily_volatility(&r).unwrap(), daily * 252f64.sqrt());
    }

    #[test]
    fn test_volatility_needs_two_observations() {
        let r = series(&[0.01], ReturnKind::Simple);
        assert!(matches!(
            daily_volatility(&r),
            Err(RiskError::EmptySeries { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_population_volatility() {
        let r = series(&[0.01, -0.01], ReturnKind::Simple);
        assert_relative_eq!(population_volatility(&r).unwrap(), 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_downside_deviation_uses_negative_values() {
        let r = series(&[0.05, -0.01, 0.03, -0.03, -0.02], ReturnKind::Simple);
        let expected = stats::sample_variance(&[-0.01, -0.03, -0.02])
            .unwrap()
            .sqrt();
        assert_relative_eq!(downside_deviation(&r).unwrap(), expected, epsilon = 1e-15);
        // A boolean loss indicator would have produced ~0.49 here.
        assert!(downside_deviation(&r).unwrap() < 0.02);
    }

    #[test]
    fn test_downside_deviation_without_losses() {
        let r = series(&[0.01, 0.02, 0.0], ReturnKind::Simple);
        assert_eq!(downside_deviation(&r).unwrap(), 0.0);
    }

    #[test]
    fn test_drawdown_non_positive_and_zero_at_peak() {
        let r = series(
            &[0.02, 0.03, -0.05, f64::NAN, 0.01, 0.06, -0.02, -0.01],
            ReturnKind::Log,
        );
        let dd = drawdown(&r).unwrap();
        let index = cumulative_index(&r);

        assert!(dd.values.iter().all(|&v| v <= 0.0));
        let peak_idx = index
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(dd.values[peak_idx], 0.0);
    }

    #[test]
    fn test_drawdown_values() {
        let r = series(&[0.1, -0.2, 0.05], ReturnKind::Log);
        let dd = drawdown(&r).unwrap();
        assert_eq!(dd.values[0], 0.0);
        assert_relative_eq!(dd.values[1], (-0.2_f64).exp() - 1.0, epsilon = 1e-12);
        assert_relative_eq!(dd.values[2], (-0.15_f64).exp() - 1.0, epsilon = 1e-12);
        assert_relative_eq!(dd.max_drawdown(), (-0.2_f64).exp() - 1.0, epsilon = 1e-12);
        assert_eq!(dd.trough_date(), Some(dd.dates[1]));
    }

    #[test]
    fn test_drawdown_empty() {
        let r = series(&[], ReturnKind::Log);
        assert!(drawdown(&r).is_err());
    }
}

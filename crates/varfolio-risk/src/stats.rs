//! Descriptive statistics shared by the estimators.
//!
//! Empty input, or too few values for the requested degrees of freedom,
//! yields `None`. NaN is not skipped: it propagates through the moments and
//! sorts above every number in [`quantile`], so callers drop non-finite
//! values first.

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Variance with `ddof` degrees of freedom removed, `None` if `len <= ddof`.
pub fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - ddof) as f64)
}

/// Sample variance (ddof = 1).
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    variance(values, 1)
}

/// Sample covariance (ddof = 1) of two equally long slices.
pub fn sample_covariance(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let cross: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    Some(cross / (x.len() - 1) as f64)
}

/// Quantile with linear interpolation between closest ranks.
///
/// `q` is a fraction in `[0, 1]`; the position is `q * (n - 1)` in the sorted
/// sample, interpolated between its neighbours. Returns `None` for an empty
/// slice or `q` outside `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let frac = position - lower as f64;

    let (_, &mut low, upper_part) = sorted.select_nth_unstable_by(lower, f64::total_cmp);
    if frac == 0.0 || upper_part.is_empty() {
        return Some(low);
    }
    let high = upper_part
        .iter()
        .copied()
        .min_by(f64::total_cmp)
        .unwrap_or(low);
    Some(low + frac * (high - low))
}

/// Convert an annual rate to the equivalent compounded daily rate.
pub fn annual_to_daily_rate(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / TRADING_DAYS_PER_YEAR as f64) - 1.0
}

//! Return calculation
//!
//! Converts prices into simple or logarithmic returns. The first observation
//! has no prior price; it is dropped, so every output is one period shorter
//! than its input.

use crate::error::{DataError, Result};
use crate::matrix::{PriceMatrix, ReturnMatrix};
use crate::series::{PriceSeries, ReturnKind, ReturnSeries};
use ndarray::{Array2, Zip, s};

/// Minimum number of prices needed to produce a single return.
pub const MIN_PRICES: usize = 2;

/// Compute returns of the given kind from a price series.
pub fn returns(prices: &PriceSeries, kind: ReturnKind) -> Result<ReturnSeries> {
    if prices.len() < MIN_PRICES {
        return Err(DataError::EmptySeries {
            required: MIN_PRICES,
            actual: prices.len(),
        });
    }
    let values = prices
        .prices()
        .windows(2)
        .map(|w| kind.between(w[0], w[1]))
        .collect();
    ReturnSeries::new(prices.dates()[1..].to_vec(), values, kind)
}

/// Simple (percentage-change) returns.
pub fn simple_returns(prices: &PriceSeries) -> Result<ReturnSeries> {
    returns(prices, ReturnKind::Simple)
}

/// Logarithmic returns.
pub fn log_returns(prices: &PriceSeries) -> Result<ReturnSeries> {
    returns(prices, ReturnKind::Log)
}

/// Compute returns of the given kind for every asset in a price matrix.
pub fn return_matrix(prices: &PriceMatrix, kind: ReturnKind) -> Result<ReturnMatrix> {
    let n_periods = prices.n_periods();
    if n_periods < MIN_PRICES {
        return Err(DataError::EmptySeries {
            required: MIN_PRICES,
            actual: n_periods,
        });
    }
    let values = prices.values();
    let previous = values.slice(s![..n_periods - 1, ..]);
    let current = values.slice(s![1.., ..]);

    let mut out = Array2::<f64>::zeros(previous.raw_dim());
    Zip::from(&mut out)
        .and(&previous)
        .and(&current)
        .for_each(|r, &p0, &p1| *r = kind.between(p0, p1));

    ReturnMatrix::new(
        prices.assets().to_vec(),
        prices.dates()[1..].to_vec(),
        out,
        kind,
    )
}

/// Simple returns for every asset.
pub fn simple_return_matrix(prices: &PriceMatrix) -> Result<ReturnMatrix> {
    return_matrix(prices, ReturnKind::Simple)
}

/// Log returns for every asset.
pub fn log_return_matrix(prices: &PriceMatrix) -> Result<ReturnMatrix> {
    return_matrix(prices, ReturnKind::Log)
}

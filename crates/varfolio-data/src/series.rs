//! Single-asset price and return series.
//!
//! Both series types are immutable once constructed. Constructors validate the
//! invariants every downstream estimator relies on: strictly increasing dates,
//! matching lengths, and (for prices) strictly positive finite values.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a return was derived from two consecutive prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReturnKind {
    /// (p_t - p_{t-1}) / p_{t-1}
    #[default]
    Simple,
    /// ln(p_t / p_{t-1})
    Log,
}

impl ReturnKind {
    /// Return between two consecutive prices.
    pub fn between(self, previous: f64, current: f64) -> f64 {
        match self {
            Self::Simple => (current - previous) / previous,
            Self::Log => (current / previous).ln(),
        }
    }
}

fn check_dates(dates: &[NaiveDate]) -> Result<()> {
    for pair in dates.windows(2) {
        if pair[1] <= pair[0] {
            return Err(DataError::UnorderedTimestamps {
                previous: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}

/// Adjusted closing prices for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    prices: Vec<f64>,
}

impl PriceSeries {
    /// Build a price series, validating ordering and positivity.
    pub fn new(dates: Vec<NaiveDate>, prices: Vec<f64>) -> Result<Self> {
        if dates.len() != prices.len() {
            return Err(DataError::LengthMismatch {
                dates: dates.len(),
                values: prices.len(),
            });
        }
        check_dates(&dates)?;
        for (&date, &price) in dates.iter().zip(&prices) {
            if !price.is_finite() {
                return Err(DataError::NonFinite(date));
            }
            if price <= 0.0 {
                return Err(DataError::NonPositivePrice { date, price });
            }
        }
        Ok(Self { dates, prices })
    }

    /// Build a price series from `(date, price)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let (dates, prices) = pairs.into_iter().unzip();
        Self::new(dates, prices)
    }

    /// Observation dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Prices, aligned with [`Self::dates`].
    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    /// Number of observations.
    pub const fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether the series has no observations.
    pub const fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Iterate over `(date, price)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.prices.iter().copied())
    }

    /// Price on a given date, if observed.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|idx| self.prices[idx])
    }
}

/// Periodic returns for one asset.
///
/// A return series built from prices has one entry fewer than the prices: the
/// first date has no prior price and is dropped rather than stored as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
    kind: ReturnKind,
}

impl ReturnSeries {
    /// Build a return series. Values may contain NaN; estimators skip them.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>, kind: ReturnKind) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(DataError::LengthMismatch {
                dates: dates.len(),
                values: values.len(),
            });
        }
        check_dates(&dates)?;
        Ok(Self {
            dates,
            values,
            kind,
        })
    }

    /// Build a series of consecutive synthetic daily dates starting at `start`.
    ///
    /// Handy when returns arrive without timestamps (e.g. a plain array).
    pub fn from_values(start: NaiveDate, values: Vec<f64>, kind: ReturnKind) -> Result<Self> {
        let dates = start.iter_days().take(values.len()).collect();
        Self::new(dates, values, kind)
    }

    /// Observation dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Return values, aligned with [`Self::dates`].
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// How the returns were computed.
    pub const fn kind(&self) -> ReturnKind {
        self.kind
    }

    /// Number of observations.
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no observations.
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(date, return)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Finite values only, in date order.
    pub fn finite_values(&self) -> Vec<f64> {
        self.values.iter().copied().filter(|v| v.is_finite()).collect()
    }

    /// Inner-join two series on date, keeping only pairs where both values are finite.
    ///
    /// Returns the joined dates and the two aligned value vectors.
    pub fn align(&self, other: &Self) -> (Vec<NaiveDate>, Vec<f64>, Vec<f64>) {
        let lookup: HashMap<NaiveDate, f64> = other.iter().collect();
        let mut dates = Vec::new();
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (date, value) in self.iter() {
            let Some(&other_value) = lookup.get(&date) else {
                continue;
            };
            if value.is_finite() && other_value.is_finite() {
                dates.push(date);
                left.push(value);
                right.push(other_value);
            }
        }
        (dates, left, right)
    }
}

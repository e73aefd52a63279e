//! Multi-asset price and return matrices aligned on a common calendar.
//!
//! Rows are periods, columns are assets, matching the layout the covariance
//! estimators expect (T x N).

use crate::error::{DataError, Result};
use crate::series::{PriceSeries, ReturnKind, ReturnSeries};
use chrono::NaiveDate;
use ndarray::{Array2, Axis, s};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

fn check_assets(assets: &[String]) -> Result<()> {
    if assets.is_empty() {
        return Err(DataError::NoAssets);
    }
    let mut seen = HashSet::new();
    for asset in assets {
        if !seen.insert(asset.as_str()) {
            return Err(DataError::DuplicateAsset(asset.clone()));
        }
    }
    Ok(())
}

/// Prices for several assets on a shared, strictly increasing set of dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMatrix {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    prices: Array2<f64>,
}

impl PriceMatrix {
    /// Build a matrix from an already aligned `T x N` array.
    pub fn new(assets: Vec<String>, dates: Vec<NaiveDate>, prices: Array2<f64>) -> Result<Self> {
        check_assets(&assets)?;
        let (n_periods, n_assets) = prices.dim();
        if n_assets != assets.len() || n_periods != dates.len() {
            return Err(DataError::LengthMismatch {
                dates: dates.len(),
                values: n_periods,
            });
        }
        // Each column must satisfy the same invariants as a standalone series.
        for column in prices.axis_iter(Axis(1)) {
            PriceSeries::new(dates.clone(), column.to_vec())?;
        }
        Ok(Self {
            assets,
            dates,
            prices,
        })
    }

    /// Align several price series on the dates common to all of them.
    ///
    /// Dates missing from any series are dropped from every series (inner join).
    /// Asset order follows the input order.
    pub fn align<I, S>(series: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, PriceSeries)>,
        S: Into<String>,
    {
        let series: Vec<(String, PriceSeries)> =
            series.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let assets: Vec<String> = series.iter().map(|(name, _)| name.clone()).collect();
        check_assets(&assets)?;

        let mut common: BTreeSet<NaiveDate> = series[0].1.dates().iter().copied().collect();
        for (_, s) in &series[1..] {
            let dates: HashSet<NaiveDate> = s.dates().iter().copied().collect();
            common.retain(|d| dates.contains(d));
        }
        let dates: Vec<NaiveDate> = common.into_iter().collect();

        let mut prices = Array2::<f64>::zeros((dates.len(), assets.len()));
        for (j, (_, s)) in series.iter().enumerate() {
            let lookup: HashMap<NaiveDate, f64> = s.iter().collect();
            for (i, date) in dates.iter().enumerate() {
                prices[[i, j]] = lookup[date];
            }
        }

        let dropped = series
            .iter()
            .map(|(_, s)| s.len() - dates.len())
            .max()
            .unwrap_or(0);
        if dropped > 0 {
            tracing::debug!(dropped, kept = dates.len(), "aligned price series on common dates");
        }

        Ok(Self {
            assets,
            dates,
            prices,
        })
    }

    /// Asset identifiers in column order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Observation dates in row order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Raw `T x N` price array.
    pub const fn values(&self) -> &Array2<f64> {
        &self.prices
    }

    /// Number of assets (columns).
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Number of periods (rows).
    pub fn n_periods(&self) -> usize {
        self.dates.len()
    }

    /// Column index of an asset.
    pub fn index_of(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Extract one asset as a standalone price series.
    pub fn series(&self, asset: &str) -> Option<PriceSeries> {
        let idx = self.index_of(asset)?;
        PriceSeries::new(self.dates.clone(), self.prices.column(idx).to_vec()).ok()
    }

    /// Keep only the named assets, in the order given.
    pub fn select<S: AsRef<str>>(&self, assets: &[S]) -> Result<Self> {
        let names: Vec<String> = assets.iter().map(|a| a.as_ref().to_string()).collect();
        check_assets(&names)?;
        let columns = names
            .iter()
            .map(|name| {
                self.index_of(name)
                    .ok_or_else(|| DataError::UnknownAsset(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            assets: names,
            dates: self.dates.clone(),
            prices: self.prices.select(Axis(1), &columns),
        })
    }

    /// Split into the first `index` periods and the remaining periods.
    pub fn split_at(&self, index: usize) -> Result<(Self, Self)> {
        if index == 0 || index >= self.n_periods() {
            return Err(DataError::EmptySeries {
                required: index.max(1) + 1,
                actual: self.n_periods(),
            });
        }
        let head = Self {
            assets: self.assets.clone(),
            dates: self.dates[..index].to_vec(),
            prices: self.prices.slice(s![..index, ..]).to_owned(),
        };
        let tail = Self {
            assets: self.assets.clone(),
            dates: self.dates[index..].to_vec(),
            prices: self.prices.slice(s![index.., ..]).to_owned(),
        };
        Ok((head, tail))
    }

    /// Split off the trailing `holdout` periods, returning `(training, holdout)`.
    pub fn split_last(&self, holdout: usize) -> Result<(Self, Self)> {
        let index = self
            .n_periods()
            .checked_sub(holdout)
            .ok_or(DataError::EmptySeries {
                required: holdout + 1,
                actual: self.n_periods(),
            })?;
        self.split_at(index)
    }
}

/// Returns for several assets on a shared calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMatrix {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    returns: Array2<f64>,
    kind: ReturnKind,
}

impl ReturnMatrix {
    /// Build a return matrix from a `T x N` array.
    pub fn new(
        assets: Vec<String>,
        dates: Vec<NaiveDate>,
        returns: Array2<f64>,
        kind: ReturnKind,
    ) -> Result<Self> {
        check_assets(&assets)?;
        let (n_periods, n_assets) = returns.dim();
        if n_assets != assets.len() || n_periods != dates.len() {
            return Err(DataError::LengthMismatch {
                dates: dates.len(),
                values: n_periods,
            });
        }
        Ok(Self {
            assets,
            dates,
            returns,
            kind,
        })
    }

    /// Asset identifiers in column order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Observation dates in row order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Raw `T x N` return array.
    pub const fn values(&self) -> &Array2<f64> {
        &self.returns
    }

    /// How the returns were computed.
    pub const fn kind(&self) -> ReturnKind {
        self.kind
    }

    /// Number of assets (columns).
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Number of periods (rows).
    pub fn n_periods(&self) -> usize {
        self.dates.len()
    }

    /// Extract one asset as a standalone return series.
    pub fn series(&self, asset: &str) -> Option<ReturnSeries> {
        let idx = self.assets.iter().position(|a| a == asset)?;
        ReturnSeries::new(
            self.dates.clone(),
            self.returns.column(idx).to_vec(),
            self.kind,
        )
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_align_drops_dates_missing_anywhere() {
        let a = PriceSeries::from_pairs([(day(1), 10.0), (day(2), 11.0), (day(3), 12.0)]).unwrap();
        let b = PriceSeries::from_pairs([(day(1), 20.0), (day(3), 22.0), (day(4), 23.0)]).unwrap();

        let matrix = PriceMatrix::align([("A", a), ("B", b)]).unwrap();
        assert_eq!(matrix.dates(), &[day(1), day(3)]);
        assert_eq!(matrix.values(), &array![[10.0, 20.0], [12.0, 22.0]]);
        assert_eq!(matrix.assets(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_duplicate_assets_rejected() {
        let a = PriceSeries::from_pairs([(day(1), 10.0), (day(2), 11.0)]).unwrap();
        let result = PriceMatrix::align([("A", a.clone()), ("A", a)]);
        assert!(matches!(result, Err(DataError::DuplicateAsset(_))));
    }

    #[test]
    fn test_split_last() {
        let prices = array![[1.0, 2.0], [1.1, 2.1], [1.2, 2.2], [1.3, 2.3]];
        let matrix = PriceMatrix::new(
            vec!["A".into(), "B".into()],
            vec![day(1), day(2), day(3), day(4)],
            prices,
        )
        .unwrap();

        let (train, holdout) = matrix.split_last(1).unwrap();
        assert_eq!(train.n_periods(), 3);
        assert_eq!(holdout.n_periods(), 1);
        assert_eq!(holdout.dates(), &[day(4)]);
        assert!(matrix.split_last(4).is_err());
        assert!(matrix.split_last(5).is_err());
    }

    #[test]
    fn test_select_reorders_and_drops() {
        let matrix = PriceMatrix::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![day(1), day(2)],
            array![[1.0, 2.0, 3.0], [1.1, 2.1, 3.1]],
        )
        .unwrap();

        let picked = matrix.select(&["C", "A"]).unwrap();
        assert_eq!(picked.assets(), &["C".to_string(), "A".to_string()]);
        assert_eq!(picked.values(), &array![[3.0, 1.0], [3.1, 1.1]]);
        assert!(matches!(matrix.select(&["Z"]), Err(DataError::UnknownAsset(a)) if a == "Z"));
        assert!(matches!(matrix.select::<&str>(&[]), Err(DataError::NoAssets)));
    }

    #[test]
    fn test_new_validates_prices() {
        let prices = array![[1.0, 2.0], [1.1, -2.1]];
        let result = PriceMatrix::new(vec!["A".into(), "B".into()], vec![day(1), day(2)], prices);
        assert!(matches!(result, Err(DataError::NonPositivePrice { .. })));
    }
}

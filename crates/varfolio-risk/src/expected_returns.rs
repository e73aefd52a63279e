//! Expected-return models
//!
//! Annualized expected returns per asset from a price matrix:
//!
//! - mean historical: mean of simple returns, times the frequency
//! - exponential moving average: recency-weighted mean of simple returns
//! - CAPM: `rf + beta * (market_return - rf)`
//!
//! With `compounding` enabled the periodic figure `r` is annualized
//! geometrically as `(1 + r)^frequency - 1` (for the historical mean, the
//! geometric mean of the observed returns is used).
//!
//! [`ExpectedReturnModel::backtest_return_models`] fits every model on a
//! training window and scores it by [`mean_absolute_error`] against the mean
//! historical return realized over the trailing `holdout` returns.

use crate::beta::{BetaConfig, BetaEstimator};
use crate::error::{Result, RiskError};
use crate::stats::{self, TRADING_DAYS_PER_YEAR};
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use varfolio_data::{
    PriceMatrix, PriceSeries, ReturnKind, ReturnSeries, log_returns, simple_return_matrix,
    simple_returns,
};

/// Expected annual return per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReturnVector {
    assets: Vec<String>,
    values: Array1<f64>,
}

impl ExpectedReturnVector {
    /// Pair asset labels with values. Labels must be unique.
    pub fn new(assets: Vec<String>, values: Array1<f64>) -> Result<Self> {
        if assets.len() != values.len() {
            return Err(RiskError::DimensionMismatch(format!(
                "{} assets but {} expected returns",
                assets.len(),
                values.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = assets.iter().find(|a| !seen.insert(a.as_str())) {
            return Err(RiskError::DimensionMismatch(format!("duplicate asset {dup}")));
        }
        Ok(Self { assets, values })
    }

    /// Build from `(asset, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let (assets, values): (Vec<String>, Vec<f64>) =
            pairs.into_iter().map(|(a, v)| (a.into(), v)).unzip();
        Self::new(assets, Array1::from(values))
    }

    /// Asset labels.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Values in asset order.
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

    /// Expected return of one asset.
    pub fn get(&self, asset: &str) -> Option<f64> {
        let idx = self.assets.iter().position(|a| a == asset)?;
        Some(self.values[idx])
    }

    /// Iterate over `(asset, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.assets
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Values keyed by asset.
    pub fn to_map(&self) -> HashMap<String, f64> {
        self.iter().map(|(a, v)| (a.to_string(), v)).collect()
    }

    /// Whether both vectors cover exactly the same assets.
    pub fn same_assets(&self, other: &Self) -> bool {
        self.len() == other.len() && other.assets.iter().all(|a| self.get(a).is_some())
    }
}

/// Mean of `|predicted_i - realized_i|` over assets.
///
/// Both vectors must cover the same asset set; order may differ.
pub fn mean_absolute_error(
    predicted: &ExpectedReturnVector,
    realized: &ExpectedReturnVector,
) -> Result<f64> {
    if predicted.is_empty() || !predicted.same_assets(realized) {
        return Err(RiskError::DimensionMismatch(
            "predicted and realized returns cover different assets".to_string(),
        ));
    }
    let total: f64 = predicted
        .iter()
        .map(|(asset, p)| (p - realized.get(asset).unwrap_or(p)).abs())
        .sum();
    Ok(total / predicted.len() as f64)
}

/// Expected-return model selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnModel {
    /// Annualized mean of historical returns
    MeanHistorical,
    /// Exponentially weighted mean of historical returns
    Ema,
    /// Capital asset pricing model
    Capm,
}

impl ReturnModel {
    /// Every model, in reporting order.
    pub const ALL: [Self; 3] = [Self::MeanHistorical, Self::Ema, Self::Capm];
}

impl fmt::Display for ReturnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MeanHistorical => "mean_historical",
            Self::Ema => "ema",
            Self::Capm => "capm",
        };
        f.write_str(name)
    }
}

/// Configuration for expected-return estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedReturnConfig {
    /// Periods per year (default: 252)
    pub frequency: usize,
    /// Annualize geometrically instead of arithmetically (default: false)
    pub compounding: bool,
    /// EMA span in periods (default: 500)
    pub span: f64,
    /// Beta settings used by CAPM
    pub beta: BetaConfig,
}

impl Default for ExpectedReturnConfig {
    fn default() -> Self {
        Self {
            frequency: TRADING_DAYS_PER_YEAR,
            compounding: false,
            span: 500.0,
            beta: BetaConfig::default(),
        }
    }
}

/// Score of one model in a hold-out backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    /// Model scored
    pub model: ReturnModel,
    /// Returns predicted from the training window
    pub predicted: ExpectedReturnVector,
    /// Mean absolute error against the hold-out window
    pub mean_absolute_error: f64,
}

/// Result of [`ExpectedReturnModel::backtest_return_models`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Mean historical return realized in the hold-out window
    pub realized: ExpectedReturnVector,
    /// One score per model
    pub scores: Vec<ModelScore>,
}

impl BacktestReport {
    /// Model with the smallest error.
    pub fn best(&self) -> Option<&ModelScore> {
        self.scores
            .iter()
            .min_by(|a, b| a.mean_absolute_error.total_cmp(&b.mean_absolute_error))
    }
}

/// Expected-return estimator
#[derive(Debug, Clone, Default)]
pub struct ExpectedReturnModel {
    config: ExpectedReturnConfig,
}

impl ExpectedReturnModel {
    /// Create a model, validating frequency and span.
    pub fn new(config: ExpectedReturnConfig) -> Result<Self> {
        if config.frequency == 0 {
            return Err(RiskError::InvalidParameter(
                "frequency must be positive".to_string(),
            ));
        }
        if !config.span.is_finite() || config.span < 1.0 {
            return Err(RiskError::InvalidParameter(format!(
                "span must be at least 1, got {}",
                config.span
            )));
        }
        Ok(Self { config })
    }

    /// Model configuration
    pub const fn config(&self) -> &ExpectedReturnConfig {
        &self.config
    }

    fn annualize(&self, periodic: f64) -> f64 {
        let frequency = self.config.frequency as f64;
        if self.config.compounding {
            (1.0 + periodic).powf(frequency) - 1.0
        } else {
            periodic * frequency
        }
    }

    fn annualized_mean(&self, returns: &[f64]) -> Result<f64> {
        let mean = stats::mean(returns).ok_or(RiskError::EmptySeries {
            required: 1,
            actual: 0,
        })?;
        if self.config.compounding {
            let growth: f64 = returns.iter().map(|r| (1.0 + r).ln()).sum();
            let frequency = self.config.frequency as f64;
            Ok((growth * frequency / returns.len() as f64).exp() - 1.0)
        } else {
            Ok(self.annualize(mean))
        }
    }

    /// Annualized mean of historical simple returns per asset.
    pub fn mean_historical_return(&self, prices: &PriceMatrix) -> Result<ExpectedReturnVector> {
        let returns = simple_return_matrix(prices)?;
        let values = returns
            .values()
            .axis_iter(Axis(1))
            .map(|column| self.annualized_mean(&column.to_vec()))
            .collect::<Result<Vec<_>>>()?;
        ExpectedReturnVector::new(returns.assets().to_vec(), Array1::from(values))
    }

    /// Exponentially weighted mean of simple returns, annualized.
    ///
    /// Weights are `(1 - α)^(T-1-t)` with `α = 2 / (span + 1)`, normalized to
    /// sum to one, so the most recent return weighs most.
    pub fn ema_return(&self, prices: &PriceMatrix, span: f64) -> Result<ExpectedReturnVector> {
        if !span.is_finite() || span < 1.0 {
            return Err(RiskError::InvalidParameter(format!(
                "span must be at least 1, got {span}"
            )));
        }
        let returns = simple_return_matrix(prices)?;
        let n_periods = returns.n_periods();
        let decay = 1.0 - 2.0 / (span + 1.0);
        let weights = Array1::from_shape_fn(n_periods, |t| decay.powi((n_periods - 1 - t) as i32));
        let weights = &weights / weights.sum();

        let ema = weights.dot(returns.values());
        ExpectedReturnVector::new(
            returns.assets().to_vec(),
            ema.mapv(|r| self.annualize(r)),
        )
    }

    /// CAPM expected return per asset.
    ///
    /// Beta is the covariance ratio of log returns against the market. The
    /// market return is the annualized mean simple return of `market` on the
    /// dates shared with `prices`. Without a market series, the equal-weighted
    /// average of the assets stands in for the market.
    pub fn capm_return(
        &self,
        prices: &PriceMatrix,
        market: Option<&PriceSeries>,
        risk_free_rate: f64,
    ) -> Result<ExpectedReturnVector> {
        let simple = simple_return_matrix(prices)?;
        let (market_simple, market_log) = match market {
            Some(series) => (simple_returns(series)?, log_returns(series)?),
            None => {
                tracing::debug!("no market series supplied, using equal-weighted proxy");
                let proxy = simple.values().mean_axis(Axis(1)).ok_or(RiskError::EmptySeries {
                    required: 1,
                    actual: 0,
                })?;
                let dates = simple.dates().to_vec();
                (
                    ReturnSeries::new(dates.clone(), proxy.to_vec(), ReturnKind::Simple)?,
                    ReturnSeries::new(
                        dates,
                        proxy.iter().map(|r| r.ln_1p()).collect(),
                        ReturnKind::Log,
                    )?,
                )
            }
        };

        let shared: HashSet<_> = simple.dates().iter().copied().collect();
        let market_window: Vec<f64> = market_simple
            .iter()
            .filter(|(date, r)| shared.contains(date) && r.is_finite())
            .map(|(_, r)| r)
            .collect();
        if market_window.is_empty() {
            return Err(RiskError::InsufficientOverlap {
                required: 1,
                actual: 0,
            });
        }
        let market_return = self.annualized_mean(&market_window)?;

        let estimator = BetaEstimator::new(self.config.beta.clone());
        let mut values = Vec::with_capacity(prices.n_assets());
        for asset in prices.assets() {
            let series = prices
                .series(asset)
                .ok_or_else(|| RiskError::DimensionMismatch(format!("missing asset {asset}")))?;
            let beta = estimator.beta_by_covariance(&log_returns(&series)?, &market_log)?;
            values.push(risk_free_rate + beta * (market_return - risk_free_rate));
        }
        tracing::debug!(market_return, risk_free_rate, "computed CAPM returns");

        ExpectedReturnVector::new(prices.assets().to_vec(), Array1::from(values))
    }

    /// Dispatch to one model, using the configured EMA span.
    pub fn return_model(
        &self,
        prices: &PriceMatrix,
        model: ReturnModel,
        market: Option<&PriceSeries>,
        risk_free_rate: f64,
    ) -> Result<ExpectedReturnVector> {
        match model {
            ReturnModel::MeanHistorical => self.mean_historical_return(prices),
            ReturnModel::Ema => self.ema_return(prices, self.config.span),
            ReturnModel::Capm => self.capm_return(prices, market, risk_free_rate),
        }
    }

    /// Fit every model on all but the last `holdout` prices and score it
    /// against the mean historical return of the last `holdout` returns.
    ///
    /// The realized window starts at the last training price, so the return
    /// bridging the two windows counts toward the hold-out.
    pub fn backtest_return_models(
        &self,
        prices: &PriceMatrix,
        holdout: usize,
        market: Option<&PriceSeries>,
        risk_free_rate: f64,
    ) -> Result<BacktestReport> {
        let (training, _) = prices.split_last(holdout)?;
        let (_, testing) = prices.split_last(holdout + 1)?;
        let realized = self.mean_historical_return(&testing)?;

        let scores = ReturnModel::ALL
            .iter()
            .map(|&model| {
                let predicted = self.return_model(&training, model, market, risk_free_rate)?;
                let mae = mean_absolute_error(&predicted, &realized)?;
                tracing::debug!(%model, mae, "scored return model");
                Ok(ModelScore {
                    model,
                    predicted,
                    mean_absolute_error: mae,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BacktestReport { realized, scores })
    }
}

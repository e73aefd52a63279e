//! End-to-end analysis over a price table.
//!
//! Single-asset risk (volatility, drawdown, beta, VaR) for every column, and a
//! portfolio run that estimates expected returns and covariance, solves the
//! configured objective and cleans the weights. An optional market column is
//! used as the beta and CAPM benchmark and is never held in the portfolio.

use crate::error::{Result, VarfolioError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use varfolio_data::{PriceMatrix, PriceSeries, log_returns, simple_return_matrix, simple_returns};
use varfolio_optim::{
    Bounds, CleanConfig, LinearConstraint, Objective, Performance, PortfolioOptimizer,
    SectorConstraints,
};
use varfolio_risk::{
    BacktestReport, BetaConfig, BetaEstimator, CovarianceEstimator, CovarianceMatrix,
    ExpectedReturnConfig, ExpectedReturnModel, ExpectedReturnVector,
    ExponentialCovarianceConfig, ExponentialCovarianceEstimator, LedoitWolfConfig,
    LedoitWolfEstimator, ReturnModel, SampleCovarianceConfig, SampleCovarianceEstimator,
    VarConfig, VarEngine, VarReport, annualized_daily_volatility, daily_volatility,
    downside_deviation, drawdown, population_volatility,
};

/// Covariance estimator used for optimization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceMethod {
    /// Annualized sample covariance
    Sample,
    /// Ledoit-Wolf shrinkage (default)
    #[default]
    LedoitWolf,
    /// Exponentially weighted covariance
    Exponential,
}

/// Objective the portfolio run solves.
///
/// The max-Sharpe variant takes its risk-free rate from
/// [`AnalysisConfig::risk_free_rate`], so CAPM, the objective and the reported
/// Sharpe ratio always share one rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PortfolioObjective {
    /// Global minimum volatility
    MinVolatility,
    /// Tangency portfolio (default)
    #[default]
    MaxSharpe,
    /// Highest return at a volatility ceiling
    EfficientRisk {
        /// Annual volatility ceiling
        target_volatility: f64,
    },
    /// Lowest volatility at a return floor
    EfficientReturn {
        /// Annual return floor
        target_return: f64,
    },
}

impl PortfolioObjective {
    /// Optimizer objective at the given risk-free rate.
    pub const fn resolve(self, risk_free_rate: f64) -> Objective {
        match self {
            Self::MinVolatility => Objective::MinVolatility,
            Self::MaxSharpe => Objective::MaxSharpe { risk_free_rate },
            Self::EfficientRisk { target_volatility } => {
                Objective::EfficientRisk { target_volatility }
            }
            Self::EfficientReturn { target_return } => Objective::EfficientReturn { target_return },
        }
    }
}

/// Settings for every stage of the analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Annual risk-free rate for CAPM and performance (default: 0.02)
    pub risk_free_rate: f64,
    /// Column holding the market benchmark, if any
    pub market: Option<String>,
    /// VaR confidence levels and Monte-Carlo settings
    pub var: VarConfig,
    /// Beta estimation settings
    pub beta: BetaConfig,
    /// Expected-return estimation settings
    pub expected_returns: ExpectedReturnConfig,
    /// Model feeding the optimizer (default: mean historical)
    pub return_model: ReturnModel,
    /// Covariance estimator feeding the optimizer (default: Ledoit-Wolf)
    pub covariance: CovarianceMethod,
    /// Sample covariance settings
    pub sample_covariance: SampleCovarianceConfig,
    /// Ledoit-Wolf settings
    pub ledoit_wolf: LedoitWolfConfig,
    /// Exponential covariance settings
    pub exponential_covariance: ExponentialCovarianceConfig,
    /// Optimization objective (default: max Sharpe)
    pub objective: PortfolioObjective,
    /// Bounds applied to every asset
    pub bounds: Bounds,
    /// Per-asset overrides of `bounds`
    pub asset_bounds: BTreeMap<String, Bounds>,
    /// Sector exposure limits
    pub sectors: Option<SectorConstraints>,
    /// Additional linear constraints
    pub constraints: Vec<LinearConstraint>,
    /// L2 regularization weight (default: 0)
    pub l2_gamma: f64,
    /// Weight cleaning settings
    pub clean: CleanConfig,
    /// Trailing periods held out when backtesting return models (default: 63)
    pub holdout: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
            market: None,
            var: VarConfig::default(),
            beta: BetaConfig::default(),
            expected_returns: ExpectedReturnConfig::default(),
            return_model: ReturnModel::MeanHistorical,
            covariance: CovarianceMethod::default(),
            sample_covariance: SampleCovarianceConfig::default(),
            ledoit_wolf: LedoitWolfConfig::default(),
            exponential_covariance: ExponentialCovarianceConfig::default(),
            objective: PortfolioObjective::default(),
            bounds: Bounds::default(),
            asset_bounds: BTreeMap::new(),
            sectors: None,
            constraints: Vec::new(),
            l2_gamma: 0.0,
            clean: CleanConfig::default(),
            holdout: 63,
        }
    }
}

impl AnalysisConfig {
    /// Reject settings no stage can work with.
    pub fn validate(&self) -> Result<()> {
        if !self.risk_free_rate.is_finite() {
            return Err(VarfolioError::InvalidConfig(format!(
                "risk-free rate must be finite, got {}",
                self.risk_free_rate
            )));
        }
        if self.holdout == 0 {
            return Err(VarfolioError::InvalidConfig(
                "holdout must be at least one period".to_string(),
            ));
        }
        Ok(())
    }

    /// Objective handed to the optimizer, with the configured risk-free rate.
    pub const fn optimizer_objective(&self) -> Objective {
        self.objective.resolve(self.risk_free_rate)
    }
}

/// Risk summary of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReport {
    /// Asset identifier
    pub asset: String,
    /// Number of returns analyzed
    pub n_observations: usize,
    /// Sample standard deviation of daily simple returns
    pub daily_volatility: f64,
    /// Population standard deviation of daily simple returns
    pub population_volatility: f64,
    /// Daily volatility scaled to a year
    pub annualized_volatility: f64,
    /// Standard deviation of the negative daily returns
    pub downside_deviation: f64,
    /// Deepest drawdown of the cumulative log-return index
    pub max_drawdown: f64,
    /// Date of the deepest drawdown
    pub max_drawdown_date: Option<NaiveDate>,
    /// Covariance beta against the market, when one is configured
    pub beta: Option<f64>,
    /// Value-at-Risk of daily simple returns
    pub var: VarReport,
}

/// Outcome of a portfolio optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    /// Objective solved
    pub objective: Objective,
    /// Model that produced the expected returns
    pub return_model: ReturnModel,
    /// Estimator that produced the covariance
    pub covariance_method: CovarianceMethod,
    /// Expected annual return per asset
    pub expected_returns: BTreeMap<String, f64>,
    /// Cleaned weight per asset
    pub weights: BTreeMap<String, f64>,
    /// Performance of the cleaned weights
    pub performance: Performance,
    /// Number of non-zero cleaned weights
    pub n_holdings: usize,
    /// Condition number of the covariance matrix
    pub condition_number: f64,
    /// Solver iterations
    pub iterations: usize,
}

/// Risk summary of one price series, with beta against `market` if given.
pub fn analyze_asset(
    asset: &str,
    prices: &PriceSeries,
    market: Option<&PriceSeries>,
    config: &AnalysisConfig,
) -> Result<AssetReport> {
    let simple = simple_returns(prices)?;
    let log = log_returns(prices)?;
    let drawdowns = drawdown(&log)?;

    let beta = market
        .map(|m| BetaEstimator::new(config.beta.clone()).beta_from_prices(prices, m))
        .transpose()?;
    let var = VarEngine::new(config.var.clone())?.report(&simple)?;

    Ok(AssetReport {
        asset: asset.to_string(),
        n_observations: simple.len(),
        daily_volatility: daily_volatility(&simple)?,
        population_volatility: population_volatility(&simple)?,
        annualized_volatility: annualized_daily_volatility(&simple)?,
        downside_deviation: downside_deviation(&simple)?,
        max_drawdown: drawdowns.max_drawdown(),
        max_drawdown_date: drawdowns.trough_date(),
        beta,
        var,
    })
}

/// Risk summary of every column. The market column gets no beta.
pub fn analyze_matrix(prices: &PriceMatrix, config: &AnalysisConfig) -> Result<Vec<AssetReport>> {
    config.validate()?;
    let market = market_series(prices, config)?;
    tracing::info!(
        assets = prices.n_assets(),
        periods = prices.n_periods(),
        "analyzing assets"
    );

    prices
        .assets()
        .iter()
        .map(|asset| {
            let series = prices
                .series(asset)
                .ok_or_else(|| VarfolioError::UnknownAsset(asset.clone()))?;
            let benchmark = market
                .as_ref()
                .filter(|_| config.market.as_deref() != Some(asset.as_str()));
            analyze_asset(asset, &series, benchmark, config)
        })
        .collect()
}

/// Covariance of the portfolio universe's simple returns.
pub fn estimate_covariance(prices: &PriceMatrix, config: &AnalysisConfig) -> Result<CovarianceMatrix> {
    let returns = simple_return_matrix(prices)?;
    let covariance = match config.covariance {
        CovarianceMethod::Sample => {
            SampleCovarianceEstimator::new(config.sample_covariance.clone()).covariance(&returns)?
        }
        CovarianceMethod::LedoitWolf => {
            LedoitWolfEstimator::new(config.ledoit_wolf.clone()).covariance(&returns)?
        }
        CovarianceMethod::Exponential => {
            ExponentialCovarianceEstimator::new(config.exponential_covariance.clone())?
                .covariance(&returns)?
        }
    };
    tracing::debug!(
        method = ?config.covariance,
        assets = covariance.n_assets(),
        "estimated covariance"
    );
    Ok(covariance)
}

/// Expected returns of the portfolio universe under the configured model.
pub fn estimate_expected_returns(
    prices: &PriceMatrix,
    market: Option<&PriceSeries>,
    config: &AnalysisConfig,
) -> Result<ExpectedReturnVector> {
    let model = ExpectedReturnModel::new(config.expected_returns.clone())?;
    Ok(model.return_model(prices, config.return_model, market, config.risk_free_rate)?)
}

/// Estimate inputs, solve the configured objective and clean the weights.
pub fn optimize_portfolio(prices: &PriceMatrix, config: &AnalysisConfig) -> Result<PortfolioReport> {
    config.validate()?;
    let objective = config.optimizer_objective();
    let (universe, market) = split_market(prices, config)?;
    tracing::info!(
        assets = universe.n_assets(),
        periods = universe.n_periods(),
        ?objective,
        "optimizing portfolio"
    );

    let expected_returns = estimate_expected_returns(&universe, market.as_ref(), config)?;
    let covariance = estimate_covariance(&universe, config)?;
    let condition_number = covariance.condition_number();

    let mut optimizer = PortfolioOptimizer::new(expected_returns.clone(), covariance)?
        .with_bounds(config.bounds)
        .with_l2_regularization(config.l2_gamma)?;
    for (asset, bounds) in &config.asset_bounds {
        optimizer = optimizer.with_asset_bounds(asset, *bounds)?;
    }
    if let Some(sectors) = &config.sectors {
        optimizer = optimizer.add_sector_constraints(sectors)?;
    }
    for constraint in &config.constraints {
        optimizer = optimizer.add_constraint(constraint)?;
    }

    let result = optimizer.optimize(objective)?;
    let cleaned = result.clean_weights(&config.clean)?;
    let performance = result.evaluate(&cleaned, config.risk_free_rate)?;
    tracing::info!(
        holdings = cleaned.n_holdings(),
        expected_return = performance.expected_return,
        volatility = performance.volatility,
        sharpe = performance.sharpe_ratio,
        "optimized portfolio"
    );

    Ok(PortfolioReport {
        objective: result.objective(),
        return_model: config.return_model,
        covariance_method: config.covariance,
        expected_returns: expected_returns
            .iter()
            .map(|(a, r)| (a.to_string(), r))
            .collect(),
        weights: cleaned.iter().map(|(a, w)| (a.to_string(), w)).collect(),
        performance,
        n_holdings: cleaned.n_holdings(),
        condition_number,
        iterations: result.iterations(),
    })
}

/// Score every return model on the trailing hold-out window.
pub fn backtest(prices: &PriceMatrix, config: &AnalysisConfig) -> Result<BacktestReport> {
    config.validate()?;
    let (universe, market) = split_market(prices, config)?;
    let model = ExpectedReturnModel::new(config.expected_returns.clone())?;
    let report = model.backtest_return_models(
        &universe,
        config.holdout,
        market.as_ref(),
        config.risk_free_rate,
    )?;
    if let Some(best) = report.best() {
        tracing::info!(
            model = %best.model,
            mae = best.mean_absolute_error,
            "best return model"
        );
    }
    Ok(report)
}

fn market_series(prices: &PriceMatrix, config: &AnalysisConfig) -> Result<Option<PriceSeries>> {
    config
        .market
        .as_deref()
        .map(|name| {
            prices
                .series(name)
                .ok_or_else(|| VarfolioError::UnknownAsset(name.to_string()))
        })
        .transpose()
}

/// Separate the market column from the assets that can be held.
fn split_market(
    prices: &PriceMatrix,
    config: &AnalysisConfig,
) -> Result<(PriceMatrix, Option<PriceSeries>)> {
    let market = market_series(prices, config)?;
    let Some(name) = config.market.as_deref() else {
        return Ok((prices.clone(), None));
    };
    let holdable: Vec<&str> = prices
        .assets()
        .iter()
        .map(String::as_str)
        .filter(|a| *a != name)
        .collect();
    if holdable.is_empty() {
        return Err(VarfolioError::InvalidConfig(format!(
            "no assets left besides the market column {name}"
        )));
    }
    Ok((prices.select(holdable.as_slice())?, market))
}

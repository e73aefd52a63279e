#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/varfolio/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod beta;
pub mod covariance;
pub mod error;
pub mod expected_returns;
pub mod metrics;
pub mod stats;
pub mod var;

pub use beta::{BetaConfig, BetaEstimator, RegressionResult};
pub use covariance::{
    CovarianceError, CovarianceEstimator, CovarianceMatrix, ExponentialCovarianceConfig,
    ExponentialCovarianceEstimator, LedoitWolfConfig, LedoitWolfEstimator,
    SampleCovarianceConfig, SampleCovarianceEstimator, ShrinkageTarget,
};
pub use error::{Result, RiskError};
pub use expected_returns::{
    BacktestReport, ExpectedReturnConfig, ExpectedReturnModel, ExpectedReturnVector,
    ModelScore, ReturnModel, mean_absolute_error,
};
pub use metrics::{
    DrawdownSeries, annualized_daily_volatility, annualized_volatility, cumulative_index,
    daily_volatility, downside_deviation, drawdown, max_drawdown, population_volatility,
};
pub use stats::{TRADING_DAYS_PER_YEAR, annual_to_daily_rate};
pub use var::{
    MonteCarloConfig, VarConfig, VarEngine, VarEstimate, VarMethod, VarReport, historical_var,
    monte_carlo_var, parametric_var, simulate_paths,
};

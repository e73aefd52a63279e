//! Command handlers. Each writes one JSON document to stdout.

use serde::Serialize;
use std::error::Error;
use std::path::Path;
use varfolio::data::{PriceMatrix, read_price_matrix_from_path};
use varfolio::{AnalysisConfig, analyze_matrix, backtest as backtest_models, optimize_portfolio};

fn read_prices(path: &Path) -> Result<PriceMatrix, Box<dyn Error>> {
    let prices = read_price_matrix_from_path(path)?;
    tracing::info!(
        path = %path.display(),
        assets = prices.n_assets(),
        periods = prices.n_periods(),
        "loaded prices"
    );
    Ok(prices)
}

fn emit<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn analyze(prices: &Path, config: &AnalysisConfig) -> Result<(), Box<dyn Error>> {
    let prices = read_prices(prices)?;
    emit(&analyze_matrix(&prices, config)?)
}

pub(crate) fn optimize(prices: &Path, config: &AnalysisConfig) -> Result<(), Box<dyn Error>> {
    let prices = read_prices(prices)?;
    emit(&optimize_portfolio(&prices, config)?)
}

pub(crate) fn backtest(prices: &Path, config: &AnalysisConfig) -> Result<(), Box<dyn Error>> {
    let prices = read_prices(prices)?;
    emit(&backtest_models(&prices, config)?)
}

//! Varfolio CLI binary.
//!
//! Reads a wide CSV price table, runs the risk engine and writes JSON to
//! stdout. Logs go to stderr and are filtered with `RUST_LOG`.

mod commands;
mod config;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "varfolio")]
#[command(about = "Varfolio: risk analytics and mean-variance portfolio optimization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// CSV price table: a `date` column followed by one column per asset
    #[arg(long)]
    prices: PathBuf,

    /// JSON analysis configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Column to use as the market benchmark
    #[arg(long)]
    market: Option<String>,

    /// Annual risk-free rate
    #[arg(long)]
    risk_free_rate: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Volatility, drawdown, beta and VaR for every asset
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        /// Confidence levels for VaR
        #[arg(long, value_delimiter = ',')]
        confidence: Option<Vec<f64>>,
    },

    /// Optimize portfolio weights
    Optimize {
        #[command(flatten)]
        input: InputArgs,

        /// Objective to solve
        #[arg(long, value_enum)]
        objective: Option<ObjectiveArg>,

        /// Target volatility or return for the efficient objectives
        #[arg(long)]
        target: Option<f64>,

        /// Covariance estimator
        #[arg(long, value_enum)]
        covariance: Option<CovarianceArg>,

        /// Expected-return model
        #[arg(long, value_enum)]
        return_model: Option<ReturnModelArg>,

        /// Maximum weight per asset
        #[arg(long)]
        max_weight: Option<f64>,

        /// L2 regularization weight
        #[arg(long)]
        l2_gamma: Option<f64>,
    },

    /// Score expected-return models on a hold-out window
    Backtest {
        #[command(flatten)]
        input: InputArgs,

        /// Trailing periods held out
        #[arg(long)]
        holdout: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ObjectiveArg {
    MinVolatility,
    MaxSharpe,
    EfficientRisk,
    EfficientReturn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CovarianceArg {
    Sample,
    LedoitWolf,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReturnModelArg {
    MeanHistorical,
    Ema,
    Capm,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { input, confidence } => {
            let mut config = config::load(&input)?;
            if let Some(levels) = confidence {
                config.var.confidence_levels = levels;
            }
            commands::analyze(&input.prices, &config)?;
        }
        Commands::Optimize {
            input,
            objective,
            target,
            covariance,
            return_model,
            max_weight,
            l2_gamma,
        } => {
            let mut config = config::load(&input)?;
            let overrides = config::OptimizeOverrides {
                objective,
                target,
                covariance,
                return_model,
                max_weight,
                l2_gamma,
            };
            overrides.apply(&mut config)?;
            commands::optimize(&input.prices, &config)?;
        }
        Commands::Backtest { input, holdout } => {
            let mut config = config::load(&input)?;
            if let Some(holdout) = holdout {
                config.holdout = holdout;
            }
            commands::backtest(&input.prices, &config)?;
        }
    }

    Ok(())
}

//! Configuration loading and command-line overrides.

use crate::{CovarianceArg, InputArgs, ObjectiveArg, ReturnModelArg};
use std::error::Error;
use std::fs;
use varfolio::optim::Bounds;
use varfolio::risk::ReturnModel;
use varfolio::{AnalysisConfig, CovarianceMethod, PortfolioObjective};

/// Read the JSON config if one was given, then apply the shared flags.
pub(crate) fn load(input: &InputArgs) -> Result<AnalysisConfig, Box<dyn Error>> {
    let mut config = match &input.config {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            let config: AnalysisConfig = serde_json::from_str(&text)?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            config
        }
        None => AnalysisConfig::default(),
    };
    if let Some(market) = &input.market {
        config.market = Some(market.clone());
    }
    if let Some(rate) = input.risk_free_rate {
        config.risk_free_rate = rate;
    }
    config.validate()?;
    Ok(config)
}

/// Flags of the `optimize` command.
#[derive(Debug, Default)]
pub(crate) struct OptimizeOverrides {
    pub(crate) objective: Option<ObjectiveArg>,
    pub(crate) target: Option<f64>,
    pub(crate) covariance: Option<CovarianceArg>,
    pub(crate) return_model: Option<ReturnModelArg>,
    pub(crate) max_weight: Option<f64>,
    pub(crate) l2_gamma: Option<f64>,
}

impl OptimizeOverrides {
    pub(crate) fn apply(self, config: &mut AnalysisConfig) -> Result<(), Box<dyn Error>> {
        if let Some(objective) = self.objective {
            config.objective = match objective {
                ObjectiveArg::MinVolatility => PortfolioObjective::MinVolatility,
                ObjectiveArg::MaxSharpe => PortfolioObjective::MaxSharpe,
                ObjectiveArg::EfficientRisk => PortfolioObjective::EfficientRisk {
                    target_volatility: self.target.ok_or("--target is required for efficient-risk")?,
                },
                ObjectiveArg::EfficientReturn => PortfolioObjective::EfficientReturn {
                    target_return: self.target.ok_or("--target is required for efficient-return")?,
                },
            };
        }
        if let Some(covariance) = self.covariance {
            config.covariance = match covariance {
                CovarianceArg::Sample => CovarianceMethod::Sample,
                CovarianceArg::LedoitWolf => CovarianceMethod::LedoitWolf,
                CovarianceArg::Exponential => CovarianceMethod::Exponential,
            };
        }
        if let Some(model) = self.return_model {
            config.return_model = match model {
                ReturnModelArg::MeanHistorical => ReturnModel::MeanHistorical,
                ReturnModelArg::Ema => ReturnModel::Ema,
                ReturnModelArg::Capm => ReturnModel::Capm,
            };
        }
        if let Some(cap) = self.max_weight {
            config.bounds = Bounds::new(config.bounds.lower, cap)?;
        }
        if let Some(gamma) = self.l2_gamma {
            config.l2_gamma = gamma;
        }
        Ok(())
    }
}

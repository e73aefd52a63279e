#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/varfolio/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod error;

// Re-export the component crates
pub use varfolio_data as data;
pub use varfolio_optim as optim;
pub use varfolio_risk as risk;

pub use analysis::{
    AnalysisConfig, AssetReport, CovarianceMethod, PortfolioObjective, PortfolioReport,
    analyze_asset,
    analyze_matrix, backtest, estimate_covariance, estimate_expected_returns,
    optimize_portfolio,
};
pub use error::{Result, VarfolioError};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

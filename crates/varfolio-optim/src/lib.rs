#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/varfolio/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constraints;
pub mod error;
pub mod optimizer;
pub mod solver;
pub mod weights;

pub use constraints::{Bounds, LinearConstraint, SectorConstraints};
pub use error::{OptimizerError, Result};
pub use optimizer::{Objective, OptimizationResult, Performance, PortfolioOptimizer};
pub use solver::{
    AdmmSolver, ConvexSolver, QpSolution, QuadraticProgram, SolverError, SolverSettings,
};
pub use weights::{CleanConfig, PortfolioWeights};

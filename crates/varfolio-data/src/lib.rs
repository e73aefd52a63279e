#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/varfolio/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod matrix;
pub mod returns;
pub mod series;

pub use error::{DataError, Result};
pub use loader::{read_price_matrix, read_price_matrix_from_path};
pub use matrix::{PriceMatrix, ReturnMatrix};
pub use returns::{
    log_return_matrix, log_returns, return_matrix, returns, simple_return_matrix, simple_returns,
};
pub use series::{PriceSeries, ReturnKind, ReturnSeries};

//! Mathematical utilities: least squares and error metrics.

pub mod ols;
pub mod stats;

pub use ols::*;
pub use stats::*;

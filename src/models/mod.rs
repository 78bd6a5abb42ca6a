//! Candidate regressors for per-target price models.
//!
//! Each family is a plain data type with `fit`/`predict`; `Regressor` wraps
//! them behind one serializable enum so selection and persistence stay generic.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod model;
pub mod tree;

pub use model::Regressor;

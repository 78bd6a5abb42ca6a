//! `fuel-forecast` library crate.
//!
//! The binary (`fuelcast`) is a thin wrapper around this library so that:
//!
//! - each pipeline stage is testable without spawning processes
//! - the stores, model selection and forecasting are reusable on their own
//!
//! Data flows one way: grid observation -> historical store, market feed ->
//! exogenous store, both -> training table -> per-target models -> forecast.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod forecast;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod sink;
pub mod store;

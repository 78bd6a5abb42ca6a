//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - calendar keys and the fixed target set (`MonthKey`, `Target`, `Brand`, `Grade`)
//! - stored rows (`HistoricalRow`, `ExogenousRow`)
//! - training/forecast outputs (`TargetModel`, `Prediction`)
//! - run configuration (`PipelineConfig`, `ModelSettings`)

pub mod types;

pub use types::*;

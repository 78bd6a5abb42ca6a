//! Model training orchestration.
//!
//! Responsibilities:
//!
//! - build forward-chaining validation folds
//! - score every candidate per target (targets in parallel)
//! - select, refit and persist the winner

pub mod cv;
pub mod selection;

pub use cv::*;
pub use selection::*;

//! Reporting: forecast tables and training diagnostics.

pub mod format;

pub use format::*;

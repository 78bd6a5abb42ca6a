//! Persisted month-keyed stores.
//!
//! - historical retail prices (`historical`)
//! - monthly exogenous features (`exogenous`)
//! - the joined training table (`merge`)

pub mod exogenous;
pub mod historical;
pub mod merge;

pub use exogenous::ExogenousStore;
pub use historical::{HistoricalStore, RecordOutcome};

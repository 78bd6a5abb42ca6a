//! Input/output helpers.
//!
//! - month-keyed CSV tables (`table`)
//! - per-target model artifacts and the training summary (`artifacts`)

pub mod artifacts;
pub mod table;

pub use artifacts::{LoadedModel, ModelMeta, ModelRegistry};
pub use table::{MonthSource, Table, TableRow, read_table, write_table};

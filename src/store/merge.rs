//! Join of historical prices and exogenous features into the training table.
//!
//! Inner join on `month`: a month lacking either actuals or features cannot be
//! trained or evaluated, so it is dropped. The output carries a single
//! canonical `date` column (rebuilt from `month` on write) and is sorted by
//! date ascending.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::MonthKey;
use crate::error::AppError;
use crate::io::table::{MonthSource, Table, TableRow, read_table, write_table};

/// Pure join of two month-keyed tables.
///
/// Output columns are the historical columns followed by the exogenous columns
/// not already present. Rows whose exogenous features are incomplete are
/// excluded so every training row has a full feature set.
pub fn join(historical: &Table, exogenous: &Table) -> Table {
    let exog_by_month: BTreeMap<MonthKey, &TableRow> = exogenous.rows.iter().map(|r| (r.month, r)).collect();

    let exog_cols: Vec<(usize, &String)> = exogenous
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            let duplicate = historical.columns.contains(name);
            if duplicate {
                warn!(column = %name, "column present on both sides; keeping the historical value");
            }
            !duplicate
        })
        .collect();

    let mut columns = historical.columns.clone();
    columns.extend(exog_cols.iter().map(|(_, name)| (*name).clone()));
    let mut out = Table::new(columns);

    let mut seen = BTreeMap::new();
    let mut incomplete = 0usize;
    for hist in &historical.rows {
        if seen.insert(hist.month, ()).is_some() {
            warn!(month = %hist.month, "duplicate historical month; keeping the first row");
            continue;
        }
        let Some(exog) = exog_by_month.get(&hist.month) else {
            continue;
        };

        let features: Vec<Option<f64>> = exog_cols
            .iter()
            .map(|(idx, _)| exog.values.get(*idx).copied().flatten())
            .collect();
        if features.iter().any(Option::is_none) {
            incomplete += 1;
            continue;
        }

        let mut values = hist.values.clone();
        values.extend(features);
        out.rows.push(TableRow {
            month: hist.month,
            values,
        });
    }

    if incomplete > 0 {
        warn!(rows = incomplete, "dropped joined months with incomplete exogenous features");
    }

    out.sort_by_month();
    out
}

/// Read both sources, join them, and write the training table.
pub fn merge_files(historical_path: &Path, exogenous_path: &Path, out_path: &Path) -> Result<Table, AppError> {
    for (label, path) in [("historical", historical_path), ("exogenous", exogenous_path)] {
        if !path.exists() {
            return Err(AppError::config(format!(
                "Missing {label} source file '{}'.",
                path.display()
            )));
        }
    }

    let historical = read_table(historical_path, MonthSource::OrDate)?;
    let exogenous = read_table(exogenous_path, MonthSource::Required)?;

    let merged = join(&historical, &exogenous);
    write_table(out_path, &merged)?;

    info!(
        rows = merged.len(),
        columns = merged.columns.len(),
        path = %out_path.display(),
        "training table written"
    );
    Ok(merged)
}

//! Flat month-keyed CSV tables.
//!
//! All three persisted stores (historical prices, monthly exogenous features,
//! merged training table) share one on-disk shape:
//!
//! ```text
//! date,month,<numeric columns...>
//! 2024-01-01,2024-01,9800,,10100,...
//! ```
//!
//! - empty or non-numeric cells read as null
//! - a missing `date` column is rebuilt from `month`
//! - a missing `month` column may be derived from `date[..7]` (caller decides)
//! - any other `date*` column (e.g. `date_x` left over from a join) is dropped

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use csv::StringRecord;

use crate::domain::MonthKey;
use crate::error::AppError;

/// How the `month` key is resolved when reading a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthSource {
    /// The file must carry a `month` column.
    Required,
    /// Use `month` if present, otherwise derive it from `date`.
    OrDate,
}

/// A single month's values, aligned with `Table::columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub month: MonthKey,
    pub values: Vec<Option<f64>>,
}

/// In-memory month-keyed table (calendar columns kept out of `columns`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.values.get(idx).copied().flatten()
    }

    pub fn months(&self) -> Vec<MonthKey> {
        self.rows.iter().map(|r| r.month).collect()
    }

    /// Stable ascending sort by month.
    pub fn sort_by_month(&mut self) {
        self.rows.sort_by_key(|r| r.month);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read a month-keyed CSV table.
pub fn read_table(path: &Path, month_source: MonthSource) -> Result<Table, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open table '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("Failed to read headers of '{}': {e}", path.display())))?
        .clone();

    let names: Vec<String> = headers.iter().map(normalize_header_name).collect();
    let header_map: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let month_idx = header_map.get("month").copied();
    let date_idx = header_map.get("date").copied();

    match (month_idx, date_idx, month_source) {
        (None, _, MonthSource::Required) => {
            return Err(AppError::config(format!(
                "Table '{}' is missing the required `month` column.",
                path.display()
            )));
        }
        (None, None, MonthSource::OrDate) => {
            return Err(AppError::config(format!(
                "Table '{}' must contain either `date` or `month`.",
                path.display()
            )));
        }
        _ => {}
    }

    // Numeric columns: everything that is not a calendar column.
    let value_cols: Vec<(usize, String)> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_calendar_column(name))
        .map(|(idx, name)| (idx, name.clone()))
        .collect();

    let mut table = Table::new(value_cols.iter().map(|(_, n)| n.clone()).collect());

    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1, records are 1-based.
        let line = idx + 2;
        let record = result.map_err(|e| {
            AppError::config(format!("CSV parse error in '{}' line {line}: {e}", path.display()))
        })?;

        let month = resolve_month(&record, month_idx, date_idx).ok_or_else(|| {
            AppError::config(format!(
                "Cannot derive month on line {line} of '{}'.",
                path.display()
            ))
        })?;

        let values = value_cols
            .iter()
            .map(|(col, _)| parse_cell(record.get(*col)))
            .collect();

        table.rows.push(TableRow { month, values });
    }

    Ok(table)
}

/// Write a table with the leading `date,month` columns (whole-file overwrite).
pub fn write_table(path: &Path, table: &Table) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::runtime(format!("Failed to create directory '{}': {e}", parent.display()))
        })?;
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::runtime(format!("Failed to create table '{}': {e}", path.display())))?;

    let mut header = vec!["date".to_string(), "month".to_string()];
    header.extend(table.columns.iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| AppError::runtime(format!("Failed to write table header: {e}")))?;

    for row in &table.rows {
        let mut record = vec![row.month.date_string(), row.month.to_string()];
        record.extend(row.values.iter().map(|v| format_cell(*v)));
        writer
            .write_record(&record)
            .map_err(|e| AppError::runtime(format!("Failed to write table row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::runtime(format!("Failed to flush table '{}': {e}", path.display())))?;
    Ok(())
}

pub fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes carry a BOM on the first header.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

/// `month`, `date` and join leftovers such as `date_x` / `date_y`.
pub fn is_calendar_column(name: &str) -> bool {
    name == "month" || name.starts_with("date")
}

fn resolve_month(record: &StringRecord, month_idx: Option<usize>, date_idx: Option<usize>) -> Option<MonthKey> {
    if let Some(raw) = month_idx.and_then(|i| record.get(i)).filter(|s| !s.is_empty()) {
        return raw.parse().ok();
    }
    let date = date_idx.and_then(|i| record.get(i))?;
    date.get(..7)?.parse().ok()
}

fn parse_cell(raw: Option<&str>) -> Option<f64> {
    let v = raw?.trim().parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Canonical cell text: empty for null or non-finite.
pub fn format_cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v}"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_month_is_derived_from_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "t.csv", "date,pertamina_92\n2024-02-01,10000\n2024-01-01,\n");

        let table = read_table(&path, MonthSource::OrDate).unwrap();
        assert_eq!(table.columns, vec!["pertamina_92"]);
        assert_eq!(table.rows[0].month.to_string(), "2024-02");
        assert_eq!(table.rows[1].values, vec![None]);
    }

    #[test]
    fn required_month_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "t.csv", "date,brent\n2024-02-01,80\n");
        let err = read_table(&path, MonthSource::Required).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn redundant_date_columns_are_dropped_and_written_back_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "t.csv",
            "date_x,month,brent,date_y\n2024-03-01,2024-03,81.5,2024-03-01\n",
        );
        let table = read_table(&path, MonthSource::Required).unwrap();
        assert_eq!(table.columns, vec!["brent"]);

        let out = dir.path().join("out.csv");
        write_table(&out, &table).unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(text, "date,month,brent\n2024-03-01,2024-03,81.5\n");
    }

    #[test]
    fn non_numeric_cells_read_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "t.csv", "month,a,b\n2024-01,abc,NaN\n");
        let table = read_table(&path, MonthSource::Required).unwrap();
        assert_eq!(table.rows[0].values, vec![None, None]);
    }
}

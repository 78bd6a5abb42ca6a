//! Append-only, month-idempotent store of observed retail prices.
//!
//! `record_observation` is safe to re-run any number of times per day against
//! the same source: a month that already exists is a no-op and the file is not
//! rewritten. The check-then-append is not atomic, so concurrent runs must be
//! serialized by the caller.
//!
//! Appending never touches existing rows: their cells are written back as read,
//! extra columns included. Only the new row and any missing target columns
//! (empty for older rows) are added.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::data::grid::{RawObservation, clean_price_cell, parse_grade};
use crate::domain::{HistoricalRow, MonthKey, Target};
use crate::error::AppError;
use crate::io::table::{
    MonthSource, Table, TableRow, format_cell, normalize_header_name, read_table, write_table,
};

/// Result of recording one observation batch.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub appended: bool,
    pub month: MonthKey,
    pub rows: Vec<HistoricalRow>,
}

/// Historical prices CSV (one row per month).
#[derive(Debug, Clone)]
pub struct HistoricalStore {
    path: PathBuf,
}

impl HistoricalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all rows; a store that does not exist yet is empty.
    pub fn load(&self) -> Result<Vec<HistoricalRow>, AppError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let table = read_table(&self.path, MonthSource::OrDate)?;
        Ok(rows_from_table(&table))
    }

    /// Append the observation's month unless it is already stored.
    pub fn record_observation(&self, obs: &RawObservation) -> Result<RecordOutcome, AppError> {
        let month = obs.month();
        let mut rows = self.load()?;
        debug!(existing = rows.len(), %month, "loaded historical store");

        if rows.iter().any(|r| r.month == month) {
            info!(%month, "month already stored; skipping append");
            return Ok(RecordOutcome {
                appended: false,
                month,
                rows,
            });
        }

        let row = build_row(obs);
        info!(%month, quoted = row.prices.iter().flatten().count(), "appending historical month");
        if self.path.exists() {
            let mut stored = StoredRows::read(&self.path)?;
            stored.append(&row);
            stored.write(&self.path)?;
        } else {
            write_table(&self.path, &rows_to_table(std::slice::from_ref(&row)))?;
        }

        rows.push(row);
        rows.sort_by_key(|r| r.date());
        Ok(RecordOutcome {
            appended: true,
            month,
            rows,
        })
    }
}

/// The store file as cell text, so existing rows round-trip unchanged.
struct StoredRows {
    header: Vec<String>,
    records: Vec<Vec<String>>,
}

impl StoredRows {
    fn read(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::config(format!("Failed to open table '{}': {e}", path.display())))?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::config(format!("Failed to read headers of '{}': {e}", path.display())))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::config(format!("CSV parse error in '{}' line {}: {e}", path.display(), idx + 2))
            })?;
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(header.len(), String::new());
            records.push(cells);
        }
        Ok(Self { header, records })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| normalize_header_name(h) == name)
    }

    /// Add the row, widening the header with any target column it lacks,
    /// then order all rows by month.
    fn append(&mut self, row: &HistoricalRow) {
        for target in Target::ALL {
            let id = target.id();
            if self.position(&id).is_none() {
                self.header.push(id);
                for record in &mut self.records {
                    record.push(String::new());
                }
            }
        }

        let cells = self
            .header
            .iter()
            .map(|h| match normalize_header_name(h).as_str() {
                "date" => row.month.date_string(),
                "month" => row.month.to_string(),
                name => Target::ALL
                    .into_iter()
                    .find(|t| t.id() == name)
                    .map(|t| format_cell(row.price(t)))
                    .unwrap_or_default(),
            })
            .collect();
        self.records.push(cells);

        let (month_idx, date_idx) = (self.position("month"), self.position("date"));
        let month_of = |record: &Vec<String>| -> Option<MonthKey> {
            month_idx
                .and_then(|i| record.get(i))
                .filter(|s| !s.trim().is_empty())
                .or_else(|| date_idx.and_then(|i| record.get(i)))
                .and_then(|s| s.trim().get(..7))
                .and_then(|s| s.parse().ok())
        };
        self.records.sort_by_key(|r| month_of(r));
    }

    fn write(&self, path: &Path) -> Result<(), AppError> {
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| AppError::runtime(format!("Failed to create table '{}': {e}", path.display())))?;
        for record in std::iter::once(&self.header).chain(&self.records) {
            writer
                .write_record(record)
                .map_err(|e| AppError::runtime(format!("Failed to write table row: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| AppError::runtime(format!("Failed to flush table '{}': {e}", path.display())))
    }
}

/// Build a historical row from a raw grid. Bad cells become nulls, never errors.
pub fn build_row(obs: &RawObservation) -> HistoricalRow {
    let mut row = HistoricalRow::empty(obs.month());

    for grid_row in &obs.rows {
        let Some(grade) = parse_grade(&grid_row.grade_text) else {
            warn!(grade = %grid_row.grade_text, "unsupported grade row; skipping");
            continue;
        };
        for (brand, text) in &grid_row.cells {
            // Only brands that sell this grade map to a target column.
            if let Some(target) = Target::lookup(*brand, grade) {
                row.set_price(target, clean_price_cell(text));
            }
        }
    }

    row
}

pub fn rows_to_table(rows: &[HistoricalRow]) -> Table {
    let mut table = Table::new(Target::ALL.iter().map(|t| t.id()).collect());
    table.rows = rows
        .iter()
        .map(|r| TableRow {
            month: r.month,
            values: r.prices.to_vec(),
        })
        .collect();
    table
}

/// Map a table onto the fixed target columns; absent columns are null.
pub fn rows_from_table(table: &Table) -> Vec<HistoricalRow> {
    let indices: Vec<Option<usize>> = Target::ALL
        .iter()
        .map(|t| table.column_index(&t.id()))
        .collect();

    table
        .rows
        .iter()
        .map(|r| {
            let mut row = HistoricalRow::empty(r.month);
            for (slot, idx) in row.prices.iter_mut().zip(&indices) {
                *slot = idx.and_then(|i| r.values.get(i).copied().flatten());
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::grid::grid_row_from_cells;
    use crate::domain::{Brand, Grade};
    use chrono::NaiveDate;

    fn observation(date: (i32, u32, u32), rows: &[&[&str]]) -> RawObservation {
        RawObservation {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            rows: rows
                .iter()
                .map(|cells| grid_row_from_cells(cells.iter().map(|s| s.to_string()).collect()))
                .collect(),
        }
    }

    fn target(brand: Brand, grade: Grade) -> Target {
        Target::lookup(brand, grade).unwrap()
    }

    #[test]
    fn first_observation_appends_and_second_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoricalStore::new(dir.path().join("hist.csv"));
        let obs = observation((2024, 1, 15), &[&["92", "9.800", "-", "10.100", "10.050"]]);

        let first = store.record_observation(&obs).unwrap();
        assert!(first.appended);
        assert_eq!(first.rows.len(), 1);
        let row = &first.rows[0];
        assert_eq!(row.month.to_string(), "2024-01");
        assert_eq!(row.price(target(Brand::Pertamina, Grade::Ron92)), Some(9800.0));
        assert_eq!(row.price(target(Brand::Vivo, Grade::Ron92)), None);
        assert_eq!(row.price(target(Brand::Bp, Grade::Ron92)), Some(10100.0));
        assert_eq!(row.price(target(Brand::Shell, Grade::Ron92)), Some(10050.0));

        let bytes_before = std::fs::read(store.path()).unwrap();
        let second = store.record_observation(&obs).unwrap();
        assert!(!second.appended);
        assert_eq!(second.rows.len(), 1);
        assert_eq!(std::fs::read(store.path()).unwrap(), bytes_before);
    }

    #[test]
    fn later_day_in_same_month_does_not_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoricalStore::new(dir.path().join("hist.csv"));
        store
            .record_observation(&observation((2024, 3, 2), &[&["92", "10.000"]]))
            .unwrap();
        let outcome = store
            .record_observation(&observation((2024, 3, 28), &[&["92", "12.000"]]))
            .unwrap();

        assert!(!outcome.appended);
        let rows = store.load().unwrap();
        assert_eq!(rows[0].price(target(Brand::Pertamina, Grade::Ron92)), Some(10000.0));
    }

    #[test]
    fn appended_months_are_kept_in_date_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoricalStore::new(dir.path().join("hist.csv"));
        for (y, m) in [(2024, 5), (2024, 2), (2023, 11)] {
            store
                .record_observation(&observation((y, m, 10), &[&["95", "13.000"]]))
                .unwrap();
        }
        let months: Vec<String> = store.load().unwrap().iter().map(|r| r.month.to_string()).collect();
        assert_eq!(months, vec!["2023-11", "2024-02", "2024-05"]);
    }

    #[test]
    fn append_leaves_existing_rows_and_extra_columns_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hist.csv");
        std::fs::write(
            &path,
            "date,month,pertamina_92,pertamina_dex\n2024-03-15,2024-03,10200,13900\n2023-12-15,2023-12,10000,13500\n",
        )
        .unwrap();
        let store = HistoricalStore::new(&path);

        let outcome = store
            .record_observation(&observation((2024, 1, 15), &[&["92", "9.800", "-", "10.100", "10.050"]]))
            .unwrap();
        assert!(outcome.appended);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("date,month,pertamina_92,pertamina_dex,pertamina_90,"));
        assert_eq!(lines[0].split(',').count(), 2 + 1 + Target::COUNT);
        assert!(lines[1].starts_with("2023-12-15,2023-12,10000,13500,"));
        assert!(lines[2].starts_with("2024-01-01,2024-01,9800,,"));
        assert!(lines[3].starts_with("2024-03-15,2024-03,10200,13900,"));

        let months: Vec<String> = store.load().unwrap().iter().map(|r| r.month.to_string()).collect();
        assert_eq!(months, vec!["2023-12", "2024-01", "2024-03"]);
        assert_eq!(
            store.load().unwrap()[1].price(target(Brand::Bp, Grade::Ron92)),
            Some(10100.0)
        );
    }

    #[test]
    fn unsupported_grades_and_unsold_brands_are_ignored() {
        let obs = observation(
            (2024, 1, 1),
            &[&["91", "9.000"], &["90", "10.000", "10.500", "11.000", "12.000"]],
        );
        let row = build_row(&obs);
        assert_eq!(row.price(target(Brand::Pertamina, Grade::Ron90)), Some(10000.0));
        assert_eq!(row.price(target(Brand::Vivo, Grade::Ron90)), Some(10500.0));
        // bp/shell do not sell RON 90.
        assert_eq!(row.prices.iter().flatten().count(), 2);
    }
}

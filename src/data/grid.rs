//! Raw retail price grid (one observation day).
//!
//! The scraped source is reduced upstream to a table-shaped CSV:
//!
//! ```text
//! ron,pertamina,vivo,bp,shell
//! 92,9.800,-,10.100,10.050
//! ```
//!
//! Cells are free text ("12.350Pertamax", "-", "0Revvo92"), so prices are
//! extracted with `clean_price_cell`. The observation date comes from the file
//! name, never from the content.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;

use crate::domain::{Brand, Grade, MonthKey};
use crate::error::AppError;

/// Number of grid columns: grade + one per brand.
const GRID_WIDTH: usize = 1 + Brand::ALL.len();

/// One grade row of the grid with the raw text of each brand cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub grade_text: String,
    pub cells: BTreeMap<Brand, String>,
}

/// A raw per-day observation batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub date: NaiveDate,
    pub rows: Vec<GridRow>,
}

impl RawObservation {
    pub fn month(&self) -> MonthKey {
        MonthKey::from_date(self.date)
    }
}

/// Load a grid CSV; the observation date is parsed from the file name.
pub fn load_observation(path: &Path) -> Result<RawObservation, AppError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let date = date_from_identifier(&name)?;

    let file = File::open(path).map_err(|e| {
        AppError::config(format!("Failed to open observation grid '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::config(format!("Grid parse error on line {}: {e}", idx + 2))
        })?;
        let cells: Vec<String> = record.iter().map(str::to_string).collect();
        rows.push(grid_row_from_cells(cells));
    }

    Ok(RawObservation { date, rows })
}

/// Build a grid row from positional cells, padding or cutting to the grid width.
pub fn grid_row_from_cells(mut cells: Vec<String>) -> GridRow {
    cells.resize(GRID_WIDTH, String::new());
    let grade_text = cells[0].clone();
    let cells = Brand::ALL
        .iter()
        .zip(cells.into_iter().skip(1))
        .map(|(brand, text)| (*brand, text))
        .collect();
    GridRow { grade_text, cells }
}

/// Extract the observation date from a source identifier (file name).
///
/// Uses the first eight digits of the first run of at least eight consecutive
/// digits, read as `YYYYMMDD`.
/// Failure is fatal for the run.
pub fn date_from_identifier(identifier: &str) -> Result<NaiveDate, AppError> {
    let chars: Vec<char> = identifier.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i - start >= 8 {
                let digits: String = chars[start..start + 8].iter().collect();
                return NaiveDate::parse_from_str(&digits, "%Y%m%d").map_err(|e| {
                    AppError::config(format!(
                        "Invalid observation date '{digits}' in '{identifier}': {e}"
                    ))
                });
            }
        } else {
            i += 1;
        }
    }
    Err(AppError::config(format!(
        "Cannot parse a YYYYMMDD date from source identifier '{identifier}'."
    )))
}

/// Parse the grade column ("92", "92.0", "RON 92").
pub fn parse_grade(text: &str) -> Option<Grade> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Grade::from_octane(digits.parse().ok()?)
}

/// Clean one raw price cell.
///
/// - empty, `-`, `na` and an exact zero mean "no quoted price" (`None`)
/// - otherwise the first run of digits and `.`/`,` separators is taken and the
///   separators are dropped: they are thousands separators in this market
///   (`"12.350Pertamax"` → `12350`)
/// - anything without digits is `None`, never an error
pub fn clean_price_cell(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() || text == "-" || text.eq_ignore_ascii_case("na") {
        return None;
    }

    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();

    let value = digits.parse::<u64>().ok()?;
    if value == 0 { None } else { Some(value as f64) }
}

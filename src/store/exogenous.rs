//! Monthly exogenous feature table.
//!
//! Daily quotes are collapsed to one row per calendar month by taking the
//! **last available value** of each series within the month (a point-in-time
//! snapshot, not an average). Rows are keyed by `MonthKey`, so they join
//! directly against the historical store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::data::market::{DailyMarketData, MarketFeed};
use crate::domain::{ExogenousRow, MonthKey};
use crate::error::AppError;
use crate::io::table::{MonthSource, Table, TableRow, read_table, write_table};

/// Collapse daily series into monthly snapshot rows, ascending by month.
pub fn aggregate(daily: &DailyMarketData) -> Vec<ExogenousRow> {
    // Outer join by date. Series only carry observed days, so a joined date
    // always has at least one value.
    let mut by_date: BTreeMap<NaiveDate, [Option<f64>; 3]> = BTreeMap::new();
    for (slot, series) in [&daily.brent, &daily.rbob, &daily.usd_idr].into_iter().enumerate() {
        for (date, value) in series {
            if value.is_finite() {
                by_date.entry(*date).or_default()[slot] = Some(*value);
            }
        }
    }

    // Walk dates ascending; the last value seen per series wins within a month.
    let mut by_month: BTreeMap<MonthKey, [Option<f64>; 3]> = BTreeMap::new();
    for (date, values) in by_date {
        let entry = by_month.entry(MonthKey::from_date(date)).or_default();
        for (slot, value) in entry.iter_mut().zip(values) {
            if value.is_some() {
                *slot = value;
            }
        }
    }

    by_month
        .into_iter()
        .map(|(month, [brent, rbob, usd_idr])| ExogenousRow {
            month,
            brent,
            rbob,
            usd_idr,
        })
        .collect()
}

/// Concatenate, keep exactly one row per month (later rows win), sort ascending.
pub fn merge_rows(existing: Vec<ExogenousRow>, fresh: Vec<ExogenousRow>) -> Vec<ExogenousRow> {
    let mut by_month = BTreeMap::new();
    for row in existing.into_iter().chain(fresh) {
        by_month.insert(row.month, row);
    }
    by_month.into_values().collect()
}

pub fn rows_to_table(rows: &[ExogenousRow]) -> Table {
    let mut table = Table::new(ExogenousRow::COLUMNS.iter().map(|c| c.to_string()).collect());
    table.rows = rows
        .iter()
        .map(|r| TableRow {
            month: r.month,
            values: r.values(),
        })
        .collect();
    table
}

/// Rebuild typed rows; derived columns are recomputed from `rbob`.
pub fn rows_from_table(table: &Table) -> Vec<ExogenousRow> {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, r)| ExogenousRow {
            month: r.month,
            brent: table.value(i, "brent"),
            rbob: table.value(i, "rbob"),
            usd_idr: table.value(i, "usd_idr"),
        })
        .collect()
}

/// Exogenous history CSV.
#[derive(Debug, Clone)]
pub struct ExogenousStore {
    path: PathBuf,
}

impl ExogenousStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<ExogenousRow>, AppError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let table = read_table(&self.path, MonthSource::Required)?;
        Ok(rows_from_table(&table))
    }

    /// Fetch daily data since `start`, aggregate it and merge it into the store.
    pub fn update(&self, feed: &dyn MarketFeed, start: NaiveDate) -> Result<Vec<ExogenousRow>, AppError> {
        let daily = feed.fetch_daily(start)?;
        if daily.is_empty() {
            return Err(AppError::insufficient(format!(
                "Market feed returned no observations since {start}."
            )));
        }

        let fresh = aggregate(&daily);
        info!(months = fresh.len(), "aggregated daily market data");

        let existing = self.load()?;
        let before = existing.len();
        let merged = merge_rows(existing, fresh);
        write_table(&self.path, &rows_to_table(&merged))?;

        info!(before, after = merged.len(), path = %self.path.display(), "exogenous history updated");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn month(s: &str) -> MonthKey {
        s.parse().unwrap()
    }

    #[test]
    fn monthly_snapshot_takes_last_available_value_per_series() {
        let daily = DailyMarketData {
            brent: vec![(d(2024, 1, 2), 76.0), (d(2024, 1, 30), 81.0), (d(2024, 2, 1), 82.0)],
            // Last RBOB quote of January is earlier than Brent's.
            rbob: vec![(d(2024, 1, 5), 2.1), (d(2024, 1, 25), 2.3)],
            usd_idr: vec![(d(2024, 2, 28), 15_700.0)],
        };

        let rows = aggregate(&daily);
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].month, month("2024-01"));
        assert_eq!(rows[0].brent, Some(81.0));
        assert_eq!(rows[0].rbob, Some(2.3));
        assert_eq!(rows[0].usd_idr, None);

        assert_eq!(rows[1].month, month("2024-02"));
        assert_eq!(rows[1].brent, Some(82.0));
        assert_eq!(rows[1].rbob, None);
        assert_eq!(rows[1].usd_idr, Some(15_700.0));
    }

    #[test]
    fn merge_is_strictly_increasing_and_last_write_wins() {
        let row = |m: &str, brent: f64| ExogenousRow {
            month: month(m),
            brent: Some(brent),
            rbob: Some(2.0),
            usd_idr: Some(15_000.0),
        };
        let existing = vec![row("2024-01", 70.0), row("2024-03", 72.0), row("2024-02", 71.0)];
        let fresh = vec![row("2024-03", 90.0), row("2024-04", 91.0)];

        let merged = merge_rows(existing, fresh);
        let months: Vec<MonthKey> = merged.iter().map(|r| r.month).collect();
        assert!(months.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[2].brent, Some(90.0));
    }

    struct FixedFeed(DailyMarketData);

    impl MarketFeed for FixedFeed {
        fn fetch_daily(&self, _start: NaiveDate) -> Result<DailyMarketData, AppError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn update_persists_derived_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExogenousStore::new(dir.path().join("exog.csv"));
        let feed = FixedFeed(DailyMarketData {
            brent: vec![(d(2024, 1, 31), 80.0)],
            rbob: vec![(d(2024, 1, 31), 3.78541)],
            usd_idr: vec![(d(2024, 1, 31), 15_600.0)],
        });

        store.update(&feed, d(2024, 1, 1)).unwrap();
        let table = read_table(store.path(), MonthSource::Required).unwrap();
        assert_eq!(table.columns, ExogenousRow::COLUMNS);
        assert!(table.column_index("base_mops").is_none());
        assert!((table.value(0, "rbob_liter").unwrap() - 1.0).abs() < 1e-9);
        assert!((table.value(0, "base_ron95").unwrap() - 1.06).abs() < 1e-9);

        // Re-running with the same feed leaves one row per month.
        let rows = store.update(&feed, d(2024, 1, 1)).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn empty_feed_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExogenousStore::new(dir.path().join("exog.csv"));
        let err = store
            .update(&FixedFeed(DailyMarketData::default()), d(2024, 1, 1))
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}

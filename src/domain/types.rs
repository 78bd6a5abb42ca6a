//! Shared domain types.
//!
//! These types are intentionally kept small and serializable so they can be:
//!
//! - used in-memory while training and forecasting
//! - written to the flat CSV stores and JSON artifacts
//! - reloaded by later pipeline stages

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Liters per US gallon, used to express the refined-product benchmark per liter.
pub const LITERS_PER_GALLON: f64 = 3.78541;

/// Calendar month identifier, canonical form `YYYY-MM`.
///
/// This is the only join and idempotency key across the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (0..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    /// First calendar day of the month.
    pub fn first_day(self) -> NaiveDate {
        // `new` guarantees a valid year/month pair, so day 1 always exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// The parallel `date` field stored next to `month` (`YYYY-MM-01`).
    pub fn date_string(self) -> String {
        format!("{self}-01")
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || AppError::config(format!("Invalid month '{s}'. Expected YYYY-MM."));
        let (y, m) = s.split_once('-').ok_or_else(invalid)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(invalid());
        }
        let year = y.parse::<i32>().map_err(|_| invalid())?;
        let month = m.parse::<u32>().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

/// Retail brand quoted in the observation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Pertamina,
    Vivo,
    Bp,
    Shell,
}

impl Brand {
    /// Grid column order of the raw observation source.
    pub const ALL: [Brand; 4] = [Brand::Pertamina, Brand::Vivo, Brand::Bp, Brand::Shell];

    /// Reference brand whose price is the floor for every other brand.
    pub const REFERENCE: Brand = Brand::Pertamina;

    pub fn key(self) -> &'static str {
        match self {
            Brand::Pertamina => "pertamina",
            Brand::Vivo => "vivo",
            Brand::Bp => "bp",
            Brand::Shell => "shell",
        }
    }
}

/// Octane grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    Ron90,
    Ron92,
    Ron95,
    Ron98,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Ron90, Grade::Ron92, Grade::Ron95, Grade::Ron98];

    pub fn octane(self) -> u32 {
        match self {
            Grade::Ron90 => 90,
            Grade::Ron92 => 92,
            Grade::Ron95 => 95,
            Grade::Ron98 => 98,
        }
    }

    pub fn from_octane(octane: u32) -> Option<Self> {
        Grade::ALL.into_iter().find(|g| g.octane() == octane)
    }

    /// Fixed premium (per liter) over the refined-product benchmark.
    ///
    /// Grade spreads are assumed to track a constant offset rather than being
    /// forecast independently.
    pub fn base_offset(self) -> f64 {
        match self {
            Grade::Ron90 => -0.04,
            Grade::Ron92 => 0.0,
            Grade::Ron95 => 0.06,
            Grade::Ron98 => 0.12,
        }
    }

    /// Exogenous column holding the derived base price for this grade.
    pub fn base_column(self) -> &'static str {
        match self {
            Grade::Ron90 => "base_ron90",
            Grade::Ron92 => "base_ron92",
            Grade::Ron95 => "base_ron95",
            Grade::Ron98 => "base_ron98",
        }
    }
}

/// One (brand, grade) prediction target, serialized as its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    pub brand: Brand,
    pub grade: Grade,
}

impl Target {
    pub const COUNT: usize = 12;

    /// The fixed target set, in declared order.
    pub const ALL: [Target; Target::COUNT] = [
        Target::new(Brand::Pertamina, Grade::Ron90),
        Target::new(Brand::Pertamina, Grade::Ron92),
        Target::new(Brand::Pertamina, Grade::Ron95),
        Target::new(Brand::Pertamina, Grade::Ron98),
        Target::new(Brand::Shell, Grade::Ron92),
        Target::new(Brand::Shell, Grade::Ron95),
        Target::new(Brand::Shell, Grade::Ron98),
        Target::new(Brand::Bp, Grade::Ron92),
        Target::new(Brand::Bp, Grade::Ron95),
        Target::new(Brand::Vivo, Grade::Ron90),
        Target::new(Brand::Vivo, Grade::Ron92),
        Target::new(Brand::Vivo, Grade::Ron95),
    ];

    pub const fn new(brand: Brand, grade: Grade) -> Self {
        Self { brand, grade }
    }

    /// Look up a target; `None` when the brand does not sell that grade.
    pub fn lookup(brand: Brand, grade: Grade) -> Option<Self> {
        Target::ALL
            .into_iter()
            .find(|t| t.brand == brand && t.grade == grade)
    }

    /// Position in `Target::ALL`.
    pub fn index(self) -> usize {
        Target::ALL
            .iter()
            .position(|t| *t == self)
            .unwrap_or(Target::COUNT)
    }

    /// Column name / target id, e.g. `pertamina_92`.
    pub fn id(self) -> String {
        format!("{}_{}", self.brand.key(), self.grade.octane())
    }

    pub fn is_target_column(name: &str) -> bool {
        Target::ALL.iter().any(|t| t.id() == name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.brand.key(), self.grade.octane())
    }
}

impl FromStr for Target {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.id() == s.trim())
            .ok_or_else(|| AppError::config(format!("Unknown target id '{s}'.")))
    }
}

impl TryFrom<String> for Target {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(value: Target) -> Self {
        value.id()
    }
}

impl PartialOrd for Target {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Target {
    /// Declared order, so reports and maps list targets the same way everywhere.
    fn cmp(&self, other: &Self) -> Ordering {
        self.index().cmp(&other.index())
    }
}

/// Observed retail prices for one month. Append-only once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRow {
    pub month: MonthKey,
    /// Indexed by `Target::index()`; `None` when the price was not quoted.
    pub prices: [Option<f64>; Target::COUNT],
}

impl HistoricalRow {
    pub fn empty(month: MonthKey) -> Self {
        Self {
            month,
            prices: [None; Target::COUNT],
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.month.first_day()
    }

    pub fn price(&self, target: Target) -> Option<f64> {
        self.prices.get(target.index()).copied().flatten()
    }

    pub fn set_price(&mut self, target: Target, value: Option<f64>) {
        if let Some(slot) = self.prices.get_mut(target.index()) {
            *slot = value;
        }
    }
}

/// Monthly exogenous snapshot derived from daily market quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExogenousRow {
    pub month: MonthKey,
    /// Crude benchmark (Brent), USD/bbl.
    pub brent: Option<f64>,
    /// Refined-product benchmark (RBOB gasoline), USD/gal.
    pub rbob: Option<f64>,
    /// FX rate, IDR per USD.
    pub usd_idr: Option<f64>,
}

impl ExogenousRow {
    /// Stored columns, in file order (calendar columns excluded).
    pub const COLUMNS: [&'static str; 8] = [
        "brent",
        "rbob",
        "usd_idr",
        "rbob_liter",
        "base_ron90",
        "base_ron92",
        "base_ron95",
        "base_ron98",
    ];

    pub fn rbob_liter(&self) -> Option<f64> {
        self.rbob.map(|v| v / LITERS_PER_GALLON)
    }

    pub fn base_price(&self, grade: Grade) -> Option<f64> {
        self.rbob_liter().map(|v| v + grade.base_offset())
    }

    /// Values aligned with `ExogenousRow::COLUMNS`.
    pub fn values(&self) -> Vec<Option<f64>> {
        let mut out = vec![self.brent, self.rbob, self.usd_idr, self.rbob_liter()];
        out.extend(Grade::ALL.iter().map(|g| self.base_price(*g)));
        out
    }
}

/// Regression algorithm family, in declared (tie-break) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    ExtraTrees,
    GradientBoosting,
    Linear,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::RandomForest,
        ModelKind::ExtraTrees,
        ModelKind::GradientBoosting,
        ModelKind::Linear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "random_forest",
            ModelKind::ExtraTrees => "extra_trees",
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::Linear => "linear",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.name() == s.trim())
            .ok_or_else(|| AppError::config(format!("Unknown model kind '{s}'.")))
    }
}

/// Selected model metadata for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetModel {
    pub target: Target,
    pub kind: ModelKind,
    /// Frozen feature order; inference must use exactly this list.
    pub feature_order: Vec<String>,
    /// Mean absolute error from forward-chaining validation. It scores the
    /// fold models; the persisted model is refitted on all rows and has no
    /// held-out error of its own.
    pub validation_error: f64,
}

/// A single forecast value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub target: Target,
    pub price: f64,
    /// In `[0, 100]`.
    pub confidence_pct: f64,
}

/// Hyper-parameters shared by every training run.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub seed: u64,
    pub folds: usize,
    pub min_rows: usize,

    pub forest_trees: usize,
    pub forest_depth: usize,
    pub extra_trees: usize,
    pub extra_depth: usize,

    pub boost_rounds: usize,
    pub boost_learning_rate: f64,
    pub boost_depth: usize,
    pub boost_subsample: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            folds: 3,
            min_rows: 18,
            forest_trees: 500,
            forest_depth: 12,
            extra_trees: 600,
            extra_depth: 12,
            boost_rounds: 500,
            boost_learning_rate: 0.05,
            boost_depth: 6,
            boost_subsample: 0.9,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub historical_path: PathBuf,
    pub exogenous_path: PathBuf,
    pub training_path: PathBuf,
    pub models_dir: PathBuf,
    /// First day requested from the daily market feed.
    pub exog_start: NaiveDate,
    pub settings: ModelSettings,
}

impl PipelineConfig {
    /// Standard file layout under a data directory.
    pub fn with_dirs(data_dir: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            historical_path: data_dir.join("fuel_prices.csv"),
            exogenous_path: data_dir.join("exog_history.csv"),
            training_path: data_dir.join("merged_dataset.csv"),
            models_dir: models_dir.into(),
            exog_start: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or(NaiveDate::MIN),
            settings: ModelSettings::default(),
        }
    }
}

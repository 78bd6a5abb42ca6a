//! Daily market feeds (crude, refined product, FX).
//!
//! Two implementations of `MarketFeed`:
//! - `YahooChartClient`: live daily closes from the public chart endpoint
//! - `CsvMarketFeed`: a `date,brent,rbob,usd_idr` file for offline runs

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AppError;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const REQUEST_TIMEOUT_SECS: u64 = 20;

const TICKER_BRENT: &str = "BZ=F";
const TICKER_RBOB: &str = "RB=F";
const TICKER_USD_IDR: &str = "USDIDR=X";

/// A date → value series, ascending by date, arbitrarily gapped.
pub type DailySeries = Vec<(NaiveDate, f64)>;

/// The three independent daily inputs of the exogenous aggregator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyMarketData {
    /// Crude benchmark close (USD/bbl).
    pub brent: DailySeries,
    /// Refined-product benchmark close (USD/gal).
    pub rbob: DailySeries,
    /// FX close (IDR per USD).
    pub usd_idr: DailySeries,
}

impl DailyMarketData {
    pub fn is_empty(&self) -> bool {
        self.brent.is_empty() && self.rbob.is_empty() && self.usd_idr.is_empty()
    }
}

/// Source of daily market quotes.
pub trait MarketFeed {
    fn fetch_daily(&self, start: NaiveDate) -> Result<DailyMarketData, AppError>;
}

/// Blocking client for the Yahoo chart API.
pub struct YahooChartClient {
    client: Client,
}

impl YahooChartClient {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("fuelcast/0.1")
            .build()
            .map_err(|e| AppError::runtime(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn fetch_series(&self, ticker: &str, start: NaiveDate) -> Result<DailySeries, AppError> {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = Utc::now().timestamp();

        let url = format!("{CHART_URL}/{ticker}");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .map_err(|e| AppError::runtime(format!("Market request for {ticker} failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::runtime(format!(
                "Market request for {ticker} failed with status {}.",
                resp.status()
            )));
        }

        let body: ChartResponse = resp
            .json()
            .map_err(|e| AppError::runtime(format!("Failed to parse market response for {ticker}: {e}")))?;

        let series = series_from_chart(body)
            .map_err(|msg| AppError::runtime(format!("Malformed chart for {ticker}: {msg}")))?;
        debug!(ticker, observations = series.len(), "fetched daily series");
        Ok(series)
    }
}

impl MarketFeed for YahooChartClient {
    fn fetch_daily(&self, start: NaiveDate) -> Result<DailyMarketData, AppError> {
        info!(%start, "fetching daily market data");
        Ok(DailyMarketData {
            brent: self.fetch_series(TICKER_BRENT, start)?,
            rbob: self.fetch_series(TICKER_RBOB, start)?,
            usd_idr: self.fetch_series(TICKER_USD_IDR, start)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

/// Bars are stamped at exchange-local midnight; `gmtoffset` (seconds) maps
/// them back to the exchange's calendar day.
#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn series_from_chart(body: ChartResponse) -> Result<DailySeries, String> {
    let result = body
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or("empty result")?;
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    // Keep the last close per exchange-local day; null closes are gaps.
    let offset = result.meta.gmtoffset;
    let mut by_day = BTreeMap::new();
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let Some(value) = close.filter(|v| v.is_finite()) else {
            continue;
        };
        let Some(dt) = chrono::DateTime::from_timestamp(ts.saturating_add(offset), 0) else {
            continue;
        };
        by_day.insert(dt.date_naive(), value);
    }
    Ok(by_day.into_iter().collect())
}

/// Daily market data from a local CSV file.
pub struct CsvMarketFeed {
    path: PathBuf,
}

impl CsvMarketFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MarketFeed for CsvMarketFeed {
    fn fetch_daily(&self, start: NaiveDate) -> Result<DailyMarketData, AppError> {
        let file = File::open(&self.path).map_err(|e| {
            AppError::config(format!("Failed to open market CSV '{}': {e}", self.path.display()))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| AppError::config(format!("Failed to read market CSV headers: {e}")))?
            .clone();
        let col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let date_idx = col("date").ok_or_else(|| AppError::config("Market CSV needs a `date` column."))?;
        let (brent_idx, rbob_idx, fx_idx) = (col("brent"), col("rbob"), col("usd_idr"));

        let mut data = DailyMarketData::default();
        for (idx, result) in reader.records().enumerate() {
            let record = result
                .map_err(|e| AppError::config(format!("Market CSV parse error on line {}: {e}", idx + 2)))?;
            let raw_date = record.get(date_idx).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(raw_date), "%Y-%m-%d")
                .map_err(|e| AppError::config(format!("Invalid market date '{raw_date}': {e}")))?;
            if date < start {
                continue;
            }

            let cell = |i: Option<usize>| {
                i.and_then(|i| record.get(i))
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
            };
            if let Some(v) = cell(brent_idx) {
                data.brent.push((date, v));
            }
            if let Some(v) = cell(rbob_idx) {
                data.rbob.push((date, v));
            }
            if let Some(v) = cell(fx_idx) {
                data.usd_idr.push((date, v));
            }
        }

        for series in [&mut data.brent, &mut data.rbob, &mut data.usd_idr] {
            series.sort_by_key(|(d, _)| *d);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_parsing_skips_null_closes() {
        let json = r#"{"chart":{"result":[{"timestamp":[1704153600,1704240000,1704326400],
            "indicators":{"quote":[{"close":[77.0,null,78.5]}]}}]}}"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let series = series_from_chart(body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(series[1].1, 78.5);
    }

    #[test]
    fn bars_are_dated_in_exchange_local_time() {
        // London midnight of 2024-08-01 during BST is 23:00 UTC the day before.
        let json = r#"{"chart":{"result":[{"meta":{"gmtoffset":3600},"timestamp":[1722466800],
            "indicators":{"quote":[{"close":[16150.0]}]}}]}}"#;
        let body: ChartResponse = serde_json::from_str(json).unwrap();
        let series = series_from_chart(body).unwrap();
        assert_eq!(series, vec![(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(), 16150.0)]);
    }

    #[test]
    fn csv_feed_reads_gapped_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.csv");
        std::fs::write(
            &path,
            "date,brent,rbob,usd_idr\n2021-12-31,70,2.1,14000\n2022-01-03,78,,15600\n2022-01-04,,2.3,\n",
        )
        .unwrap();

        let feed = CsvMarketFeed::new(&path);
        let data = feed
            .fetch_daily(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap())
            .unwrap();
        assert_eq!(data.brent, vec![(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(), 78.0)]);
        assert_eq!(data.rbob.len(), 1);
        assert_eq!(data.usd_idr.len(), 1);
    }
}

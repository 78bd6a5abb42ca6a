//! External inputs: the raw retail price grid and the daily market feeds.

pub mod grid;
pub mod market;

pub use grid::{RawObservation, clean_price_cell, load_observation};
pub use market::{CsvMarketFeed, DailyMarketData, DailySeries, MarketFeed, YahooChartClient};

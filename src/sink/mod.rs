//! Downstream handoff of a finished forecast.
//!
//! The payload shape is fixed:
//!
//! ```json
//! {"month": "2024-01",
//!  "model": {"pertamina_92": 10000.0, ...},
//!  "confidence": {"pertamina_92": 80.0, ...},
//!  "current_prices": {"pertamina_92": 9800.0, ...}}
//! ```
//!
//! Every number is finite by construction (`sanitize_finite`), since sinks may
//! reject NaN or infinity. Sinks are built per run and passed in explicitly.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::info;

use crate::domain::{HistoricalRow, Target};
use crate::error::AppError;
use crate::forecast::Forecast;

const DEFAULT_TABLE: &str = "predictions";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPayload {
    pub month: String,
    pub model: BTreeMap<String, f64>,
    pub confidence: BTreeMap<String, f64>,
    pub current_prices: BTreeMap<String, f64>,
}

impl ForecastPayload {
    /// Build the payload; `current` is the latest observed historical row, if any.
    pub fn build(forecast: &Forecast, current: Option<&HistoricalRow>) -> Self {
        let mut model = BTreeMap::new();
        let mut confidence = BTreeMap::new();
        for p in &forecast.predictions {
            model.insert(p.target.id(), sanitize_finite(p.price));
            confidence.insert(p.target.id(), sanitize_finite(p.confidence_pct));
        }

        let current_prices = current
            .map(|row| {
                Target::ALL
                    .iter()
                    .filter_map(|t| row.price(*t).map(|v| (t.id(), sanitize_finite(v))))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            month: forecast.month.to_string(),
            model,
            confidence,
            current_prices,
        }
    }
}

/// Replace NaN and infinities with `0.0`.
pub fn sanitize_finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Destination for a finished forecast.
pub trait PredictionSink {
    fn name(&self) -> &'static str;
    fn publish(&self, payload: &ForecastPayload) -> Result<(), AppError>;
}

/// Discards the payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PredictionSink for NullSink {
    fn name(&self) -> &'static str {
        "none"
    }

    fn publish(&self, _payload: &ForecastPayload) -> Result<(), AppError> {
        Ok(())
    }
}

/// Writes the payload as pretty JSON.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PredictionSink for JsonFileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn publish(&self, payload: &ForecastPayload) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::runtime(format!("Failed to create directory '{}': {e}", parent.display()))
            })?;
        }
        let file = File::create(&self.path)
            .map_err(|e| AppError::runtime(format!("Failed to create '{}': {e}", self.path.display())))?;
        serde_json::to_writer_pretty(file, payload)
            .map_err(|e| AppError::runtime(format!("Failed to write forecast JSON: {e}")))?;
        info!(path = %self.path.display(), "forecast written");
        Ok(())
    }
}

/// Inserts the payload as one row through a PostgREST-style endpoint.
pub struct RestSink {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl RestSink {
    pub fn new(base_url: &str, api_key: impl Into<String>, table: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| AppError::runtime(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{table}", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    /// `FORECAST_SINK_URL`, `FORECAST_SINK_KEY` and optional `FORECAST_SINK_TABLE`.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let url = std::env::var("FORECAST_SINK_URL")
            .map_err(|_| AppError::config("Missing FORECAST_SINK_URL in environment (.env)."))?;
        let key = std::env::var("FORECAST_SINK_KEY")
            .map_err(|_| AppError::config("Missing FORECAST_SINK_KEY in environment (.env)."))?;
        let table = std::env::var("FORECAST_SINK_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string());
        Self::new(&url, key, &table)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PredictionSink for RestSink {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn publish(&self, payload: &ForecastPayload) -> Result<(), AppError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(payload)
            .send()
            .map_err(|e| AppError::runtime(format!("Sink request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(AppError::runtime(format!("Sink rejected forecast ({status}): {body}")));
        }
        info!(endpoint = %self.endpoint, month = %payload.month, "forecast published");
        Ok(())
    }
}

//! Shared pipeline stages used by every subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! record observation -> exogenous refresh -> merge -> train -> forecast -> sink
//!
//! Each stage reads its inputs from the persisted stores and writes its
//! outputs back, so single stages can be re-run from the CLI. Errors leaving a
//! stage are tagged with the stage name; any stage failure aborts the run.

use std::path::Path;

use tracing::info_span;

use crate::data::grid::load_observation;
use crate::data::market::MarketFeed;
use crate::domain::{ExogenousRow, PipelineConfig};
use crate::error::AppError;
use crate::fit::selection::{ModelSelector, TrainingSummary};
use crate::forecast::{Forecast, Forecaster};
use crate::io::artifacts::ModelRegistry;
use crate::io::table::{MonthSource, Table, read_table};
use crate::sink::{ForecastPayload, PredictionSink};
use crate::store::merge::merge_files;
use crate::store::{ExogenousStore, HistoricalStore, RecordOutcome};

/// All computed outputs of a single full run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub record: RecordOutcome,
    pub exogenous: Vec<ExogenousRow>,
    pub training: Table,
    pub summary: TrainingSummary,
    pub forecast: Forecast,
    pub payload: ForecastPayload,
}

pub fn update_stage(config: &PipelineConfig, source: &Path) -> Result<RecordOutcome, AppError> {
    let _span = info_span!("update").entered();
    let run = || -> Result<RecordOutcome, AppError> {
        let observation = load_observation(source)?;
        HistoricalStore::new(&config.historical_path).record_observation(&observation)
    };
    run().map_err(|e| e.in_stage("update"))
}

pub fn exog_stage(config: &PipelineConfig, feed: &dyn MarketFeed) -> Result<Vec<ExogenousRow>, AppError> {
    let _span = info_span!("exog").entered();
    ExogenousStore::new(&config.exogenous_path)
        .update(feed, config.exog_start)
        .map_err(|e| e.in_stage("exog"))
}

pub fn merge_stage(config: &PipelineConfig) -> Result<Table, AppError> {
    let _span = info_span!("merge").entered();
    merge_files(&config.historical_path, &config.exogenous_path, &config.training_path)
        .map_err(|e| e.in_stage("merge"))
}

pub fn train_stage(config: &PipelineConfig) -> Result<TrainingSummary, AppError> {
    let _span = info_span!("train").entered();
    let run = || -> Result<TrainingSummary, AppError> {
        if !config.training_path.exists() {
            return Err(AppError::config(format!(
                "Training table '{}' not found; run `merge` first.",
                config.training_path.display()
            )));
        }
        let table = read_table(&config.training_path, MonthSource::Required)?;
        if table.is_empty() {
            return Err(AppError::insufficient("Training table has no rows."));
        }
        let registry = ModelRegistry::new(&config.models_dir);
        ModelSelector::new(config.settings.clone()).train_all(&table, &registry)
    };
    run().map_err(|e| e.in_stage("train"))
}

pub fn predict_stage(config: &PipelineConfig) -> Result<(Forecast, ForecastPayload), AppError> {
    let _span = info_span!("predict").entered();
    let run = || -> Result<(Forecast, ForecastPayload), AppError> {
        if !config.exogenous_path.exists() {
            return Err(AppError::config(format!(
                "Exogenous table '{}' not found; run `exog` first.",
                config.exogenous_path.display()
            )));
        }
        let exogenous = read_table(&config.exogenous_path, MonthSource::Required)?;
        let registry = ModelRegistry::new(&config.models_dir);
        let forecast = Forecaster::new(&registry).predict_next(&exogenous)?;

        let history = HistoricalStore::new(&config.historical_path).load()?;
        let current = history.iter().max_by_key(|r| r.month);
        let payload = ForecastPayload::build(&forecast, current);
        Ok((forecast, payload))
    };
    run().map_err(|e| e.in_stage("predict"))
}

pub fn publish_stage(sink: &dyn PredictionSink, payload: &ForecastPayload) -> Result<(), AppError> {
    let _span = info_span!("sink", kind = sink.name()).entered();
    sink.publish(payload).map_err(|e| e.in_stage("sink"))
}

/// Sequences every stage for one run. Collaborators are injected and live only
/// for this run.
pub struct PipelineOrchestrator<'a> {
    config: &'a PipelineConfig,
    feed: &'a dyn MarketFeed,
    sink: &'a dyn PredictionSink,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(config: &'a PipelineConfig, feed: &'a dyn MarketFeed, sink: &'a dyn PredictionSink) -> Self {
        Self { config, feed, sink }
    }

    pub fn run(&self, source: &Path) -> Result<RunOutput, AppError> {
        let record = update_stage(self.config, source)?;
        let exogenous = exog_stage(self.config, self.feed)?;
        let training = merge_stage(self.config)?;
        let summary = train_stage(self.config)?;
        let (forecast, payload) = predict_stage(self.config)?;
        publish_stage(self.sink, &payload)?;

        Ok(RunOutput {
            record,
            exogenous,
            training,
            summary,
            forecast,
            payload,
        })
    }
}

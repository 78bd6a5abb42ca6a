//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the log subscriber
//! - builds the run configuration and collaborators
//! - dispatches to the pipeline stages and prints reports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, CommonArgs, ExogArgs, PredictArgs, SinkKind};
use crate::data::market::{CsvMarketFeed, MarketFeed, YahooChartClient};
use crate::domain::{ModelSettings, PipelineConfig};
use crate::error::AppError;
use crate::sink::{JsonFileSink, NullSink, PredictionSink, RestSink};

pub mod pipeline;

/// Entry point for the `fuelcast` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(&cli.common);
    let config = pipeline_config_from_args(&cli.common);

    match cli.command {
        Command::Update(args) => {
            let outcome = pipeline::update_stage(&config, &args.source)?;
            if outcome.appended {
                println!("Recorded {} ({} months stored).", outcome.month, outcome.rows.len());
            } else {
                println!("{} already stored; nothing to do.", outcome.month);
            }
            Ok(())
        }
        Command::Exog(args) => {
            let config = with_exog_start(config, &args);
            let feed = build_feed(&args)?;
            let rows = pipeline::exog_stage(&config, feed.as_ref())?;
            if let Some(last) = rows.last() {
                println!("Exogenous table: {} months, latest {}.", rows.len(), last.month);
            }
            Ok(())
        }
        Command::Merge => {
            let table = pipeline::merge_stage(&config)?;
            println!(
                "Training table: {} rows x {} columns -> {}",
                table.len(),
                table.columns.len(),
                config.training_path.display()
            );
            Ok(())
        }
        Command::Train => {
            let summary = pipeline::train_stage(&config)?;
            println!("{}", crate::report::format_training_summary(&summary));
            Ok(())
        }
        Command::Predict(args) => {
            let sink = build_sink(&args)?;
            let (forecast, payload) = pipeline::predict_stage(&config)?;
            println!("{}", crate::report::format_forecast(&forecast));
            pipeline::publish_stage(sink.as_ref(), &payload)
        }
        Command::Run(args) => {
            let config = with_exog_start(config, &args.exog);
            let feed = build_feed(&args.exog)?;
            let sink = build_sink(&args.predict)?;

            let orchestrator = pipeline::PipelineOrchestrator::new(&config, feed.as_ref(), sink.as_ref());
            let run = orchestrator.run(&args.update.source)?;

            println!("{}", crate::report::format_training_summary(&run.summary));
            println!("{}", crate::report::format_forecast(&run.forecast));
            info!(
                appended = run.record.appended,
                trained = run.summary.trained(),
                forecast = run.forecast.predictions.len(),
                "pipeline run complete"
            );
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_logging(common: &CommonArgs) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&common.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A second initialisation (e.g. from tests) is not an error worth surfacing.
    let _ = if common.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

pub fn pipeline_config_from_args(common: &CommonArgs) -> PipelineConfig {
    let mut config = PipelineConfig::with_dirs(&common.data_dir, &common.models_dir);
    config.settings = ModelSettings {
        seed: common.seed,
        folds: common.folds,
        min_rows: common.min_rows,
        ..ModelSettings::default()
    };
    config
}

fn with_exog_start(mut config: PipelineConfig, args: &ExogArgs) -> PipelineConfig {
    if let Some(start) = args.start {
        config.exog_start = start;
    }
    config
}

fn build_feed(args: &ExogArgs) -> Result<Box<dyn MarketFeed>, AppError> {
    Ok(match &args.market_csv {
        Some(path) => Box::new(CsvMarketFeed::new(path)),
        None => Box::new(YahooChartClient::new()?),
    })
}

/// Sinks are validated before any stage runs so a bad flag cannot waste a
/// full training pass.
fn build_sink(args: &PredictArgs) -> Result<Box<dyn PredictionSink>, AppError> {
    Ok(match args.sink {
        SinkKind::None => Box::new(NullSink),
        SinkKind::File => {
            let path = args
                .out
                .clone()
                .ok_or_else(|| AppError::config("`--sink file` requires `--out <JSON>`."))?;
            Box::new(JsonFileSink::new(path))
        }
        SinkKind::Rest => Box::new(RestSink::from_env()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn common() -> CommonArgs {
        CommonArgs {
            data_dir: PathBuf::from("d"),
            models_dir: PathBuf::from("m"),
            seed: 9,
            folds: 4,
            min_rows: 20,
            log_level: "info".into(),
            log_json: false,
        }
    }

    #[test]
    fn config_follows_flags() {
        let config = pipeline_config_from_args(&common());
        assert_eq!(config.historical_path, PathBuf::from("d/fuel_prices.csv"));
        assert_eq!(config.models_dir, PathBuf::from("m"));
        assert_eq!(config.settings.seed, 9);
        assert_eq!(config.settings.folds, 4);
        assert_eq!(config.settings.min_rows, 20);
        assert_eq!(config.settings.forest_trees, 500);
    }

    #[test]
    fn file_sink_requires_an_output_path() {
        let args = PredictArgs {
            sink: SinkKind::File,
            out: None,
        };
        assert_eq!(build_sink(&args).err().map(|e| e.exit_code()), Some(2));

        let args = PredictArgs {
            sink: SinkKind::None,
            out: None,
        };
        assert_eq!(build_sink(&args).map(|s| s.name()).ok(), Some("none"));
    }
}

//! Command-line parsing for the fuel price forecasting pipeline.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pipeline stages. Each stage has its own subcommand; `run` chains them all.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fuelcast", version, about = "Monthly retail fuel price forecaster")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record one observed price grid into the historical store (idempotent per month).
    Update(UpdateArgs),
    /// Fetch daily market data and refresh the monthly exogenous table.
    Exog(ExogArgs),
    /// Join historical prices and exogenous features into the training table.
    Merge,
    /// Select, fit and persist one model per target.
    Train,
    /// Forecast from the latest exogenous snapshot and hand off the result.
    Predict(PredictArgs),
    /// Run every stage in order: update, exog, merge, train, predict.
    Run(RunArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    /// Directory holding the CSV stores.
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory holding per-target model artifacts.
    #[arg(long, global = true, default_value = "models")]
    pub models_dir: PathBuf,

    /// Seed for every stochastic model choice.
    #[arg(long, global = true, default_value_t = 42)]
    pub seed: u64,

    /// Number of forward-chaining validation folds.
    #[arg(long, global = true, default_value_t = 3)]
    pub folds: usize,

    /// Minimum usable rows before a target is trained.
    #[arg(long, global = true, default_value_t = 18)]
    pub min_rows: usize,

    /// Log filter when RUST_LOG is not set (e.g. info, debug, fuel_forecast=trace).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Debug, Args, Clone)]
pub struct UpdateArgs {
    /// Grid CSV (`ron,pertamina,vivo,bp,shell`) whose file name carries a YYYYMMDD date.
    #[arg(long, value_name = "CSV")]
    pub source: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct ExogArgs {
    /// Read daily quotes from a CSV (`date,brent,rbob,usd_idr`) instead of the network.
    #[arg(long, value_name = "CSV")]
    pub market_csv: Option<PathBuf>,

    /// First day of daily data to request.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Print only.
    None,
    /// Write the payload JSON to `--out`.
    File,
    /// POST the payload to the REST endpoint configured in the environment.
    Rest,
}

#[derive(Debug, Args, Clone)]
pub struct PredictArgs {
    /// Where to hand off the forecast.
    #[arg(long, value_enum, default_value_t = SinkKind::None)]
    pub sink: SinkKind,

    /// Output path for `--sink file`.
    #[arg(long, value_name = "JSON")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub update: UpdateArgs,

    #[command(flatten)]
    pub exog: ExogArgs,

    #[command(flatten)]
    pub predict: PredictArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn shared_options_parse_after_the_subcommand() {
        let cli = Cli::parse_from([
            "fuelcast",
            "run",
            "--source",
            "grid_20240115.csv",
            "--sink",
            "file",
            "--out",
            "f.json",
            "--seed",
            "7",
            "--start",
            "2023-01-01",
        ]);
        assert_eq!(cli.common.seed, 7);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.predict.sink, SinkKind::File);
        assert_eq!(args.exog.start, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(args.update.source, PathBuf::from("grid_20240115.csv"));
    }
}

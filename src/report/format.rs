//! Formatted terminal output.
//!
//! Formatting lives here so the pipeline stays free of presentation code and
//! output changes stay localized.

use crate::domain::{ModelKind, Target};
use crate::fit::selection::TrainingSummary;
use crate::forecast::Forecast;

/// Per-target price and confidence, in declared target order.
pub fn format_forecast(forecast: &Forecast) -> String {
    let mut out = String::new();

    out.push_str("=== fuelcast - Retail Fuel Price Forecast ===\n");
    out.push_str(&format!("Month: {}\n", forecast.month));
    out.push_str(&format!(
        "Targets: {} of {} forecast\n\n",
        forecast.predictions.len(),
        Target::COUNT
    ));

    out.push_str(format!("{:<14} {:>12} {:>12}", "target", "price", "confidence").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<14} {:-<12} {:-<12}", "", "", "").trim_end());
    out.push('\n');

    for target in Target::ALL {
        let line = match forecast.get(target) {
            Some(p) => format!(
                "{:<14} {:>12.0} {:>11.2}%",
                target.id(),
                p.price,
                p.confidence_pct
            ),
            None => format!("{:<14} {:>12} {:>12}", target.id(), "-", "(no model)"),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

/// Candidate errors per target with the winner marked.
pub fn format_training_summary(summary: &TrainingSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Training table: n={} | features=[{}]\n",
        summary.table_rows,
        summary.features.join(", ")
    ));
    out.push_str(&format!(
        "Trained {} of {} targets\n",
        summary.trained(),
        summary.targets.len()
    ));

    out.push_str("\nModel diagnostics:\n");
    for report in &summary.targets {
        if let Some(reason) = &report.skipped {
            out.push_str(&format!("  {:<14} (skipped) {reason}\n", report.target));
            continue;
        }
        out.push_str(&format!("  {:<14} rows={}\n", report.target, report.rows));
        for c in &report.candidates {
            let chosen = if Some(c.model) == report.selected { "*" } else { " " };
            let score = match (c.mae, &c.error) {
                (Some(mae), _) => format!("MAE={mae:.2}"),
                (None, Some(err)) => format!("failed: {err}"),
                (None, None) => "n/a".to_string(),
            };
            out.push_str(&format!("  {chosen} {:<18} {score}\n", display_name(c.model)));
        }
    }

    out
}

fn display_name(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::RandomForest => "RandomForest",
        ModelKind::ExtraTrees => "ExtraTrees",
        ModelKind::GradientBoosting => "GradientBoosting",
        ModelKind::Linear => "Linear",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Brand, Grade, Prediction};
    use crate::fit::selection::{CandidateScore, TargetReport};

    #[test]
    fn forecast_lists_every_target_once() {
        let forecast = Forecast {
            month: "2024-05".parse().unwrap(),
            predictions: vec![Prediction {
                target: Target::new(Brand::Bp, Grade::Ron95),
                price: 13_250.4,
                confidence_pct: 97.5,
            }],
        };
        let text = format_forecast(&forecast);
        assert!(text.contains("Month: 2024-05"));
        assert!(text.contains("bp_95"));
        assert!(text.contains("13250"));
        assert!(text.contains("97.50%"));
        assert_eq!(text.matches("(no model)").count(), Target::COUNT - 1);
    }

    #[test]
    fn diagnostics_mark_the_winner() {
        let summary = TrainingSummary {
            table_rows: 30,
            features: vec!["brent".into()],
            targets: vec![
                TargetReport {
                    target: "pertamina_92".into(),
                    rows: 30,
                    selected: Some(ModelKind::ExtraTrees),
                    mae: Some(12.0),
                    candidates: vec![
                        CandidateScore { model: ModelKind::RandomForest, mae: Some(15.0), error: None },
                        CandidateScore { model: ModelKind::ExtraTrees, mae: Some(12.0), error: None },
                    ],
                    skipped: None,
                },
                TargetReport {
                    target: "vivo_90".into(),
                    rows: 4,
                    selected: None,
                    mae: None,
                    candidates: vec![],
                    skipped: Some("only 4 usable rows (need 18)".into()),
                },
            ],
        };
        let text = format_training_summary(&summary);
        assert!(text.contains("Trained 1 of 2 targets"));
        assert!(text.contains("* ExtraTrees"));
        assert!(text.contains("  RandomForest"));
        assert!(text.contains("vivo_90        (skipped) only 4 usable rows"));
    }
}

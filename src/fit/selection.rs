//! Per-target model selection by forward-chaining cross-validation.
//!
//! For every target independently:
//! 1. features are every non-target, non-calendar column of the training table
//! 2. usable rows are those where the target (and every feature) is present
//! 3. targets with fewer than `min_rows` usable rows are skipped
//! 4. each candidate kind is scored by mean fold MAE
//! 5. the lowest score wins; ties go to the earlier-declared kind
//! 6. the winner is refitted on all usable rows and persisted
//!
//! Targets share no data, so they are selected in parallel. Persistence runs
//! afterwards on the calling thread.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{ModelKind, ModelSettings, Target, TargetModel};
use crate::error::AppError;
use crate::fit::cv::{Fold, forward_chaining_folds};
use crate::io::artifacts::ModelRegistry;
use crate::io::table::{Table, is_calendar_column};
use crate::math::{mean, mean_absolute_error};
use crate::models::Regressor;

/// Cross-validation outcome of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub model: ModelKind,
    pub mae: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of selecting a model for one target.
#[derive(Debug, Clone)]
pub enum TargetFit {
    Selected {
        model: TargetModel,
        regressor: Regressor,
        scores: Vec<CandidateScore>,
        rows: usize,
    },
    Skipped {
        target: Target,
        reason: String,
        rows: usize,
        scores: Vec<CandidateScore>,
    },
}

impl TargetFit {
    pub fn target(&self) -> Target {
        match self {
            TargetFit::Selected { model, .. } => model.target,
            TargetFit::Skipped { target, .. } => *target,
        }
    }
}

/// One line of the persisted training summary.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub rows: usize,
    pub selected: Option<ModelKind>,
    pub mae: Option<f64>,
    pub candidates: Vec<CandidateScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub table_rows: usize,
    pub features: Vec<String>,
    pub targets: Vec<TargetReport>,
}

impl TrainingSummary {
    pub fn trained(&self) -> usize {
        self.targets.iter().filter(|t| t.selected.is_some()).count()
    }
}

/// Every column usable as a model input.
///
/// Other brands' prices are deliberately excluded even though they are known
/// at prediction time.
pub fn feature_columns(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter(|c| !Target::is_target_column(c) && !is_calendar_column(c))
        .cloned()
        .collect()
}

/// Build the row-major feature matrix and target vector for one target,
/// preserving table row order.
pub fn training_matrix(table: &Table, target: Target, features: &[String]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let Some(target_idx) = table.column_index(&target.id()) else {
        return (Vec::new(), Vec::new());
    };
    let feature_idx: Vec<Option<usize>> = features.iter().map(|f| table.column_index(f)).collect();

    let mut x = Vec::new();
    let mut y = Vec::new();
    for row in &table.rows {
        let Some(value) = row.values.get(target_idx).copied().flatten() else {
            continue;
        };
        let features: Option<Vec<f64>> = feature_idx
            .iter()
            .map(|idx| idx.and_then(|i| row.values.get(i).copied().flatten()))
            .collect();
        if let Some(features) = features {
            x.push(features);
            y.push(value);
        }
    }
    (x, y)
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    settings: ModelSettings,
}

impl ModelSelector {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Select, persist and summarize models for all targets.
    pub fn train_all(&self, table: &Table, registry: &ModelRegistry) -> Result<TrainingSummary, AppError> {
        let mut table = table.clone();
        table.sort_by_month();

        let features = feature_columns(&table);
        if features.is_empty() {
            return Err(AppError::config("Training table has no feature columns."));
        }
        info!(rows = table.len(), features = features.len(), "training all targets");

        let fits: Vec<TargetFit> = Target::ALL
            .par_iter()
            .map(|&target| self.select(&table, target, &features))
            .collect();

        let mut reports = Vec::with_capacity(fits.len());
        for fit in fits {
            match &fit {
                TargetFit::Selected {
                    model, regressor, ..
                } => {
                    registry.save(model, regressor)?;
                    info!(
                        target_id = %model.target,
                        kind = %model.kind,
                        mae = model.validation_error,
                        "model selected"
                    );
                }
                TargetFit::Skipped {
                    target, reason, ..
                } => {
                    registry.remove(*target)?;
                    warn!(target_id = %target, %reason, "target skipped");
                }
            }
            reports.push(report_for(fit));
        }

        let summary = TrainingSummary {
            table_rows: table.len(),
            features,
            targets: reports,
        };
        let path = registry.write_summary(&summary)?;
        debug!(path = %path.display(), "training summary written");
        Ok(summary)
    }

    /// Select the best candidate for one target. Never fails: problems become a skip.
    pub fn select(&self, table: &Table, target: Target, features: &[String]) -> TargetFit {
        let (x, y) = training_matrix(table, target, features);
        let rows = y.len();

        if rows < self.settings.min_rows {
            return TargetFit::Skipped {
                target,
                reason: format!("only {rows} usable rows (need {})", self.settings.min_rows),
                rows,
                scores: Vec::new(),
            };
        }

        let folds = match forward_chaining_folds(rows, self.settings.folds) {
            Ok(folds) => folds,
            Err(e) => {
                return TargetFit::Skipped {
                    target,
                    reason: e.message().to_string(),
                    rows,
                    scores: Vec::new(),
                };
            }
        };

        let scores: Vec<CandidateScore> = ModelKind::ALL
            .iter()
            .map(|&kind| match self.cross_validate(kind, &x, &y, &folds) {
                Ok(mae) => CandidateScore {
                    model: kind,
                    mae: Some(mae),
                    error: None,
                },
                Err(e) => {
                    warn!(target_id = %target, %kind, error = %e, "candidate failed validation");
                    CandidateScore {
                        model: kind,
                        mae: None,
                        error: Some(e.message().to_string()),
                    }
                }
            })
            .collect();

        let Some((kind, mae)) = pick_best(&scores) else {
            return TargetFit::Skipped {
                target,
                reason: "no candidate produced a finite validation error".to_string(),
                rows,
                scores,
            };
        };

        match Regressor::fit(kind, &x, &y, &self.settings) {
            Ok(regressor) => TargetFit::Selected {
                model: TargetModel {
                    target,
                    kind,
                    feature_order: features.to_vec(),
                    validation_error: mae,
                },
                regressor,
                scores,
                rows,
            },
            Err(e) => TargetFit::Skipped {
                target,
                reason: format!("refit of {kind} failed: {}", e.message()),
                rows,
                scores,
            },
        }
    }

    fn cross_validate(&self, kind: ModelKind, x: &[Vec<f64>], y: &[f64], folds: &[Fold]) -> Result<f64, AppError> {
        let mut errors = Vec::with_capacity(folds.len());
        for fold in folds {
            let model = Regressor::fit(kind, &x[fold.train.clone()], &y[fold.train.clone()], &self.settings)?;
            let predicted = model.predict(&x[fold.test.clone()]);
            errors.push(mean_absolute_error(&y[fold.test.clone()], &predicted));
        }

        let mae = mean(&errors);
        if !mae.is_finite() {
            return Err(AppError::runtime(format!("{kind} produced a non-finite validation error.")));
        }
        Ok(mae)
    }
}

/// Lowest score wins; a later candidate must be strictly better to displace
/// an earlier one.
fn pick_best(scores: &[CandidateScore]) -> Option<(ModelKind, f64)> {
    let mut best: Option<(ModelKind, f64)> = None;
    for score in scores {
        let Some(mae) = score.mae else { continue };
        if best.is_none_or(|(_, b)| mae < b) {
            best = Some((score.model, mae));
        }
    }
    best
}

fn report_for(fit: TargetFit) -> TargetReport {
    match fit {
        TargetFit::Selected {
            model, scores, rows, ..
        } => TargetReport {
            target: model.target.id(),
            rows,
            selected: Some(model.kind),
            mae: Some(model.validation_error),
            candidates: scores,
            skipped: None,
        },
        TargetFit::Skipped {
            target,
            reason,
            rows,
            scores,
        } => TargetReport {
            target: target.id(),
            rows,
            selected: None,
            mae: None,
            candidates: scores,
            skipped: Some(reason),
        },
    }
}

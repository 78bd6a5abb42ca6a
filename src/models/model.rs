//! A fitted regressor tagged by model kind.
//!
//! This is the unit persisted per target: the serialized form carries its own
//! `kind` tag so the registry can cross-check it against the metadata sidecar.

use serde::{Deserialize, Serialize};

use crate::domain::{ModelKind, ModelSettings};
use crate::error::AppError;
use crate::models::boosting::{BoostParams, BoostedTrees};
use crate::models::forest::{ForestParams, TreeEnsemble};
use crate::models::linear::LinearModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    RandomForest(TreeEnsemble),
    ExtraTrees(TreeEnsemble),
    GradientBoosting(BoostedTrees),
    Linear(LinearModel),
}

impl Regressor {
    /// Fit a candidate of the given kind on row-major features `x`.
    pub fn fit(kind: ModelKind, x: &[Vec<f64>], y: &[f64], settings: &ModelSettings) -> Result<Self, AppError> {
        if x.len() != y.len() {
            return Err(AppError::runtime(format!(
                "Feature/target length mismatch: {} rows vs {} targets.",
                x.len(),
                y.len()
            )));
        }

        let model = match kind {
            ModelKind::RandomForest => Regressor::RandomForest(TreeEnsemble::fit(
                x,
                y,
                &ForestParams::random_forest(settings.forest_trees, settings.forest_depth, settings.seed),
            )),
            ModelKind::ExtraTrees => Regressor::ExtraTrees(TreeEnsemble::fit(
                x,
                y,
                &ForestParams::extra_trees(settings.extra_trees, settings.extra_depth, settings.seed),
            )),
            ModelKind::GradientBoosting => Regressor::GradientBoosting(BoostedTrees::fit(
                x,
                y,
                &BoostParams {
                    rounds: settings.boost_rounds,
                    learning_rate: settings.boost_learning_rate,
                    max_depth: settings.boost_depth,
                    subsample: settings.boost_subsample,
                    seed: settings.seed,
                },
            )),
            ModelKind::Linear => Regressor::Linear(LinearModel::fit(x, y)?),
        };
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Regressor::RandomForest(_) => ModelKind::RandomForest,
            Regressor::ExtraTrees(_) => ModelKind::ExtraTrees,
            Regressor::GradientBoosting(_) => ModelKind::GradientBoosting,
            Regressor::Linear(_) => ModelKind::Linear,
        }
    }

    /// Width of the feature vector the model was fitted on.
    pub fn n_features(&self) -> usize {
        match self {
            Regressor::RandomForest(m) | Regressor::ExtraTrees(m) => m.n_features,
            Regressor::GradientBoosting(m) => m.n_features,
            Regressor::Linear(m) => m.n_features,
        }
    }

    /// Structural check for deserialized models.
    pub fn validate(&self) -> Result<(), AppError> {
        let n_features = self.n_features();
        let trees = match self {
            Regressor::RandomForest(m) | Regressor::ExtraTrees(m) => m.trees.as_slice(),
            Regressor::GradientBoosting(m) => m.trees.as_slice(),
            Regressor::Linear(m) => {
                let widths_ok = m.coefficients.len() == n_features
                    && m.means.len() == n_features
                    && m.scales.len() == n_features;
                return if widths_ok {
                    Ok(())
                } else {
                    Err(AppError::config("Linear model coefficient width does not match its features."))
                };
            }
        };

        for tree in trees {
            if !tree.is_well_formed() {
                return Err(AppError::config(format!("Malformed tree in {} model.", self.kind())));
            }
            if tree.max_feature().is_some_and(|f| f >= n_features) {
                return Err(AppError::config(format!(
                    "Tree in {} model references a feature outside its {n_features} inputs.",
                    self.kind()
                )));
            }
        }
        Ok(())
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        match self {
            Regressor::RandomForest(m) | Regressor::ExtraTrees(m) => m.predict(row),
            Regressor::GradientBoosting(m) => m.predict(row),
            Regressor::Linear(m) => m.predict(row),
        }
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_settings() -> ModelSettings {
        ModelSettings {
            forest_trees: 8,
            extra_trees: 8,
            boost_rounds: 10,
            ..ModelSettings::default()
        }
    }

    #[test]
    fn every_kind_fits_and_reports_itself() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..20).map(|i| 10_000.0 + 25.0 * i as f64).collect();

        for kind in ModelKind::ALL {
            let model = Regressor::fit(kind, &x, &y, &small_settings()).unwrap();
            assert_eq!(model.kind(), kind);
            assert_eq!(model.n_features(), 2);
            model.validate().unwrap();
            let p = model.predict(&x[..2]);
            assert_eq!(p.len(), 2);
            assert!(p.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn serialized_form_is_tagged_by_kind() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![1.0, 2.0, 3.0];
        let model = Regressor::fit(ModelKind::Linear, &x, &y, &small_settings()).unwrap();

        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "linear");
        let back: Regressor = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ModelKind::Linear);
        assert!((back.predict_row(&[4.0]) - model.predict_row(&[4.0])).abs() < 1e-9);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = Regressor::fit(ModelKind::RandomForest, &[vec![1.0]], &[], &small_settings()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}

//! Per-target model artifacts.
//!
//! Layout under the models directory:
//!
//! ```text
//! <models>/<target_id>/model.json   fitted regressor, tagged by kind
//! <models>/<target_id>/meta.json    {model_name, mae, features}
//! <models>/summary.json             last training run outcome
//! ```
//!
//! Lookups go through the fixed target enumeration, never a directory scan. A
//! target with no artifacts is simply unavailable; a target whose artifacts
//! exist but do not parse or disagree with each other is a hard error.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{ModelKind, Target, TargetModel};
use crate::error::AppError;
use crate::models::Regressor;

const MODEL_FILE: &str = "model.json";
const META_FILE: &str = "meta.json";
const SUMMARY_FILE: &str = "summary.json";

/// Metadata sidecar written next to each model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub model_name: ModelKind,
    pub mae: f64,
    pub features: Vec<String>,
}

/// A target's model with its frozen metadata.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub model: TargetModel,
    pub regressor: Regressor,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    dir: PathBuf,
}

impl ModelRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn target_dir(&self, target: Target) -> PathBuf {
        self.dir.join(target.id())
    }

    pub fn save(&self, model: &TargetModel, regressor: &Regressor) -> Result<(), AppError> {
        if regressor.kind() != model.kind {
            return Err(AppError::runtime(format!(
                "Refusing to save {} regressor as {} for {}.",
                regressor.kind(),
                model.kind,
                model.target
            )));
        }

        let dir = self.target_dir(model.target);
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::runtime(format!("Failed to create '{}': {e}", dir.display())))?;

        write_json(&dir.join(MODEL_FILE), regressor, false)?;
        let meta = ModelMeta {
            model_name: model.kind,
            mae: model.validation_error,
            features: model.feature_order.clone(),
        };
        write_json(&dir.join(META_FILE), &meta, true)?;
        debug!(target_id = %model.target, kind = %model.kind, "model artifacts written");
        Ok(())
    }

    /// Delete a target's artifacts so it reads as unavailable.
    pub fn remove(&self, target: Target) -> Result<(), AppError> {
        let dir = self.target_dir(target);
        for name in [MODEL_FILE, META_FILE] {
            let path = dir.join(name);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    AppError::runtime(format!("Failed to remove stale artifact '{}': {e}", path.display()))
                })?;
            }
        }
        Ok(())
    }

    pub fn load(&self, target: Target) -> Result<Option<LoadedModel>, AppError> {
        let dir = self.target_dir(target);
        let model_path = dir.join(MODEL_FILE);
        let meta_path = dir.join(META_FILE);

        match (model_path.exists(), meta_path.exists()) {
            (false, false) => {
                warn!(target_id = %target, "no persisted model; target unavailable");
                return Ok(None);
            }
            (true, false) | (false, true) => {
                warn!(target_id = %target, "incomplete model artifacts; target unavailable");
                return Ok(None);
            }
            (true, true) => {}
        }

        let meta: ModelMeta = read_json(&meta_path)?;
        let regressor: Regressor = read_json(&model_path)?;

        if regressor.kind() != meta.model_name {
            return Err(AppError::config(format!(
                "Artifact mismatch for {target}: meta says {} but model is {}.",
                meta.model_name,
                regressor.kind()
            )));
        }
        if meta.features.is_empty() || meta.features.iter().any(|f| Target::is_target_column(f)) {
            return Err(AppError::config(format!(
                "Invalid feature list in '{}'.",
                meta_path.display()
            )));
        }
        if regressor.n_features() != meta.features.len() {
            return Err(AppError::config(format!(
                "Artifact mismatch for {target}: model expects {} features, meta lists {}.",
                regressor.n_features(),
                meta.features.len()
            )));
        }
        if !(meta.mae.is_finite() && meta.mae >= 0.0) {
            return Err(AppError::config(format!(
                "Invalid validation error {} in '{}'.",
                meta.mae,
                meta_path.display()
            )));
        }
        regressor
            .validate()
            .map_err(|e| AppError::config(format!("{}: {}", model_path.display(), e.message())))?;

        Ok(Some(LoadedModel {
            model: TargetModel {
                target,
                kind: meta.model_name,
                feature_order: meta.features,
                validation_error: meta.mae,
            },
            regressor,
        }))
    }

    /// Load every available model, in declared target order.
    pub fn load_all(&self) -> Result<Vec<LoadedModel>, AppError> {
        let mut out = Vec::new();
        for target in Target::ALL {
            if let Some(model) = self.load(target)? {
                out.push(model);
            }
        }
        Ok(out)
    }

    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AppError::runtime(format!("Failed to create '{}': {e}", self.dir.display())))?;
        let path = self.dir.join(SUMMARY_FILE);
        write_json(&path, summary, true)?;
        Ok(path)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::runtime(format!("Failed to create '{}': {e}", path.display())))?;
    let writer = BufWriter::new(file);
    let result = if pretty {
        serde_json::to_writer_pretty(writer, value)
    } else {
        serde_json::to_writer(writer, value)
    };
    result.map_err(|e| AppError::runtime(format!("Failed to write '{}': {e}", path.display())))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::config(format!("Malformed artifact '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Brand, Grade, ModelSettings};

    fn fitted(kind: ModelKind) -> (TargetModel, Regressor) {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 1.0 + i as f64 * 0.5]).collect();
        let y: Vec<f64> = (0..10).map(|i| 9_000.0 + 100.0 * i as f64).collect();
        let settings = ModelSettings {
            forest_trees: 4,
            extra_trees: 4,
            boost_rounds: 5,
            ..ModelSettings::default()
        };
        let regressor = Regressor::fit(kind, &x, &y, &settings).unwrap();
        let model = TargetModel {
            target: Target::new(Brand::Shell, Grade::Ron95),
            kind,
            feature_order: vec!["brent".into(), "rbob_liter".into()],
            validation_error: 123.5,
        };
        (model, regressor)
    }

    #[test]
    fn saved_models_load_back_with_frozen_features() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        let (model, regressor) = fitted(ModelKind::ExtraTrees);
        registry.save(&model, &regressor).unwrap();

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("shell_95/meta.json")).unwrap()).unwrap();
        assert_eq!(meta["model_name"], "extra_trees");
        assert_eq!(meta["features"][1], "rbob_liter");

        let loaded = registry.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].model, model);
        assert_eq!(loaded[0].regressor.kind(), ModelKind::ExtraTrees);
    }

    #[test]
    fn missing_artifacts_are_unavailable_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        assert!(registry.load(Target::ALL[0]).unwrap().is_none());

        let (model, regressor) = fitted(ModelKind::Linear);
        registry.save(&model, &regressor).unwrap();
        registry.remove(model.target).unwrap();
        assert!(registry.load(model.target).unwrap().is_none());
    }

    #[test]
    fn kind_mismatch_and_garbage_are_hard_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        let (model, regressor) = fitted(ModelKind::RandomForest);
        registry.save(&model, &regressor).unwrap();

        let meta_path = dir.path().join("shell_95/meta.json");
        let text = fs::read_to_string(&meta_path).unwrap().replace("random_forest", "gradient_boosting");
        fs::write(&meta_path, text).unwrap();
        assert_eq!(registry.load(model.target).unwrap_err().exit_code(), 2);

        fs::write(dir.path().join("shell_95/model.json"), "{not json").unwrap();
        assert!(registry.load_all().is_err());
    }
}

//! Forecasting from the latest market snapshot.
//!
//! The forecast month is the month of the most recent exogenous row: the
//! models answer "what would retail prices be set to under the latest known
//! market conditions", not a separate horizon.
//!
//! Per target with a persisted model:
//! 1. select the model's frozen feature order from the snapshot (absent = null)
//! 2. fill nulls: forward, then backward, then zero
//! 3. predict and derive a confidence from the validation error
//!
//! A final pass lifts every brand's price to the reference brand's price for
//! the same grade when it falls below it.

use tracing::{debug, info, warn};

use crate::domain::{Brand, Grade, MonthKey, Prediction, Target};
use crate::error::AppError;
use crate::io::artifacts::{LoadedModel, ModelRegistry};
use crate::io::table::Table;
use crate::math::round2;

/// Predictions for one month, in declared target order.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub month: MonthKey,
    pub predictions: Vec<Prediction>,
}

impl Forecast {
    pub fn get(&self, target: Target) -> Option<&Prediction> {
        self.predictions.iter().find(|p| p.target == target)
    }
}

pub struct Forecaster<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> Forecaster<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    /// Load every available model and forecast from the exogenous table.
    pub fn predict_next(&self, exogenous: &Table) -> Result<Forecast, AppError> {
        let models = self.registry.load_all()?;
        if models.is_empty() {
            warn!(dir = %self.registry.dir().display(), "no trained models; forecast will be empty");
        }
        forecast_with(&models, exogenous)
    }
}

/// Pure forecasting step over already-loaded models.
pub fn forecast_with(models: &[LoadedModel], exogenous: &Table) -> Result<Forecast, AppError> {
    let Some(latest) = exogenous.rows.iter().max_by_key(|r| r.month) else {
        return Err(AppError::insufficient("Exogenous table is empty; nothing to forecast from."));
    };
    info!(month = %latest.month, models = models.len(), "forecasting from latest snapshot");

    let mut predictions = Vec::with_capacity(models.len());
    for loaded in models {
        let order = &loaded.model.feature_order;
        let row: Vec<Option<f64>> = order
            .iter()
            .map(|name| {
                exogenous
                    .column_index(name)
                    .and_then(|i| latest.values.get(i).copied().flatten())
            })
            .collect();

        let missing = row.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            debug!(target_id = %loaded.model.target, missing, "snapshot lacks features; filling");
        }

        let filled = fill_missing(vec![row]);
        let features = filled.into_iter().next().unwrap_or_default();
        let price = loaded.regressor.predict_row(&features);

        predictions.push(Prediction {
            target: loaded.model.target,
            price,
            confidence_pct: confidence_pct(loaded.model.validation_error, price),
        });
    }

    predictions.sort_by_key(|p| p.target);
    enforce_floor(&mut predictions);

    Ok(Forecast {
        month: latest.month,
        predictions,
    })
}

/// Column-wise null fill over rows: forward fill, then backward fill, then zero.
pub fn fill_missing(rows: Vec<Vec<Option<f64>>>) -> Vec<Vec<f64>> {
    let mut rows = rows;
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);

    for col in 0..width {
        let mut last = None;
        for row in rows.iter_mut() {
            match row.get(col).copied().flatten() {
                Some(v) => last = Some(v),
                None => {
                    if let Some(cell) = row.get_mut(col) {
                        *cell = last;
                    }
                }
            }
        }

        let mut next = None;
        for row in rows.iter_mut().rev() {
            match row.get(col).copied().flatten() {
                Some(v) => next = Some(v),
                None => {
                    if let Some(cell) = row.get_mut(col) {
                        *cell = next;
                    }
                }
            }
        }
    }

    rows.into_iter()
        .map(|row| row.into_iter().map(|v| v.unwrap_or(0.0)).collect())
        .collect()
}

/// `max(0, 1 - mae / max(|price|, 1)) * 100`, rounded to two decimals.
///
/// Non-finite inputs yield zero confidence.
pub fn confidence_pct(mae: f64, price: f64) -> f64 {
    if !(mae.is_finite() && price.is_finite()) {
        return 0.0;
    }
    let raw = (1.0 - mae / price.abs().max(1.0)).max(0.0) * 100.0;
    round2(raw).clamp(0.0, 100.0)
}

/// Raise every same-grade price strictly below the reference brand's price to
/// exactly that price. Grades without a reference prediction are left alone.
/// Confidence is not touched.
pub fn enforce_floor(predictions: &mut [Prediction]) {
    for grade in Grade::ALL {
        let Some(floor) = predictions
            .iter()
            .find(|p| p.target.grade == grade && p.target.brand == Brand::REFERENCE)
            .map(|p| p.price)
        else {
            continue;
        };

        for p in predictions
            .iter_mut()
            .filter(|p| p.target.grade == grade && p.target.brand != Brand::REFERENCE)
        {
            if p.price < floor {
                debug!(target_id = %p.target, from = p.price, to = floor, "raised to reference floor");
                p.price = floor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelKind, ModelSettings, TargetModel};
    use crate::io::table::TableRow;
    use crate::models::Regressor;

    fn pred(brand: Brand, grade: Grade, price: f64, confidence_pct: f64) -> Prediction {
        Prediction {
            target: Target::new(brand, grade),
            price,
            confidence_pct,
        }
    }

    #[test]
    fn floor_lifts_cheaper_brand_and_keeps_its_confidence() {
        let mut preds = vec![
            pred(Brand::Pertamina, Grade::Ron92, 10_000.0, 80.0),
            pred(Brand::Vivo, Grade::Ron92, 9_500.0, 91.5),
            pred(Brand::Shell, Grade::Ron92, 10_400.0, 70.0),
        ];
        enforce_floor(&mut preds);
        assert_eq!(preds[1].price, 10_000.0);
        assert_eq!(preds[1].confidence_pct, 91.5);
        assert_eq!(preds[2].price, 10_400.0);
        assert_eq!(preds[0].price, 10_000.0);
    }

    #[test]
    fn grade_without_reference_is_unconstrained() {
        let mut preds = vec![
            pred(Brand::Pertamina, Grade::Ron92, 12_000.0, 80.0),
            pred(Brand::Bp, Grade::Ron95, 9_000.0, 80.0),
        ];
        enforce_floor(&mut preds);
        assert_eq!(preds[1].price, 9_000.0);
    }

    #[test]
    fn confidence_is_bounded_and_rounded() {
        assert_eq!(confidence_pct(200.0, 10_000.0), 98.0);
        assert_eq!(confidence_pct(1.0, 3.0), 66.67);
        assert_eq!(confidence_pct(50_000.0, 10_000.0), 0.0);
        // Negative predictions use the magnitude.
        assert_eq!(confidence_pct(100.0, -1_000.0), 90.0);
        // Tiny predictions divide by at least one.
        assert_eq!(confidence_pct(0.5, 0.01), 50.0);
        assert_eq!(confidence_pct(f64::NAN, 10.0), 0.0);
        assert_eq!(confidence_pct(0.0, 10.0), 100.0);
    }

    #[test]
    fn fill_prefers_forward_then_backward_then_zero() {
        let rows = vec![
            vec![None, Some(1.0), None],
            vec![Some(2.0), None, None],
            vec![None, None, None],
        ];
        let filled = fill_missing(rows);
        assert_eq!(filled[0], vec![2.0, 1.0, 0.0]);
        assert_eq!(filled[1], vec![2.0, 1.0, 0.0]);
        assert_eq!(filled[2], vec![2.0, 1.0, 0.0]);

        // Single row: only the zero fill applies.
        assert_eq!(fill_missing(vec![vec![Some(3.0), None]]), vec![vec![3.0, 0.0]]);
    }

    fn loaded(target: Target, features: &[&str], mae: f64, y: f64) -> LoadedModel {
        let x: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64; features.len()]).collect();
        let ys = vec![y; 4];
        let regressor = Regressor::fit(ModelKind::Linear, &x, &ys, &ModelSettings::default()).unwrap();
        LoadedModel {
            model: TargetModel {
                target,
                kind: ModelKind::Linear,
                feature_order: features.iter().map(|f| f.to_string()).collect(),
                validation_error: mae,
            },
            regressor,
        }
    }

    #[test]
    fn forecast_uses_latest_month_and_enforces_floor() {
        let mut exog = Table::new(vec!["brent".into(), "usd_idr".into()]);
        for (m, brent) in [("2024-03", 82.0), ("2024-01", 80.0), ("2024-02", 81.0)] {
            exog.rows.push(TableRow {
                month: m.parse().unwrap(),
                values: vec![Some(brent), None],
            });
        }

        let models = vec![
            loaded(Target::new(Brand::Vivo, Grade::Ron92), &["brent", "usd_idr"], 100.0, 9_500.0),
            loaded(Target::new(Brand::Pertamina, Grade::Ron92), &["brent", "not_there"], 2_000.0, 10_000.0),
        ];

        let forecast = forecast_with(&models, &exog).unwrap();
        assert_eq!(forecast.month.to_string(), "2024-03");
        // Declared target order regardless of model order.
        assert_eq!(forecast.predictions[0].target.id(), "pertamina_92");

        let vivo = forecast.get(Target::new(Brand::Vivo, Grade::Ron92)).unwrap();
        let pertamina = forecast.get(Target::new(Brand::Pertamina, Grade::Ron92)).unwrap();
        assert!((pertamina.price - 10_000.0).abs() < 1e-6);
        assert_eq!(vivo.price, pertamina.price);
        assert_eq!(vivo.confidence_pct, 98.95);
        assert_eq!(pertamina.confidence_pct, 80.0);
        for p in &forecast.predictions {
            assert!((0.0..=100.0).contains(&p.confidence_pct));
        }
    }

    #[test]
    fn empty_snapshot_is_insufficient() {
        let err = forecast_with(&[], &Table::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}

//! Ordinary least squares baseline with standardized features.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{mean, solve_least_squares};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub n_features: usize,
    pub intercept: f64,
    /// Per-feature centering applied before the coefficients.
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self, AppError> {
        let n = y.len();
        let p = x.first().map_or(0, Vec::len);
        if n == 0 {
            return Err(AppError::insufficient("Cannot fit a linear model on zero rows."));
        }

        let mut means = Vec::with_capacity(p);
        let mut scales = Vec::with_capacity(p);
        for j in 0..p {
            let column: Vec<f64> = x.iter().map(|r| r[j]).collect();
            let m = mean(&column);
            let var = column.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n as f64;
            let sd = var.sqrt();
            means.push(m);
            scales.push(if sd > 1e-12 { sd } else { 1.0 });
        }

        let design = DMatrix::from_fn(n, p + 1, |i, j| {
            if j == 0 {
                1.0
            } else {
                (x[i][j - 1] - means[j - 1]) / scales[j - 1]
            }
        });
        let target = DVector::from_column_slice(y);

        let fit = solve_least_squares(&design, &target)
            .ok_or_else(|| AppError::runtime("Linear least squares did not converge."))?;
        if fit.rank <= p {
            tracing::debug!(rank = fit.rank, columns = p + 1, "rank-deficient linear design");
        }
        let beta = fit.beta;

        Ok(Self {
            n_features: p,
            intercept: beta[0],
            means,
            scales,
            coefficients: beta.iter().skip(1).copied().collect(),
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .zip(row)
            .fold(self.intercept, |acc, ((c, (m, s)), v)| acc + c * (v - m) / s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_linear_relation_at_different_scales() {
        // Price-like target on an FX-like column and a per-liter column.
        let x: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![15_000.0 + 50.0 * i as f64, 0.5 + 0.01 * (i * i) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 2.0 * r[0] - 300.0 * r[1] + 10.0).collect();

        let model = LinearModel::fit(&x, &y).unwrap();
        for (row, t) in x.iter().zip(&y) {
            assert!((model.predict(row) - t).abs() < 1e-6);
        }
        assert_eq!(model.n_features, 2);
    }

    #[test]
    fn constant_column_is_harmless() {
        let x: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64, 7.0]).collect();
        let y: Vec<f64> = (0..5).map(|i| 3.0 * i as f64).collect();
        let model = LinearModel::fit(&x, &y).unwrap();
        assert!((model.predict(&[10.0, 7.0]) - 30.0).abs() < 1e-8);
    }
}

//! Gradient-boosted regression trees on squared loss.
//!
//! Each round fits a shallow tree to the current residuals on a row subsample
//! drawn without replacement, then adds it with shrinkage. Rounds are
//! inherently sequential.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

use crate::math::mean;
use crate::models::tree::{RegressionTree, SplitRule, TreeParams};

#[derive(Debug, Clone, Copy)]
pub struct BoostParams {
    pub rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows drawn per round, in `(0, 1]`.
    pub subsample: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    pub n_features: usize,
    pub base: f64,
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
}

impl BoostedTrees {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &BoostParams) -> Self {
        let n = y.len();
        let n_features = x.first().map_or(0, Vec::len);
        let base = mean(y);
        let tree_params = TreeParams::new(params.max_depth, SplitRule::Best);

        let subsample = if params.subsample.is_finite() {
            params.subsample.clamp(f64::EPSILON, 1.0)
        } else {
            1.0
        };
        let draw = ((n as f64 * subsample).round() as usize).clamp(1, n.max(1));

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut fitted = vec![base; n];
        let mut trees = Vec::with_capacity(params.rounds);

        if n > 0 {
            for _ in 0..params.rounds {
                let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();
                let rows = if draw < n {
                    let mut rows = sample(&mut rng, n, draw).into_vec();
                    rows.sort_unstable();
                    rows
                } else {
                    (0..n).collect()
                };

                let tree = RegressionTree::fit(x, &residuals, &rows, &tree_params, &mut rng);
                for (f, row) in fitted.iter_mut().zip(x) {
                    *f += params.learning_rate * tree.predict(row);
                }
                trees.push(tree);
            }
        }

        Self {
            n_features,
            base,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.base + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(rounds: usize) -> BoostParams {
        BoostParams {
            rounds,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 0.9,
            seed: 42,
        }
    }

    #[test]
    fn zero_rounds_predicts_the_mean() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![1.0, 2.0, 6.0];
        let model = BoostedTrees::fit(&x, &y, &params(0));
        assert_eq!(model.predict(&[5.0]), 3.0);
    }

    #[test]
    fn boosting_reduces_training_error_and_is_deterministic() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin() * 50.0 + 1000.0).collect();

        let short = BoostedTrees::fit(&x, &y, &params(5));
        let long = BoostedTrees::fit(&x, &y, &params(200));
        let err = |m: &BoostedTrees| -> f64 {
            x.iter().zip(&y).map(|(r, t)| (m.predict(r) - t).abs()).sum::<f64>()
        };
        assert!(err(&long) < err(&short));
        assert_eq!(long, BoostedTrees::fit(&x, &y, &params(200)));
    }
}

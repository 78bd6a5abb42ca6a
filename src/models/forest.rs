//! Averaged tree ensembles: bagged random forest and extra-trees.
//!
//! Per-tree seeds are drawn up front from one seeded generator, then trees are
//! grown in parallel. The result depends only on the seed, never on thread
//! scheduling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::tree::{RegressionTree, SplitRule, TreeParams};

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    /// Resample rows with replacement for each tree.
    pub bootstrap: bool,
    pub split: SplitRule,
    pub seed: u64,
}

impl ForestParams {
    /// Bootstrap rows, exhaustive splits.
    pub fn random_forest(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            n_trees,
            max_depth,
            bootstrap: true,
            split: SplitRule::Best,
            seed,
        }
    }

    /// All rows, random thresholds.
    pub fn extra_trees(n_trees: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            n_trees,
            max_depth,
            bootstrap: false,
            split: SplitRule::Random,
            seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    pub trees: Vec<RegressionTree>,
}

impl TreeEnsemble {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Self {
        let n = y.len();
        let n_features = x.first().map_or(0, Vec::len);
        let tree_params = TreeParams::new(params.max_depth, params.split);

        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_trees.max(1)).map(|_| master.r#gen()).collect();

        let trees = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let rows: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, y, &rows, &tree_params, &mut rng)
            })
            .collect();

        Self { n_features, trees }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = (0..n).map(|i| 100.0 + 10.0 * i as f64).collect();
        (x, y)
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = linear_data(30);
        let params = ForestParams::random_forest(16, 6, 42);
        let a = TreeEnsemble::fit(&x, &y, &params);
        let b = TreeEnsemble::fit(&x, &y, &params);
        assert_eq!(a, b);
        assert_eq!(a.trees.len(), 16);
        assert_eq!(a.n_features, 2);
    }

    #[test]
    fn ensembles_track_the_training_signal() {
        let (x, y) = linear_data(30);
        for params in [ForestParams::random_forest(32, 8, 1), ForestParams::extra_trees(32, 8, 1)] {
            let model = TreeEnsemble::fit(&x, &y, &params);
            let low = model.predict(&x[2]);
            let high = model.predict(&x[27]);
            assert!(high > low + 150.0, "low={low} high={high}");
            assert!((100.0..=390.0).contains(&low));
        }
    }
}

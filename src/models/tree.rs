//! CART regression tree (squared-error splits).
//!
//! Trees are stored as a flat node arena: node `0` is the root and split
//! nodes refer to their children by index. This keeps the serialized form
//! shallow regardless of depth.
//!
//! Two split rules are supported:
//! - `Best`: exhaustive search over every midpoint between distinct sorted
//!   feature values (bagged forests and boosting)
//! - `Random`: one uniformly drawn threshold per feature within the node's
//!   value range, best feature wins (extra-trees)

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Minimum variance reduction for a split to be accepted.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRule {
    Best,
    Random,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub split: SplitRule,
}

impl TreeParams {
    pub fn new(max_depth: usize, split: SplitRule) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            split,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    /// Fit a tree on the given row subset (indices may repeat, as in a bootstrap).
    pub fn fit(x: &[Vec<f64>], y: &[f64], rows: &[usize], params: &TreeParams, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let mut idx = rows.to_vec();
        if idx.is_empty() {
            tree.nodes.push(Node::Leaf { value: 0.0 });
            return tree;
        }
        tree.grow(x, y, &mut idx, 0, params, rng);
        tree
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match self.nodes.get(at) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    at = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Largest feature index referenced by a split, if any.
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    /// Children must point forward in the arena; anything else cannot have
    /// been produced by `fit` and would loop during prediction.
    pub fn is_well_formed(&self) -> bool {
        let n = self.nodes.len();
        n > 0
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Leaf { .. } => true,
                Node::Split { left, right, .. } => *left > i && *right > i && *left < n && *right < n,
            })
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        idx: &mut [usize],
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> usize {
        let n = idx.len();
        let sum: f64 = idx.iter().map(|&i| y[i]).sum();
        let mean = sum / n as f64;
        let sse: f64 = idx.iter().map(|&i| (y[i] - mean).powi(2)).sum();

        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= params.max_depth || n < params.min_samples_split || sse <= MIN_GAIN {
            return node_id;
        }

        let Some(best) = find_split(x, y, idx, sum, params, rng) else {
            return node_id;
        };

        let split_at = partition(idx, |i| x[i][best.feature] <= best.threshold);
        if split_at == 0 || split_at == n {
            return node_id;
        }

        let (left_idx, right_idx) = idx.split_at_mut(split_at);
        let left = self.grow(x, y, left_idx, depth + 1, params, rng);
        let right = self.grow(x, y, right_idx, depth + 1, params, rng);
        self.nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_id
    }
}

/// Score used for split comparison: `sum_l²/n_l + sum_r²/n_r`.
///
/// Maximising it is equivalent to minimising the children's total SSE.
fn split_score(sum_l: f64, n_l: usize, sum_r: f64, n_r: usize) -> f64 {
    sum_l * sum_l / n_l as f64 + sum_r * sum_r / n_r as f64
}

fn find_split(
    x: &[Vec<f64>],
    y: &[f64],
    idx: &[usize],
    total: f64,
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<Candidate> {
    let n = idx.len();
    let n_features = x.get(idx[0]).map_or(0, Vec::len);
    let parent_score = total * total / n as f64;
    let min_leaf = params.min_samples_leaf.max(1);

    let mut best: Option<Candidate> = None;
    let mut consider = |c: Candidate| {
        if c.score - parent_score > MIN_GAIN && best.as_ref().is_none_or(|b| c.score > b.score) {
            best = Some(c);
        }
    };

    match params.split {
        SplitRule::Best => {
            let mut order: Vec<usize> = idx.to_vec();
            for feature in 0..n_features {
                order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
                let mut sum_l = 0.0;
                for k in 1..n {
                    sum_l += y[order[k - 1]];
                    let lo = x[order[k - 1]][feature];
                    let hi = x[order[k]][feature];
                    if lo >= hi || k < min_leaf || n - k < min_leaf {
                        continue;
                    }
                    consider(Candidate {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        score: split_score(sum_l, k, total - sum_l, n - k),
                    });
                }
            }
        }
        SplitRule::Random => {
            for feature in 0..n_features {
                let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(x[i][feature]), hi.max(x[i][feature]))
                });
                if !(lo < hi) {
                    continue;
                }
                let threshold = rng.gen_range(lo..hi);
                let (mut sum_l, mut n_l) = (0.0, 0usize);
                for &i in idx {
                    if x[i][feature] <= threshold {
                        sum_l += y[i];
                        n_l += 1;
                    }
                }
                if n_l < min_leaf || n - n_l < min_leaf {
                    continue;
                }
                consider(Candidate {
                    feature,
                    threshold,
                    score: split_score(sum_l, n_l, total - sum_l, n - n_l),
                });
            }
        }
    }

    best
}

/// Stable-enough in-place partition; returns the count of rows matching `pred`.
fn partition(idx: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut store = 0;
    for i in 0..idx.len() {
        if pred(idx[i]) {
            idx.swap(store, i);
            store += 1;
        }
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 1.0]).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 5.0 } else { 15.0 }).collect();
        (x, y)
    }

    #[test]
    fn best_split_recovers_step_function() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..x.len()).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, &rows, &TreeParams::new(4, SplitRule::Best), &mut rng);

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.predict(&[3.0, 1.0]), 5.0);
        assert_eq!(tree.predict(&[12.0, 1.0]), 15.0);
        assert_eq!(tree.max_feature(), Some(0));
        assert!(tree.is_well_formed());
    }

    #[test]
    fn depth_zero_is_the_mean() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..x.len()).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = RegressionTree::fit(&x, &y, &rows, &TreeParams::new(0, SplitRule::Best), &mut rng);
        assert_eq!(tree.predict(&[0.0, 0.0]), 10.0);
    }

    #[test]
    fn random_split_is_seed_deterministic() {
        let (x, y) = step_data();
        let rows: Vec<usize> = (0..x.len()).collect();
        let params = TreeParams::new(6, SplitRule::Random);
        let a = RegressionTree::fit(&x, &y, &rows, &params, &mut StdRng::seed_from_u64(7));
        let b = RegressionTree::fit(&x, &y, &rows, &params, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        // Constant second feature is never split on.
        assert_eq!(a.max_feature(), Some(0));
    }

    #[test]
    fn malformed_arena_is_detected() {
        let tree = RegressionTree {
            nodes: vec![Node::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
            }],
        };
        assert!(!tree.is_well_formed());
    }
}

//! Forward-chaining (expanding-window) time-series folds.
//!
//! With `n` ordered rows and `k` folds the rows are cut into `k + 1` blocks of
//! `n / (k + 1)` rows; any remainder goes to the first training window. Fold `i`
//! trains on every row before its test block, so training is always a strict
//! prefix in time of validation.

use std::ops::Range;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

pub fn forward_chaining_folds(n: usize, k: usize) -> Result<Vec<Fold>, AppError> {
    if k == 0 {
        return Err(AppError::config("Fold count must be at least 1."));
    }
    if n < k + 1 {
        return Err(AppError::insufficient(format!(
            "Cannot build {k} forward-chaining folds from {n} rows."
        )));
    }

    let test_size = n / (k + 1);
    let first_test = n - k * test_size;
    Ok((0..k)
        .map(|i| {
            let start = first_test + i * test_size;
            Fold {
                train: 0..start,
                test: start..start + test_size,
            }
        })
        .collect())
}

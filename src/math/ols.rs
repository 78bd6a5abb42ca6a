//! Ordinary least squares via SVD.
//!
//! The linear baseline regresses a price on a handful of market columns, several
//! of which are exact affine transforms of each other (the per-grade base prices
//! are the per-liter benchmark plus a constant). The design matrix is therefore
//! rank deficient by construction; singular values below a cutoff relative to
//! the largest one are discarded, which yields the minimum-norm solution.
//!
//! (Nalgebra's `QR::solve` is intended for square systems and will panic for
//! non-square matrices.)

use nalgebra::{DMatrix, DVector};

/// Cutoff relative to the largest singular value, scaled by the larger matrix dimension.
const RELATIVE_CUTOFF: f64 = 1e-10;

/// Solution of `min ||X b - y||` together with the effective rank used.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    pub beta: DVector<f64>,
    pub rank: usize,
}

/// Returns `None` on shape mismatch, empty input or a non-finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<LeastSquares> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }

    let svd = x.clone().svd(true, true);
    let largest = svd.singular_values.max();
    if !largest.is_finite() {
        return None;
    }
    let eps = largest * RELATIVE_CUTOFF * x.nrows().max(x.ncols()) as f64;

    let beta = svd.solve(y, eps).ok()?;
    if !beta.iter().all(|v| v.is_finite()) {
        return None;
    }
    let rank = svd.rank(eps);

    Some(LeastSquares { beta, rank })
}

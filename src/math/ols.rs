//! Ordinary least squares.
//!
//! The COR model is a straight line through a handful of `(slice, cor)`
//! points:
//!
//! ```text
//! minimize Σ (cor_i - (c + m · slice_i))^2
//! ```
//!
//! Implementation choices:
//! - The design matrix is tall (`n × 2`), so we solve with SVD rather than
//!   `QR::solve`, which is intended for square systems.
//! - Slice indices can be in the thousands while CORs vary by a few pixels, so
//!   the columns are badly scaled; SVD copes with that without extra centering.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser tolerances before giving up.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Straight-line fit `y = intercept + slope · x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    /// Root mean square of the residuals.
    pub rms: f64,
}

impl LineFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit a line through `(x_i, y_i)`. Needs at least two distinct `x` values.
pub fn fit_line(xs: &[f64], ys: &[f64]) -> Option<LineFit> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len();
    let design = DMatrix::from_fn(n, 2, |r, c| if c == 0 { 1.0 } else { xs[r] });
    let y = DVector::from_column_slice(ys);
    let beta = solve_least_squares(&design, &y)?;

    let fit = LineFit {
        intercept: beta[0],
        slope: beta[1],
        rms: 0.0,
    };
    let sse: f64 = xs.iter().zip(ys).map(|(x, y)| (y - fit.eval(*x)).powi(2)).sum();
    Some(LineFit {
        rms: (sse / n as f64).sqrt(),
        ..fit
    })
}

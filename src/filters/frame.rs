//! 2D per-frame neighbourhood operations shared by several stages.
//!
//! Everything here works on one frame at a time, so stages built on top of
//! these stay frame-local and chunking cannot change their output.

use std::str::FromStr;

use ndarray::{Array2, ArrayView2};

use crate::volume::FrameShape;

/// Largest neighbourhood radius accepted by the median and Gaussian kernels.
pub const MAX_KERNEL_RADIUS: usize = 256;

/// How indices outside the frame are mapped back inside (scipy.ndimage naming).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderMode {
    /// `d c b a | a b c d | d c b a`
    Reflect,
    /// `d c b | a b c d | c b a`
    Mirror,
    /// `a a a | a b c d | d d d`
    Nearest,
    /// `a b c d | a b c d | a b c d`
    Wrap,
    /// Outside samples are zero.
    Constant,
}

impl FromStr for BorderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reflect" => Ok(BorderMode::Reflect),
            "mirror" => Ok(BorderMode::Mirror),
            "nearest" => Ok(BorderMode::Nearest),
            "wrap" => Ok(BorderMode::Wrap),
            "constant" => Ok(BorderMode::Constant),
            other => Err(format!(
                "unknown border mode '{other}' (expected reflect, mirror, nearest, wrap or constant)"
            )),
        }
    }
}

impl BorderMode {
    /// Map a possibly out-of-range index into `0..n`; `None` means "use zero".
    pub fn index(self, i: isize, n: usize) -> Option<usize> {
        let n = n as isize;
        if n == 0 {
            return None;
        }
        if (0..n).contains(&i) {
            return Some(i as usize);
        }
        let mapped = match self {
            BorderMode::Constant => return None,
            BorderMode::Nearest => i.clamp(0, n - 1),
            BorderMode::Wrap => i.rem_euclid(n),
            BorderMode::Reflect => {
                let period = 2 * n;
                let m = i.rem_euclid(period);
                if m < n { m } else { period - 1 - m }
            }
            BorderMode::Mirror => {
                if n == 1 {
                    0
                } else {
                    let period = 2 * n - 2;
                    let m = i.rem_euclid(period);
                    if m < n { m } else { period - m }
                }
            }
        };
        Some(mapped as usize)
    }
}

fn sample(frame: &ArrayView2<'_, f32>, r: isize, c: isize, mode: BorderMode) -> f32 {
    let (h, w) = frame.dim();
    match (mode.index(r, h), mode.index(c, w)) {
        (Some(r), Some(c)) => frame[[r, c]],
        _ => 0.0,
    }
}

/// A kernel reaching further than the larger frame side only sees border samples.
pub fn check_radius(radius: usize, frame: FrameShape) -> Result<(), String> {
    let (h, w) = frame;
    let extent = h.max(w);
    if radius > extent {
        return Err(format!("kernel radius {radius} exceeds the frame extent {h}x{w}"));
    }
    Ok(())
}

/// Median over a `size × size` window (odd `size`) for every pixel.
pub fn median_filter(frame: ArrayView2<'_, f32>, size: usize, mode: BorderMode) -> Array2<f32> {
    let (h, w) = frame.dim();
    let half = (size / 2) as isize;
    let mut window = Vec::with_capacity(size * size);
    let mut out = Array2::<f32>::zeros((h, w));

    for r in 0..h {
        for c in 0..w {
            window.clear();
            for dr in -half..=half {
                for dc in -half..=half {
                    window.push(sample(&frame, r as isize + dr, c as isize + dc, mode));
                }
            }
            let mid = window.len() / 2;
            let (_, m, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            out[[r, c]] = *m;
        }
    }
    out
}

/// Normalised 1D Gaussian weights for `sigma`, cut at `truncate * sigma`.
pub fn gaussian_weights(sigma: f64, truncate: f64) -> Vec<f64> {
    let radius = (truncate * sigma + 0.5) as isize;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Separable Gaussian smoothing (rows, then columns).
pub fn gaussian_filter(frame: ArrayView2<'_, f32>, weights: &[f64], mode: BorderMode) -> Array2<f32> {
    let (h, w) = frame.dim();
    let radius = (weights.len() / 2) as isize;

    let mut rows = Array2::<f32>::zeros((h, w));
    for r in 0..h {
        for c in 0..w {
            let mut acc = 0.0f64;
            for (k, wk) in weights.iter().enumerate() {
                let cc = c as isize + k as isize - radius;
                acc += wk * sample(&frame, r as isize, cc, mode) as f64;
            }
            rows[[r, c]] = acc as f32;
        }
    }

    let rows_view = rows.view();
    let mut out = Array2::<f32>::zeros((h, w));
    for r in 0..h {
        for c in 0..w {
            let mut acc = 0.0f64;
            for (k, wk) in weights.iter().enumerate() {
                let rr = r as isize + k as isize - radius;
                acc += wk * sample(&rows_view, rr, c as isize, mode) as f64;
            }
            out[[r, c]] = acc as f32;
        }
    }
    out
}

/// Mean of `frame[top..bottom, left..right]`, accumulated in `f64`.
pub fn region_mean(frame: ArrayView2<'_, f32>, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> f64 {
    let count = rows.len() * cols.len();
    if count == 0 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for r in rows {
        for c in cols.clone() {
            acc += frame[[r, c]] as f64;
        }
    }
    acc / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn border_modes_match_scipy_layout() {
        // n = 4: a b c d
        let idx = |m: BorderMode, i| m.index(i, 4);
        assert_eq!(idx(BorderMode::Reflect, -1), Some(0));
        assert_eq!(idx(BorderMode::Reflect, -2), Some(1));
        assert_eq!(idx(BorderMode::Reflect, 4), Some(3));
        assert_eq!(idx(BorderMode::Mirror, -1), Some(1));
        assert_eq!(idx(BorderMode::Mirror, 4), Some(2));
        assert_eq!(idx(BorderMode::Nearest, -5), Some(0));
        assert_eq!(idx(BorderMode::Wrap, -1), Some(3));
        assert_eq!(idx(BorderMode::Constant, -1), None);
        assert_eq!(idx(BorderMode::Constant, 2), Some(2));
    }

    #[test]
    fn median_removes_single_spike() {
        let frame = array![
            [1.0f32, 1.0, 1.0],
            [1.0, 100.0, 1.0],
            [1.0, 1.0, 1.0]
        ];
        let out = median_filter(frame.view(), 3, BorderMode::Reflect);
        assert_eq!(out[[1, 1]], 1.0);
    }

    #[test]
    fn gaussian_preserves_constant_frames() {
        let frame = Array2::<f32>::from_elem((5, 6), 3.5);
        let weights = gaussian_weights(1.2, 4.0);
        let out = gaussian_filter(frame.view(), &weights, BorderMode::Reflect);
        for v in out.iter() {
            assert!((v - 3.5).abs() < 1e-5);
        }
    }

    #[test]
    fn gaussian_weights_are_normalised() {
        let w = gaussian_weights(2.0, 4.0);
        assert_eq!(w.len(), 17);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn radius_is_bounded_by_the_frame() {
        assert!(check_radius(4, (4, 3)).is_ok());
        assert!(check_radius(5, (4, 3)).is_err());
    }

    #[test]
    fn region_mean_over_subwindow() {
        let frame = array![[1.0f32, 2.0], [3.0, 4.0]];
        assert_eq!(region_mean(frame.view(), 0..2, 1..2), 3.0);
    }
}

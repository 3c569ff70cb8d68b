//! Piecewise-linear interpolation with flat extrapolation.

/// Evaluate the piecewise-linear function through `(xp[i], fp[i])` at `x`.
///
/// - `xp` must be strictly increasing and the same length as `fp`
/// - `x <= xp[0]` gives `fp[0]`, `x >= xp[last]` gives `fp[last]`
/// - at a knot the knot value is returned exactly
///
/// Returns `None` for empty or mismatched inputs.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> Option<f64> {
    if xp.is_empty() || xp.len() != fp.len() {
        return None;
    }
    let last = xp.len() - 1;
    if x <= xp[0] {
        return Some(fp[0]);
    }
    if x >= xp[last] {
        return Some(fp[last]);
    }

    // First knot strictly greater than x; 1..=last because of the checks above.
    let hi = xp.partition_point(|&k| k <= x);
    let lo = hi - 1;
    if xp[lo] == x {
        return Some(fp[lo]);
    }
    let t = (x - xp[lo]) / (xp[hi] - xp[lo]);
    Some(fp[lo] + t * (fp[hi] - fp[lo]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_and_clamps() {
        let xp = [2.0, 8.0];
        let fp = [5.0, 11.0];
        assert_eq!(interp(0.0, &xp, &fp), Some(5.0));
        assert_eq!(interp(2.0, &xp, &fp), Some(5.0));
        assert_eq!(interp(5.0, &xp, &fp), Some(8.0));
        assert_eq!(interp(8.0, &xp, &fp), Some(11.0));
        assert_eq!(interp(100.0, &xp, &fp), Some(11.0));
    }

    #[test]
    fn exact_at_interior_knots() {
        let xp = [0.0, 1.0, 3.0];
        let fp = [0.1, 0.7, 0.2];
        assert_eq!(interp(1.0, &xp, &fp), Some(0.7));
        assert!((interp(2.0, &xp, &fp).unwrap() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn single_knot_is_constant() {
        assert_eq!(interp(-3.0, &[4.0], &[1.5]), Some(1.5));
        assert_eq!(interp(9.0, &[4.0], &[1.5]), Some(1.5));
        assert_eq!(interp(1.0, &[], &[]), None);
    }
}

//! Centre-of-rotation calibration.
//!
//! Two different products come out of the same sparse observations:
//!
//! - `CorModel`: a least-squares line and the tilt it implies (global,
//!   extrapolates linearly)
//! - `CorTable` from `interpolate`: one COR per slice for per-slice
//!   reconstruction (flat outside the observed range)
//!
//! `dense_table` picks one of them according to `CorMode`.

use crate::domain::CorMode;
use crate::error::ReconError;

pub mod model;
pub mod observations;
pub mod table;

pub use model::CorModel;
pub use observations::CorObservations;
pub use table::{CorTable, interpolate};

/// Per-slice COR table for `slices` slices, built the way `mode` asks.
pub fn dense_table(mode: CorMode, slices: usize, observations: &CorObservations) -> Result<CorTable, ReconError> {
    match mode {
        CorMode::Interpolate => interpolate(slices, observations),
        CorMode::Regression => Ok(CorModel::fit(observations)?.table(slices)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorObservation;

    #[test]
    fn modes_differ_outside_the_observed_range() {
        let obs: CorObservations = vec![CorObservation::new(2, 5.0), CorObservation::new(8, 11.0)].into();
        let flat = dense_table(CorMode::Interpolate, 10, &obs).unwrap();
        let line = dense_table(CorMode::Regression, 10, &obs).unwrap();
        assert_eq!(flat.get(0), Some(5.0));
        assert!((line.get(0).unwrap() - 3.0).abs() < 1e-9);
        assert!((flat.get(5).unwrap() - line.get(5).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn regression_needs_two_slices_interpolation_one() {
        let obs: CorObservations = vec![CorObservation::new(2, 5.0)].into();
        assert!(dense_table(CorMode::Interpolate, 3, &obs).is_ok());
        assert!(matches!(
            dense_table(CorMode::Regression, 3, &obs),
            Err(ReconError::InsufficientData(_))
        ));
    }
}

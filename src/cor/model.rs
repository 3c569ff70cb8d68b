//! Linear COR model: `cor(slice) = intercept + slope · slice`.
//!
//! The slope is the detector-plane tilt of the rotation axis, so
//! `tilt = atan(slope)`. Unlike the interpolated table, the model extrapolates
//! linearly (and unclamped) outside the observed slices.

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::math::fit_line;

use super::CorObservations;
use super::table::CorTable;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorModel {
    pub slope: f64,
    pub intercept: f64,
    /// `atan(slope)`, radians.
    pub tilt_rad: f64,
    /// Residual RMS of the fit; zero for a model built from a known line.
    pub rms: f64,
    /// Distinct slices the model was fitted on.
    pub points: usize,
}

impl CorModel {
    /// Least-squares fit. Needs at least two distinct slice indices.
    pub fn fit(observations: &CorObservations) -> Result<Self, ReconError> {
        if observations.len() < 2 {
            return Err(ReconError::InsufficientData(format!(
                "COR regression needs at least 2 distinct slices, got {}",
                observations.len()
            )));
        }
        let cors = observations.cors();
        if let Some(bad) = cors.iter().find(|c| !c.is_finite()) {
            return Err(ReconError::invalid_param("cor", format!("COR {bad} is not finite")));
        }

        let fit = fit_line(&observations.slices(), &cors).ok_or_else(|| {
            ReconError::InsufficientData("COR observations do not determine a line".to_string())
        })?;
        log::debug!(
            "COR fit over {} slice(s): cor = {:.4} + {:.6} * slice (rms {:.4})",
            observations.len(),
            fit.intercept,
            fit.slope,
            fit.rms
        );

        Ok(Self {
            slope: fit.slope,
            intercept: fit.intercept,
            tilt_rad: fit.slope.atan(),
            rms: fit.rms,
            points: observations.len(),
        })
    }

    /// A model from a known rotation centre (at slice 0) and gradient.
    pub fn from_line(intercept: f64, slope: f64) -> Self {
        Self {
            slope,
            intercept,
            tilt_rad: slope.atan(),
            rms: 0.0,
            points: 0,
        }
    }

    pub fn predict(&self, slice_index: f64) -> f64 {
        self.intercept + self.slope * slice_index
    }

    pub fn tilt_deg(&self) -> f64 {
        self.tilt_rad.to_degrees()
    }

    /// `predict(i)` for every slice `i in 0..slices`.
    pub fn table(&self, slices: usize) -> CorTable {
        CorTable::new((0..slices).map(|i| self.predict(i as f64)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorObservation;

    fn obs(points: &[(usize, f64)]) -> CorObservations {
        points.iter().map(|(s, c)| CorObservation::new(*s, *c)).collect()
    }

    #[test]
    fn two_points_give_exact_line() {
        let model = CorModel::fit(&obs(&[(0, 10.0), (10, 20.0)])).unwrap();
        assert!((model.slope - 1.0).abs() < 1e-9);
        assert!((model.intercept - 10.0).abs() < 1e-9);
        assert!((model.tilt_rad - 1.0f64.atan()).abs() < 1e-9);
        assert!((model.predict(5.0) - 15.0).abs() < 1e-9);
        assert!((model.tilt_deg() - 45.0).abs() < 1e-7);
    }

    #[test]
    fn extrapolation_is_linear() {
        let model = CorModel::fit(&obs(&[(0, 10.0), (10, 20.0)])).unwrap();
        assert!((model.predict(-10.0) - 0.0).abs() < 1e-9);
        assert!((model.predict(100.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn fewer_than_two_distinct_slices_is_insufficient() {
        assert!(matches!(CorModel::fit(&obs(&[])), Err(ReconError::InsufficientData(_))));
        // duplicates collapse to one slice
        assert!(matches!(
            CorModel::fit(&obs(&[(4, 1.0), (4, 2.0)])),
            Err(ReconError::InsufficientData(_))
        ));
    }

    #[test]
    fn table_evaluates_the_line() {
        let table = CorModel::from_line(100.0, -0.5).table(4);
        assert_eq!(table.as_slice(), &[100.0, 99.5, 99.0, 98.5]);
    }
}

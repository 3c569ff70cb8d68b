//! Dense per-slice COR table and the interpolator that builds it.

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::math::interp;

use super::CorObservations;

/// One COR per slice, index = slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorTable {
    values: Vec<f64>,
}

impl CorTable {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, slice_index: usize) -> Option<f64> {
        self.values.get(slice_index).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().copied().enumerate()
    }
}

/// Dense COR table of `slices` entries from sparse observations.
///
/// Exact at observed slices, linear between them, and flat (the nearest
/// observation's value) below the first and above the last observed slice.
pub fn interpolate(slices: usize, observations: &CorObservations) -> Result<CorTable, ReconError> {
    if observations.is_empty() {
        return Err(ReconError::InsufficientData(
            "COR interpolation needs at least one observation".to_string(),
        ));
    }
    let xp = observations.slices();
    let fp = observations.cors();

    let values = (0..slices)
        .map(|i| {
            interp(i as f64, &xp, &fp).ok_or_else(|| {
                ReconError::InsufficientData("COR interpolation needs at least one observation".to_string())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorTable::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorObservation;

    #[test]
    fn flat_outside_linear_inside() {
        let obs: CorObservations = vec![CorObservation::new(2, 5.0), CorObservation::new(8, 11.0)].into();
        let table = interpolate(10, &obs).unwrap();
        assert_eq!(table.len(), 10);
        assert_eq!(table.get(0), Some(5.0));
        assert_eq!(table.get(1), Some(5.0));
        assert_eq!(table.get(2), Some(5.0));
        assert!((table.get(5).unwrap() - 8.0).abs() < 1e-12);
        assert_eq!(table.get(8), Some(11.0));
        assert_eq!(table.get(9), Some(11.0));
    }

    #[test]
    fn single_observation_fills_the_table() {
        let obs: CorObservations = vec![CorObservation::new(3, 7.25)].into();
        let table = interpolate(5, &obs).unwrap();
        assert!(table.as_slice().iter().all(|v| *v == 7.25));
    }

    #[test]
    fn no_observations_is_insufficient() {
        assert!(matches!(
            interpolate(4, &CorObservations::new()),
            Err(ReconError::InsufficientData(_))
        ));
    }
}

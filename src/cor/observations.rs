//! Sparse `(slice, cor)` observations keyed by slice index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::CorObservation;

/// At most one COR per slice; setting a slice twice keeps the last value.
/// Iteration is always in ascending slice order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CorObservation>", into = "Vec<CorObservation>")]
pub struct CorObservations {
    points: BTreeMap<usize, f64>,
}

impl CorObservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cor` at `slice_index`, returning the value it replaced.
    pub fn set(&mut self, slice_index: usize, cor: f64) -> Option<f64> {
        self.points.insert(slice_index, cor)
    }

    pub fn get(&self, slice_index: usize) -> Option<f64> {
        self.points.get(&slice_index).copied()
    }

    /// Number of distinct slice indices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CorObservation> + '_ {
        self.points.iter().map(|(s, c)| CorObservation::new(*s, *c))
    }

    pub fn slices(&self) -> Vec<f64> {
        self.points.keys().map(|s| *s as f64).collect()
    }

    pub fn cors(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }
}

impl FromIterator<CorObservation> for CorObservations {
    fn from_iter<I: IntoIterator<Item = CorObservation>>(iter: I) -> Self {
        let mut out = CorObservations::new();
        for obs in iter {
            out.set(obs.slice_index, obs.cor);
        }
        out
    }
}

impl From<Vec<CorObservation>> for CorObservations {
    fn from(value: Vec<CorObservation>) -> Self {
        value.into_iter().collect()
    }
}

impl From<CorObservations> for Vec<CorObservation> {
    fn from(value: CorObservations) -> Self {
        value.iter().collect()
    }
}

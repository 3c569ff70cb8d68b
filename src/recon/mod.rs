//! Reconstruction handoff.
//!
//! The reconstruction algorithm (gridrec, SIRT, ...) is not implemented here.
//! The pipeline prepares what it needs (projection angles, a COR per slice or
//! a single COR, algorithm and filter names) and calls a `Reconstructor`.

use crate::cor::{CorModel, CorObservations, CorTable, dense_table};
use crate::domain::{CorMode, ReconSettings};
use crate::error::ReconError;
use crate::volume::Volume;

/// Rotation centre handed to the reconstructor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorInput<'a> {
    /// The same centre for every slice.
    Single(f64),
    /// One centre per slice (projection row).
    PerSlice(&'a CorTable),
}

impl CorInput<'_> {
    /// Centre for `slice_index`; per-slice tables clamp to their last entry.
    pub fn for_slice(&self, slice_index: usize) -> Option<f64> {
        match self {
            CorInput::Single(c) => Some(*c),
            CorInput::PerSlice(table) => table
                .get(slice_index)
                .or_else(|| table.as_slice().last().copied()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconRequest<'a> {
    /// One angle per projection, radians.
    pub angles: &'a [f64],
    pub cor: CorInput<'a>,
    pub algorithm: &'a str,
    pub filter: &'a str,
}

/// External reconstruction collaborator.
///
/// Receives the pre-processed projections `(angles, rows, cols)` and returns
/// the reconstructed volume `(slices, y, x)`.
pub trait Reconstructor {
    fn reconstruct(&self, projections: &Volume, request: &ReconRequest<'_>) -> Result<Volume, String>;
}

/// `angles[i] = radians(i * max_angle_deg / n)` for `i in 0..n`.
pub fn projection_angles(n: usize, max_angle_deg: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let step = max_angle_deg / n as f64;
    (0..n).map(|i| (i as f64 * step).to_radians()).collect()
}

/// How the COR for a run was decided.
#[derive(Debug, Clone, PartialEq)]
pub enum CorPlan {
    Single(f64),
    PerSlice(CorTable),
}

impl CorPlan {
    /// From the run settings and the projection geometry `(rows, cols)`.
    ///
    /// Without observations the detector's horizontal centre is used for every
    /// slice.
    pub fn resolve(settings: &ReconSettings, frame: (usize, usize)) -> Result<Self, ReconError> {
        let (rows, cols) = frame;
        let observations: CorObservations = settings.cor_observations.iter().copied().collect();
        if observations.is_empty() {
            let centre = cols as f64 / 2.0;
            log::warn!("no COR observations given, using the detector centre {centre}");
            return Ok(CorPlan::Single(centre));
        }
        Ok(CorPlan::PerSlice(dense_table(settings.cor_mode, rows, &observations)?))
    }

    pub fn input(&self) -> CorInput<'_> {
        match self {
            CorPlan::Single(c) => CorInput::Single(*c),
            CorPlan::PerSlice(table) => CorInput::PerSlice(table),
        }
    }
}

/// Everything about `settings` that does not depend on the projections:
/// the angle range, finite observations, and enough slices for a regression.
pub fn validate_settings(settings: &ReconSettings) -> Result<(), ReconError> {
    if !(settings.max_angle_deg.is_finite() && settings.max_angle_deg > 0.0) {
        return Err(ReconError::invalid_param(
            "recon",
            format!("max_angle_deg must be > 0, got {}", settings.max_angle_deg),
        ));
    }
    if let Some(bad) = settings.cor_observations.iter().find(|o| !o.cor.is_finite()) {
        return Err(ReconError::invalid_param(
            "cor",
            format!("COR {} at slice {} is not finite", bad.cor, bad.slice_index),
        ));
    }
    if settings.cor_mode == CorMode::Regression && !settings.cor_observations.is_empty() {
        let observations: CorObservations = settings.cor_observations.iter().copied().collect();
        CorModel::fit(&observations)?;
    }
    Ok(())
}

/// Build the request for `projections` and call `reconstructor`.
pub fn reconstruct(
    reconstructor: &dyn Reconstructor,
    projections: &Volume,
    settings: &ReconSettings,
) -> Result<(Volume, CorPlan), ReconError> {
    validate_settings(settings)?;
    let angles = projection_angles(projections.len(), settings.max_angle_deg);
    let cor = CorPlan::resolve(settings, projections.frame_shape())?;
    let request = ReconRequest {
        angles: &angles,
        cor: cor.input(),
        algorithm: &settings.algorithm,
        filter: &settings.filter,
    };
    log::info!(
        "reconstructing {} projection(s) of {:?} with {} / {}",
        projections.len(),
        projections.frame_shape(),
        settings.algorithm,
        settings.filter
    );
    let volume = reconstructor
        .reconstruct(projections, &request)
        .map_err(ReconError::ReconstructionFailure)?;
    Ok((volume, cor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorObservation;

    struct Echo;

    impl Reconstructor for Echo {
        fn reconstruct(&self, projections: &Volume, request: &ReconRequest<'_>) -> Result<Volume, String> {
            if request.angles.len() != projections.len() {
                return Err("angle count mismatch".to_string());
            }
            Ok(projections.swap_frames_and_rows())
        }
    }

    struct Broken;

    impl Reconstructor for Broken {
        fn reconstruct(&self, _: &Volume, _: &ReconRequest<'_>) -> Result<Volume, String> {
            Err("gpu on fire".to_string())
        }
    }

    #[test]
    fn angles_span_the_configured_range() {
        let a = projection_angles(4, 360.0);
        assert_eq!(a.len(), 4);
        assert_eq!(a[0], 0.0);
        assert!((a[1] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((a[3] - 270f64.to_radians()).abs() < 1e-12);
        assert!(projection_angles(0, 180.0).is_empty());
    }

    #[test]
    fn per_slice_cor_covers_every_projection_row() {
        let settings = ReconSettings {
            cor_mode: CorMode::Interpolate,
            cor_observations: vec![CorObservation::new(1, 3.0), CorObservation::new(3, 5.0)],
            ..ReconSettings::default()
        };
        let plan = CorPlan::resolve(&settings, (6, 8)).unwrap();
        let CorPlan::PerSlice(table) = &plan else {
            panic!("expected a table, got {plan:?}");
        };
        assert_eq!(table.as_slice(), &[3.0, 3.0, 4.0, 5.0, 5.0, 5.0]);
        assert_eq!(plan.input().for_slice(99), Some(5.0));
    }

    #[test]
    fn missing_observations_use_the_detector_centre() {
        let plan = CorPlan::resolve(&ReconSettings::default(), (6, 8)).unwrap();
        assert_eq!(plan, CorPlan::Single(4.0));
    }

    #[test]
    fn settings_are_checked_without_projections() {
        assert!(validate_settings(&ReconSettings::default()).is_ok());

        let single_regression = ReconSettings {
            cor_mode: CorMode::Regression,
            cor_observations: vec![CorObservation::new(4, 10.0)],
            ..ReconSettings::default()
        };
        assert!(matches!(
            validate_settings(&single_regression),
            Err(ReconError::InsufficientData(_))
        ));

        let interpolated = ReconSettings {
            cor_mode: CorMode::Interpolate,
            ..single_regression.clone()
        };
        assert!(validate_settings(&interpolated).is_ok());

        for max_angle_deg in [0.0, -180.0, f64::NAN] {
            let bad = ReconSettings {
                max_angle_deg,
                ..ReconSettings::default()
            };
            assert!(matches!(validate_settings(&bad), Err(ReconError::InvalidParameter { .. })));
        }

        let nan_cor = ReconSettings {
            cor_observations: vec![CorObservation::new(0, f64::NAN)],
            ..ReconSettings::default()
        };
        assert!(validate_settings(&nan_cor).is_err());
    }

    #[test]
    fn collaborator_failure_is_wrapped() {
        let v = Volume::allocate((3, 2, 2));
        let (out, _) = reconstruct(&Echo, &v, &ReconSettings::default()).unwrap();
        assert_eq!(out.shape(), (2, 3, 2));
        assert_eq!(
            reconstruct(&Broken, &v, &ReconSettings::default()).unwrap_err(),
            ReconError::ReconstructionFailure("gpu on fire".to_string())
        );
    }
}

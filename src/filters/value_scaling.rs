//! Value scaling.
//!
//! Normalization compresses intensities towards 1.0. The factor is the mean of
//! the region of interest before normalization; multiplying the normalized data
//! by it restores the original dynamic range while keeping the normalization's
//! frame-to-frame corrections.

use crate::domain::{Region, StageParams};
use crate::error::ReconError;
use crate::volume::Volume;

use super::frame::region_mean;
use super::{FilterStage, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[];

/// Mean over `roi` (or the whole frame) of every frame, single-threaded.
pub fn capture_factor(volume: &Volume, roi: Option<Region>) -> Result<f64, ReconError> {
    let (h, w) = volume.frame_shape();
    let region = roi.unwrap_or(Region::new(0, 0, w, h));
    region.validate(StageId::ValueScaling.key(), (h, w))?;

    if volume.is_empty() {
        return Ok(1.0);
    }
    let sum: f64 = volume
        .data()
        .outer_iter()
        .map(|frame| region_mean(frame, region.top..region.bottom, region.left..region.right))
        .sum();
    Ok(sum / volume.len() as f64)
}

pub struct ValueScaling;

impl FilterStage for ValueScaling {
    fn id(&self) -> StageId {
        StageId::ValueScaling
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn validate(&self, params: &StageParams) -> Result<(), ReconError> {
        ParamReader::new(self.id().key(), PARAMS, params).map(|_| ())
    }

    fn prepare<'a>(
        &self,
        params: &StageParams,
        _volume: &Volume,
        ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError> {
        self.validate(params)?;
        let Some(factor) = ctx.scale_factor else {
            return Ok(StagePlan::Skip(
                "no scale factor captured (needs flat/dark or an air region)".to_string(),
            ));
        };
        if !factor.is_finite() {
            return Err(ReconError::invalid_param(
                self.id().key(),
                format!("captured scale factor {factor} is not finite"),
            ));
        }
        Ok(per_frame(move |mut frame| {
            frame.mapv_inplace(|v| (v as f64 * factor) as f32);
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::KernelRegistry;
    use crate::filters::test_support::{ctx, run_plan};

    #[test]
    fn factor_is_the_roi_mean() {
        let mut v = Volume::filled((2, 4, 4), 1.0);
        v.data_mut()[[0, 0, 0]] = 5.0;
        // ROI covers (0,0) only in frame 0 → mean over frames (5 + 1) / 2
        let f = capture_factor(&v, Some(Region::new(0, 0, 1, 1))).unwrap();
        assert!((f - 3.0).abs() < 1e-12);
        assert!(capture_factor(&v, Some(Region::new(0, 0, 9, 1))).is_err());
    }

    #[test]
    fn applies_captured_factor() {
        let mut v = Volume::filled((3, 2, 2), 0.5);
        let kernels = KernelRegistry::new();
        let mut c = ctx(&kernels);
        c.scale_factor = Some(4.0);
        let plan = ValueScaling.prepare(&StageParams::new(), &v, &c).unwrap();
        let out = run_plan(plan, &mut v);
        assert!(out.data().iter().all(|x| *x == 2.0));
    }

    #[test]
    fn skips_without_factor() {
        let v = Volume::filled((1, 2, 2), 0.5);
        let kernels = KernelRegistry::new();
        let plan = ValueScaling.prepare(&StageParams::new(), &v, &ctx(&kernels)).unwrap();
        assert!(matches!(plan, StagePlan::Skip(_)));
    }
}

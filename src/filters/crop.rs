//! Crop every frame to the run's region of interest.

use ndarray::s;

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{FilterStage, ParamReader, ParamSpec, PerFrameReshape, StageContext, StageId, StagePlan};

const PARAMS: &[ParamSpec] = &[];

pub struct Crop;

impl FilterStage for Crop {
    fn id(&self) -> StageId {
        StageId::Crop
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
        volume: &Volume,
        ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError> {
        self.validate(params)?;
        let Some(roi) = ctx.region_of_interest else {
            return Ok(StagePlan::Skip("no region of interest".to_string()));
        };
        roi.validate(self.id().key(), volume.frame_shape())?;

        Ok(StagePlan::Reshape(Box::new(PerFrameReshape {
            shape: (roi.height(), roi.width()),
            f: move |src: ndarray::ArrayView2<'_, f32>, mut dst: ndarray::ArrayViewMut2<'_, f32>| {
                dst.assign(&src.slice(s![roi.top..roi.bottom, roi.left..roi.right]));
            },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Region;
    use crate::filters::KernelRegistry;
    use crate::filters::test_support::{ctx, run_plan};
    use crate::synthetic::random_volume;

    #[test]
    fn crops_to_roi() {
        let mut v = random_volume((3, 6, 8), 4);
        let kernels = KernelRegistry::new();
        let mut c = ctx(&kernels);
        c.region_of_interest = Some(Region::new(2, 1, 7, 4));
        let plan = Crop.prepare(&StageParams::new(), &v, &c).unwrap();
        let original = v.clone();
        let out = run_plan(plan, &mut v);
        assert_eq!(out.shape(), (3, 3, 5));
        assert_eq!(out.data()[[2, 0, 0]], original.data()[[2, 1, 2]]);
        assert_eq!(out.data()[[1, 2, 4]], original.data()[[1, 3, 6]]);
    }

    #[test]
    fn roi_outside_frame_is_invalid_region() {
        let v = Volume::allocate((1, 4, 4));
        let kernels = KernelRegistry::new();
        let mut c = ctx(&kernels);
        c.region_of_interest = Some(Region::new(0, 0, 4, 5));
        assert!(matches!(
            Crop.prepare(&StageParams::new(), &v, &c),
            Err(ReconError::InvalidRegion { .. })
        ));
    }
}

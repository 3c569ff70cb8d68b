//! Air-region normalization: divide each frame by the mean of a background window.

use crate::domain::{Region, StageParams};
use crate::error::ReconError;
use crate::volume::Volume;

use super::frame::region_mean;
use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("left", ParamKind::Int, DefaultValue::None, "first column of the air region"),
    ParamSpec::new("top", ParamKind::Int, DefaultValue::None, "first row of the air region"),
    ParamSpec::new("right", ParamKind::Int, DefaultValue::None, "column bound (exclusive)"),
    ParamSpec::new("bottom", ParamKind::Int, DefaultValue::None, "row bound (exclusive)"),
];

/// `None` when no region is configured (stage is a no-op).
fn parse(params: &StageParams) -> Result<Option<Region>, ReconError> {
    let r = ParamReader::new(StageId::NormalizeAirRegion.key(), PARAMS, params)?;
    let coords: Vec<Option<i64>> = ["left", "top", "right", "bottom"].iter().map(|n| r.int(n)).collect();

    if coords.iter().all(Option::is_none) {
        return Ok(None);
    }
    let mut values = [0usize; 4];
    for (slot, (name, v)) in values.iter_mut().zip(["left", "top", "right", "bottom"].iter().zip(&coords)) {
        match v {
            None => return Err(r.invalid(format!("'{name}' is required once any region bound is set"))),
            Some(v) if *v < 0 => return Err(r.invalid(format!("'{name}' must be >= 0, got {v}"))),
            Some(v) => *slot = *v as usize,
        }
    }
    let [left, top, right, bottom] = values;
    Ok(Some(Region::new(left, top, right, bottom)))
}

/// Scale the region of `frame` to a mean of one; frames whose region mean is
/// zero or not finite are left as they are.
fn normalize_frame(mut frame: ndarray::ArrayViewMut2<'_, f32>, region: Region) {
    let mean = region_mean(frame.view(), region.top..region.bottom, region.left..region.right);
    if mean == 0.0 || !mean.is_finite() {
        log::warn!("air region {region} has mean {mean}, frame left unnormalized");
        return;
    }
    frame.mapv_inplace(|v| (v as f64 / mean) as f32);
}

pub struct NormalizeAirRegion;

impl FilterStage for NormalizeAirRegion {
    fn id(&self) -> StageId {
        StageId::NormalizeAirRegion
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn validate(&self, params: &StageParams) -> Result<(), ReconError> {
        if let Some(region) = parse(params)? {
            if region.right <= region.left || region.bottom <= region.top {
                return Err(ReconError::invalid_region(self.id().key(), format!("region {region} is empty")));
            }
        }
        Ok(())
    }

    fn prepare<'a>(
        &self,
        params: &StageParams,
        volume: &Volume,
        _ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError> {
        let Some(region) = parse(params)? else {
            return Ok(StagePlan::Skip("no air region configured".to_string()));
        };
        region.validate(self.id().key(), volume.frame_shape())?;
        Ok(per_frame(move |frame| {
            normalize_frame(frame, region);
            Ok(())
        }))
    }
}

//! Clamp reconstructed values into caller-chosen bounds.

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("min", ParamKind::Float, DefaultValue::None, "lower bound; unset leaves it open"),
    ParamSpec::new("max", ParamKind::Float, DefaultValue::None, "upper bound; unset leaves it open"),
];

fn parse(params: &StageParams) -> Result<(Option<f32>, Option<f32>), ReconError> {
    let r = ParamReader::new(StageId::Clip.key(), PARAMS, params)?;
    let lo = r.finite("min")?;
    let hi = r.finite("max")?;
    if let (Some(lo), Some(hi)) = (lo, hi) {
        if lo > hi {
            return Err(r.invalid(format!("'min' {lo} is greater than 'max' {hi}")));
        }
    }
    Ok((lo.map(|v| v as f32), hi.map(|v| v as f32)))
}

pub struct Clip;

impl FilterStage for Clip {
    fn id(&self) -> StageId {
        StageId::Clip
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn validate(&self, params: &StageParams) -> Result<(), ReconError> {
        parse(params).map(|_| ())
    }

    fn prepare<'a>(
        &self,
        params: &StageParams,
        _volume: &Volume,
        _ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError> {
        let (lo, hi) = parse(params)?;
        if lo.is_none() && hi.is_none() {
            return Ok(StagePlan::Skip("no bounds given".to_string()));
        }
        let lo = lo.unwrap_or(f32::NEG_INFINITY);
        let hi = hi.unwrap_or(f32::INFINITY);
        Ok(per_frame(move |mut frame| {
            frame.mapv_inplace(|v| v.clamp(lo, hi));
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamValue;
    use crate::filters::KernelRegistry;
    use crate::filters::test_support::{ctx, params, run_plan};

    #[test]
    fn clamps_to_bounds() {
        let mut v = Volume::from_array(ndarray::array![[[-1.0f32, 0.5, 9.0]]]);
        let kernels = KernelRegistry::new();
        let raw = params(&[("min", ParamValue::Float(1e-9)), ("max", ParamValue::Int(5))]);
        let out = run_plan(Clip.prepare(&raw, &v, &ctx(&kernels)).unwrap(), &mut v);
        assert_eq!(out.into_array(), ndarray::array![[[1e-9f32, 0.5, 5.0]]]);
    }

    #[test]
    fn open_bounds_skip_and_inverted_bounds_fail() {
        let v = Volume::allocate((1, 1, 1));
        let kernels = KernelRegistry::new();
        assert!(matches!(
            Clip.prepare(&StageParams::new(), &v, &ctx(&kernels)).unwrap(),
            StagePlan::Skip(_)
        ));
        let raw = params(&[("min", ParamValue::Float(2.0)), ("max", ParamValue::Float(1.0))]);
        assert!(matches!(Clip.validate(&raw), Err(ReconError::InvalidParameter { .. })));
    }
}

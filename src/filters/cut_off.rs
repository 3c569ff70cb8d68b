//! Clamp intensities above a fraction of the volume's global maximum.
//!
//! The maximum is read once, on the calling thread, before any chunk runs.

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[ParamSpec::new(
    "threshold",
    ParamKind::Float,
    DefaultValue::None,
    "fraction of the global maximum in (0, 1]; unset disables the stage",
)];

fn parse(params: &StageParams) -> Result<Option<f64>, ReconError> {
    let r = ParamReader::new(StageId::CutOff.key(), PARAMS, params)?;
    match r.finite("threshold")? {
        Some(t) if t <= 0.0 || t > 1.0 => Err(r.invalid(format!("'threshold' must be in (0, 1], got {t}"))),
        other => Ok(other),
    }
}

pub struct CutOff;

impl FilterStage for CutOff {
    fn id(&self) -> StageId {
        StageId::CutOff
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
        volume: &Volume,
        _ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError> {
        let Some(threshold) = parse(params)? else {
            return Ok(StagePlan::Skip("threshold is none".to_string()));
        };
        let Some(max) = volume.max() else {
            return Ok(StagePlan::Skip("volume is empty".to_string()));
        };
        let limit = (max as f64 * threshold) as f32;
        log::debug!("{}: clamping above {limit} (max {max} x {threshold})", self.id());
        Ok(per_frame(move |mut frame| {
            frame.mapv_inplace(|v| if v > limit { limit } else { v });
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
    fn clamps_relative_to_global_max() {
        let mut v = Volume::filled((3, 2, 2), 1.0);
        v.data_mut()[[2, 1, 1]] = 10.0;
        v.data_mut()[[0, 0, 0]] = 6.0;
        let kernels = KernelRegistry::new();
        let raw = params(&[("threshold", ParamValue::Float(0.5))]);
        let out = run_plan(CutOff.prepare(&raw, &v, &ctx(&kernels)).unwrap(), &mut v);
        assert_eq!(out.data()[[2, 1, 1]], 5.0);
        assert_eq!(out.data()[[0, 0, 0]], 5.0);
        assert_eq!(out.data()[[1, 0, 0]], 1.0);
    }

    #[test]
    fn threshold_must_be_a_fraction() {
        assert!(CutOff.validate(&params(&[("threshold", ParamValue::Float(1.5))])).is_err());
        assert!(CutOff.validate(&params(&[("threshold", ParamValue::Float(0.0))])).is_err());
        assert!(CutOff.validate(&params(&[("threshold", ParamValue::Int(1))])).is_ok());
    }
}

//! `-ln(x)` transmission to attenuation. Must stay the last pre-processing stage.

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[ParamSpec::new(
    "min_value",
    ParamKind::Float,
    DefaultValue::Float(1e-6),
    "inputs below this are raised to it before the logarithm, > 0",
)];

fn parse(params: &StageParams) -> Result<f32, ReconError> {
    let r = ParamReader::new(StageId::MinusLog.key(), PARAMS, params)?;
    let min = r.finite("min_value")?.unwrap_or(1e-6);
    if min <= 0.0 {
        return Err(r.invalid(format!("'min_value' must be > 0, got {min}")));
    }
    Ok(min as f32)
}

pub struct MinusLog;

impl FilterStage for MinusLog {
    fn id(&self) -> StageId {
        StageId::MinusLog
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
        let min = parse(params)?;
        Ok(per_frame(move |mut frame| {
            frame.mapv_inplace(|v| -(v.max(min)).ln());
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
    fn log_of_transmission() {
        let mut v = Volume::filled((1, 1, 3), 1.0);
        v.data_mut()[[0, 0, 1]] = std::f32::consts::E.recip();
        v.data_mut()[[0, 0, 2]] = -4.0;
        let kernels = KernelRegistry::new();
        let out = run_plan(MinusLog.prepare(&StageParams::new(), &v, &ctx(&kernels)).unwrap(), &mut v);
        assert_eq!(out.data()[[0, 0, 0]], 0.0);
        assert!((out.data()[[0, 0, 1]] - 1.0).abs() < 1e-6);
        assert!(out.data()[[0, 0, 2]].is_finite());
    }
}

//! Outlier removal: pixels far from their local median are replaced by it.

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::frame::{BorderMode, check_radius, median_filter};
use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new(
        "threshold",
        ParamKind::Float,
        DefaultValue::None,
        "absolute difference from the median above which a pixel is replaced; unset disables the stage",
    ),
    ParamSpec::new("radius", ParamKind::Int, DefaultValue::Int(3), "median window size, odd and >= 3"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    threshold: f32,
    size: usize,
}

fn parse(params: &StageParams) -> Result<Option<Settings>, ReconError> {
    let r = ParamReader::new(StageId::Outliers.key(), PARAMS, params)?;
    let size = r.odd_size("radius", 3)?.unwrap_or(3);
    let Some(threshold) = r.finite("threshold")? else {
        return Ok(None);
    };
    if threshold < 0.0 {
        return Err(r.invalid(format!("'threshold' must be >= 0, got {threshold}")));
    }
    Ok(Some(Settings {
        threshold: threshold as f32,
        size,
    }))
}

pub struct Outliers;

impl FilterStage for Outliers {
    fn id(&self) -> StageId {
        StageId::Outliers
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
        let Some(settings) = parse(params)? else {
            return Ok(StagePlan::Skip("threshold is none".to_string()));
        };
        check_radius(settings.size / 2, volume.frame_shape())
            .map_err(|e| ReconError::invalid_param(self.id().key(), e))?;
        Ok(per_frame(move |mut frame| {
            let median = median_filter(frame.view(), settings.size, BorderMode::Reflect);
            ndarray::Zip::from(&mut frame).and(&median).for_each(|v, &m| {
                if (*v - m).abs() > settings.threshold {
                    *v = m;
                }
            });
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
    fn spikes_above_threshold_are_replaced() {
        let mut v = Volume::filled((2, 5, 5), 1.0);
        v.data_mut()[[0, 2, 2]] = 50.0;
        v.data_mut()[[1, 1, 1]] = 1.5;
        let kernels = KernelRegistry::new();
        let raw = params(&[("threshold", ParamValue::Float(1.0))]);
        let plan = Outliers.prepare(&raw, &v, &ctx(&kernels)).unwrap();
        let out = run_plan(plan, &mut v);
        assert_eq!(out.data()[[0, 2, 2]], 1.0);
        assert_eq!(out.data()[[1, 1, 1]], 1.5);
    }

    #[test]
    fn unset_threshold_is_a_skip() {
        let v = Volume::filled((1, 3, 3), 1.0);
        let kernels = KernelRegistry::new();
        let plan = Outliers.prepare(&StageParams::new(), &v, &ctx(&kernels)).unwrap();
        assert!(matches!(plan, StagePlan::Skip(_)));
    }

    #[test]
    fn even_radius_is_rejected() {
        let raw = params(&[("threshold", ParamValue::Float(1.0)), ("radius", ParamValue::Int(4))]);
        assert!(matches!(Outliers.validate(&raw), Err(ReconError::InvalidParameter { .. })));
    }

    #[test]
    fn huge_radius_is_rejected_before_allocating() {
        let raw = params(&[("threshold", ParamValue::Float(1.0)), ("radius", ParamValue::Int(i64::MAX))]);
        assert!(matches!(Outliers.validate(&raw), Err(ReconError::InvalidParameter { .. })));
    }
}

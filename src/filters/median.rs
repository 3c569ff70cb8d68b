use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::frame::{BorderMode, check_radius, median_filter};
use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new(
        "size",
        ParamKind::Int,
        DefaultValue::None,
        "window size, odd and >= 3; unset disables the stage",
    ),
    ParamSpec::new(
        "mode",
        ParamKind::Text,
        DefaultValue::Text("reflect"),
        "border handling: reflect, mirror, nearest, wrap or constant",
    ),
];

pub(crate) fn border_mode(r: &ParamReader<'_>) -> Result<BorderMode, ReconError> {
    r.text("mode")
        .unwrap_or_else(|| "reflect".to_string())
        .parse::<BorderMode>()
        .map_err(|e| r.invalid(e))
}

fn parse(params: &StageParams) -> Result<Option<(usize, BorderMode)>, ReconError> {
    let r = ParamReader::new(StageId::Median.key(), PARAMS, params)?;
    let mode = border_mode(&r)?;
    Ok(r.odd_size("size", 3)?.map(|size| (size, mode)))
}

pub struct Median;

impl FilterStage for Median {
    fn id(&self) -> StageId {
        StageId::Median
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
        let Some((size, mode)) = parse(params)? else {
            return Ok(StagePlan::Skip("size is none".to_string()));
        };
        check_radius(size / 2, volume.frame_shape()).map_err(|e| ReconError::invalid_param(self.id().key(), e))?;
        Ok(per_frame(move |mut frame| {
            let filtered = median_filter(frame.view(), size, mode);
            frame.assign(&filtered);
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamValue;
    use crate::filters::KernelRegistry;
    use crate::filters::test_support::{ctx, params};

    #[test]
    fn negative_and_even_sizes_are_invalid() {
        for size in [-3, 0, 2, 1, 1_000_001] {
            let raw = params(&[("size", ParamValue::Int(size))]);
            assert!(
                matches!(Median.validate(&raw), Err(ReconError::InvalidParameter { .. })),
                "size={size}"
            );
        }
        assert!(Median.validate(&params(&[("size", ParamValue::Int(5))])).is_ok());
    }

    #[test]
    fn window_wider_than_the_frame_is_invalid() {
        let v = Volume::allocate((2, 3, 3));
        let kernels = KernelRegistry::new();
        let ok = params(&[("size", ParamValue::Int(7))]);
        assert!(Median.prepare(&ok, &v, &ctx(&kernels)).is_ok());
        let wide = params(&[("size", ParamValue::Int(9))]);
        let err = Median.prepare(&wide, &v, &ctx(&kernels)).unwrap_err();
        assert!(matches!(err, ReconError::InvalidParameter { .. }));
    }

    #[test]
    fn unknown_mode_is_invalid() {
        let raw = params(&[("size", ParamValue::Int(3)), ("mode", ParamValue::Text("clamp".into()))]);
        assert!(Median.validate(&raw).is_err());
    }
}

//! Flat/dark normalization: `(sample - dark) / (flat - dark)`.

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new(
        "floor",
        ParamKind::Float,
        DefaultValue::Float(0.0),
        "value written where flat - dark is zero or the quotient is not finite",
    ),
    ParamSpec::new("clip_min", ParamKind::Float, DefaultValue::None, "lower bound of the output"),
    ParamSpec::new("clip_max", ParamKind::Float, DefaultValue::None, "upper bound of the output"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    floor: f32,
    clip_min: Option<f32>,
    clip_max: Option<f32>,
}

impl Settings {
    fn normalize(&self, sample: f32, flat: f32, dark: f32) -> f32 {
        let denom = flat - dark;
        let v = if denom == 0.0 {
            self.floor
        } else {
            let q = (sample - dark) / denom;
            if q.is_finite() { q } else { self.floor }
        };
        let v = self.clip_min.map_or(v, |lo| v.max(lo));
        self.clip_max.map_or(v, |hi| v.min(hi))
    }
}

fn parse(params: &StageParams) -> Result<Settings, ReconError> {
    let r = ParamReader::new(StageId::NormalizeFlatDark.key(), PARAMS, params)?;
    let floor = r.finite("floor")?.unwrap_or(0.0) as f32;
    let clip_min = r.finite("clip_min")?.map(|v| v as f32);
    let clip_max = r.finite("clip_max")?.map(|v| v as f32);
    if let (Some(lo), Some(hi)) = (clip_min, clip_max) {
        if lo > hi {
            return Err(r.invalid(format!("clip_min {lo} is greater than clip_max {hi}")));
        }
    }
    Ok(Settings {
        floor,
        clip_min,
        clip_max,
    })
}

pub struct NormalizeFlatDark;

impl FilterStage for NormalizeFlatDark {
    fn id(&self) -> StageId {
        StageId::NormalizeFlatDark
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn requires_flat_dark(&self) -> bool {
        true
    }

    fn validate(&self, params: &StageParams) -> Result<(), ReconError> {
        parse(params).map(|_| ())
    }

    fn prepare<'a>(
        &self,
        params: &StageParams,
        volume: &Volume,
        ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError> {
        let settings = parse(params)?;
        let Some(refs) = ctx.references else {
            return Ok(StagePlan::Skip("no flat/dark references".to_string()));
        };

        let frame = volume.frame_shape();
        for (name, r) in [("flat", &refs.flat), ("dark", &refs.dark)] {
            if r.dim() != frame {
                return Err(ReconError::DimensionMismatch(format!(
                    "{name} reference {:?} != sample frame {:?}",
                    r.dim(),
                    frame
                )));
            }
        }

        Ok(per_frame(move |mut f| {
            ndarray::Zip::from(&mut f)
                .and(&refs.flat)
                .and(&refs.dark)
                .for_each(|s, &fl, &dk| *s = settings.normalize(*s, fl, dk));
            Ok(())
        }))
    }
}

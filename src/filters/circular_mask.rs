//! Replace everything outside a centred circle of each slice with a constant.

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new(
        "ratio",
        ParamKind::Float,
        DefaultValue::Float(0.95),
        "circle diameter relative to the smaller slice edge, in (0, 1]",
    ),
    ParamSpec::new("value", ParamKind::Float, DefaultValue::Float(0.0), "value written outside the circle"),
];

fn parse(params: &StageParams) -> Result<(f64, f32), ReconError> {
    let r = ParamReader::new(StageId::CircularMask.key(), PARAMS, params)?;
    let ratio = r.finite("ratio")?.unwrap_or(0.95);
    if ratio <= 0.0 || ratio > 1.0 {
        return Err(r.invalid(format!("'ratio' must be in (0, 1], got {ratio}")));
    }
    let value = r.finite("value")?.unwrap_or(0.0) as f32;
    Ok((ratio, value))
}

pub struct CircularMask;

impl FilterStage for CircularMask {
    fn id(&self) -> StageId {
        StageId::CircularMask
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
        let (ratio, value) = parse(params)?;
        let (h, w) = volume.frame_shape();
        let cy = (h as f64 - 1.0) / 2.0;
        let cx = (w as f64 - 1.0) / 2.0;
        let radius = ratio * h.min(w) as f64 / 2.0;
        let r2 = radius * radius;

        Ok(per_frame(move |mut frame| {
            for ((r, c), v) in frame.indexed_iter_mut() {
                let dy = r as f64 - cy;
                let dx = c as f64 - cx;
                if dy * dy + dx * dx > r2 {
                    *v = value;
                }
            }
            Ok(())
        }))
    }
}

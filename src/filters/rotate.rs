//! Rotate every frame by a whole number of clockwise quarter turns.

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, PerFrameReshape, StageContext, StageId, StagePlan};

const PARAMS: &[ParamSpec] = &[ParamSpec::new(
    "rotation",
    ParamKind::Int,
    DefaultValue::Int(0),
    "clockwise quarter turns; negative values turn counter-clockwise",
)];

fn parse(params: &StageParams) -> Result<u8, ReconError> {
    let r = ParamReader::new(StageId::Rotate.key(), PARAMS, params)?;
    Ok(r.int("rotation").unwrap_or(0).rem_euclid(4) as u8)
}

/// Source index for output `(r, c)` of a frame `(h, w)` turned `turns` times clockwise.
fn source(turns: u8, (h, w): (usize, usize), r: usize, c: usize) -> (usize, usize) {
    match turns {
        1 => (h - 1 - c, r),
        2 => (h - 1 - r, w - 1 - c),
        3 => (c, w - 1 - r),
        _ => (r, c),
    }
}

pub struct Rotate;

impl FilterStage for Rotate {
    fn id(&self) -> StageId {
        StageId::Rotate
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
        let turns = parse(params)?;
        if turns == 0 {
            return Ok(StagePlan::Skip("rotation is a multiple of 360 degrees".to_string()));
        }
        let (h, w) = volume.frame_shape();
        let shape = if turns % 2 == 1 { (w, h) } else { (h, w) };

        Ok(StagePlan::Reshape(Box::new(PerFrameReshape {
            shape,
            f: move |src: ndarray::ArrayView2<'_, f32>, mut dst: ndarray::ArrayViewMut2<'_, f32>| {
                for ((r, c), v) in dst.indexed_iter_mut() {
                    let (sr, sc) = source(turns, (h, w), r, c);
                    *v = src[[sr, sc]];
                }
            },
        })))
    }
}

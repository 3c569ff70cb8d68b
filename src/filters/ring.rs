//! Ring artifact removal on reconstructed slices (external kernel).

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, external};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("center_x", ParamKind::Float, DefaultValue::None, "ring centre column; unset uses the slice centre"),
    ParamSpec::new("center_y", ParamKind::Float, DefaultValue::None, "ring centre row; unset uses the slice centre"),
    ParamSpec::new("thresh", ParamKind::Float, DefaultValue::Float(300.0), "maximum value of an offset due to a ring artifact"),
    ParamSpec::new("thresh_max", ParamKind::Float, DefaultValue::Float(300.0), "upper clip before filtering"),
    ParamSpec::new("thresh_min", ParamKind::Float, DefaultValue::Float(-100.0), "lower clip before filtering"),
    ParamSpec::new("theta_min", ParamKind::Int, DefaultValue::Int(30), "features above this angle (degrees) are kept"),
    ParamSpec::new("rwidth", ParamKind::Int, DefaultValue::Int(30), "maximum ring width in pixels"),
];

fn parse(params: &StageParams) -> Result<StageParams, ReconError> {
    let r = ParamReader::new(StageId::RingRemoval.key(), PARAMS, params)?;
    for name in ["center_x", "center_y", "thresh"] {
        r.finite(name)?;
    }
    let lo = r.finite("thresh_min")?.unwrap_or(-100.0);
    let hi = r.finite("thresh_max")?.unwrap_or(300.0);
    if lo > hi {
        return Err(r.invalid(format!("'thresh_min' {lo} is greater than 'thresh_max' {hi}")));
    }
    let theta = r.int("theta_min").unwrap_or(30);
    if !(0..180).contains(&theta) {
        return Err(r.invalid(format!("'theta_min' must be in [0, 180), got {theta}")));
    }
    let rwidth = r.int("rwidth").unwrap_or(30);
    if rwidth < 1 {
        return Err(r.invalid(format!("'rwidth' must be >= 1, got {rwidth}")));
    }
    Ok(r.resolved())
}

pub struct RingRemoval;

impl FilterStage for RingRemoval {
    fn id(&self) -> StageId {
        StageId::RingRemoval
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn external_kernel(&self) -> bool {
        true
    }

    fn validate(&self, params: &StageParams) -> Result<(), ReconError> {
        parse(params).map(|_| ())
    }

    fn prepare<'a>(
        &self,
        params: &StageParams,
        _volume: &Volume,
        ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError> {
        let resolved = parse(params)?;
        external::plan(self.id(), ctx.kernels, resolved, false)
    }
}

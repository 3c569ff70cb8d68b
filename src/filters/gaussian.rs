use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::frame::{MAX_KERNEL_RADIUS, check_radius, gaussian_filter, gaussian_weights};
use super::median::border_mode;
use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, per_frame};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new(
        "size",
        ParamKind::Float,
        DefaultValue::None,
        "standard deviation of the kernel, > 0; unset disables the stage",
    ),
    ParamSpec::new(
        "mode",
        ParamKind::Text,
        DefaultValue::Text("reflect"),
        "border handling: reflect, mirror, nearest, wrap or constant",
    ),
    ParamSpec::new("truncate", ParamKind::Float, DefaultValue::Float(4.0), "kernel radius in standard deviations"),
];

pub struct Gaussian;

fn parse(params: &StageParams) -> Result<Option<(Vec<f64>, super::frame::BorderMode)>, ReconError> {
    let r = ParamReader::new(StageId::Gaussian.key(), PARAMS, params)?;
    let mode = border_mode(&r)?;
    let truncate = r.finite("truncate")?.unwrap_or(4.0);
    if truncate <= 0.0 {
        return Err(r.invalid(format!("'truncate' must be > 0, got {truncate}")));
    }
    let Some(sigma) = r.finite("size")? else {
        return Ok(None);
    };
    if sigma <= 0.0 {
        return Err(r.invalid(format!("'size' must be > 0, got {sigma}")));
    }
    let radius = truncate * sigma + 0.5;
    if !radius.is_finite() || radius > MAX_KERNEL_RADIUS as f64 {
        return Err(r.invalid(format!(
            "kernel radius truncate * size = {:.1} exceeds {MAX_KERNEL_RADIUS}",
            truncate * sigma
        )));
    }
    Ok(Some((gaussian_weights(sigma, truncate), mode)))
}

impl FilterStage for Gaussian {
    fn id(&self) -> StageId {
        StageId::Gaussian
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
        let Some((weights, mode)) = parse(params)? else {
            return Ok(StagePlan::Skip("size is none".to_string()));
        };
        check_radius(weights.len() / 2, volume.frame_shape())
            .map_err(|e| ReconError::invalid_param(self.id().key(), e))?;
        Ok(per_frame(move |mut frame| {
            let smoothed = gaussian_filter(frame.view(), &weights, mode);
            frame.assign(&smoothed);
            Ok(())
        }))
    }
}

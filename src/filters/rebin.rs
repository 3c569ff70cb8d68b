//! Spatial downsampling by an integer factor.
//!
//! Output pixel `(r, c)` reduces the `factor × factor` block starting at
//! `(r * factor, c * factor)`. When the frame size is not a multiple of the
//! factor, `remainder = error` (the default) refuses to run and
//! `remainder = truncate` drops the trailing rows/columns.

use std::str::FromStr;

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, PerFrameReshape, StageContext, StageId, StagePlan};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("factor", ParamKind::Int, DefaultValue::Int(1), "block edge length, >= 1"),
    ParamSpec::new("mode", ParamKind::Text, DefaultValue::Text("mean"), "block reduction: mean or sum"),
    ParamSpec::new(
        "remainder",
        ParamKind::Text,
        DefaultValue::Text("error"),
        "frame sizes not divisible by factor: error or truncate",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    Mean,
    Sum,
}

impl FromStr for Reduction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Reduction::Mean),
            "sum" => Ok(Reduction::Sum),
            other => Err(format!("unknown mode '{other}' (expected mean or sum)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settings {
    factor: usize,
    mode: Reduction,
    truncate: bool,
}

fn parse(params: &StageParams) -> Result<Settings, ReconError> {
    let r = ParamReader::new(StageId::Rebin.key(), PARAMS, params)?;
    let factor = r.int("factor").unwrap_or(1);
    if factor < 1 {
        return Err(r.invalid(format!("'factor' must be >= 1, got {factor}")));
    }
    let mode = r
        .text("mode")
        .unwrap_or_else(|| "mean".to_string())
        .parse::<Reduction>()
        .map_err(|e| r.invalid(e))?;
    let truncate = match r.text("remainder").as_deref().unwrap_or("error") {
        "error" => false,
        "truncate" => true,
        other => {
            return Err(r.invalid(format!(
                "unknown remainder policy '{other}' (expected error or truncate)"
            )));
        }
    };
    Ok(Settings {
        factor: factor as usize,
        mode,
        truncate,
    })
}

pub struct Rebin;

impl FilterStage for Rebin {
    fn id(&self) -> StageId {
        StageId::Rebin
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
        let settings = parse(params)?;
        let k = settings.factor;
        if k == 1 {
            return Ok(StagePlan::Skip("factor is 1".to_string()));
        }

        let (h, w) = volume.frame_shape();
        if (h % k != 0 || w % k != 0) && !settings.truncate {
            return Err(ReconError::invalid_param(
                self.id().key(),
                format!("frame {h}x{w} is not divisible by factor {k}; set remainder = truncate to drop the edge"),
            ));
        }
        let (oh, ow) = (h / k, w / k);
        if oh == 0 || ow == 0 {
            return Err(ReconError::invalid_param(
                self.id().key(),
                format!("factor {k} is larger than frame {h}x{w}"),
            ));
        }

        let scale = match settings.mode {
            Reduction::Mean => 1.0 / (k * k) as f64,
            Reduction::Sum => 1.0,
        };
        Ok(StagePlan::Reshape(Box::new(PerFrameReshape {
            shape: (oh, ow),
            f: move |src: ndarray::ArrayView2<'_, f32>, mut dst: ndarray::ArrayViewMut2<'_, f32>| {
                for ((r, c), v) in dst.indexed_iter_mut() {
                    let block = src.slice(ndarray::s![r * k..(r + 1) * k, c * k..(c + 1) * k]);
                    let sum: f64 = block.iter().map(|x| *x as f64).sum();
                    *v = (sum * scale) as f32;
                }
            },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamValue;
    use crate::filters::KernelRegistry;
    use crate::filters::test_support::{ctx, params, run_plan};
    use ndarray::array;

    fn frame() -> Volume {
        Volume::from_array(array![[
            [1.0f32, 2.0, 3.0, 4.0, 9.0],
            [5.0, 6.0, 7.0, 8.0, 9.0],
            [9.0, 9.0, 9.0, 9.0, 9.0]
        ]])
    }

    #[test]
    fn mean_and_sum_with_truncation() {
        let kernels = KernelRegistry::new();
        let mut v = frame();
        let raw = params(&[("factor", ParamValue::Int(2)), ("remainder", ParamValue::Text("truncate".into()))]);
        let out = run_plan(Rebin.prepare(&raw, &v, &ctx(&kernels)).unwrap(), &mut v);
        assert_eq!(out.into_array(), array![[[3.5f32, 5.5]]]);

        let mut v = frame();
        let raw = params(&[
            ("factor", ParamValue::Int(2)),
            ("mode", ParamValue::Text("sum".into())),
            ("remainder", ParamValue::Text("truncate".into())),
        ]);
        let out = run_plan(Rebin.prepare(&raw, &v, &ctx(&kernels)).unwrap(), &mut v);
        assert_eq!(out.into_array(), array![[[14.0f32, 22.0]]]);
    }

    #[test]
    fn uneven_frames_fail_by_default() {
        let kernels = KernelRegistry::new();
        let v = frame();
        let raw = params(&[("factor", ParamValue::Int(2))]);
        assert!(matches!(
            Rebin.prepare(&raw, &v, &ctx(&kernels)),
            Err(ReconError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn bad_factor_and_mode_are_rejected() {
        assert!(Rebin.validate(&params(&[("factor", ParamValue::Int(0))])).is_err());
        assert!(Rebin.validate(&params(&[("mode", ParamValue::Text("max".into()))])).is_err());
        assert!(Rebin.validate(&params(&[("remainder", ParamValue::Text("pad".into()))])).is_err());
    }
}

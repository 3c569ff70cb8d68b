//! Stripe removal on sinograms.
//!
//! Three methods are recognised, each with its own parameters:
//!
//! | method | aliases            | parameters                      |
//! |--------|--------------------|---------------------------------|
//! | `wf`   | `wavelet-fourier`  | `level`, `wname`, `sigma`, `pad` |
//! | `ti`   | `titarenko`        | `nblock`, `alpha`               |
//! | `sf`   | `smoothing-filter` | `size`                          |
//!
//! The kernel itself is external; it receives sinogram chunks
//! `(rows, angles, cols)` and the resolved parameters, with `method` reduced to
//! its short name.

use crate::domain::{ParamValue, StageParams};
use crate::error::ReconError;
use crate::volume::Volume;

use super::{DefaultValue, FilterStage, ParamKind, ParamReader, ParamSpec, StageContext, StageId, StagePlan, external};

const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("method", ParamKind::Text, DefaultValue::None, "wf, ti or sf; unset disables the stage"),
    ParamSpec::new("level", ParamKind::Int, DefaultValue::None, "wf: wavelet decomposition levels"),
    ParamSpec::new("wname", ParamKind::Text, DefaultValue::Text("db5"), "wf: wavelet filter name"),
    ParamSpec::new("sigma", ParamKind::Float, DefaultValue::Float(2.0), "wf: damping in Fourier space"),
    ParamSpec::new("pad", ParamKind::Bool, DefaultValue::Bool(true), "wf: zero-pad the sinogram"),
    ParamSpec::new("nblock", ParamKind::Int, DefaultValue::Int(0), "ti: number of blocks"),
    ParamSpec::new("alpha", ParamKind::Float, DefaultValue::Float(1.5), "ti: damping factor"),
    ParamSpec::new("size", ParamKind::Int, DefaultValue::Int(5), "sf: smoothing filter size"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    WaveletFourier,
    Titarenko,
    SmoothingFilter,
}

impl Method {
    fn parse(s: &str) -> Option<Method> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wf" | "wavelet-fourier" => Some(Method::WaveletFourier),
            "ti" | "titarenko" => Some(Method::Titarenko),
            "sf" | "smoothing-filter" => Some(Method::SmoothingFilter),
            _ => None,
        }
    }

    fn short(self) -> &'static str {
        match self {
            Method::WaveletFourier => "wf",
            Method::Titarenko => "ti",
            Method::SmoothingFilter => "sf",
        }
    }
}

/// Resolved kernel parameters, or `None` when no method is selected.
fn parse(params: &StageParams) -> Result<Option<StageParams>, ReconError> {
    let r = ParamReader::new(StageId::StripeRemoval.key(), PARAMS, params)?;
    let Some(name) = r.text("method") else {
        return Ok(None);
    };
    let method = Method::parse(&name).ok_or_else(|| {
        r.invalid(format!(
            "unknown method '{name}' (expected wf, wavelet-fourier, ti, titarenko, sf or smoothing-filter)"
        ))
    })?;

    match method {
        Method::WaveletFourier => {
            if let Some(level) = r.int("level") {
                if level < 1 {
                    return Err(r.invalid(format!("'level' must be >= 1, got {level}")));
                }
            }
            if let Some(sigma) = r.finite("sigma")? {
                if sigma <= 0.0 {
                    return Err(r.invalid(format!("'sigma' must be > 0, got {sigma}")));
                }
            }
        }
        Method::Titarenko => {
            if let Some(nblock) = r.int("nblock") {
                if nblock < 0 {
                    return Err(r.invalid(format!("'nblock' must be >= 0, got {nblock}")));
                }
            }
            if let Some(alpha) = r.finite("alpha")? {
                if alpha <= 0.0 {
                    return Err(r.invalid(format!("'alpha' must be > 0, got {alpha}")));
                }
            }
        }
        Method::SmoothingFilter => {
            if let Some(size) = r.int("size") {
                if size < 1 {
                    return Err(r.invalid(format!("'size' must be >= 1, got {size}")));
                }
            }
        }
    }

    let mut resolved = r.resolved();
    resolved.insert("method".to_string(), ParamValue::Text(method.short().to_string()));
    Ok(Some(resolved))
}

pub struct StripeRemoval;

impl FilterStage for StripeRemoval {
    fn id(&self) -> StageId {
        StageId::StripeRemoval
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
        let Some(resolved) = parse(params)? else {
            return Ok(StagePlan::Skip("no stripe removal method selected".to_string()));
        };
        external::plan(self.id(), ctx.kernels, resolved, true)
    }
}

//! Workflows shared by the CLI handlers: gathering COR observations and the
//! synthetic determinism check.

use std::sync::Arc;

use chrono::Local;

use crate::cli::ObservationArgs;
use crate::cor::CorObservations;
use crate::domain::{AutoOr, ExecutionParams, ParamValue, Phase, PipelineConfig, Region, RunFlags, StageSettings};
use crate::error::{AppError, ReconError};
use crate::exec::NoProgress;
use crate::io::{Loader, read_cor_json, read_observations_csv};
use crate::pipeline::Pipeline;
use crate::report::RunReport;
use crate::synthetic::PhantomSpec;
use crate::volume::Volume;

/// Merge observations from JSON, then CSV, then `--obs` (later wins per slice).
pub fn gather_observations(args: &ObservationArgs) -> Result<CorObservations, AppError> {
    let mut observations = CorObservations::default();
    if let Some(path) = &args.obs_json {
        for obs in read_cor_json(path)?.observations.iter() {
            observations.set(obs.slice_index, obs.cor);
        }
    }
    if let Some(path) = &args.obs_csv {
        for obs in read_observations_csv(path)?.iter() {
            observations.set(obs.slice_index, obs.cor);
        }
    }
    for obs in &args.obs {
        observations.set(obs.slice_index, obs.cor);
    }
    if observations.is_empty() {
        return Err(AppError::new(2, "No COR observations given (use --obs, --obs-csv or --obs-json)."));
    }
    Ok(observations)
}

/// Pre-processing chain used when no config is given: every built-in
/// pre stage that does something on a flat/dark phantom.
pub fn builtin_preprocess_config(frame: (usize, usize)) -> PipelineConfig {
    let (height, width) = frame;
    let on = StageSettings::enabled;
    PipelineConfig {
        region_of_interest: Some(Region::new(width / 8, height / 8, width - width / 8, height - height / 8)),
        flags: RunFlags {
            only_preproc: true,
            ..RunFlags::default()
        },
        ..PipelineConfig::default()
    }
    .with_stage(Phase::Pre, "normalize_flat_dark", on())
    .with_stage(Phase::Pre, "value_scaling", on())
    .with_stage(Phase::Pre, "crop", on())
    .with_stage(
        Phase::Pre,
        "rebin",
        on().with("factor", ParamValue::Int(2))
            .with("remainder", ParamValue::Text("truncate".to_string())),
    )
    .with_stage(Phase::Pre, "outliers", on().with("threshold", ParamValue::Float(0.05)))
    .with_stage(Phase::Pre, "median", on().with("size", ParamValue::Int(3)))
    .with_stage(Phase::Pre, "gaussian", on().with("size", ParamValue::Float(1.0)))
    .with_stage(Phase::Pre, "cut_off", on().with("threshold", ParamValue::Float(0.98)))
    .with_stage(Phase::Pre, "minus_log", on())
}

#[derive(Debug)]
pub struct DeterminismRun {
    /// `(execution label, identical to the reference)` per compared setting.
    pub rows: Vec<(String, bool)>,
    /// Report of the reference run.
    pub report: RunReport,
}

impl DeterminismRun {
    pub fn all_identical(&self) -> bool {
        self.rows.iter().all(|(_, same)| *same)
    }
}

/// Pre-process the phantom once single-threaded, then once per entry of
/// `cores`, and compare each output to the reference bit for bit.
pub fn run_determinism(
    phantom: &PhantomSpec,
    base: &PipelineConfig,
    cores: &[AutoOr],
    chunksize: AutoOr,
) -> Result<DeterminismRun, AppError> {
    let started = Local::now();
    let reference_exec = ExecutionParams::new(AutoOr::Fixed(1), AutoOr::Fixed(phantom.frames.max(1)));
    let mut records = Vec::new();
    let reference = preprocess(phantom, base, reference_exec, &mut records)?;
    let report = RunReport::new(started, Vec::new(), records);

    let mut rows = Vec::with_capacity(cores.len());
    for c in cores {
        let exec = ExecutionParams::new(*c, chunksize);
        let output = preprocess(phantom, base, exec, &mut Vec::new())?;
        let same = bit_identical(&reference, &output);
        if !same {
            log::warn!("cores={c} chunksize={chunksize}: output differs from the single-threaded run");
        }
        rows.push((format!("cores={c} chunksize={chunksize}"), same));
    }
    Ok(DeterminismRun { rows, report })
}

fn preprocess(
    phantom: &PhantomSpec,
    base: &PipelineConfig,
    execution: ExecutionParams,
    records: &mut Vec<crate::pipeline::StageRecord>,
) -> Result<Volume, ReconError> {
    let config = PipelineConfig {
        execution,
        ..base.clone()
    };
    let pipeline = Pipeline::new(config).with_progress(Arc::new(NoProgress));
    pipeline.validate()?;
    let mut acquisition = phantom.load()?;
    pipeline.preprocess(&mut acquisition, records)?;
    Ok(acquisition.into_sample())
}

fn bit_identical(a: &Volume, b: &Volume) -> bool {
    a.shape() == b.shape() && a.data().iter().zip(b.data().iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorObservation;

    #[test]
    fn builtin_chain_is_deterministic_across_core_counts() {
        let phantom = PhantomSpec {
            frames: 10,
            height: 12,
            width: 16,
            ..PhantomSpec::default()
        };
        let base = builtin_preprocess_config((phantom.height, phantom.width));
        let run = run_determinism(
            &phantom,
            &base,
            &[AutoOr::Fixed(1), AutoOr::Fixed(3), AutoOr::Fixed(8)],
            AutoOr::Fixed(2),
        )
        .unwrap();
        assert_eq!(run.rows.len(), 3);
        assert!(run.all_identical(), "{:?}", run.rows);
        assert!(run.report.ran().count() >= 8);
    }

    #[test]
    fn cli_observations_override_file_sources() {
        let args = ObservationArgs {
            obs: vec![CorObservation::new(3, 7.5), CorObservation::new(3, 8.0)],
            obs_csv: None,
            obs_json: None,
        };
        let obs = gather_observations(&args).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs.get(3), Some(8.0));

        let empty = ObservationArgs {
            obs: Vec::new(),
            obs_csv: None,
            obs_json: None,
        };
        assert_eq!(gather_observations(&empty).unwrap_err().exit_code(), 2);
    }
}

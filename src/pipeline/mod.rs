//! Pipeline orchestration.
//!
//! A run moves through `Idle → PreProcessing → ReconstructionHandoff →
//! PostProcessing → Done`, one way only:
//!
//! - `only_preproc`: `PreProcessing → Done`
//! - `reuse_preproc`: `Idle → ReconstructionHandoff` (input is pre-processed)
//! - `only_postproc`: `Idle → PostProcessing` (input is reconstructed)
//! - `no_postproc`: post-processing passes the volume through
//!
//! Stages run one after the other; each one is a full fan-out/fan-in through
//! the `ChunkedExecutor`. Every configured stage's parameters and the
//! reconstruction settings are checked before the first chunk of the run is
//! dispatched, and each stage checks its shape/region requirements again
//! against the actual volume before its own chunks go out. A failure ends the
//! run; earlier stages are not undone, and `preprocess` leaves their output in
//! the caller's acquisition.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{Phase, PipelineConfig, StageSettings};
use crate::error::ReconError;
use crate::exec::{ChunkedExecutor, ExecStats, LogProgress, ProgressEvent, ProgressSink};
use crate::filters::value_scaling::capture_factor;
use crate::filters::{
    InPlaceKernel, KernelRegistry, POST_STAGES, PRE_STEPS, References, ReshapeKernel, StageContext, StageId,
    StagePlan, Step,
};
use crate::io::{OutputKind, Saver};
use crate::recon::{CorPlan, Reconstructor, reconstruct, validate_settings};
use crate::volume::{Acquisition, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    PreProcessing,
    ReconstructionHandoff,
    PostProcessing,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Ran(ExecStats),
    /// Enabled, but a no-op for its parameters or inputs.
    Skipped(String),
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub phase: Phase,
    pub stage: StageId,
    pub outcome: StageOutcome,
    pub elapsed: Duration,
}

/// What a run talks to besides the config.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub reconstructor: &'a dyn Reconstructor,
    pub saver: &'a dyn Saver,
    pub destination: &'a Path,
}

#[derive(Debug)]
pub struct RunOutput {
    /// Pre-processed volume after `only_preproc`, otherwise the final volume.
    pub volume: Volume,
    /// Every state entered, in order.
    pub states: Vec<RunState>,
    pub stages: Vec<StageRecord>,
    /// COR handed to the reconstructor, if reconstruction ran.
    pub cor: Option<CorPlan>,
}

impl RunOutput {
    pub fn ran(&self, phase: Phase, stage: StageId) -> bool {
        self.stages
            .iter()
            .any(|r| r.phase == phase && r.stage == stage && matches!(r.outcome, StageOutcome::Ran(_)))
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    executor: ChunkedExecutor,
    kernels: KernelRegistry,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            executor: ChunkedExecutor::new(Arc::new(LogProgress)),
            kernels: KernelRegistry::new(),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.executor = ChunkedExecutor::new(sink);
        self
    }

    pub fn with_kernels(mut self, kernels: KernelRegistry) -> Self {
        self.kernels = kernels;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn executor(&self) -> &ChunkedExecutor {
        &self.executor
    }

    /// Check everything that can be checked without data.
    pub fn validate(&self) -> Result<(), ReconError> {
        validate_config(&self.config)?;
        for phase in [Phase::Pre, Phase::Post] {
            for (key, settings) in self.config.stages(phase) {
                if let Some(id) = StageId::from_key(key) {
                    if settings.enabled && id.stage().external_kernel() && self.kernels.get(id).is_none() {
                        // stripe removal without a method is a no-op and needs no kernel
                        let needs_kernel = id != StageId::StripeRemoval
                            || settings.params.get("method").is_some_and(|m| !m.is_null());
                        if needs_kernel {
                            return Err(ReconError::KernelUnavailable {
                                stage: key.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn run(&self, mut acquisition: Acquisition, collab: &Collaborators<'_>) -> Result<RunOutput, ReconError> {
        self.validate()?;
        let flags = self.config.flags;
        let mut states = vec![RunState::Idle];
        let mut stages = Vec::new();

        let preprocessed = if flags.reuse_preproc || flags.only_postproc {
            log::warn!("pre-processing skipped: input is already pre-processed (reuse_preproc/only_postproc)");
            acquisition.into_sample()
        } else {
            states.push(RunState::PreProcessing);
            self.preprocess(&mut acquisition, &mut stages)?;
            let volume = acquisition.into_sample();
            if flags.save_preproc || flags.only_preproc {
                save(collab, &volume, OutputKind::PreProcessed)?;
            }
            if flags.only_preproc {
                log::info!("only pre-processing requested, stopping");
                states.push(RunState::Done);
                return Ok(RunOutput {
                    volume,
                    states,
                    stages,
                    cor: None,
                });
            }
            volume
        };

        let (reconstructed, cor) = if flags.only_postproc {
            log::warn!("reconstruction skipped: only post-processing requested");
            (preprocessed, None)
        } else {
            states.push(RunState::ReconstructionHandoff);
            let started = Instant::now();
            let (volume, cor) = reconstruct(collab.reconstructor, &preprocessed, &self.config.recon)?;
            log::info!("reconstruction finished in {:.2?}", started.elapsed());
            (volume, Some(cor))
        };

        states.push(RunState::PostProcessing);
        let volume = if flags.no_postproc {
            log::warn!("post-processing skipped: no_postproc is set");
            reconstructed
        } else {
            self.postprocess(reconstructed, &mut stages)?
        };

        save(collab, &volume, OutputKind::Reconstructed)?;
        states.push(RunState::Done);
        Ok(RunOutput {
            volume,
            states,
            stages,
            cor,
        })
    }

    /// Run the pre-processing chain over `acquisition` in place.
    ///
    /// On error the acquisition holds the output of every stage that finished.
    pub fn preprocess(&self, acquisition: &mut Acquisition, records: &mut Vec<StageRecord>) -> Result<(), ReconError> {
        acquisition.average_references();
        let mut scale_factor = None;

        for step in PRE_STEPS {
            match step {
                Step::CaptureScaleFactor => {
                    if self.scaling_active(acquisition) {
                        let factor = capture_factor(acquisition.sample(), self.config.region_of_interest)?;
                        log::info!("[pre] value scaling factor captured: {factor:.6}");
                        scale_factor = Some(factor);
                    }
                }
                Step::Stage(id) => self.apply(Phase::Pre, *id, acquisition, scale_factor, records)?,
            }
        }
        Ok(())
    }

    /// Run the post-processing chain over a reconstructed volume.
    pub fn postprocess(&self, volume: Volume, records: &mut Vec<StageRecord>) -> Result<Volume, ReconError> {
        let mut acquisition = Acquisition::SampleOnly(volume);
        for id in POST_STAGES {
            self.apply(Phase::Post, *id, &mut acquisition, None, records)?;
        }
        Ok(acquisition.into_sample())
    }

    fn settings(&self, phase: Phase, id: StageId) -> Option<&StageSettings> {
        self.config.stages(phase).get(id.key())
    }

    fn enabled(&self, phase: Phase, id: StageId) -> bool {
        self.settings(phase, id).is_some_and(|s| s.enabled)
    }

    /// Value scaling needs something to undo: flat/dark or air-region normalization.
    fn scaling_active(&self, acquisition: &Acquisition) -> bool {
        self.enabled(Phase::Pre, StageId::ValueScaling)
            && ((acquisition.has_flat_dark() && self.enabled(Phase::Pre, StageId::NormalizeFlatDark))
                || self.enabled(Phase::Pre, StageId::NormalizeAirRegion))
    }

    fn apply(
        &self,
        phase: Phase,
        id: StageId,
        acquisition: &mut Acquisition,
        scale_factor: Option<f64>,
        records: &mut Vec<StageRecord>,
    ) -> Result<(), ReconError> {
        let started = Instant::now();
        let tag = phase.label();
        let name = id.key();

        let settings = match self.settings(phase, id) {
            Some(s) if s.enabled => s,
            Some(_) => {
                log::info!("[{tag}] {name}: disabled");
                records.push(record(phase, id, StageOutcome::Disabled, started));
                return Ok(());
            }
            None => {
                log::debug!("[{tag}] {name}: not configured");
                records.push(record(phase, id, StageOutcome::Disabled, started));
                return Ok(());
            }
        };

        let stage = id.stage();
        let references = if stage.requires_flat_dark() {
            acquisition.flat_dark().map(|(flat, dark)| References::from_volumes(flat, dark))
        } else {
            None
        };
        let ctx = StageContext {
            phase,
            region_of_interest: self.config.region_of_interest,
            references: references.as_ref(),
            scale_factor,
            kernels: &self.kernels,
        };
        let plan = stage.prepare(&settings.params, acquisition.sample(), &ctx)?;

        let exec = &self.config.execution;
        let stats = match plan {
            StagePlan::Skip(reason) => {
                log::info!("[{tag}] {name}: skipped ({reason})");
                records.push(record(phase, id, StageOutcome::Skipped(reason), started));
                return Ok(());
            }
            StagePlan::InPlace(kernel) => {
                self.begin(tag, name, acquisition.sample());
                self.executor
                    .run(name, acquisition.sample_mut(), exec, |chunk| kernel.apply(chunk))?
            }
            StagePlan::Sinograms(kernel) => {
                self.begin(tag, name, acquisition.sample());
                self.run_sinograms(name, kernel.as_ref(), acquisition.sample_mut())?
            }
            StagePlan::Reshape(kernel) => {
                self.begin(tag, name, acquisition.sample());
                self.run_reshape(name, kernel.as_ref(), acquisition)?
            }
        };

        self.progress(name, 1.0, "finished");
        log::info!(
            "[{tag}] {name}: finished in {:.2?} ({} chunk(s), {} worker(s))",
            started.elapsed(),
            stats.chunks,
            stats.cores
        );
        records.push(record(phase, id, StageOutcome::Ran(stats), started));
        Ok(())
    }

    fn begin(&self, tag: &str, name: &str, sample: &Volume) {
        log::info!("[{tag}] {name}: started on {:?}", sample.shape());
        self.progress(name, 0.0, "started");
    }

    /// The sample is only replaced once every sinogram chunk succeeded.
    fn run_sinograms(&self, name: &str, kernel: &dyn InPlaceKernel, sample: &mut Volume) -> Result<ExecStats, ReconError> {
        let mut sinograms = sample.swap_frames_and_rows();
        let stats = self
            .executor
            .run(name, &mut sinograms, &self.config.execution, |chunk| kernel.apply(chunk))?;
        *sample = sinograms.swap_frames_and_rows();
        Ok(stats)
    }

    /// Flat/dark follow the sample's geometry.
    fn run_reshape(
        &self,
        name: &str,
        kernel: &dyn ReshapeKernel,
        acquisition: &mut Acquisition,
    ) -> Result<ExecStats, ReconError> {
        let shape = kernel.frame_shape();
        let mut sample_stats = None;
        let reshaped = acquisition.try_map(|volume| {
            let (out, stats) = self.executor.run_into(name, volume, shape, &self.config.execution, |src, dst| {
                kernel.apply(src, dst)
            })?;
            sample_stats.get_or_insert(stats);
            Ok(out)
        })?;
        *acquisition = reshaped;
        sample_stats.ok_or_else(|| ReconError::Executor(format!("{name}: no volume was reshaped")))
    }

    fn progress(&self, stage: &str, fraction: f64, message: &str) {
        self.executor
            .progress()
            .report(ProgressEvent::new(stage, fraction, message));
    }
}

fn record(phase: Phase, stage: StageId, outcome: StageOutcome, started: Instant) -> StageRecord {
    StageRecord {
        phase,
        stage,
        outcome,
        elapsed: started.elapsed(),
    }
}

fn save(collab: &Collaborators<'_>, volume: &Volume, kind: OutputKind) -> Result<(), ReconError> {
    log::info!("saving {} volume {:?} to {}", kind.label(), volume.shape(), collab.destination.display());
    collab
        .saver
        .save(volume, kind, collab.destination)
        .map_err(|e| ReconError::Save(format!("{} volume: {e}", kind.label())))
}

/// Data-free config checks: execution parameters, flags, stage keys, every
/// enabled stage's parameters and, when reconstruction will run, the
/// reconstruction settings.
pub fn validate_config(config: &PipelineConfig) -> Result<(), ReconError> {
    config.execution.validate()?;

    let flags = config.flags;
    if flags.only_preproc && (flags.reuse_preproc || flags.only_postproc) {
        return Err(ReconError::invalid_param(
            "flags",
            "only_preproc cannot be combined with reuse_preproc or only_postproc",
        ));
    }

    if let Some(roi) = config.region_of_interest {
        if roi.width() == 0 || roi.height() == 0 {
            return Err(ReconError::invalid_region(
                "region_of_interest",
                format!("region {roi} is empty"),
            ));
        }
    }

    for phase in [Phase::Pre, Phase::Post] {
        for (key, settings) in config.stages(phase) {
            let id: StageId = key
                .parse()
                .map_err(|e: String| ReconError::invalid_param(key, e))?;
            if !id.phases().contains(&phase) {
                return Err(ReconError::invalid_param(
                    key,
                    format!("'{key}' is not a {}-processing stage", phase.label()),
                ));
            }
            if settings.enabled {
                id.stage().validate(&settings.params)?;
            }
        }
    }

    if !flags.only_preproc && !flags.only_postproc {
        validate_settings(&config.recon)?;
    }
    Ok(())
}

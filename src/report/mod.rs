//! Run reports and terminal formatting.
//!
//! Formatting lives here so the pipeline and COR code only produce values.

use std::time::Duration;

use chrono::{DateTime, Local};

use crate::domain::Phase;
use crate::pipeline::{RunOutput, RunState, StageOutcome, StageRecord};

pub mod format;

pub use format::*;

/// Timestamped summary of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    pub states: Vec<RunState>,
    pub records: Vec<StageRecord>,
}

impl RunReport {
    pub fn new(started: DateTime<Local>, states: Vec<RunState>, records: Vec<StageRecord>) -> Self {
        Self {
            started,
            finished: Local::now(),
            states,
            records,
        }
    }

    pub fn from_output(started: DateTime<Local>, output: &RunOutput) -> Self {
        Self::new(started, output.states.clone(), output.stages.clone())
    }

    pub fn wall_time(&self) -> Duration {
        (self.finished - self.started).to_std().unwrap_or_default()
    }

    /// Stages that dispatched chunks, in order.
    pub fn ran(&self) -> impl Iterator<Item = &StageRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, StageOutcome::Ran(_)))
    }

    /// Enabled stages that turned out to be no-ops.
    pub fn skipped(&self) -> impl Iterator<Item = &StageRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, StageOutcome::Skipped(_)))
    }

    pub fn stage_time(&self, phase: Phase) -> Duration {
        self.records
            .iter()
            .filter(|r| r.phase == phase)
            .map(|r| r.elapsed)
            .sum()
    }
}

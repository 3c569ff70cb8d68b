//! Progress reporting.
//!
//! Purely observational: sinks never slow down or stop the pipeline.

use std::sync::Mutex;

/// One progress notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub stage: String,
    /// Fraction of the current stage completed, `0.0..=1.0`.
    pub fraction: f64,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(stage: &str, fraction: f64, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            fraction: fraction.clamp(0.0, 1.0),
            message: message.into(),
        }
    }
}

/// Receiver of progress events. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: ProgressEvent) {
        log::debug!(
            "[{}] {:>5.1}% {}",
            event.stage,
            event.fraction * 100.0,
            event.message
        );
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Keeps every event in memory (front-ends that poll, and tests).
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of chunk-completion events recorded for `stage`.
    pub fn chunk_events(&self, stage: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.stage == stage && e.message.starts_with("chunk "))
            .count()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

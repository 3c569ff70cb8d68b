//! Error types.
//!
//! - `ReconError` is the library taxonomy every pipeline/COR operation returns.
//! - `AppError` is what the binary reports: a message plus a process exit code.

use std::ops::Range;

use thiserror::Error;

/// Failures raised by the reconstruction core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconError {
    /// Shape incompatibility between sample/flat/dark or a derived volume.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Out-of-range, malformed or unknown stage parameter.
    #[error("invalid parameter for '{stage}': {message}")]
    InvalidParameter { stage: String, message: String },

    /// A rectangular region does not fit inside the frame.
    #[error("invalid region for '{stage}': {message}")]
    InvalidRegion { stage: String, message: String },

    /// Too few COR observations for the requested operation.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A chunk transform failed while the stage was running.
    #[error("stage '{stage}' failed on frames {}..{}: {cause}", range.start, range.end)]
    StageFailure {
        stage: String,
        range: Range<usize>,
        cause: String,
    },

    /// The external reconstruction collaborator reported a failure.
    #[error("reconstruction failed: {0}")]
    ReconstructionFailure(String),

    /// The stage is enabled but its numeric kernel lives outside this crate and
    /// none was registered.
    #[error("stage '{stage}' is enabled but no kernel is registered for it")]
    KernelUnavailable { stage: String },

    /// The worker pool could not be created.
    #[error("executor error: {0}")]
    Executor(String),

    /// The saver collaborator could not persist a volume.
    #[error("save failed: {0}")]
    Save(String),
}

impl ReconError {
    pub fn invalid_param(stage: &str, message: impl Into<String>) -> Self {
        ReconError::InvalidParameter {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_region(stage: &str, message: impl Into<String>) -> Self {
        ReconError::InvalidRegion {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Exit code used when the error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReconError::InvalidParameter { .. } | ReconError::InvalidRegion { .. } => 2,
            ReconError::InsufficientData(_) => 3,
            ReconError::StageFailure { .. }
            | ReconError::ReconstructionFailure(_)
            | ReconError::KernelUnavailable { .. }
            | ReconError::Executor(_)
            | ReconError::Save(_) => 4,
            ReconError::DimensionMismatch(_) => 5,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ReconError> for AppError {
    fn from(err: ReconError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_failure_message_names_stage_and_range() {
        let err = ReconError::StageFailure {
            stage: "median".to_string(),
            range: 4..8,
            cause: "boom".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("median"));
        assert!(msg.contains("4..8"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn recon_error_maps_to_app_exit_codes() {
        let app: AppError = ReconError::InsufficientData("one point".into()).into();
        assert_eq!(app.exit_code(), 3);
        let app: AppError = ReconError::invalid_param("rebin", "factor").into();
        assert_eq!(app.exit_code(), 2);
    }
}

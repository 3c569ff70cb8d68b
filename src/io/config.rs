//! Pipeline config JSON.

use std::fs::File;
use std::path::Path;

use crate::domain::PipelineConfig;
use crate::error::AppError;

/// Read a pipeline config JSON file. Missing sections take their defaults.
pub fn read_config_json(path: &Path) -> Result<PipelineConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open config '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid config JSON '{}': {e}", path.display())))
}

pub fn write_config_json(path: &Path, config: &PipelineConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create config '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, config)
        .map_err(|e| AppError::new(2, format!("Failed to write config JSON: {e}")))
}

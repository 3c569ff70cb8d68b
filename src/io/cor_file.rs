//! COR JSON files: observations plus, when it could be fitted, the line.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cor::{CorModel, CorObservations};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorFile {
    pub tool: String,
    pub observations: CorObservations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<CorModel>,
}

impl CorFile {
    /// Observations with a fitted model when at least two slices are present.
    pub fn new(observations: CorObservations) -> Self {
        let model = CorModel::fit(&observations).ok();
        Self {
            tool: "tomo".to_string(),
            observations,
            model,
        }
    }
}

pub fn write_cor_json(path: &Path, file: &CorFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create COR JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(out, file).map_err(|e| AppError::new(2, format!("Failed to write COR JSON: {e}")))
}

pub fn read_cor_json(path: &Path) -> Result<CorFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open COR JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid COR JSON: {e}")))
}

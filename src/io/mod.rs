//! Input/output helpers and collaborator interfaces.
//!
//! - `Loader` / `Saver`: how volumes enter and leave a run (formats are the
//!   caller's business)
//! - pipeline config JSON (`config`)
//! - COR observation/model JSON (`cor_file`)
//! - COR CSV import/export (`export`)

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::synthetic::{PhantomSpec, phantom_acquisition};
use crate::error::ReconError;
use crate::volume::{Acquisition, Volume};

pub mod config;
pub mod cor_file;
pub mod export;

pub use config::*;
pub use cor_file::*;
pub use export::*;

/// Supplies the sample and, optionally, its flat/dark references.
pub trait Loader {
    fn load(&self) -> Result<Acquisition, ReconError>;
}

/// Which product of a run is being saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    PreProcessed,
    Reconstructed,
}

impl OutputKind {
    pub fn label(self) -> &'static str {
        match self {
            OutputKind::PreProcessed => "pre-processed",
            OutputKind::Reconstructed => "reconstructed",
        }
    }
}

/// Persists volumes. `destination` is passed through uninterpreted.
pub trait Saver {
    fn save(&self, volume: &Volume, kind: OutputKind, destination: &Path) -> Result<(), String>;
}

impl Loader for PhantomSpec {
    fn load(&self) -> Result<Acquisition, ReconError> {
        phantom_acquisition(self)
    }
}

/// Keeps saved volumes in memory.
#[derive(Debug, Default)]
pub struct MemorySaver {
    saved: Mutex<Vec<(OutputKind, PathBuf, Volume)>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<(OutputKind, PathBuf, Volume)> {
        match self.saved.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<OutputKind> {
        self.saved().into_iter().map(|(k, _, _)| k).collect()
    }
}

impl Saver for MemorySaver {
    fn save(&self, volume: &Volume, kind: OutputKind, destination: &Path) -> Result<(), String> {
        let entry = (kind, destination.to_path_buf(), volume.clone());
        match self.saved.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        Ok(())
    }
}

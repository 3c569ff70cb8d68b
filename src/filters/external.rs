//! Caller-supplied numeric kernels.
//!
//! Stripe and ring removal are only orchestrated here: their numerics come from
//! an `ExternalKernel` the caller registers per stage. The stage still owns
//! parameter validation and chunking.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::ArrayViewMut3;

use crate::domain::StageParams;
use crate::error::ReconError;
use crate::volume::Chunk;

use super::{InPlaceKernel, StageId, StagePlan};

pub trait ExternalKernel: Send + Sync {
    fn name(&self) -> &str;

    /// Transform `block` in place. `params` has every declared parameter with
    /// defaults resolved.
    fn apply(&self, block: ArrayViewMut3<'_, f32>, params: &StageParams) -> Result<(), String>;
}

#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<StageId, Arc<dyn ExternalKernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage: StageId, kernel: Arc<dyn ExternalKernel>) -> &mut Self {
        log::debug!("registered external kernel '{}' for {stage}", kernel.name());
        self.kernels.insert(stage, kernel);
        self
    }

    pub fn with(mut self, stage: StageId, kernel: Arc<dyn ExternalKernel>) -> Self {
        self.register(stage, kernel);
        self
    }

    pub fn get(&self, stage: StageId) -> Option<&Arc<dyn ExternalKernel>> {
        self.kernels.get(&stage)
    }
}

impl std::fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<(StageId, &str)> = self.kernels.iter().map(|(k, v)| (*k, v.name())).collect();
        names.sort();
        f.debug_struct("KernelRegistry").field("kernels", &names).finish()
    }
}

/// Adapts an external kernel to the executor.
pub(crate) struct ExternalChunkKernel {
    pub kernel: Arc<dyn ExternalKernel>,
    pub params: StageParams,
}

impl InPlaceKernel for ExternalChunkKernel {
    fn apply(&self, chunk: &mut Chunk<'_>) -> Result<(), String> {
        self.kernel.apply(chunk.view_mut(), &self.params)
    }
}

/// Plan running the registered kernel for `stage` with fully resolved `params`.
pub(crate) fn plan<'a>(
    stage: StageId,
    kernels: &KernelRegistry,
    params: StageParams,
    sinograms: bool,
) -> Result<StagePlan<'a>, ReconError> {
    let kernel = kernels.get(stage).cloned().ok_or_else(|| ReconError::KernelUnavailable {
        stage: stage.key().to_string(),
    })?;
    let chunk_kernel = Box::new(ExternalChunkKernel { kernel, params });
    Ok(if sinograms {
        StagePlan::Sinograms(chunk_kernel)
    } else {
        StagePlan::InPlace(chunk_kernel)
    })
}

/// Test kernel: adds `offset` (a float parameter, default 1.0) to every sample.
#[cfg(test)]
pub(crate) struct AddOffset;

#[cfg(test)]
impl ExternalKernel for AddOffset {
    fn name(&self) -> &str {
        "add-offset"
    }

    fn apply(&self, mut block: ArrayViewMut3<'_, f32>, params: &StageParams) -> Result<(), String> {
        let offset = match params.get("offset") {
            Some(crate::domain::ParamValue::Float(v)) => *v as f32,
            _ => 1.0,
        };
        block.mapv_inplace(|v| v + offset);
        Ok(())
    }
}

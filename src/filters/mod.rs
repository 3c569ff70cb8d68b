//! Filter stages: one numerical operation each, applied chunk by chunk.
//!
//! A stage is a stateless `FilterStage` (static registry, see `registry`). At
//! run time the orchestrator asks it to `prepare` a plan from the stage's
//! parameters and the current volume. Preparing is where every parameter,
//! region and shape check happens, so a bad value fails before any chunk is
//! dispatched. The plan is then one of:
//!
//! - `Skip`: a documented no-op (e.g. `threshold = none`), logged, not an error
//! - `InPlace`: a kernel applied to projection/slice chunks in place
//! - `Sinograms`: an in-place kernel applied to sinogram chunks
//! - `Reshape`: a kernel writing into a new volume with a different frame shape

use ndarray::{Array2, ArrayView2, ArrayView3, ArrayViewMut2};

use crate::domain::{Phase, Region, StageParams};
use crate::error::ReconError;
use crate::volume::{Chunk, FrameShape, Volume};

pub mod circular_mask;
pub mod clip;
pub mod crop;
pub mod cut_off;
pub mod external;
pub mod flat_dark;
pub mod air_region;
pub mod frame;
pub mod gaussian;
pub mod median;
pub mod minus_log;
pub mod outliers;
pub mod params;
pub mod rebin;
pub mod registry;
pub mod ring;
pub mod rotate;
pub mod stripe;
pub mod value_scaling;

pub use external::{ExternalKernel, KernelRegistry};
pub use params::{DefaultValue, ParamKind, ParamReader, ParamSpec};
pub use registry::{POST_STAGES, PRE_STEPS, StageId, Step};

/// Flat and dark references averaged down to one frame each.
#[derive(Debug, Clone, PartialEq)]
pub struct References {
    pub flat: Array2<f32>,
    pub dark: Array2<f32>,
}

impl References {
    pub fn from_volumes(flat: &Volume, dark: &Volume) -> Self {
        Self {
            flat: flat.mean_frame(),
            dark: dark.mean_frame(),
        }
    }
}

/// Run-wide inputs a stage may need besides its own parameters.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub phase: Phase,
    pub region_of_interest: Option<Region>,
    pub references: Option<&'a References>,
    /// Captured by value scaling before normalization.
    pub scale_factor: Option<f64>,
    pub kernels: &'a KernelRegistry,
}

/// Kernel rewriting a chunk in place.
pub trait InPlaceKernel: Send + Sync {
    fn apply(&self, chunk: &mut Chunk<'_>) -> Result<(), String>;
}

/// Kernel writing each input chunk into an output chunk of a new frame shape.
pub trait ReshapeKernel: Send + Sync {
    fn frame_shape(&self) -> FrameShape;
    fn apply(&self, input: ArrayView3<'_, f32>, output: &mut Chunk<'_>) -> Result<(), String>;
}

pub enum StagePlan<'a> {
    Skip(String),
    InPlace(Box<dyn InPlaceKernel + 'a>),
    Sinograms(Box<dyn InPlaceKernel + 'a>),
    Reshape(Box<dyn ReshapeKernel + 'a>),
}

impl std::fmt::Debug for StagePlan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StagePlan::Skip(reason) => write!(f, "Skip({reason})"),
            StagePlan::InPlace(_) => write!(f, "InPlace"),
            StagePlan::Sinograms(_) => write!(f, "Sinograms"),
            StagePlan::Reshape(k) => write!(f, "Reshape({:?})", k.frame_shape()),
        }
    }
}

/// One numerical operation of the pipeline.
pub trait FilterStage: Send + Sync {
    fn id(&self) -> StageId;

    /// Declared parameters: names, kinds, defaults.
    fn params(&self) -> &'static [ParamSpec];

    /// Only flat/dark normalization needs the companion references.
    fn requires_flat_dark(&self) -> bool {
        false
    }

    /// The numeric kernel is supplied by the caller through a `KernelRegistry`.
    fn external_kernel(&self) -> bool {
        false
    }

    /// Check parameters without any data (config validation).
    fn validate(&self, params: &StageParams) -> Result<(), ReconError>;

    /// Validate against the actual volume and build the kernel to dispatch.
    fn prepare<'a>(
        &self,
        params: &StageParams,
        volume: &Volume,
        ctx: &StageContext<'a>,
    ) -> Result<StagePlan<'a>, ReconError>;
}

/// In-place kernel applying `f` to every frame of a chunk.
pub struct PerFrame<F>(pub F);

impl<F> InPlaceKernel for PerFrame<F>
where
    F: Fn(ArrayViewMut2<'_, f32>) -> Result<(), String> + Send + Sync,
{
    fn apply(&self, chunk: &mut Chunk<'_>) -> Result<(), String> {
        for frame in chunk.view_mut().outer_iter_mut() {
            (self.0)(frame)?;
        }
        Ok(())
    }
}

/// Reshape kernel mapping every input frame to an output frame of `shape`.
pub struct PerFrameReshape<F> {
    pub shape: FrameShape,
    pub f: F,
}

impl<F> ReshapeKernel for PerFrameReshape<F>
where
    F: Fn(ArrayView2<'_, f32>, ArrayViewMut2<'_, f32>) + Send + Sync,
{
    fn frame_shape(&self) -> FrameShape {
        self.shape
    }

    fn apply(&self, input: ArrayView3<'_, f32>, output: &mut Chunk<'_>) -> Result<(), String> {
        let mut out = output.view_mut();
        if input.dim().0 != out.dim().0 {
            return Err(format!(
                "chunk length mismatch: {} input frames, {} output frames",
                input.dim().0,
                out.dim().0
            ));
        }
        for (src, dst) in input.outer_iter().zip(out.outer_iter_mut()) {
            (self.f)(src, dst);
        }
        Ok(())
    }
}

/// Wrap a closure as a boxed per-frame in-place plan.
pub fn per_frame<'a, F>(f: F) -> StagePlan<'a>
where
    F: Fn(ArrayViewMut2<'_, f32>) -> Result<(), String> + Send + Sync + 'a,
{
    StagePlan::InPlace(Box::new(PerFrame(f)))
}

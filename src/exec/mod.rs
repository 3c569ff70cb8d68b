//! Chunked parallel execution of per-frame stage kernels.
//!
//! A stage runs as "fan out, wait for all, fan in":
//!
//! 1. resolve `cores` / `chunksize` against the volume's axis-0 length
//! 2. cut axis 0 into contiguous, disjoint chunks
//! 3. run the kernel on every chunk on a pool of at most `cores` threads
//! 4. return once every chunk finished, or with the first failure
//!
//! Kernels only ever see their own chunk, so the result does not depend on the
//! worker count or on where chunk boundaries fall. `cores == 1` runs the same
//! code on a single-thread pool. Pools are built once per worker count and
//! reused by every later stage of the executor.

use std::collections::HashMap;
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::domain::{AutoOr, ExecutionParams};
use crate::error::ReconError;
use crate::volume::{Chunk, FrameShape, Volume};

pub mod progress;

pub use progress::*;

/// `cores` / `chunksize` resolved for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    pub cores: usize,
    pub chunksize: usize,
    pub ranges: Vec<Range<usize>>,
}

impl ExecPlan {
    /// Resolve execution parameters for an axis 0 of length `len`.
    ///
    /// - `cores = auto` uses the available hardware parallelism; any value is
    ///   clamped to `[1, len]`.
    /// - `chunksize = auto` is `ceil(len / cores)`; an explicit value larger
    ///   than `len` is clamped to `len`.
    pub fn resolve(params: &ExecutionParams, len: usize) -> Result<Self, ReconError> {
        params.validate()?;

        let cores = match params.cores {
            AutoOr::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            AutoOr::Fixed(n) => n,
        };
        let cores = cores.clamp(1, len.max(1));

        let chunksize = match params.chunksize {
            AutoOr::Auto => len.div_ceil(cores),
            AutoOr::Fixed(n) => n.min(len),
        }
        .max(1);

        let ranges = (0..len)
            .step_by(chunksize)
            .map(|start| start..(start + chunksize).min(len))
            .collect();

        Ok(Self {
            cores,
            chunksize,
            ranges,
        })
    }
}

/// What a finished stage dispatch looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStats {
    pub cores: usize,
    pub chunksize: usize,
    pub chunks: usize,
}

/// Runs per-chunk kernels over a volume with bounded parallelism.
pub struct ChunkedExecutor {
    progress: Arc<dyn ProgressSink>,
    dispatched: AtomicUsize,
    pools: Mutex<HashMap<usize, Arc<rayon::ThreadPool>>>,
}

impl ChunkedExecutor {
    pub fn new(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            progress,
            dispatched: AtomicUsize::new(0),
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }

    /// Total number of chunks handed to workers over this executor's lifetime.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Number of distinct worker pools built so far.
    pub fn pools_built(&self) -> usize {
        match self.pools.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn pool(&self, cores: usize) -> Result<Arc<rayon::ThreadPool>, ReconError> {
        let mut pools = match self.pools.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(pool) = pools.get(&cores) {
            return Ok(Arc::clone(pool));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cores)
            .build()
            .map_err(|e| ReconError::Executor(format!("failed to build worker pool: {e}")))?;
        log::debug!("built a worker pool of {cores} thread(s)");
        let pool = Arc::new(pool);
        pools.insert(cores, Arc::clone(&pool));
        Ok(pool)
    }

    /// Run `kernel` in place over every chunk of `volume`.
    pub fn run<F>(
        &self,
        stage: &str,
        volume: &mut Volume,
        params: &ExecutionParams,
        kernel: F,
    ) -> Result<ExecStats, ReconError>
    where
        F: Fn(&mut Chunk<'_>) -> Result<(), String> + Sync,
    {
        let plan = ExecPlan::resolve(params, volume.len())?;
        let units: Vec<(Range<usize>, Chunk<'_>)> = volume
            .chunks_mut(plan.chunksize)
            .into_iter()
            .map(|chunk| (chunk.range(), chunk))
            .collect();

        self.dispatch(stage, &plan, units, |mut chunk| kernel(&mut chunk))
    }

    /// Run `kernel` from `input` into a freshly allocated volume whose frames
    /// are `frame_shape`. Input and output chunks share the same boundaries.
    pub fn run_into<F>(
        &self,
        stage: &str,
        input: &Volume,
        frame_shape: FrameShape,
        params: &ExecutionParams,
        kernel: F,
    ) -> Result<(Volume, ExecStats), ReconError>
    where
        F: Fn(ArrayView3<'_, f32>, &mut Chunk<'_>) -> Result<(), String> + Sync,
    {
        let plan = ExecPlan::resolve(params, input.len())?;
        let mut output = Volume::allocate((input.len(), frame_shape.0, frame_shape.1));

        let units: Vec<_> = input
            .chunks(plan.chunksize)
            .into_iter()
            .zip(output.chunks_mut(plan.chunksize))
            .map(|((range, src), dst)| (range, (src, dst)))
            .collect();

        let stats = self.dispatch(stage, &plan, units, |(src, mut dst)| kernel(src, &mut dst))?;
        Ok((output, stats))
    }

    fn dispatch<T, F>(
        &self,
        stage: &str,
        plan: &ExecPlan,
        units: Vec<(Range<usize>, T)>,
        work: F,
    ) -> Result<ExecStats, ReconError>
    where
        T: Send,
        F: Fn(T) -> Result<(), String> + Sync,
    {
        let stats = ExecStats {
            cores: plan.cores,
            chunksize: plan.chunksize,
            chunks: units.len(),
        };
        if units.is_empty() {
            return Ok(stats);
        }

        let pool = self.pool(plan.cores)?;

        log::debug!(
            "{stage}: dispatching {} chunk(s) of <= {} frame(s) on {} worker(s)",
            stats.chunks,
            plan.chunksize,
            plan.cores
        );

        let total = units.len();
        let completed = AtomicUsize::new(0);

        pool.install(|| {
            units.into_par_iter().try_for_each(|(range, unit)| {
                self.dispatched.fetch_add(1, Ordering::Relaxed);

                let outcome = catch_unwind(AssertUnwindSafe(|| work(unit)))
                    .unwrap_or_else(|panic| Err(panic_message(panic.as_ref())));

                if let Err(cause) = outcome {
                    log::error!("{stage}: chunk {}..{} failed: {cause}", range.start, range.end);
                    return Err(ReconError::StageFailure {
                        stage: stage.to_string(),
                        range,
                        cause,
                    });
                }

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                self.progress.report(ProgressEvent::new(
                    stage,
                    done as f64 / total as f64,
                    format!("chunk {}..{} done", range.start, range.end),
                ));
                Ok(())
            })
        })?;

        Ok(stats)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("kernel panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("kernel panicked: {s}")
    } else {
        "kernel panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::random_volume;

    fn executor() -> ChunkedExecutor {
        ChunkedExecutor::new(Arc::new(NoProgress))
    }

    /// A frame-local kernel with enough arithmetic to expose ordering bugs.
    fn kernel(chunk: &mut Chunk<'_>) -> Result<(), String> {
        let first = chunk.range().start;
        for (i, mut frame) in chunk.view_mut().outer_iter_mut().enumerate() {
            let k = (first + i) as f32;
            frame.mapv_inplace(|v| (v * 1.37 + k).sqrt().ln_1p());
        }
        Ok(())
    }

    #[test]
    fn resolve_auto_chunksize_is_ceil() {
        let plan = ExecPlan::resolve(&ExecutionParams::new(AutoOr::Fixed(4), AutoOr::Auto), 10).unwrap();
        assert_eq!(plan.cores, 4);
        assert_eq!(plan.chunksize, 3);
        assert_eq!(plan.ranges, vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn resolve_clamps_cores_and_chunksize() {
        let plan = ExecPlan::resolve(&ExecutionParams::fixed(16, 100), 5).unwrap();
        assert_eq!(plan.cores, 5);
        assert_eq!(plan.chunksize, 5);
        assert_eq!(plan.ranges, vec![0..5]);

        let plan = ExecPlan::resolve(&ExecutionParams::default(), 0).unwrap();
        assert_eq!(plan.cores, 1);
        assert!(plan.ranges.is_empty());
    }

    #[test]
    fn output_is_independent_of_parallelism() {
        let base = random_volume((23, 7, 5), 11);

        let mut reference = base.clone();
        executor()
            .run("k", &mut reference, &ExecutionParams::fixed(1, 23), kernel)
            .unwrap();

        for (cores, chunksize) in [(1, 1), (2, 5), (3, 7), (8, 2), (4, 23)] {
            let mut v = base.clone();
            executor()
                .run("k", &mut v, &ExecutionParams::fixed(cores, chunksize), kernel)
                .unwrap();
            assert_eq!(v, reference, "cores={cores} chunksize={chunksize}");
        }

        let mut v = base.clone();
        executor().run("k", &mut v, &ExecutionParams::default(), kernel).unwrap();
        assert_eq!(v, reference);
    }

    #[test]
    fn every_chunk_is_dispatched_once() {
        let exec = executor();
        let mut v = random_volume((10, 2, 2), 3);
        let stats = exec.run("k", &mut v, &ExecutionParams::fixed(3, 4), kernel).unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(exec.dispatched(), 3);
    }

    #[test]
    fn pools_are_reused_across_runs() {
        let exec = executor();
        let mut v = random_volume((8, 2, 2), 4);
        for _ in 0..3 {
            exec.run("k", &mut v, &ExecutionParams::fixed(2, 2), kernel).unwrap();
        }
        exec.run_into("copy", &v, (2, 2), &ExecutionParams::fixed(2, 4), |src, dst| {
            dst.view_mut().assign(&src);
            Ok(())
        })
        .unwrap();
        assert_eq!(exec.pools_built(), 1);

        exec.run("k", &mut v, &ExecutionParams::fixed(3, 2), kernel).unwrap();
        assert_eq!(exec.pools_built(), 2);
    }

    #[test]
    fn failing_chunk_reports_stage_and_range() {
        let mut v = random_volume((12, 2, 2), 5);
        let err = executor()
            .run("explode", &mut v, &ExecutionParams::fixed(1, 4), |chunk| {
                if chunk.range().contains(&5) {
                    Err("bad frame".to_string())
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(
            err,
            ReconError::StageFailure {
                stage: "explode".to_string(),
                range: 4..8,
                cause: "bad frame".to_string(),
            }
        );
    }

    #[test]
    fn panicking_kernel_becomes_stage_failure() {
        let mut v = random_volume((4, 2, 2), 5);
        let err = executor()
            .run("panic", &mut v, &ExecutionParams::fixed(2, 2), |_| panic!("oops"))
            .unwrap_err();
        assert!(matches!(err, ReconError::StageFailure { ref stage, .. } if stage == "panic"));
    }

    #[test]
    fn run_into_reshapes_each_frame() {
        let input = random_volume((9, 4, 6), 2);
        let (out, stats) = executor()
            .run_into("half", &input, (4, 3), &ExecutionParams::fixed(2, 4), |src, dst| {
                let mut dst = dst.view_mut();
                for (s, mut d) in src.outer_iter().zip(dst.outer_iter_mut()) {
                    for ((r, c), v) in d.indexed_iter_mut() {
                        *v = s[[r, c * 2]];
                    }
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(out.shape(), (9, 4, 3));
        assert_eq!(out.data()[[8, 3, 2]], input.data()[[8, 3, 4]]);
    }

    #[test]
    fn chunk_progress_is_reported() {
        let sink = Arc::new(RecordingProgress::new());
        let exec = ChunkedExecutor::new(sink.clone());
        let mut v = random_volume((6, 2, 2), 1);
        exec.run("k", &mut v, &ExecutionParams::fixed(2, 2), kernel).unwrap();
        assert_eq!(sink.chunk_events("k"), 3);
    }
}

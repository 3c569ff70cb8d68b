//! Volume storage and chunk views.
//!
//! A `Volume` owns one contiguous `frames × height × width` buffer of `f32`.
//! Workers never get the volume itself: they get `Chunk`s, mutable windows over
//! a contiguous range of axis 0. Chunks can only be created from `&mut Volume`,
//! so the borrow checker guarantees that two live chunks never overlap and that
//! writes through a chunk land directly in the owning buffer.

use std::ops::Range;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis, s};

use crate::error::ReconError;

/// `(height, width)` of a single frame.
pub type FrameShape = (usize, usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
}

impl Volume {
    /// Zero-initialised volume of `(frames, height, width)`.
    pub fn allocate(shape: (usize, usize, usize)) -> Self {
        Self {
            data: Array3::zeros(shape),
        }
    }

    pub fn filled(shape: (usize, usize, usize), value: f32) -> Self {
        Self {
            data: Array3::from_elem(shape, value),
        }
    }

    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Length of axis 0 (frames, angles or slices).
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frame_shape(&self) -> FrameShape {
        let (_, h, w) = self.data.dim();
        (h, w)
    }

    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, f32> {
        self.data.view_mut()
    }

    pub fn frame(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// Mutable window over `range` of axis 0.
    pub fn view_mut(&mut self, range: Range<usize>) -> Result<Chunk<'_>, ReconError> {
        if range.start > range.end || range.end > self.len() {
            return Err(ReconError::DimensionMismatch(format!(
                "view {}..{} outside axis 0 of length {}",
                range.start,
                range.end,
                self.len()
            )));
        }
        let start = range.start;
        let view = self.data.slice_mut(s![range, .., ..]);
        Ok(Chunk { start, view })
    }

    /// Split axis 0 into disjoint mutable chunks of `chunksize` frames (last may be shorter).
    pub fn chunks_mut(&mut self, chunksize: usize) -> Vec<Chunk<'_>> {
        let chunksize = chunksize.max(1);
        self.data
            .axis_chunks_iter_mut(Axis(0), chunksize)
            .enumerate()
            .map(|(i, view)| Chunk {
                start: i * chunksize,
                view,
            })
            .collect()
    }

    /// Read-only counterpart of `chunks_mut`, with identical boundaries.
    pub fn chunks(&self, chunksize: usize) -> Vec<(Range<usize>, ArrayView3<'_, f32>)> {
        let chunksize = chunksize.max(1);
        self.data
            .axis_chunks_iter(Axis(0), chunksize)
            .enumerate()
            .map(|(i, view)| {
                let start = i * chunksize;
                (start..start + view.len_of(Axis(0)), view)
            })
            .collect()
    }

    /// Swap axes 0 and 1: `(angles, rows, cols)` projections become
    /// `(rows, angles, cols)` sinograms and back. Always a fresh contiguous copy.
    pub fn swap_frames_and_rows(&self) -> Volume {
        let swapped = self.data.view().permuted_axes([1, 0, 2]);
        Volume {
            data: swapped.as_standard_layout().into_owned(),
        }
    }

    /// Global maximum (NaN ignored); `None` for an empty volume.
    pub fn max(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f32| a.max(v))))
    }

    /// Average all frames into one, accumulating in `f64`.
    pub fn mean_frame(&self) -> Array2<f32> {
        let (n, h, w) = self.data.dim();
        let mut acc = Array2::<f64>::zeros((h, w));
        for frame in self.data.outer_iter() {
            acc.zip_mut_with(&frame, |a, &v| *a += v as f64);
        }
        let n = n.max(1) as f64;
        acc.mapv(|v| (v / n) as f32)
    }
}

/// A disjoint mutable window over frames `start..start + len` of a volume.
#[derive(Debug)]
pub struct Chunk<'a> {
    start: usize,
    view: ArrayViewMut3<'a, f32>,
}

impl Chunk<'_> {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.view.len_of(Axis(0))
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.view.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut3<'_, f32> {
        self.view.view_mut()
    }
}

/// What the loader hands the pipeline: either a bare sample or a sample with
/// its flat and dark references.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    SampleOnly(Volume),
    SampleWithFlatDark {
        sample: Volume,
        flat: Volume,
        dark: Volume,
    },
}

impl Acquisition {
    /// Build an acquisition, checking that flat/dark share the sample's frame shape.
    pub fn with_flat_dark(sample: Volume, flat: Volume, dark: Volume) -> Result<Self, ReconError> {
        for (name, v) in [("flat", &flat), ("dark", &dark)] {
            if v.frame_shape() != sample.frame_shape() {
                return Err(ReconError::DimensionMismatch(format!(
                    "{name} frame shape {:?} != sample frame shape {:?}",
                    v.frame_shape(),
                    sample.frame_shape()
                )));
            }
            if v.is_empty() {
                return Err(ReconError::DimensionMismatch(format!("{name} has no frames")));
            }
        }
        Ok(Acquisition::SampleWithFlatDark { sample, flat, dark })
    }

    pub fn sample(&self) -> &Volume {
        match self {
            Acquisition::SampleOnly(sample) => sample,
            Acquisition::SampleWithFlatDark { sample, .. } => sample,
        }
    }

    pub fn sample_mut(&mut self) -> &mut Volume {
        match self {
            Acquisition::SampleOnly(sample) => sample,
            Acquisition::SampleWithFlatDark { sample, .. } => sample,
        }
    }

    pub fn flat_dark(&self) -> Option<(&Volume, &Volume)> {
        match self {
            Acquisition::SampleOnly(_) => None,
            Acquisition::SampleWithFlatDark { flat, dark, .. } => Some((flat, dark)),
        }
    }

    pub fn has_flat_dark(&self) -> bool {
        self.flat_dark().is_some()
    }

    pub fn into_sample(self) -> Volume {
        match self {
            Acquisition::SampleOnly(sample) => sample,
            Acquisition::SampleWithFlatDark { sample, .. } => sample,
        }
    }

    /// Build a new acquisition from `f` applied to every volume, sample first.
    /// `self` is left untouched if any call fails.
    pub fn try_map<F>(&self, mut f: F) -> Result<Self, ReconError>
    where
        F: FnMut(&Volume) -> Result<Volume, ReconError>,
    {
        match self {
            Acquisition::SampleOnly(sample) => Ok(Acquisition::SampleOnly(f(sample)?)),
            Acquisition::SampleWithFlatDark { sample, flat, dark } => {
                Ok(Acquisition::SampleWithFlatDark {
                    sample: f(sample)?,
                    flat: f(flat)?,
                    dark: f(dark)?,
                })
            }
        }
    }

    /// Collapse multi-frame flat/dark stacks to their single mean frame.
    pub fn average_references(&mut self) {
        if let Acquisition::SampleWithFlatDark { flat, dark, .. } = self {
            let average = |v: &Volume| Volume::from_array(v.mean_frame().insert_axis(Axis(0)));
            *flat = average(flat);
            *dark = average(dark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_axis_zero_disjointly() {
        let mut v = Volume::allocate((10, 2, 3));
        let ranges: Vec<_> = v.chunks_mut(4).iter().map(|c| c.range()).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn writes_through_a_view_reach_the_volume() {
        let mut v = Volume::allocate((6, 2, 2));
        {
            let mut chunk = v.view_mut(2..4).unwrap();
            chunk.view_mut().fill(7.0);
        }
        assert_eq!(v.frame(1)[[0, 0]], 0.0);
        assert_eq!(v.frame(2)[[1, 1]], 7.0);
        assert_eq!(v.frame(3)[[0, 1]], 7.0);
        assert_eq!(v.frame(4)[[0, 0]], 0.0);
        assert!(v.view_mut(5..7).is_err());
    }

    #[test]
    fn mean_frame_averages_axis_zero() {
        let mut v = Volume::allocate((2, 1, 2));
        v.data_mut()[[0, 0, 0]] = 1.0;
        v.data_mut()[[1, 0, 0]] = 3.0;
        let m = v.mean_frame();
        assert_eq!(m[[0, 0]], 2.0);
        assert_eq!(m[[0, 1]], 0.0);
    }

    #[test]
    fn sinogram_swap_round_trips() {
        let mut v = Volume::allocate((3, 2, 4));
        v.data_mut()[[2, 1, 3]] = 5.0;
        let sino = v.swap_frames_and_rows();
        assert_eq!(sino.shape(), (2, 3, 4));
        assert_eq!(sino.data()[[1, 2, 3]], 5.0);
        assert_eq!(sino.swap_frames_and_rows(), v);
        assert_eq!(v.max(), Some(5.0));
    }

    #[test]
    fn references_average_to_one_frame() {
        let sample = Volume::allocate((4, 2, 2));
        let mut flat = Volume::filled((3, 2, 2), 2.0);
        flat.data_mut()[[0, 0, 0]] = 5.0;
        let dark = Volume::filled((2, 2, 2), 1.0);
        let mut acq = Acquisition::with_flat_dark(sample, flat, dark).unwrap();
        acq.average_references();
        let (flat, dark) = acq.flat_dark().unwrap();
        assert_eq!(flat.shape(), (1, 2, 2));
        assert_eq!(flat.data()[[0, 0, 0]], 3.0);
        assert_eq!(dark.data()[[0, 1, 1]], 1.0);
        assert_eq!(acq.sample().len(), 4);
    }

    #[test]
    fn flat_dark_shape_must_match_sample() {
        let sample = Volume::allocate((4, 3, 3));
        let flat = Volume::allocate((2, 3, 3));
        let dark = Volume::allocate((1, 3, 2));
        assert!(matches!(
            Acquisition::with_flat_dark(sample, flat, dark),
            Err(ReconError::DimensionMismatch(_))
        ));
    }
}

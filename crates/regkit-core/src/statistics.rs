//! Multithreaded image moments.
//!
//! The voxel range is split into disjoint contiguous chunks. Each rayon task
//! accumulates into its own cache-line aligned partial result and the
//! partials are merged on the calling thread, so no two workers write to the
//! same cache line and no locking is needed.

use rayon::prelude::*;

use crate::error::{CoreError, Result};
use crate::image::ImageBuffer;
use crate::spatial::Vector;

/// Zeroth and first moments of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMoments<const D: usize> {
    /// Sum of voxel values taken into account.
    pub total_mass: f64,
    /// Mass-weighted mean physical position.
    pub center_of_gravity: Vector<D>,
    /// Number of voxels taken into account.
    pub samples: usize,
}

#[repr(align(64))]
#[derive(Debug, Clone, Copy)]
struct Partial<const D: usize> {
    m0: f64,
    m1: Vector<D>,
    count: usize,
}

impl<const D: usize> Partial<D> {
    fn zero() -> Self {
        Self {
            m0: 0.0,
            m1: Vector::zeros(),
            count: 0,
        }
    }
}

/// Computes the centre of gravity of an image.
#[derive(Debug, Clone, Default)]
pub struct ImageMomentsCalculator<const D: usize> {
    lower_threshold: Option<f64>,
    number_of_samples: Option<usize>,
    work_units: Option<usize>,
    mask: Option<ImageBuffer<D>>,
}

impl<const D: usize> ImageMomentsCalculator<D> {
    pub fn new() -> Self {
        Self {
            lower_threshold: None,
            number_of_samples: None,
            work_units: None,
            mask: None,
        }
    }

    /// Ignore voxels whose value is below `threshold`.
    pub fn with_lower_threshold(mut self, threshold: f64) -> Self {
        self.lower_threshold = Some(threshold);
        self
    }

    /// Visit roughly `samples` voxels on a regular stride instead of all.
    pub fn with_number_of_samples(mut self, samples: usize) -> Self {
        self.number_of_samples = Some(samples.max(1));
        self
    }

    /// Number of chunks the voxel range is partitioned into. Defaults to the
    /// size of the rayon pool.
    pub fn with_work_units(mut self, units: usize) -> Self {
        self.work_units = Some(units.max(1));
        self
    }

    /// Only voxels inside the (non-zero) mask contribute.
    pub fn with_mask(mut self, mask: ImageBuffer<D>) -> Self {
        self.mask = Some(mask);
        self
    }

    fn stride(&self, voxels: usize) -> usize {
        self.number_of_samples
            .map_or(1, |samples| (voxels / samples).max(1))
    }

    fn accumulate(&self, image: &ImageBuffer<D>, start: usize, values: &[f64], stride: usize) -> Partial<D> {
        let geometry = image.geometry();
        let mut partial = Partial::zero();
        for (offset, &value) in values.iter().enumerate() {
            let linear = start + offset;
            if linear % stride != 0 {
                continue;
            }
            if self.lower_threshold.is_some_and(|t| value < t) {
                continue;
            }
            let point = geometry.index_to_physical(&geometry.multi_index(linear));
            if let Some(mask) = &self.mask {
                if !mask.is_inside_mask(&point) {
                    continue;
                }
            }
            partial.m0 += value;
            partial.m1 += point * value;
            partial.count += 1;
        }
        partial
    }

    fn finish(partials: impl IntoIterator<Item = Partial<D>>) -> Result<ImageMoments<D>> {
        let mut total = Partial::<D>::zero();
        for partial in partials {
            total.m0 += partial.m0;
            total.m1 += partial.m1;
            total.count += partial.count;
        }
        if total.m0.abs() <= f64::EPSILON {
            return Err(CoreError::Degenerate(
                "image has zero total mass; centre of gravity undefined".to_string(),
            ));
        }
        Ok(ImageMoments {
            total_mass: total.m0,
            center_of_gravity: total.m1 / total.m0,
            samples: total.count,
        })
    }

    /// Partition-reduce over rayon workers.
    pub fn compute(&self, image: &ImageBuffer<D>) -> Result<ImageMoments<D>> {
        let values = image.values();
        if values.is_empty() {
            return Err(CoreError::Degenerate("image has no voxels".to_string()));
        }
        let stride = self.stride(values.len());
        let units = self
            .work_units
            .unwrap_or_else(rayon::current_num_threads)
            .clamp(1, values.len());
        let chunk = values.len().div_ceil(units);

        let partials: Vec<Partial<D>> = values
            .par_chunks(chunk)
            .enumerate()
            .map(|(i, slice)| self.accumulate(image, i * chunk, slice, stride))
            .collect();
        tracing::debug!(work_units = partials.len(), "merged image moment partials");
        Self::finish(partials)
    }

    /// Same result computed on the calling thread only.
    pub fn compute_single_threaded(&self, image: &ImageBuffer<D>) -> Result<ImageMoments<D>> {
        let values = image.values();
        if values.is_empty() {
            return Err(CoreError::Degenerate("image has no voxels".to_string()));
        }
        let stride = self.stride(values.len());
        Self::finish([self.accumulate(image, 0, values, stride)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Geometry;
    use proptest::prelude::*;

    fn blob(centre: Vector<2>) -> ImageBuffer<2> {
        ImageBuffer::from_fn(Geometry::<2>::with_size([21, 17]), |p| {
            (-(p - centre).norm_squared() / 8.0).exp()
        })
    }

    #[test]
    fn test_center_of_gravity_of_symmetric_blob() {
        let moments = ImageMomentsCalculator::new()
            .compute(&blob(Vector::<2>::new(10.0, 8.0)))
            .unwrap();
        assert!((moments.center_of_gravity - Vector::<2>::new(10.0, 8.0)).norm() < 1e-6);
        assert_eq!(moments.samples, 21 * 17);
    }

    #[test]
    fn test_zero_mass_is_degenerate() {
        let image = ImageBuffer::filled(Geometry::<2>::with_size([4, 4]), 0.0);
        assert!(matches!(
            ImageMomentsCalculator::new().compute(&image),
            Err(CoreError::Degenerate(_))
        ));
    }

    #[test]
    fn test_threshold_and_mask_restrict_voxels() {
        let geometry = Geometry::<2>::with_size([8, 8]);
        let image = ImageBuffer::from_fn(geometry.clone(), |p| if p[0] < 4.0 { 1.0 } else { 5.0 });
        let bright = ImageMomentsCalculator::new()
            .with_lower_threshold(2.0)
            .compute(&image)
            .unwrap();
        assert_eq!(bright.samples, 32);
        assert!((bright.center_of_gravity[0] - 5.5).abs() < 1e-12);

        let mask = ImageBuffer::from_fn(geometry, |p| if p[1] < 2.0 { 1.0 } else { 0.0 });
        let masked = ImageMomentsCalculator::new().with_mask(mask).compute(&image).unwrap();
        assert_eq!(masked.samples, 16);
    }

    proptest! {
        #[test]
        fn prop_partitioning_matches_single_thread(units in 1usize..40, cx in 2.0f64..18.0, cy in 2.0f64..14.0) {
            let image = blob(Vector::<2>::new(cx, cy));
            let calculator = ImageMomentsCalculator::new().with_work_units(units);
            let parallel = calculator.compute(&image).unwrap();
            let serial = calculator.compute_single_threaded(&image).unwrap();
            prop_assert_eq!(parallel.samples, serial.samples);
            prop_assert!((parallel.total_mass - serial.total_mass).abs() < 1e-9);
            prop_assert!((parallel.center_of_gravity - serial.center_of_gravity).norm() < 1e-9);
        }
    }
}

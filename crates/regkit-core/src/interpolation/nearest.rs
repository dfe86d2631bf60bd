//! Nearest neighbor interpolation.

use super::trait_::Interpolator;
use crate::image::ImageBuffer;
use crate::spatial::Vector;

/// Nearest Neighbor Interpolator.
///
/// Returns the value of the closest voxel. The gradient is estimated with
/// central differences on the voxel grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl<const D: usize> Interpolator<D> for NearestNeighborInterpolator {
    fn evaluate(&self, image: &ImageBuffer<D>, point: &Vector<D>) -> Option<f64> {
        let geometry = image.geometry();
        let index = geometry.physical_to_continuous_index(point);
        if !geometry.is_inside(&index) {
            return None;
        }
        let mut nearest = [0isize; D];
        for axis in 0..D {
            nearest[axis] = index[axis].round() as isize;
        }
        image.get_checked(&nearest)
    }

    fn evaluate_with_gradient(
        &self,
        image: &ImageBuffer<D>,
        point: &Vector<D>,
    ) -> Option<(f64, Vector<D>)> {
        let geometry = image.geometry();
        let index = geometry.physical_to_continuous_index(point);
        if !geometry.is_inside(&index) {
            return None;
        }
        let mut nearest = [0isize; D];
        for axis in 0..D {
            nearest[axis] = index[axis].round() as isize;
        }
        let value = image.get_checked(&nearest)?;

        let mut gradient = Vector::<D>::zeros();
        for axis in 0..D {
            let mut forward = nearest;
            let mut backward = nearest;
            forward[axis] += 1;
            backward[axis] -= 1;
            gradient[axis] = match (image.get_checked(&forward), image.get_checked(&backward)) {
                (Some(f), Some(b)) => 0.5 * (f - b),
                (Some(f), None) => f - value,
                (None, Some(b)) => value - b,
                (None, None) => 0.0,
            };
        }
        Some((value, geometry.index_gradient_to_physical(&gradient)))
    }
}

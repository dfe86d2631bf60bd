//! Linear interpolation implementation.
//!
//! Multilinear interpolation over the `2^D` voxels surrounding a point
//! (bilinear for 2D, trilinear for 3D). The gradient is the exact derivative
//! of the interpolant.

use super::trait_::Interpolator;
use crate::image::ImageBuffer;
use crate::spatial::Vector;

/// Linear Interpolator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

struct Cell<const D: usize> {
    base: [usize; D],
    fraction: [f64; D],
    degenerate: [bool; D],
}

impl LinearInterpolator {
    fn locate<const D: usize>(image: &ImageBuffer<D>, point: &Vector<D>) -> Option<Cell<D>> {
        let geometry = image.geometry();
        let index = geometry.physical_to_continuous_index(point);
        if !geometry.is_inside(&index) {
            return None;
        }
        let size = geometry.size();
        let mut cell = Cell {
            base: [0; D],
            fraction: [0.0; D],
            degenerate: [false; D],
        };
        for axis in 0..D {
            if size[axis] < 2 {
                cell.degenerate[axis] = true;
                continue;
            }
            // the last voxel is reached with fraction 1 from the previous one
            let base = (index[axis].floor() as usize).min(size[axis] - 2);
            cell.base[axis] = base;
            cell.fraction[axis] = index[axis] - base as f64;
        }
        Some(cell)
    }

    fn corners<const D: usize>(cell: &Cell<D>) -> impl Iterator<Item = ([usize; D], usize)> + '_ {
        (0..1usize << D).filter_map(move |corner| {
            let mut index = cell.base;
            for axis in 0..D {
                if corner & (1 << axis) != 0 {
                    if cell.degenerate[axis] {
                        return None;
                    }
                    index[axis] += 1;
                }
            }
            Some((index, corner))
        })
    }
}

impl<const D: usize> Interpolator<D> for LinearInterpolator {
    fn evaluate(&self, image: &ImageBuffer<D>, point: &Vector<D>) -> Option<f64> {
        let cell = Self::locate(image, point)?;
        let mut value = 0.0;
        for (index, corner) in Self::corners(&cell) {
            let mut weight = 1.0;
            for axis in 0..D {
                let t = cell.fraction[axis];
                weight *= if corner & (1 << axis) != 0 { t } else { 1.0 - t };
            }
            value += weight * image.get(&index);
        }
        Some(value)
    }

    fn evaluate_with_gradient(
        &self,
        image: &ImageBuffer<D>,
        point: &Vector<D>,
    ) -> Option<(f64, Vector<D>)> {
        let cell = Self::locate(image, point)?;
        let mut value = 0.0;
        let mut gradient = Vector::<D>::zeros();
        for (index, corner) in Self::corners(&cell) {
            let sample = image.get(&index);
            let mut weight = 1.0;
            for axis in 0..D {
                let t = cell.fraction[axis];
                weight *= if corner & (1 << axis) != 0 { t } else { 1.0 - t };
            }
            value += weight * sample;

            for axis in (0..D).filter(|&a| !cell.degenerate[a]) {
                let mut partial = if corner & (1 << axis) != 0 { 1.0 } else { -1.0 };
                for other in (0..D).filter(|&o| o != axis) {
                    let t = cell.fraction[other];
                    partial *= if corner & (1 << other) != 0 { t } else { 1.0 - t };
                }
                gradient[axis] += partial * sample;
            }
        }
        Some((value, image.geometry().index_gradient_to_physical(&gradient)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Geometry, Matrix};

    #[test]
    fn test_linear_is_exact_on_affine_functions() {
        let image = ImageBuffer::from_fn(Geometry::<3>::with_size([5, 4, 3]), |p| {
            1.0 + 2.0 * p[0] - 3.0 * p[1] + 0.5 * p[2]
        });
        let point = Vector::<3>::new(1.25, 2.5, 1.75);
        let (value, gradient) = LinearInterpolator.evaluate_with_gradient(&image, &point).unwrap();
        assert!((value - (1.0 + 2.5 - 7.5 + 0.875)).abs() < 1e-12);
        assert!((gradient - Vector::<3>::new(2.0, -3.0, 0.5)).norm() < 1e-12);
    }

    #[test]
    fn test_last_voxel_is_inside() {
        let image = ImageBuffer::from_fn(Geometry::<2>::with_size([3, 3]), |p| p[0]);
        assert_eq!(LinearInterpolator.evaluate(&image, &Vector::<2>::new(2.0, 2.0)), Some(2.0));
        assert_eq!(LinearInterpolator.evaluate(&image, &Vector::<2>::new(2.01, 2.0)), None);
    }

    #[test]
    fn test_gradient_respects_spacing() {
        let geometry = Geometry::new(
            [6, 6],
            Vector::<2>::zeros(),
            Vector::<2>::new(2.0, 0.5),
            Matrix::<2>::identity(),
        )
        .unwrap();
        let image = ImageBuffer::from_fn(geometry, |p| 3.0 * p[0] + p[1]);
        let (_, gradient) = LinearInterpolator
            .evaluate_with_gradient(&image, &Vector::<2>::new(4.3, 1.1))
            .unwrap();
        assert!((gradient - Vector::<2>::new(3.0, 1.0)).norm() < 1e-12);
    }
}

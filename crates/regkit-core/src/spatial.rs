//! Spatial types and the index/physical geometry of a sampled image.
//!
//! Points and vectors are nalgebra statics over `f64`. [`Geometry`] maps
//! discrete indices to physical coordinates with
//! `point = origin + Direction * (index * spacing)`.

use nalgebra::{SMatrix, SVector};

use crate::error::{CoreError, Result};

/// A point or displacement in D-dimensional physical space.
pub type Vector<const D: usize> = SVector<f64, D>;

/// A D x D matrix; columns of a direction matrix are the image axes.
pub type Matrix<const D: usize> = SMatrix<f64, D, D>;

/// Size, origin, spacing and orientation of a sampled image.
///
/// Voxels are stored with the first axis varying fastest, so the linear index
/// of `[i0, i1, i2]` is `i0 + size[0] * (i1 + size[1] * i2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry<const D: usize> {
    size: [usize; D],
    origin: Vector<D>,
    spacing: Vector<D>,
    direction: Matrix<D>,
    inverse_direction: Matrix<D>,
}

impl<const D: usize> Geometry<D> {
    /// Create a geometry. Spacing must be positive and the direction invertible.
    pub fn new(
        size: [usize; D],
        origin: Vector<D>,
        spacing: Vector<D>,
        direction: Matrix<D>,
    ) -> Result<Self> {
        if spacing.iter().any(|s| s.is_nan() || *s <= 0.0) {
            return Err(CoreError::invalid_value(
                "Spacing",
                0,
                format!("{:?}", spacing.as_slice()),
                "spacing must be positive",
            ));
        }
        let inverse_direction = direction.try_inverse().ok_or_else(|| {
            CoreError::invalid_value(
                "Direction",
                0,
                format!("{:?}", direction.as_slice()),
                "direction matrix is singular",
            )
        })?;
        Ok(Self {
            size,
            origin,
            spacing,
            direction,
            inverse_direction,
        })
    }

    /// Unit spacing, zero origin, identity direction.
    pub fn with_size(size: [usize; D]) -> Self {
        Self {
            size,
            origin: Vector::zeros(),
            spacing: Vector::repeat(1.0),
            direction: Matrix::identity(),
            inverse_direction: Matrix::identity(),
        }
    }

    pub fn size(&self) -> [usize; D] {
        self.size
    }

    pub fn origin(&self) -> &Vector<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Vector<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Matrix<D> {
        &self.direction
    }

    pub fn number_of_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Tensor shape for this geometry: the size reversed, slowest axis first.
    pub fn tensor_shape(&self) -> [usize; D] {
        let mut shape = self.size;
        shape.reverse();
        shape
    }

    pub fn linear_index(&self, index: &[usize; D]) -> usize {
        let mut linear = 0;
        for axis in (0..D).rev() {
            linear = linear * self.size[axis] + index[axis];
        }
        linear
    }

    pub fn multi_index(&self, mut linear: usize) -> [usize; D] {
        let mut index = [0usize; D];
        for axis in 0..D {
            index[axis] = linear % self.size[axis];
            linear /= self.size[axis];
        }
        index
    }

    /// `point = origin + Direction * (index * spacing)`
    pub fn continuous_index_to_physical(&self, index: &Vector<D>) -> Vector<D> {
        self.origin + self.direction * index.component_mul(&self.spacing)
    }

    pub fn index_to_physical(&self, index: &[usize; D]) -> Vector<D> {
        let continuous = Vector::<D>::from_fn(|axis, _| index[axis] as f64);
        self.continuous_index_to_physical(&continuous)
    }

    /// `index = (Direction^-1 * (point - origin)) / spacing`
    pub fn physical_to_continuous_index(&self, point: &Vector<D>) -> Vector<D> {
        (self.inverse_direction * (point - self.origin)).component_div(&self.spacing)
    }

    /// Convert a derivative taken with respect to the continuous index into a
    /// physical-space gradient.
    pub fn index_gradient_to_physical(&self, gradient: &Vector<D>) -> Vector<D> {
        self.inverse_direction.transpose() * gradient.component_div(&self.spacing)
    }

    /// Continuous index lies within `[0, size - 1]` on every axis.
    pub fn is_inside(&self, index: &Vector<D>) -> bool {
        (0..D).all(|axis| index[axis] >= 0.0 && index[axis] <= (self.size[axis] as f64 - 1.0))
    }

    /// Physical position of the geometric centre of the voxel grid.
    pub fn center(&self) -> Vector<D> {
        let index = Vector::<D>::from_fn(|axis, _| (self.size[axis] as f64 - 1.0) / 2.0);
        self.continuous_index_to_physical(&index)
    }

    /// Same physical extent sampled with `size` voxels and `spacing`.
    pub fn resampled(&self, size: [usize; D], spacing: Vector<D>) -> Self {
        Self {
            size,
            origin: self.origin,
            spacing,
            direction: self.direction,
            inverse_direction: self.inverse_direction,
        }
    }
}

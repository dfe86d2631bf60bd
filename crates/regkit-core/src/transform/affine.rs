//! Affine transform implementation.

use super::trait_::Transform;
use crate::error::{CoreError, Result};
use crate::spatial::{Matrix, Vector};

/// Affine transform about a fixed centre.
///
/// `T(x) = A (x - c) + c + t`. Parameters are the matrix `A` in row-major
/// order followed by the translation `t`; the centre `c` is a fixed
/// parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform<const D: usize> {
    matrix: Matrix<D>,
    translation: Vector<D>,
    center: Vector<D>,
}

impl<const D: usize> AffineTransform<D> {
    pub fn new(matrix: Matrix<D>, translation: Vector<D>, center: Vector<D>) -> Self {
        Self {
            matrix,
            translation,
            center,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix::identity(), Vector::zeros(), Vector::zeros())
    }

    pub fn matrix(&self) -> &Matrix<D> {
        &self.matrix
    }

    pub fn translation(&self) -> &Vector<D> {
        &self.translation
    }

    pub fn center(&self) -> &Vector<D> {
        &self.center
    }

    pub fn set_center(&mut self, center: Vector<D>) {
        self.center = center;
    }

    pub fn set_translation(&mut self, translation: Vector<D>) {
        self.translation = translation;
    }
}

impl<const D: usize> Default for AffineTransform<D> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<const D: usize> Transform<D> for AffineTransform<D> {
    fn name(&self) -> &'static str {
        "AffineTransform"
    }

    fn number_of_parameters(&self) -> usize {
        D * D + D
    }

    fn parameters(&self) -> Vec<f64> {
        let mut parameters = Vec::with_capacity(D * D + D);
        for row in 0..D {
            for col in 0..D {
                parameters.push(self.matrix[(row, col)]);
            }
        }
        parameters.extend(self.translation.iter());
        parameters
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        if parameters.len() != D * D + D {
            return Err(CoreError::ParameterCount {
                expected: D * D + D,
                actual: parameters.len(),
            });
        }
        self.matrix = Matrix::from_row_slice(&parameters[..D * D]);
        self.translation = Vector::from_column_slice(&parameters[D * D..]);
        Ok(())
    }

    fn fixed_parameters(&self) -> Vec<f64> {
        self.center.iter().copied().collect()
    }

    fn transform_point(&self, point: &Vector<D>) -> Vector<D> {
        self.matrix * (point - self.center) + self.center + self.translation
    }

    fn jacobian(&self, point: &Vector<D>) -> Vec<Vector<D>> {
        let offset = point - self.center;
        let mut columns = Vec::with_capacity(D * D + D);
        for row in 0..D {
            for col in 0..D {
                let mut column = Vector::<D>::zeros();
                column[row] = offset[col];
                columns.push(column);
            }
        }
        for axis in 0..D {
            let mut column = Vector::<D>::zeros();
            column[axis] = 1.0;
            columns.push(column);
        }
        columns
    }

    fn clone_box(&self) -> Box<dyn Transform<D>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_about_center() {
        let matrix = Matrix::<2>::new(0.0, -1.0, 1.0, 0.0);
        let transform = AffineTransform::new(matrix, Vector::zeros(), Vector::<2>::new(1.0, 1.0));
        let moved = transform.transform_point(&Vector::<2>::new(2.0, 1.0));
        assert!((moved - Vector::<2>::new(1.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn test_parameter_layout_is_row_major_then_translation() {
        let mut transform = AffineTransform::<2>::identity();
        transform.set_parameters(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(transform.matrix()[(0, 1)], 2.0);
        assert_eq!(transform.matrix()[(1, 0)], 3.0);
        assert_eq!(transform.translation(), &Vector::<2>::new(5.0, 6.0));
        assert_eq!(transform.parameters(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let mut transform = AffineTransform::<2>::identity();
        transform.set_center(Vector::<2>::new(0.5, -1.0));
        transform.set_parameters(&[1.1, 0.2, -0.1, 0.9, 0.3, 0.4]).unwrap();
        let point = Vector::<2>::new(2.0, 3.0);
        let jacobian = transform.jacobian(&point);

        let base = transform.parameters();
        let h = 1e-6;
        for (k, column) in jacobian.iter().enumerate() {
            let mut perturbed = transform.clone();
            let mut parameters = base.clone();
            parameters[k] += h;
            perturbed.set_parameters(&parameters).unwrap();
            let numeric = (perturbed.transform_point(&point) - transform.transform_point(&point)) / h;
            assert!((numeric - column).norm() < 1e-6);
        }
    }
}

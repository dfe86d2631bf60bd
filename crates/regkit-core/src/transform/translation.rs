//! Translation transform implementation.

use super::trait_::Transform;
use crate::error::{CoreError, Result};
use crate::spatial::Vector;

/// Translates points by a fixed offset vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationTransform<const D: usize> {
    translation: Vector<D>,
}

impl<const D: usize> TranslationTransform<D> {
    pub fn new(translation: Vector<D>) -> Self {
        Self { translation }
    }

    pub fn identity() -> Self {
        Self::new(Vector::zeros())
    }

    pub fn translation(&self) -> &Vector<D> {
        &self.translation
    }
}

impl<const D: usize> Default for TranslationTransform<D> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<const D: usize> Transform<D> for TranslationTransform<D> {
    fn name(&self) -> &'static str {
        "TranslationTransform"
    }

    fn number_of_parameters(&self) -> usize {
        D
    }

    fn parameters(&self) -> Vec<f64> {
        self.translation.iter().copied().collect()
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        if parameters.len() != D {
            return Err(CoreError::ParameterCount {
                expected: D,
                actual: parameters.len(),
            });
        }
        self.translation = Vector::from_column_slice(parameters);
        Ok(())
    }

    fn transform_point(&self, point: &Vector<D>) -> Vector<D> {
        point + self.translation
    }

    fn jacobian(&self, _point: &Vector<D>) -> Vec<Vector<D>> {
        (0..D)
            .map(|axis| {
                let mut column = Vector::<D>::zeros();
                column[axis] = 1.0;
                column
            })
            .collect()
    }

    fn clone_box(&self) -> Box<dyn Transform<D>> {
        Box::new(self.clone())
    }
}

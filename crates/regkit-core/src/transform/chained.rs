//! Chained transform implementation.
//!
//! Composes a fixed initial transform with an optimisable one:
//! T(x) = current(initial(x))

use super::trait_::Transform;
use crate::error::Result;
use crate::spatial::Vector;

/// `current` after `initial`.
///
/// Only `current` is optimised: parameters, fixed parameters and the
/// Jacobian all belong to it, the Jacobian evaluated at `initial(x)`.
#[derive(Debug, Clone)]
pub struct ChainedTransform<const D: usize> {
    initial: Box<dyn Transform<D>>,
    current: Box<dyn Transform<D>>,
}

impl<const D: usize> ChainedTransform<D> {
    pub fn new(initial: Box<dyn Transform<D>>, current: Box<dyn Transform<D>>) -> Self {
        Self { initial, current }
    }

    pub fn current(&self) -> &dyn Transform<D> {
        self.current.as_ref()
    }
}

impl<const D: usize> Transform<D> for ChainedTransform<D> {
    fn name(&self) -> &'static str {
        self.current.name()
    }

    fn number_of_parameters(&self) -> usize {
        self.current.number_of_parameters()
    }

    fn parameters(&self) -> Vec<f64> {
        self.current.parameters()
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        self.current.set_parameters(parameters)
    }

    fn fixed_parameters(&self) -> Vec<f64> {
        self.current.fixed_parameters()
    }

    fn transform_point(&self, point: &Vector<D>) -> Vector<D> {
        self.current.transform_point(&self.initial.transform_point(point))
    }

    fn jacobian(&self, point: &Vector<D>) -> Vec<Vector<D>> {
        self.current.jacobian(&self.initial.transform_point(point))
    }

    fn initial_transform(&self) -> Option<&dyn Transform<D>> {
        Some(self.initial.as_ref())
    }

    fn clone_box(&self) -> Box<dyn Transform<D>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{AffineTransform, TranslationTransform};
    use crate::Matrix;

    #[test]
    fn test_chained_transform_2d() {
        // [1, 0] first, then [0, 1]
        let chain = ChainedTransform::new(
            Box::new(TranslationTransform::new(Vector::<2>::new(1.0, 0.0))),
            Box::new(TranslationTransform::new(Vector::<2>::new(0.0, 1.0))),
        );
        assert_eq!(chain.transform_point(&Vector::<2>::zeros()), Vector::<2>::new(1.0, 1.0));
        assert_eq!(chain.name(), "TranslationTransform");
        assert_eq!(chain.parameters(), vec![0.0, 1.0]);
        assert_eq!(chain.initial_transform().unwrap().parameters(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_only_the_current_transform_is_optimised() {
        let initial = TranslationTransform::new(Vector::<2>::new(2.0, 0.0));
        let mut chain = ChainedTransform::new(Box::new(initial), Box::new(AffineTransform::<2>::identity()));
        chain.set_parameters(&[2.0, 0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();

        // x -> 2 * (x + 2) along the first axis
        let mapped = chain.transform_point(&Vector::<2>::new(1.0, 5.0));
        assert!((mapped - Vector::<2>::new(6.0, 5.0)).norm() < 1e-12);
        assert_eq!(chain.number_of_parameters(), 6);
        assert_eq!(chain.initial_transform().unwrap().parameters(), vec![2.0, 0.0]);

        // Jacobian of the affine part, taken at the shifted point
        let point = Vector::<2>::new(1.0, 5.0);
        let shifted = Vector::<2>::new(3.0, 5.0);
        let expected = AffineTransform::new(Matrix::<2>::identity() * 2.0, Vector::zeros(), Vector::zeros())
            .jacobian(&shifted);
        assert_eq!(chain.jacobian(&point), expected);
    }
}

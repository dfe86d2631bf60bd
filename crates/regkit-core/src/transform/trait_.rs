//! Transform trait for spatial coordinate transformations.

use crate::error::Result;
use crate::spatial::Vector;

/// Parametric mapping from fixed-image physical space to moving-image
/// physical space.
///
/// Parameters form a flat vector the optimizer works on; fixed parameters
/// (such as a centre of rotation) are not optimised.
pub trait Transform<const D: usize>: std::fmt::Debug {
    /// Name written to the `Transform` field of parameter records.
    fn name(&self) -> &'static str;

    fn number_of_parameters(&self) -> usize;

    fn parameters(&self) -> Vec<f64>;

    /// Replace the parameters; the length must equal
    /// [`number_of_parameters`](Self::number_of_parameters).
    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()>;

    fn fixed_parameters(&self) -> Vec<f64> {
        Vec::new()
    }

    fn transform_point(&self, point: &Vector<D>) -> Vector<D>;

    /// Derivative of the mapped point with respect to each parameter at
    /// `point`: one column per parameter.
    fn jacobian(&self, point: &Vector<D>) -> Vec<Vector<D>>;

    /// Transform applied before this one, if it is a composition.
    fn initial_transform(&self) -> Option<&dyn Transform<D>> {
        None
    }

    fn clone_box(&self) -> Box<dyn Transform<D>>;
}

impl<const D: usize> Clone for Box<dyn Transform<D>> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

//! Interpolator trait for sampling values at continuous coordinates.

use crate::image::ImageBuffer;
use crate::spatial::Vector;

/// Samples image values at physical points.
///
/// Points outside the image grid yield `None`.
pub trait Interpolator<const D: usize>: Send + Sync {
    /// Value at a physical point.
    fn evaluate(&self, image: &ImageBuffer<D>, point: &Vector<D>) -> Option<f64>;

    /// Value and physical-space gradient at a physical point.
    fn evaluate_with_gradient(
        &self,
        image: &ImageBuffer<D>,
        point: &Vector<D>,
    ) -> Option<(f64, Vector<D>)>;
}

//! Family interfaces: what each category of component offers beyond the
//! shared lifecycle.

use std::rc::Rc;

use burn::tensor::backend::Backend;
use regkit_core::interpolation::Interpolator;
use regkit_core::transform::Transform;
use regkit_core::{ImageBuffer, Vector};

use super::RegistrationComponent;
use crate::error::Result;
use crate::events::RegistrationEvent;

/// Drives the staged run: each call performs at most one unit of work and
/// reports what happened.
pub trait RegistrationMethod<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    fn advance(&mut self) -> Result<RegistrationEvent>;

    fn number_of_resolutions(&self) -> usize;
}

/// One resolution level per entry, coarsest first.
pub trait ImagePyramidComponent<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    fn number_of_levels(&self) -> usize;

    /// Host copy of the image at `level`, once the pyramid has been computed.
    fn level(&self, level: usize) -> Option<Rc<ImageBuffer<D>>>;
}

/// A fixed-image sample: physical position and fixed-image value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSample<const D: usize> {
    pub point: Vector<D>,
    pub value: f64,
}

/// Chooses where the metric evaluates the fixed image.
pub trait ImageSamplerComponent<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    fn samples(&self) -> &[ImageSample<D>];
}

pub trait InterpolatorComponent<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    fn interpolator(&self) -> &dyn Interpolator<D>;
}

/// Similarity measure between the fixed image and the transformed moving
/// image. Lower is better.
pub trait MetricComponent<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    fn value(&mut self, parameters: &[f64]) -> Result<f64>;

    fn value_and_derivative(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)>;
}

/// Objective handed to an optimizer.
pub trait CostFunction {
    fn number_of_parameters(&self) -> usize;

    fn value(&mut self, parameters: &[f64]) -> Result<f64>;

    fn value_and_derivative(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)>;
}

/// Result of one optimizer step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// An iteration was performed; the position changed.
    Iterated,
    /// No iteration was performed; the optimizer is done at this level.
    Stopped(String),
}

pub trait OptimizerComponent<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    /// Start a new resolution level from `initial`.
    fn start(&mut self, initial: Vec<f64>) -> Result<()>;

    fn step(&mut self, cost: &mut dyn CostFunction) -> Result<StepOutcome>;

    fn current_position(&self) -> &[f64];

    fn current_value(&self) -> f64;
}

/// Produces the final deformed moving image.
pub trait ResamplerComponent<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    /// Moving image resampled onto the fixed-image grid with the current
    /// transform.
    fn resample(&self) -> Result<ImageBuffer<D>>;
}

pub trait TransformComponent<B: Backend, const D: usize>: RegistrationComponent<B, D> {
    fn transform(&self) -> &dyn Transform<D>;

    fn transform_mut(&mut self) -> &mut dyn Transform<D>;
}

//! Component categories, labels, and the lifecycle every component shares.

pub mod families;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use burn::tensor::backend::Backend;
use regkit_core::ParameterMap;

use crate::context::ExecutionContext;
use crate::error::{RegistrationError, Result};

pub use families::{
    CostFunction, ImagePyramidComponent, ImageSample, ImageSamplerComponent, InterpolatorComponent,
    MetricComponent, OptimizerComponent, RegistrationMethod, ResamplerComponent, StepOutcome,
    TransformComponent,
};

/// The role a component plays in a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Registration,
    FixedImagePyramid,
    MovingImagePyramid,
    ImageSampler,
    Interpolator,
    Metric,
    Optimizer,
    ResampleInterpolator,
    Resampler,
    Transform,
}

impl Category {
    /// Order in which categories are created from the configuration.
    pub const CREATION_ORDER: [Category; 10] = [
        Category::Registration,
        Category::FixedImagePyramid,
        Category::MovingImagePyramid,
        Category::ImageSampler,
        Category::Interpolator,
        Category::Metric,
        Category::Optimizer,
        Category::ResampleInterpolator,
        Category::Resampler,
        Category::Transform,
    ];

    /// Order in which lifecycle events reach categories (after the
    /// configuration). Also the binding order.
    pub const FAN_OUT_ORDER: [Category; 10] = [
        Category::Registration,
        Category::Transform,
        Category::ImageSampler,
        Category::Metric,
        Category::Interpolator,
        Category::Optimizer,
        Category::FixedImagePyramid,
        Category::MovingImagePyramid,
        Category::ResampleInterpolator,
        Category::Resampler,
    ];

    /// Parameter key naming this category's components.
    pub fn key(self) -> &'static str {
        match self {
            Category::Registration => "Registration",
            Category::FixedImagePyramid => "FixedImagePyramid",
            Category::MovingImagePyramid => "MovingImagePyramid",
            Category::ImageSampler => "ImageSampler",
            Category::Interpolator => "Interpolator",
            Category::Metric => "Metric",
            Category::Optimizer => "Optimizer",
            Category::ResampleInterpolator => "ResampleInterpolator",
            Category::Resampler => "Resampler",
            Category::Transform => "Transform",
        }
    }

    /// Component used when the configuration names none.
    pub fn default_component(self) -> Option<&'static str> {
        match self {
            Category::Registration => Some("MultiResolutionRegistration"),
            Category::FixedImagePyramid => Some("FixedSmoothingImagePyramid"),
            Category::MovingImagePyramid => Some("MovingSmoothingImagePyramid"),
            Category::Interpolator => Some("LinearInterpolator"),
            Category::ResampleInterpolator => Some("FinalLinearInterpolator"),
            Category::Resampler => Some("DefaultResampler"),
            Category::ImageSampler | Category::Metric | Category::Optimizer | Category::Transform => None,
        }
    }

    /// Whether a run cannot proceed without at least one component.
    pub fn is_mandatory(self) -> bool {
        !matches!(self, Category::ImageSampler)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// `(category, index)` of a component within its collection. Displays as
/// `Metric1`, which is also its parameter prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentLabel {
    pub category: Category,
    pub index: usize,
}

impl ComponentLabel {
    pub fn new(category: Category, index: usize) -> Self {
        Self { category, index }
    }
}

impl fmt::Display for ComponentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.category.key(), self.index)
    }
}

/// State every component carries: its label and a non-owning reference to
/// the execution context it is bound to.
pub struct ComponentBase<B: Backend, const D: usize> {
    label: Option<ComponentLabel>,
    context: Weak<ExecutionContext<B, D>>,
}

impl<B: Backend, const D: usize> Default for ComponentBase<B, D> {
    fn default() -> Self {
        Self {
            label: None,
            context: Weak::new(),
        }
    }
}

impl<B: Backend, const D: usize> fmt::Debug for ComponentBase<B, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBase")
            .field("label", &self.label)
            .field("bound", &(self.context.strong_count() > 0))
            .finish()
    }
}

/// Lifecycle shared by every component.
///
/// Hooks are called synchronously by the pipeline in a fixed category order.
/// All hooks default to doing nothing; an error from any hook stops the run.
pub trait RegistrationComponent<B: Backend, const D: usize> {
    /// Registered family name, e.g. `"AdvancedMeanSquares"`.
    fn name(&self) -> &'static str;

    fn base(&self) -> &ComponentBase<B, D>;

    fn base_mut(&mut self) -> &mut ComponentBase<B, D>;

    fn set_label(&mut self, label: ComponentLabel) {
        self.base_mut().label = Some(label);
    }

    fn label(&self) -> Option<ComponentLabel> {
        self.base().label
    }

    fn bind_context(&mut self, context: &Rc<ExecutionContext<B, D>>) {
        self.base_mut().context = Rc::downgrade(context);
    }

    /// Drop the context reference; the label is kept.
    fn unbind(&mut self) {
        self.base_mut().context = Weak::new();
    }

    fn is_bound(&self) -> bool {
        self.base().context.strong_count() > 0
    }

    /// The bound context; an error when unbound or already torn down.
    fn context(&self) -> Result<Rc<ExecutionContext<B, D>>> {
        self.base().context.upgrade().ok_or_else(|| {
            RegistrationError::runtime(format!(
                "{} ({}) used outside a bound execution context",
                self.name(),
                self.label().map(|l| l.to_string()).unwrap_or_else(|| "unlabelled".into())
            ))
        })
    }

    fn before_all(&mut self) -> Result<()> {
        Ok(())
    }

    fn before_registration(&mut self) -> Result<()> {
        Ok(())
    }

    fn before_each_resolution(&mut self) -> Result<()> {
        Ok(())
    }

    fn after_each_iteration(&mut self) -> Result<()> {
        Ok(())
    }

    fn after_each_resolution(&mut self) -> Result<()> {
        Ok(())
    }

    fn after_registration(&mut self) -> Result<()> {
        Ok(())
    }

    /// Contribute this component's block to a transform-parameter record.
    fn write_parameters(&self, _parameters: &mut ParameterMap) -> Result<()> {
        Ok(())
    }
}

/// Shared, interior-mutable handle to a component.
pub type Shared<T> = Rc<RefCell<T>>;

/// A component instance tagged with the category it was built for. This is
/// what registry factories produce inside their type-erased box.
pub enum Component<B: Backend, const D: usize> {
    Registration(Shared<dyn RegistrationMethod<B, D>>),
    FixedImagePyramid(Shared<dyn ImagePyramidComponent<B, D>>),
    MovingImagePyramid(Shared<dyn ImagePyramidComponent<B, D>>),
    ImageSampler(Shared<dyn ImageSamplerComponent<B, D>>),
    Interpolator(Shared<dyn InterpolatorComponent<B, D>>),
    Metric(Shared<dyn MetricComponent<B, D>>),
    Optimizer(Shared<dyn OptimizerComponent<B, D>>),
    ResampleInterpolator(Shared<dyn InterpolatorComponent<B, D>>),
    Resampler(Shared<dyn ResamplerComponent<B, D>>),
    Transform(Shared<dyn TransformComponent<B, D>>),
}

impl<B: Backend, const D: usize> Component<B, D> {
    pub fn category(&self) -> Category {
        match self {
            Component::Registration(_) => Category::Registration,
            Component::FixedImagePyramid(_) => Category::FixedImagePyramid,
            Component::MovingImagePyramid(_) => Category::MovingImagePyramid,
            Component::ImageSampler(_) => Category::ImageSampler,
            Component::Interpolator(_) => Category::Interpolator,
            Component::Metric(_) => Category::Metric,
            Component::Optimizer(_) => Category::Optimizer,
            Component::ResampleInterpolator(_) => Category::ResampleInterpolator,
            Component::Resampler(_) => Category::Resampler,
            Component::Transform(_) => Category::Transform,
        }
    }

    /// Family name of the wrapped component. Fails while the component is
    /// borrowed elsewhere.
    pub fn name(&self) -> Result<&'static str> {
        self.with_lifecycle(|c| Ok(c.name()))
    }

    /// Run `f` on the component through its lifecycle interface.
    pub fn with_lifecycle<R>(
        &self,
        f: impl FnOnce(&mut dyn RegistrationComponent<B, D>) -> Result<R>,
    ) -> Result<R> {
        macro_rules! call {
            ($slot:expr) => {{
                let mut guard = $slot
                    .try_borrow_mut()
                    .map_err(|_| busy(self.category()))?;
                f(&mut *guard)
            }};
        }
        match self {
            Component::Registration(c) => call!(c),
            Component::FixedImagePyramid(c) | Component::MovingImagePyramid(c) => call!(c),
            Component::ImageSampler(c) => call!(c),
            Component::Interpolator(c) | Component::ResampleInterpolator(c) => call!(c),
            Component::Metric(c) => call!(c),
            Component::Optimizer(c) => call!(c),
            Component::Resampler(c) => call!(c),
            Component::Transform(c) => call!(c),
        }
    }
}

pub(crate) fn busy(category: Category) -> RegistrationError {
    RegistrationError::runtime(format!(
        "{category} component is already in use (re-entrant call)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display_is_parameter_prefix() {
        assert_eq!(ComponentLabel::new(Category::Metric, 1).to_string(), "Metric1");
        assert_eq!(
            ComponentLabel::new(Category::FixedImagePyramid, 0).to_string(),
            "FixedImagePyramid0"
        );
    }

    #[test]
    fn test_orders_cover_every_category_once() {
        let mut creation = Category::CREATION_ORDER.to_vec();
        let mut fan_out = Category::FAN_OUT_ORDER.to_vec();
        creation.sort();
        fan_out.sort();
        assert_eq!(creation, fan_out);
        creation.dedup();
        assert_eq!(creation.len(), 10);
    }

    #[test]
    fn test_transform_precedes_metric_in_fan_out() {
        let position = |c| Category::FAN_OUT_ORDER.iter().position(|x| *x == c).unwrap();
        assert!(position(Category::Transform) < position(Category::Metric));
        assert_eq!(position(Category::Registration), 0);
    }

    #[test]
    fn test_name_of_a_borrowed_component_is_an_error() {
        use crate::builtin::transform::ParametricTransform;
        use burn_ndarray::NdArray;

        let transform = Rc::new(RefCell::new(ParametricTransform::<NdArray<f32>, 2>::translation()));
        let component = Component::Transform(transform.clone());
        assert_eq!(component.name().unwrap(), "TranslationTransform");

        let _guard = transform.borrow_mut();
        let err = component.name().unwrap_err();
        assert_eq!(err.error_code(), 8);
        assert!(err.to_string().contains("Transform component is already in use"));
    }

    #[test]
    fn test_only_sampler_is_optional() {
        for category in Category::CREATION_ORDER {
            assert_eq!(category.is_mandatory(), category != Category::ImageSampler);
        }
    }
}

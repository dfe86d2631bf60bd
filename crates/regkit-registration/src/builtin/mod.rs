//! Built-in components and the registry installation list.
//!
//! Every supported signature gets the same set of families. `float` images
//! run on `NdArray<f32>`, `double` images on `NdArray<f64>`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;
use regkit_core::{PixelType, TypeSignature};

use crate::component::Component;
use crate::pipeline::{Pipeline, PipelineRunner, PIPELINE_FAMILY};
use crate::registry::{AnyComponent, ComponentFactory, ComponentRegistry, SignatureIndex};

/// Implements the identity part of [`RegistrationComponent`](crate::component::RegistrationComponent)
/// for a struct with a `base` field.
macro_rules! component_identity {
    ($name:expr) => {
        fn name(&self) -> &'static str {
            $name
        }

        fn base(&self) -> &$crate::component::ComponentBase<B, D> {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::component::ComponentBase<B, D> {
            &mut self.base
        }
    };
}

pub mod interpolator;
pub mod metric;
pub mod optimizer;
pub mod pyramid;
pub mod registration;
pub mod resampler;
pub mod sampler;
pub mod transform;

pub use interpolator::InterpolatorHolder;
pub use metric::{MetricKind, SimilarityMetric};
pub use optimizer::{GradientDescent, GradientDescentKind};
pub use pyramid::{ImagePyramid, PyramidKind, PyramidSide};
pub use registration::MultiResolutionRegistration;
pub use resampler::DefaultResampler;
pub use sampler::{ImageSampler, SamplerKind};
pub use transform::ParametricTransform;

pub(crate) fn shared<T>(value: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(value))
}

/// Wrap a component constructor as a registry factory.
pub fn factory<B: Backend, const D: usize>(make: fn() -> Component<B, D>) -> ComponentFactory {
    Arc::new(move || Some(Box::new(make()) as AnyComponent))
}

/// Register every built-in signature and family.
pub fn install(registry: &mut ComponentRegistry) {
    install_for::<NdArray<f32>, 2>(registry, PixelType::Float);
    install_for::<NdArray<f32>, 3>(registry, PixelType::Float);
    install_for::<NdArray<f64>, 2>(registry, PixelType::Double);
    install_for::<NdArray<f64>, 3>(registry, PixelType::Double);
}

/// Register the pipeline and all built-in families for one backend and
/// dimension, under a symmetric signature of `pixel_type`.
pub fn install_for<B: Backend, const D: usize>(
    registry: &mut ComponentRegistry,
    pixel_type: PixelType,
) -> SignatureIndex {
    let index = registry.register_signature(TypeSignature::symmetric(pixel_type, D));
    registry.register(
        PIPELINE_FAMILY,
        index,
        Arc::new(|| {
            let pipeline: Box<dyn PipelineRunner> = Box::new(Pipeline::<B, D>::new(Default::default()));
            Some(Box::new(pipeline) as AnyComponent)
        }),
    );
    registration::register::<B, D>(registry, index);
    pyramid::register::<B, D>(registry, index);
    sampler::register::<B, D>(registry, index);
    interpolator::register::<B, D>(registry, index);
    metric::register::<B, D>(registry, index);
    optimizer::register::<B, D>(registry, index);
    transform::register::<B, D>(registry, index);
    resampler::register::<B, D>(registry, index);
    index
}

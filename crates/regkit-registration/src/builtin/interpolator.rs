//! Interpolator components, for the metric and for final resampling.

use burn::tensor::backend::Backend;
use regkit_core::interpolation::{Interpolator, LinearInterpolator, NearestNeighborInterpolator};
use regkit_core::ParameterMap;

use super::{factory, shared};
use crate::component::{Category, Component, ComponentBase, InterpolatorComponent, RegistrationComponent};
use crate::error::Result;
use crate::registry::{ComponentRegistry, SignatureIndex};

pub struct InterpolatorHolder<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    name: &'static str,
    interpolator: Box<dyn Interpolator<D>>,
}

impl<B: Backend, const D: usize> InterpolatorHolder<B, D> {
    pub fn new(name: &'static str, interpolator: Box<dyn Interpolator<D>>) -> Self {
        Self {
            base: ComponentBase::default(),
            name,
            interpolator,
        }
    }

    fn is_resample_interpolator(&self) -> bool {
        self.label()
            .is_some_and(|label| label.category == Category::ResampleInterpolator)
            || self.name.starts_with("Final")
    }
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for InterpolatorHolder<B, D> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn base(&self) -> &ComponentBase<B, D> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase<B, D> {
        &mut self.base
    }

    fn write_parameters(&self, parameters: &mut ParameterMap) -> Result<()> {
        if self.is_resample_interpolator() {
            parameters.set("ResampleInterpolator", [self.name]);
        }
        Ok(())
    }
}

impl<B: Backend, const D: usize> InterpolatorComponent<B, D> for InterpolatorHolder<B, D> {
    fn interpolator(&self) -> &dyn Interpolator<D> {
        self.interpolator.as_ref()
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    registry.register(
        "NearestNeighborInterpolator",
        index,
        factory::<B, D>(|| {
            Component::Interpolator(shared(InterpolatorHolder::<B, D>::new(
                "NearestNeighborInterpolator",
                Box::new(NearestNeighborInterpolator),
            )))
        }),
    );
    registry.register(
        "LinearInterpolator",
        index,
        factory::<B, D>(|| {
            Component::Interpolator(shared(InterpolatorHolder::<B, D>::new(
                "LinearInterpolator",
                Box::new(LinearInterpolator),
            )))
        }),
    );
    registry.register(
        "FinalNearestNeighborInterpolator",
        index,
        factory::<B, D>(|| {
            Component::ResampleInterpolator(shared(InterpolatorHolder::<B, D>::new(
                "FinalNearestNeighborInterpolator",
                Box::new(NearestNeighborInterpolator),
            )))
        }),
    );
    registry.register(
        "FinalLinearInterpolator",
        index,
        factory::<B, D>(|| {
            Component::ResampleInterpolator(shared(InterpolatorHolder::<B, D>::new(
                "FinalLinearInterpolator",
                Box::new(LinearInterpolator),
            )))
        }),
    );
}

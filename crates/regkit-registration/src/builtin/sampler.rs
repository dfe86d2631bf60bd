//! Image samplers: which fixed-image positions the metric evaluates.
//!
//! Samples are drawn from the current fixed pyramid level at the start of
//! every resolution. Positions outside a fixed mask are skipped.

use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regkit_core::ImageBuffer;

use super::{factory, shared};
use crate::component::{
    Component, ComponentBase, ImageSample, ImageSamplerComponent, RegistrationComponent,
};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::registry::{ComponentRegistry, SignatureIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Full,
    Grid,
    Random,
}

pub struct ImageSampler<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    kind: SamplerKind,
    samples: Vec<ImageSample<D>>,
    rng: Option<StdRng>,
    fresh_every_iteration: bool,
}

impl<B: Backend, const D: usize> ImageSampler<B, D> {
    pub fn new(kind: SamplerKind) -> Self {
        Self {
            base: ComponentBase::default(),
            kind,
            samples: Vec::new(),
            rng: None,
            fresh_every_iteration: false,
        }
    }

    fn draw(&mut self, context: &ExecutionContext<B, D>) -> Result<()> {
        let level = context.resolution().level;
        let image = current_fixed_level(context, level)?;
        let mask = context.fixed_mask(0);
        let label = self.label();
        let configuration = context.configuration();

        let candidates: Vec<usize> = match self.kind {
            SamplerKind::Full => (0..image.len()).collect(),
            SamplerKind::Grid => {
                let spacing: usize =
                    configuration.read_component_parameter_or("SampleGridSpacing", label.as_ref(), level, 2)?;
                grid_indices(&image, spacing.max(1))
            }
            SamplerKind::Random => {
                let count: usize = configuration.read_component_parameter_or(
                    "NumberOfSpatialSamples",
                    label.as_ref(),
                    level,
                    5000,
                )?;
                let rng = self.rng.get_or_insert_with(|| StdRng::seed_from_u64(0));
                (0..count).map(|_| rng.random_range(0..image.len())).collect()
            }
        };

        let geometry = image.geometry();
        self.samples = candidates
            .into_iter()
            .map(|linear| ImageSample {
                point: geometry.index_to_physical(&geometry.multi_index(linear)),
                value: image.values()[linear],
            })
            .filter(|sample| mask.as_ref().is_none_or(|m| m.is_inside_mask(&sample.point)))
            .collect();
        tracing::debug!(kind = ?self.kind, level, samples = self.samples.len(), "samples drawn");
        Ok(())
    }
}

/// Current fixed pyramid level, or the full-resolution fixed image when
/// there is no pyramid output for this level.
pub(crate) fn current_fixed_level<B: Backend, const D: usize>(
    context: &ExecutionContext<B, D>,
    level: usize,
) -> Result<std::rc::Rc<ImageBuffer<D>>> {
    if let Ok(pyramid) = context.fixed_pyramid(0) {
        if let Some(buffer) = pyramid.try_borrow().ok().and_then(|p| p.level(level)) {
            return Ok(buffer);
        }
    }
    context.fixed_image(0)
}

/// Moving counterpart of [`current_fixed_level`].
pub(crate) fn current_moving_level<B: Backend, const D: usize>(
    context: &ExecutionContext<B, D>,
    level: usize,
) -> Result<std::rc::Rc<ImageBuffer<D>>> {
    if let Ok(pyramid) = context.moving_pyramid(0) {
        if let Some(buffer) = pyramid.try_borrow().ok().and_then(|p| p.level(level)) {
            return Ok(buffer);
        }
    }
    context.moving_image(0)
}

fn grid_indices<const D: usize>(image: &ImageBuffer<D>, spacing: usize) -> Vec<usize> {
    let geometry = image.geometry();
    (0..image.len())
        .filter(|&linear| geometry.multi_index(linear).iter().all(|i| i % spacing == 0))
        .collect()
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for ImageSampler<B, D> {
    fn name(&self) -> &'static str {
        match self.kind {
            SamplerKind::Full => "Full",
            SamplerKind::Grid => "Grid",
            SamplerKind::Random => "Random",
        }
    }

    fn base(&self) -> &ComponentBase<B, D> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase<B, D> {
        &mut self.base
    }

    fn before_registration(&mut self) -> Result<()> {
        if self.kind == SamplerKind::Random {
            let context = self.context()?;
            let label = self.label();
            let configuration = context.configuration();
            let seed: u64 = configuration.read_component_parameter_or("RandomSeed", label.as_ref(), 0, 0)?;
            self.fresh_every_iteration =
                configuration.read_flag("NewSamplesEveryIteration", label.as_ref(), false)?;
            self.rng = Some(StdRng::seed_from_u64(seed));
        }
        Ok(())
    }

    fn before_each_resolution(&mut self) -> Result<()> {
        let context = self.context()?;
        self.draw(&context)
    }

    fn after_each_iteration(&mut self) -> Result<()> {
        if self.fresh_every_iteration {
            let context = self.context()?;
            self.draw(&context)?;
        }
        Ok(())
    }
}

impl<B: Backend, const D: usize> ImageSamplerComponent<B, D> for ImageSampler<B, D> {
    fn samples(&self) -> &[ImageSample<D>] {
        &self.samples
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    registry.register(
        "Full",
        index,
        factory::<B, D>(|| Component::ImageSampler(shared(ImageSampler::<B, D>::new(SamplerKind::Full)))),
    );
    registry.register(
        "Grid",
        index,
        factory::<B, D>(|| Component::ImageSampler(shared(ImageSampler::<B, D>::new(SamplerKind::Grid)))),
    );
    registry.register(
        "Random",
        index,
        factory::<B, D>(|| Component::ImageSampler(shared(ImageSampler::<B, D>::new(SamplerKind::Random)))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use regkit_core::Geometry;

    #[test]
    fn test_grid_indices_stride_every_axis() {
        let image = ImageBuffer::filled(Geometry::<2>::with_size([5, 4]), 1.0);
        let indices = grid_indices(&image, 2);
        // x in {0, 2, 4}, y in {0, 2}
        assert_eq!(indices.len(), 6);
        assert_eq!(indices[1], 2);
        assert_eq!(indices[3], 10);
    }
}
